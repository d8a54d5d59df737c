pub mod conditions;
mod mariadb;

pub use conditions::{condition_reasons, condition_status, condition_types};
pub use mariadb::*;
