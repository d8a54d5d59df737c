// Test code is allowed to panic on failure
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic,
    dead_code
)]

//! Common test utilities and fixtures shared across all test targets
//!
//! Include this module in your test file:
//! ```rust,ignore
//! #[path = "../common/mod.rs"]
//! mod common;
//! use common::*;
//! ```

mod fixtures;

pub use fakes::*;
pub use fixtures::*;
