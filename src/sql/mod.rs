//! SQL access to cluster members
//!
//! The health evaluator only needs two queries, so the seam is a small trait
//! with a factory that knows how to reach a member of a `MariaDB` cluster.

mod mysql;

pub use mysql::{MySqlClient, MySqlClientFactory};

use async_trait::async_trait;
use thiserror::Error;

use crate::crd::MariaDB;

/// Errors that can occur while talking to a member
#[derive(Error, Debug)]
pub enum SqlError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("Credentials secret not found: {0}")]
    SecretNotFound(String),

    #[error("Secret missing required key: {0}")]
    SecretMissingKey(String),

    #[error("Invalid UTF-8 in secret data")]
    InvalidUtf8,

    #[error("Invalid port: {0}")]
    InvalidPort(i32),

    #[error("Invalid system variable name: {0}")]
    InvalidVariable(String),

    #[error("Unexpected value for {name}: {value}")]
    UnexpectedValue { name: String, value: String },
}

pub type SqlResult<T> = Result<T, SqlError>;

#[async_trait]
pub trait SqlClient: Send + Sync {
    /// Whether a global system variable is switched on (`ON`, `1`, `TRUE`)
    async fn is_system_variable_enabled(&self, name: &str) -> SqlResult<bool>;

    /// Member count the Galera provider reports for the primary component
    async fn galera_cluster_size(&self) -> SqlResult<i32>;
}

#[async_trait]
pub trait SqlClientFactory: Send + Sync {
    /// Open a client against one member pod of `mariadb`
    async fn connect(&self, mariadb: &MariaDB, pod_name: &str) -> SqlResult<Box<dyn SqlClient>>;
}

/// Interpret a system variable value as a boolean switch
pub fn parse_enabled(name: &str, value: &str) -> SqlResult<bool> {
    match value.trim().to_ascii_uppercase().as_str() {
        "ON" | "1" | "TRUE" | "YES" => Ok(true),
        "OFF" | "0" | "FALSE" | "NO" | "" => Ok(false),
        _ => Err(SqlError::UnexpectedValue {
            name: name.to_string(),
            value: value.to_string(),
        }),
    }
}

/// System variable names are interpolated into queries, so only identifiers pass
pub fn validate_variable_name(name: &str) -> SqlResult<()> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(SqlError::InvalidVariable(name.to_string()))
    }
}
