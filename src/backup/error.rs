//! Error types for backup naming, selection and storage

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackupError {
    #[error("invalid backup file name: {0}")]
    InvalidFileName(String),

    #[error("invalid timestamp in backup file {name}: {reason}")]
    InvalidTimestamp { name: String, reason: String },

    #[error("unsupported compression algorithm: {0}")]
    UnsupportedCompression(String),

    #[error("backup file {0} is not compressed")]
    NotCompressed(String),

    #[error("no valid backup files found")]
    NoValidBackupsFound,

    #[error("backup file not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("giving up reading {name} after {attempts} attempts: {source}")]
    RetriesExhausted {
        name: String,
        attempts: u32,
        #[source]
        source: std::io::Error,
    },

    #[error("{}", cleanup_failure_message(.deleted, .failures))]
    CleanupFailed {
        /// Backups that were deleted before and after the failures
        deleted: Vec<String>,
        failures: Vec<(String, BackupError)>,
    },
}

fn cleanup_failure_message(deleted: &[String], failures: &[(String, BackupError)]) -> String {
    let details = failures
        .iter()
        .map(|(name, e)| format!("{name}: {e}"))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "failed to delete {} of {} old backups:\n{details}",
        failures.len(),
        deleted.len() + failures.len()
    )
}

pub type Result<T, E = BackupError> = std::result::Result<T, E>;
