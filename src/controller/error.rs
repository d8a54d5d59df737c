//! Error types for the MariaDB controllers

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::sql::SqlError;

/// Error variants are named with the `Error` suffix for clarity (e.g., `KubeError`, `ValidationError`).
/// This is idiomatic for error enums and improves readability at call sites.
#[allow(clippy::enum_variant_names)]
#[derive(Error, Debug)]
pub enum Error {
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("SQL error: {0}")]
    SqlError(#[from] SqlError),

    #[error("Missing object key: {0}")]
    MissingObjectKey(&'static str),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Transient error (will retry): {0}")]
    TransientError(String),

    #[error("Permanent error (will not retry): {0}")]
    PermanentError(String),

    #[error("{0}")]
    Multiple(Errors),
}

impl Error {
    /// Check if this error indicates a resource was not found
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::NotFound(_) => true,
            Error::KubeError(e) => matches!(e, kube::Error::Api(api_err) if api_err.code == 404),
            Error::Multiple(errors) => {
                !errors.is_empty() && errors.iter().all(|e| e.is_not_found())
            }
            _ => false,
        }
    }

    /// Optimistic concurrency rejection from the API server
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::KubeError(kube::Error::Api(api_err)) if api_err.code == 409)
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            // Kubernetes API errors are often retryable
            Error::KubeError(e) => {
                // Check for specific non-retryable HTTP codes
                match e {
                    kube::Error::Api(api_err) => {
                        // 4xx errors (except 409 Conflict, 429 TooManyRequests) are usually not retryable
                        let code = api_err.code;
                        if (400..500).contains(&code) {
                            return code == 409 || code == 429;
                        }
                        // 5xx errors are retryable
                        true
                    }
                    // Network and other errors are retryable
                    _ => true,
                }
            }
            // Connections to members come and go with pod restarts
            Error::SqlError(_) => true,
            Error::Timeout(_) => true,
            Error::TransientError(_) => true,
            Error::PermanentError(_) => false,
            // Configuration and validation errors are permanent
            Error::InvalidConfig(_) => false,
            Error::ValidationError(_) => false,
            Error::SerializationError(_) => false,
            Error::MissingObjectKey(_) => false,
            Error::NotFound(_) => true, // Resource might appear later
            Error::Multiple(errors) => errors.iter().any(|e| e.is_retryable()),
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Collects failures from independent side effects so none is lost
#[derive(Debug, Default)]
pub struct Errors(Vec<Error>);

impl Errors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, error: Error) {
        self.0.push(error);
    }

    /// Record the error of `result`, if any, and pass the value through
    pub fn collect<T>(&mut self, result: Result<T>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                self.push(e);
                None
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Error> {
        self.0.iter()
    }

    /// `Ok` when nothing was collected, the error itself when only one was
    pub fn into_result(mut self) -> Result<()> {
        match self.0.len() {
            0 => Ok(()),
            1 => Err(self.0.remove(0)),
            _ => Err(Error::Multiple(self)),
        }
    }
}

impl fmt::Display for Errors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, error) in self.0.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{error}")?;
        }
        Ok(())
    }
}

/// Exponential backoff configuration
#[derive(Clone, Debug)]
pub struct BackoffConfig {
    /// Initial delay for first retry
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Multiplier for each subsequent retry
    pub multiplier: f64,
    /// Random jitter factor (0.0 to 1.0)
    pub jitter: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(300), // 5 minutes
            multiplier: 2.0,
            jitter: 0.1,
        }
    }
}

impl BackoffConfig {
    /// Calculate the backoff delay for a given retry attempt
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base_delay_secs =
            self.initial_delay.as_secs_f64() * self.multiplier.powi(attempt as i32);

        let jitter_range = base_delay_secs * self.jitter;
        let jitter = rand::random::<f64>() * jitter_range * 2.0 - jitter_range;
        let delay_with_jitter = (base_delay_secs + jitter).max(0.0);

        let capped_delay = delay_with_jitter.min(self.max_delay.as_secs_f64());

        Duration::from_secs_f64(capped_delay)
    }

    /// Get the delay for an error, with different handling for retryable vs non-retryable
    pub fn delay_for_error(&self, error: &Error, attempt: u32) -> Duration {
        if error.is_retryable() {
            self.delay_for_attempt(attempt)
        } else {
            // Non-retryable errors wait for manual intervention
            self.max_delay
        }
    }
}
