//! Error types for the scheduler.

use thiserror::Error;

/// Errors that can occur in scheduler operations.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Invalid job registration: bad cron expression or an inconsistent
    /// frequency/expression pairing.
    #[error("validation error: {0}")]
    Validation(String),

    /// Job handler failed or timed out.
    #[error("job execution failed: {0}")]
    ExecutionFailed(String),

    /// Reading or writing the persistence file failed.
    #[error("persistence I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Persisted job data could not be encoded or decoded.
    #[error("persistence JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, SchedulerError>;
