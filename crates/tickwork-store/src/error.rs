//! Store errors.

use thiserror::Error;
use uuid::Uuid;

use tickwork_schedule::ScheduleError;

/// Store error types.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The job's schedule descriptor is malformed.
    #[error("invalid schedule: {0}")]
    InvalidSchedule(#[from] ScheduleError),

    /// No job with this name.
    #[error("job not found: {0}")]
    NotFound(String),

    /// Another holder owns an unexpired lease on the job.
    #[error("job already leased: {0}")]
    AlreadyLeased(String),

    /// The lease token is unknown or its lease has expired.
    #[error("lease expired: {0}")]
    LeaseExpired(Uuid),

    /// A lease duration could not be applied.
    #[error("invalid lease: {0}")]
    InvalidLease(String),

    /// Database error.
    #[error("database error: {0}")]
    Database(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<tokio_rusqlite::Error> for StoreError {
    fn from(err: tokio_rusqlite::Error) -> Self {
        StoreError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}
