//! Scheduler errors.

use thiserror::Error;

use tickwork_store::StoreError;

/// Errors surfaced by the [`Scheduler`](crate::Scheduler).
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Store failure, including schedule validation.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// No handler is registered under this identifier.
    #[error("no handler registered for '{0}'")]
    UnknownHandler(String),

    /// `start` was called twice.
    #[error("scheduler is already running")]
    AlreadyRunning,

    /// `shutdown` was called on a scheduler that is not running.
    #[error("scheduler is not running")]
    NotRunning,
}
