//! Schedule errors.

use thiserror::Error;

/// Errors produced while validating or evaluating a schedule.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleError {
    /// The cron expression could not be parsed.
    #[error("invalid cron expression '{expression}': {reason}")]
    InvalidCron { expression: String, reason: String },

    /// The interval period is unusable.
    #[error("invalid interval: {0}")]
    InvalidInterval(String),
}

impl ScheduleError {
    pub(crate) fn cron(expression: &str, reason: impl Into<String>) -> Self {
        ScheduleError::InvalidCron {
            expression: expression.to_string(),
            reason: reason.into(),
        }
    }
}
