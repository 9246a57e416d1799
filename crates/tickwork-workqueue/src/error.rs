//! Worker errors.

use thiserror::Error;

/// Error returned by a job handler.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The payload could not be interpreted.
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// I/O failure inside the handler.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Handler-specific failure.
    #[error("{0}")]
    Failed(String),
}

impl HandlerError {
    pub fn failed(message: impl Into<String>) -> Self {
        HandlerError::Failed(message.into())
    }
}

/// Worker pool errors.
#[derive(Debug, Error)]
pub enum PoolError {
    /// A handler is already registered under this name.
    #[error("Handler already registered: {0}")]
    AlreadyRegistered(String),

    /// The pool is not accepting work.
    #[error("Pool is not running")]
    NotRunning,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_displays_message() {
        assert_eq!(HandlerError::failed("boom").to_string(), "boom");
    }

    #[test]
    fn test_io_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: HandlerError = io.into();
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn test_pool_error_display() {
        assert_eq!(PoolError::NotRunning.to_string(), "Pool is not running");
        assert_eq!(
            PoolError::AlreadyRegistered("LogMessage".to_string()).to_string(),
            "Handler already registered: LogMessage"
        );
    }
}
