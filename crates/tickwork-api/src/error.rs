//! API error types.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use tickwork_runloop::SchedulerError;
use tickwork_store::StoreError;

/// Errors returned by route handlers. The body is the plain-text message.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("Job '{0}' not found")]
    NotFound(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<SchedulerError> for ApiError {
    fn from(err: SchedulerError) -> Self {
        match err {
            SchedulerError::UnknownHandler(method) => {
                Self::BadRequest(format!("Method '{}' is not recognized.", method))
            }
            SchedulerError::Store(StoreError::InvalidSchedule(e)) => Self::BadRequest(e.to_string()),
            SchedulerError::Store(StoreError::NotFound(name)) => Self::NotFound(name),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), self.to_string()).into_response()
    }
}
