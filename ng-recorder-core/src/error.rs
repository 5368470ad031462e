use crate::client::StatusCode;
use std::time::Duration;
use thiserror::Error;

pub type RecorderResult<T, E = RecorderError> = Result<T, E>;

/// Recorder specific errors
#[derive(Error, Debug, Default, Clone, PartialEq)]
pub enum RecorderError {
    #[error("Service unavailable")]
    #[default]
    ServiceUnavailable,
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Internal error: {0}")]
    InternalError(String),
    #[error("Invalid: {0}")]
    Invalid(String),
    #[error("Session error: {0}")]
    Session(String),
    #[error("Method call '{method}' failed: {status}")]
    Call { method: String, status: StatusCode },
    #[error("Codec error: {0}")]
    Codec(String),
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Request timeout")]
    Timeout(Duration),
}

impl RecorderError {
    /// Map the error back onto the device status taxonomy.
    pub fn status(&self) -> StatusCode {
        match self {
            RecorderError::NotFound(_) => StatusCode::BadNotFound,
            RecorderError::Invalid(_) | RecorderError::Codec(_) => StatusCode::BadInvalid,
            RecorderError::Call { status, .. } => *status,
            RecorderError::ServiceUnavailable
            | RecorderError::InternalError(_)
            | RecorderError::Session(_)
            | RecorderError::Configuration(_)
            | RecorderError::Timeout(_) => StatusCode::BadInternalError,
        }
    }
}
