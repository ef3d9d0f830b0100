//! Server-layer errors.

use thiserror::Error;
use uaserve_core::CoreError;
use uaserve_types::StatusCode;

/// Errors surfaced by the service dispatch layer.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("view id is unknown")]
    ViewUnknown,
}

impl ServerError {
    /// Maps the error onto the status code reported to the client.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServerError::Core(e) => e.status_code(),
            ServerError::InvalidRequest(_) => StatusCode::BadUnexpectedError,
            ServerError::ViewUnknown => StatusCode::BadViewIdUnknown,
        }
    }
}
