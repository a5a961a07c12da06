//! API error types.

use axum::http::StatusCode;
use dicomvid_media::PipelineError;
use dicomvid_models::InvokeResponse;
use thiserror::Error;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Invalid base64 DICOM data: {0}")]
    Base64(#[from] base64::DecodeError),

    /// Carries the failure message without the pipeline stage prefix
    #[error("{}", .0.message())]
    Conversion(#[from] PipelineError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Base64(_) | ApiError::Conversion(_) | ApiError::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Error envelope; internal details are hidden in production.
    pub fn to_envelope(&self, production: bool) -> InvokeResponse {
        let message = match self {
            ApiError::Io(_) if production => {
                "An internal error occurred".to_string()
            }
            _ => self.to_string(),
        };
        InvokeResponse::error(self.status_code().as_u16(), message)
    }
}
