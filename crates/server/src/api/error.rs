//! Error-to-HTTP response conversion for the conversion routes.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use stickerkit_core::ProcessingError;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Failure of an API request.
#[derive(Debug)]
pub enum ApiError {
    /// The request itself is malformed (missing file, bad field).
    BadRequest(String),
    /// A requested resource does not exist.
    NotFound(String),
    /// The conversion job failed.
    Processing(ProcessingError),
    /// Anything else on the server side.
    Internal(String),
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Processing(ProcessingError::TaskExists(_)) => StatusCode::CONFLICT,
            Self::Processing(e) if e.is_input_error() => StatusCode::BAD_REQUEST,
            Self::Processing(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> String {
        match self {
            Self::BadRequest(msg) | Self::NotFound(msg) => msg.clone(),
            Self::Processing(e) => e.to_string(),
            Self::Internal(_) => "Internal server error".to_string(),
        }
    }
}

impl From<ProcessingError> for ApiError {
    fn from(e: ProcessingError) -> Self {
        Self::Processing(e)
    }
}

impl From<std::io::Error> for ApiError {
    fn from(e: std::io::Error) -> Self {
        Self::Internal(e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        if status.is_server_error() {
            let detail = match &self {
                Self::Internal(detail) => detail.clone(),
                other => other.message(),
            };
            tracing::error!(status = %status, error = %detail, "Server error in API handler");
        }

        let body = ErrorResponse {
            error: self.message(),
        };
        (status, Json(body)).into_response()
    }
}
