//! API error types.

use crate::engine::BlobError;
use axum::Json;
use axum::http::header::RETRY_AFTER;
use axum::http::{HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// API error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Human-readable error message.
    pub error: String,
    /// Error code for programmatic handling.
    pub code: String,
}

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Engine error reported with its usual status.
    #[error(transparent)]
    Blob(#[from] BlobError),

    /// Engine error reported as a client error regardless of kind.
    #[error(transparent)]
    Rejected(BlobError),
}

impl ApiError {
    fn inner(&self) -> &BlobError {
        match self {
            Self::Blob(e) | Self::Rejected(e) => e,
        }
    }

    /// Get the error code for this error.
    pub fn code(&self) -> &'static str {
        self.inner().code()
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        let err = match self {
            Self::Rejected(_) => return StatusCode::BAD_REQUEST,
            Self::Blob(e) => e,
        };
        match err {
            BlobError::NotReady => StatusCode::SERVICE_UNAVAILABLE,
            BlobError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            BlobError::PayloadTooLarge { .. } => StatusCode::BAD_REQUEST,
            BlobError::NotFound(_) => StatusCode::NOT_FOUND,
            BlobError::CorruptRecord { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            BlobError::BackendFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();
        crate::metrics::record_api_error(code);

        if status.is_server_error() {
            tracing::error!(code, error = %self, "Request failed");
        } else {
            tracing::debug!(code, error = %self, "Request rejected");
        }

        let body = ErrorResponse {
            error: self.to_string(),
            code: code.to_string(),
        };
        let mut response = (status, Json(body)).into_response();
        if status == StatusCode::SERVICE_UNAVAILABLE {
            response
                .headers_mut()
                .insert(RETRY_AFTER, HeaderValue::from_static("1"));
        }
        response
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = std::result::Result<T, ApiError>;
