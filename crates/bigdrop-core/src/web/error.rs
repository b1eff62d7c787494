//! HTTP error handling for the store API.
//!
//! Handler failures become the same `{code, message}` envelope as
//! successes, with the HTTP status mirroring the envelope code.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use crate::protocol::ApiResponse;

/// A handler failure carrying the status it should respond with.
#[derive(Debug, Clone)]
pub struct ApiError {
    /// HTTP status, mirrored into the envelope `code` field.
    pub status: StatusCode,
    /// Human-readable error message.
    pub message: String,
}

impl ApiError {
    /// Client sent something malformed or unsafe.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    /// The requested artifact does not exist.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    /// The store failed while handling a well-formed request.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiResponse::<serde_json::Value>::error(self.status.as_u16(), self.message);
        (self.status, Json(body)).into_response()
    }
}

impl From<crate::error::Error> for ApiError {
    fn from(err: crate::error::Error) -> Self {
        if err.is_input_error() {
            Self::bad_request(err.to_string())
        } else {
            Self::internal(err.to_string())
        }
    }
}

/// Result type for web handlers.
pub type ApiResult<T> = Result<T, ApiError>;
