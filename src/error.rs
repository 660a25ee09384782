//! API error type shared by the HTTP handlers.
//!
//! Content-provider internals report failures as `Result<T, String>`; the
//! handlers wrap those in `ApiError::Provider` so clients get a recoverable
//! 502-class error with a displayable message and nothing partially applied.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde_json::json;

pub type Result<T> = std::result::Result<T, ApiError>;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Content provider error: {0}")]
    Provider(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, error_message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Provider(msg) => (StatusCode::BAD_GATEWAY, msg),
        };

        let body = Json(json!({ "error": error_message }));
        (status, body).into_response()
    }
}
