//! services/api/src/error.rs
//!
//! Defines the primary error types for the API service: `ApiError` for the
//! fallible binary startup path, and `RequestError`, the per-request failure
//! taxonomy that maps onto HTTP responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::config::ConfigError;
use chat_core::ports::PortError;

/// The primary error type for the `api` service binary.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Represents an error that occurred during configuration loading.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Represents an error that propagated up from one of the core service ports.
    #[error("Service Port Error: {0}")]
    Port(#[from] PortError),

    /// Represents an error from the underlying database library.
    #[error("Database Error: {0}")]
    Database(#[from] sqlx::Error),

    /// Represents a standard Input/Output error (e.g., binding to a network socket).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A catch-all for any other unexpected errors.
    #[error("An unexpected internal error occurred: {0}")]
    Internal(String),
}

/// A request-level failure. Every variant carries only client-safe text;
/// the detailed cause is logged where the failure is first observed.
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    /// Malformed or missing input. Each entry is one field-level message.
    #[error("validation failed")]
    Validation(Vec<String>),

    /// Malformed input outside the field-validation flow, reported as a
    /// single `{error}` body.
    #[error("{0}")]
    BadRequest(String),

    /// Missing, invalid, or expired credentials.
    #[error("{0}")]
    Auth(String),

    /// Duplicate registration.
    #[error("{0}")]
    Conflict(String),

    /// Upload with a type outside the allow-list, or undecodable content.
    #[error("{0}")]
    UnsupportedFile(String),

    /// Upload over the size ceiling.
    #[error("file exceeds the size limit")]
    FileTooLarge,

    /// Unknown (or not owned) session.
    #[error("{0}")]
    NotFound(String),

    /// Database or other unexpected failure.
    #[error("internal server error")]
    Server,
}

impl IntoResponse for RequestError {
    fn into_response(self) -> Response {
        match self {
            Self::Validation(errors) => {
                (StatusCode::BAD_REQUEST, Json(json!({ "errors": errors }))).into_response()
            }
            Self::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, Json(json!({ "error": msg }))).into_response()
            }
            Self::Auth(msg) => {
                (StatusCode::UNAUTHORIZED, Json(json!({ "msg": msg }))).into_response()
            }
            Self::Conflict(msg) => {
                (StatusCode::BAD_REQUEST, Json(json!({ "msg": msg }))).into_response()
            }
            Self::UnsupportedFile(msg) => {
                (StatusCode::BAD_REQUEST, Json(json!({ "error": msg }))).into_response()
            }
            Self::FileTooLarge => (
                StatusCode::PAYLOAD_TOO_LARGE,
                Json(json!({ "error": "File size should not exceed 50 MB." })),
            )
                .into_response(),
            Self::NotFound(msg) => {
                (StatusCode::NOT_FOUND, Json(json!({ "error": msg }))).into_response()
            }
            Self::Server => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": "An unexpected server error occurred." })),
            )
                .into_response(),
        }
    }
}

impl From<PortError> for RequestError {
    fn from(err: PortError) -> Self {
        match err {
            PortError::NotFound(msg) => Self::NotFound(msg),
            PortError::Conflict(msg) => Self::Conflict(msg),
            PortError::Unauthorized => Self::Auth("Unauthorized".to_string()),
            PortError::Gateway(_) | PortError::Unexpected(_) => Self::Server,
        }
    }
}
