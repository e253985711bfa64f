use crate::services::object_store::StoreError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;
use thiserror::Error;

/// Failures surfaced by the bucket filesystem adapter.
#[derive(Debug, Error)]
pub enum FsError {
    /// Nothing in the fallback chain resolved. Carries no key on purpose so
    /// a miss looks the same whatever was probed.
    #[error("file does not exist")]
    NotFound,
    #[error("listing `{prefix}` failed: {source}")]
    ListingFailed {
        prefix: String,
        #[source]
        source: StoreError,
    },
    #[error("invalid operation: {0}")]
    InvalidOperation(&'static str),
    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type FsResult<T> = Result<T, FsError>;

/// A lightweight wrapper for general errors that keeps the message local.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
        }
    }

    /// Shortcut for a 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    /// Shortcut for 404 Not Found
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, msg)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.message,
            "status": self.status.as_u16()
        }));

        (self.status, body).into_response()
    }
}

impl From<FsError> for AppError {
    fn from(err: FsError) -> Self {
        match err {
            FsError::NotFound => AppError::not_found("404 page not found"),
            FsError::InvalidOperation(_) => AppError::internal(err.to_string()),
            FsError::ListingFailed { .. } | FsError::Store(_) => {
                tracing::error!("object store failure: {}", err);
                AppError::new(StatusCode::BAD_GATEWAY, "object store unavailable")
            }
        }
    }
}
