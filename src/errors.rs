use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;
use thiserror::Error;

use crate::services::content_store::ContentError;

/// Why a request was refused before anything was written.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Missing name")]
    MissingName,
    #[error("Missing type")]
    MissingKind,
    #[error("Missing data")]
    MissingData,
    #[error("Invalid data")]
    InvalidData,
    #[error("Parent not found")]
    ParentNotFound,
    #[error("Parent is not a folder")]
    ParentNotFolder,
    #[error("A folder doesn't have content")]
    FolderHasNoContent,
    #[error("Invalid size")]
    InvalidSize,
}

/// Outcome of every operation the core exposes.
///
/// Display strings are safe to hand to callers: storage and backend details
/// stay in the source error and only reach the logs.
#[derive(Debug, Error)]
pub enum FilesError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Absent, or present but not visible to the caller.
    #[error("Not found")]
    NotFound,

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unable to access stored content")]
    Storage(#[source] ContentError),

    #[error("Upstream service unavailable")]
    Upstream(String),
}

pub type FilesResult<T> = Result<T, FilesError>;

impl From<sqlx::Error> for FilesError {
    fn from(err: sqlx::Error) -> Self {
        tracing::error!(error = %err, "catalog operation failed");
        FilesError::Upstream(err.to_string())
    }
}

impl From<ContentError> for FilesError {
    fn from(err: ContentError) -> Self {
        match err {
            ContentError::NotFound(_) => FilesError::NotFound,
            other => {
                tracing::error!(error = %other, "content store operation failed");
                FilesError::Storage(other)
            }
        }
    }
}

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
    pub fn not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND, "Not found")
    }

    /// Shortcut for 401 Unauthorized
    pub fn unauthorized() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "Unauthorized")
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

impl From<FilesError> for AppError {
    fn from(err: FilesError) -> Self {
        match err {
            FilesError::Validation(v) => AppError::new(StatusCode::BAD_REQUEST, v.to_string()),
            FilesError::NotFound => AppError::not_found(),
            FilesError::Conflict(msg) => AppError::new(StatusCode::CONFLICT, msg),
            other @ (FilesError::Storage(_) | FilesError::Upstream(_)) => {
                AppError::internal(other.to_string())
            }
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::new(StatusCode::BAD_REQUEST, rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_maps_to_bad_request() {
        let app: AppError = FilesError::from(ValidationError::ParentNotFound).into();
        assert_eq!(app.status, StatusCode::BAD_REQUEST);
        assert_eq!(app.message, "Parent not found");
    }

    #[test]
    fn storage_errors_do_not_leak_paths() {
        let io = std::io::Error::other("/var/lib/files/ab/secret-ref");
        let err = FilesError::Storage(ContentError::Io(io));
        let app: AppError = err.into();
        assert_eq!(app.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!app.message.contains("/var/lib"));
    }

    #[test]
    fn not_found_is_uniform() {
        let app: AppError = FilesError::NotFound.into();
        assert_eq!(app.status, StatusCode::NOT_FOUND);
        assert_eq!(app.message, "Not found");
    }
}
