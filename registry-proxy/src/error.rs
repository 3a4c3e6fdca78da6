//! # Error Handling and Response Types
//!
//! Two error families live here. [`AppError`] covers the HTTP layer and maps
//! each variant to a status code plus an npm-style JSON body
//! (`{"error": "..."}`) via [`IntoResponse`]. The startup taxonomy
//! ([`IngestError`], [`ReadinessError`]) covers failures that abort the
//! process before it ever listens, or that only concern a waiting caller;
//! those surface through `anyhow` at the binary boundary and never reach a
//! client.

use std::path::PathBuf;
use std::time::Duration;

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Serialize;

/// JSON error body in the shape registry clients expect.
#[derive(Serialize, Debug)]
pub struct ErrorBody {
    pub error: String,
}

/// Errors produced while servicing a request.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    NotFound(String),

    #[error("method not allowed")]
    MethodNotAllowed,

    #[error("upstream registry error: {0}")]
    BadGateway(String),

    #[error("internal server error: {0}")]
    Internal(String),
}

impl AppError {
    /// HTTP status code this error maps to.
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            AppError::BadGateway(_) => StatusCode::BAD_GATEWAY,
            AppError::Io(_) | AppError::Json(_) | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        tracing::error!(error = %self, "Request failed");

        let status = self.status();
        let body = axum::Json(ErrorBody {
            error: self.to_string(),
        });

        let mut response = (status, body).into_response();
        if status == StatusCode::METHOD_NOT_ALLOWED {
            response
                .headers_mut()
                .insert(header::ALLOW, HeaderValue::from_static("GET, HEAD"));
        }
        response
    }
}

/// Convenient result type for request handling.
pub type AppResult<T> = Result<T, AppError>;

/// Fatal ingestion failures. Any of these indicates a broken fixture, not a
/// runtime condition to recover from, so startup aborts before listening.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("failed to extract {}: {detail}", .archive.display())]
    Extraction { archive: PathBuf, detail: String },

    #[error("failed to parse manifest for package '{package}': {reason}")]
    ManifestParse { package: String, reason: String },

    #[error("archive manifest declares name '{found}' but was configured as '{expected}'")]
    NameMismatch { expected: String, found: String },

    #[error("I/O error ingesting package '{package}': {source}")]
    Io {
        package: String,
        #[source]
        source: std::io::Error,
    },
}

/// Failures of the readiness waiter. Only the waiting caller sees these; the
/// server process is unaffected.
#[derive(Debug, thiserror::Error)]
pub enum ReadinessError {
    #[error("server did not become ready within {timeout:?} (no marker at {})", .marker.display())]
    Timeout { timeout: Duration, marker: PathBuf },

    #[error("failed to read readiness marker: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(
            AppError::NotFound("x".into()).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::MethodNotAllowed.status(),
            StatusCode::METHOD_NOT_ALLOWED
        );
        assert_eq!(
            AppError::BadGateway("x".into()).status(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            AppError::Internal("x".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn method_not_allowed_advertises_read_methods() {
        let response = AppError::MethodNotAllowed.into_response();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(
            response.headers().get(header::ALLOW).unwrap(),
            "GET, HEAD"
        );
    }
}
