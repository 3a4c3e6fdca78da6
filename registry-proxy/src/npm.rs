//! Local handlers: abbreviated metadata documents and tarball streaming.

use axum::{
    body::Body,
    http::{header, StatusCode},
    response::Response,
};
use futures_util::TryStreamExt;
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};

use crate::error::{AppError, AppResult};
use crate::storage;
use crate::store::PackageRecord;

/// Media type of the registry's reduced metadata documents.
pub const ABBREVIATED_METADATA_CONTENT_TYPE: &str = "application/vnd.npm.install-v1+json";

/// Serve a package's abbreviated metadata document.
pub fn metadata_response(record: &PackageRecord) -> AppResult<Response> {
    let body = serde_json::to_vec(&record.metadata)?;
    debug!(package = %record.name, size = body.len(), "Serving metadata from local store");

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, ABBREVIATED_METADATA_CONTENT_TYPE)
        .body(Body::from(body))
        .map_err(|e| AppError::Internal(format!("failed to build metadata response: {e}")))
}

/// Stream a package's stored archive bytes.
///
/// The requested filename must match the digest-derived name of the stored
/// object exactly; anything else is a plain 404 and is never forwarded
/// upstream. The body streams straight from disk so memory stays bounded for
/// arbitrarily large archives. An I/O error mid-stream only drops this one
/// connection; it is reported on the diagnostic channel, not to the client.
pub async fn tarball_response(record: &PackageRecord, filename: &str) -> AppResult<Response> {
    if filename != record.object_filename() {
        return Err(AppError::NotFound(format!(
            "no tarball '{filename}' for package '{}'",
            record.name
        )));
    }

    let (file, len) = storage::open_for_streaming(&record.object_path)
        .await
        .map_err(|e| {
            AppError::Internal(format!(
                "stored object for '{}' unreadable: {e}",
                record.name
            ))
        })?;

    debug!(package = %record.name, size = len, "Streaming tarball from local store");

    let package = record.name.clone();
    let stream = ReaderStream::new(file).inspect_err(move |err| {
        warn!(package = %package, error = %err, "Tarball stream failed mid-transfer; dropping connection");
    });

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .header(header::CONTENT_LENGTH, len)
        .body(Body::from_stream(stream))
        .map_err(|e| AppError::Internal(format!("failed to build tarball response: {e}")))
}
