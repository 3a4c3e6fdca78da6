//! File-based readiness handshake.
//!
//! The server writes a marker file containing its base URL once it is fully
//! initialized: ingestion finished, socket bound, tarball URLs rewritten. The
//! marker's existence, not its content, is the synchronization signal, so it
//! is written to a temporary name and renamed into place; a waiter can never
//! observe it half-written. An external process blocks on [`wait_for_ready`]
//! until the marker appears or a timeout elapses.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, info};

use crate::error::ReadinessError;

/// Filename of the readiness marker within the data dir.
pub const READY_MARKER_FILE: &str = "registry.url.txt";

/// How often the waiter re-checks for the marker.
pub const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Default overall waiting budget.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Marker location for a given data dir.
pub fn marker_path(data_dir: &Path) -> PathBuf {
    data_dir.join(READY_MARKER_FILE)
}

/// Publish the readiness marker containing exactly the server's base URL.
pub async fn write_marker(data_dir: &Path, base_url: &str) -> std::io::Result<()> {
    tokio::fs::create_dir_all(data_dir).await?;
    let marker = marker_path(data_dir);
    let staging = marker.with_extension("txt.tmp");
    tokio::fs::write(&staging, base_url).await?;
    tokio::fs::rename(&staging, &marker).await?;
    info!(marker = %marker.display(), url = %base_url, "Readiness marker published");
    Ok(())
}

/// Block until the marker exists, then return the base URL it contains.
///
/// Polls at [`POLL_INTERVAL`] up to `timeout`; a server that never starts
/// yields [`ReadinessError::Timeout`] rather than hanging forever.
pub async fn wait_for_ready(data_dir: &Path, timeout: Duration) -> Result<String, ReadinessError> {
    let marker = marker_path(data_dir);
    let deadline = tokio::time::Instant::now() + timeout;
    debug!(marker = %marker.display(), ?timeout, "Waiting for readiness marker");

    loop {
        match tokio::fs::read_to_string(&marker).await {
            Ok(contents) => {
                let url = contents.trim().to_string();
                info!(url = %url, "Server is ready");
                return Ok(url);
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(ReadinessError::Io(err)),
        }

        if tokio::time::Instant::now() >= deadline {
            return Err(ReadinessError::Timeout { timeout, marker });
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}
