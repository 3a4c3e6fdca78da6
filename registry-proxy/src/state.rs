//! Shared application state.
//!
//! One [`AppState`] is constructed during startup, after ingestion has
//! finished and the tarball URL rewrite has run, and is handed to every
//! request handler behind an `Arc`. Nothing in it mutates after construction;
//! the access log serializes its own appends internally.

use std::path::PathBuf;
use std::sync::Arc;

use crate::access_log::AccessLog;
use crate::store::RegistryStore;
use crate::upstream::UpstreamClient;

/// Process-wide registry state shared across all request handlers.
#[derive(Debug)]
pub struct AppState {
    /// Ingested packages, keyed by name. Tarball URLs are already absolute.
    pub store: RegistryStore,
    /// The server's externally reachable base URL, e.g. "http://127.0.0.1:49152".
    pub server_addr: String,
    /// Working directory holding objects, the access log and the ready marker.
    pub data_dir: PathBuf,
    /// Shared HTTP client used to relay unknown packages upstream.
    pub upstream_client: Arc<UpstreamClient>,
    /// Append-only audit trail of every request.
    pub access_log: AccessLog,
}
