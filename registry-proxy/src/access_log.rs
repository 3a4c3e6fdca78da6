//! Append-only access log and the verification that reads it back.
//!
//! The log is the canonical audit trail external tooling uses to prove that a
//! package manager fetched artifacts from this server rather than the public
//! registry. Four line shapes exist:
//!
//! ```text
//! REQUEST: <METHOD> <raw path>
//! LOCAL <name> metadata
//! LOCAL <name> tar
//! PROXIED <name>
//! ```
//!
//! Appends from concurrent handlers are serialized behind a mutex so every
//! write lands as one complete line; ordering across concurrent requests is
//! best-effort arrival order. Write failures are never swallowed: external
//! verification depends entirely on this file being present and complete.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::http::Method;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// Filename of the access log within the data dir.
pub const ACCESS_LOG_FILE: &str = "access.log";

/// Access log location for a given data dir.
pub fn log_path(data_dir: &Path) -> PathBuf {
    data_dir.join(ACCESS_LOG_FILE)
}

/// Shared handle to the append-only access log.
#[derive(Debug, Clone)]
pub struct AccessLog {
    path: PathBuf,
    file: Arc<Mutex<File>>,
}

impl AccessLog {
    /// Open (creating if necessary) the log file in append mode.
    pub async fn open(data_dir: &Path) -> std::io::Result<Self> {
        tokio::fs::create_dir_all(data_dir).await?;
        let path = log_path(data_dir);
        let file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&path)
            .await?;
        Ok(Self {
            path,
            file: Arc::new(Mutex::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record the arrival of a request, before any routing decision.
    pub async fn request(&self, method: &Method, raw_path: &str) -> std::io::Result<()> {
        self.append(&format!("REQUEST: {method} {raw_path}")).await
    }

    /// Record a metadata document served from the local store.
    pub async fn local_metadata(&self, package: &str) -> std::io::Result<()> {
        self.append(&format!("LOCAL {package} metadata")).await
    }

    /// Record a tarball streamed from the local objects directory.
    pub async fn local_tar(&self, package: &str) -> std::io::Result<()> {
        self.append(&format!("LOCAL {package} tar")).await
    }

    /// Record a request relayed to the upstream registry.
    pub async fn proxied(&self, package: &str) -> std::io::Result<()> {
        self.append(&format!("PROXIED {package}")).await
    }

    async fn append(&self, line: &str) -> std::io::Result<()> {
        let mut file = self.file.lock().await;
        // One write per line keeps concurrent appends from interleaving.
        file.write_all(format!("{line}\n").as_bytes()).await?;
        file.flush().await
    }
}

/// What the log recorded about one package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LogEvidence {
    pub metadata: bool,
    pub tarball: bool,
    pub proxied: bool,
}

/// Scan a full log text for evidence about `package`.
pub fn gather_evidence(log: &str, package: &str) -> LogEvidence {
    let metadata_line = format!("LOCAL {package} metadata");
    let tar_line = format!("LOCAL {package} tar");
    let proxied_line = format!("PROXIED {package}");

    let mut evidence = LogEvidence::default();
    for line in log.lines().map(str::trim) {
        if line == metadata_line {
            evidence.metadata = true;
        } else if line == tar_line {
            evidence.tarball = true;
        } else if line == proxied_line {
            evidence.proxied = true;
        }
    }
    evidence
}

impl LogEvidence {
    /// Succeeds only when both local lines were seen and the package was
    /// never proxied.
    pub fn verdict(&self, package: &str) -> Result<(), String> {
        if self.proxied {
            return Err(format!(
                "package '{package}' was proxied to the upstream registry"
            ));
        }
        match (self.metadata, self.tarball) {
            (true, true) => Ok(()),
            (false, false) => Err(format!(
                "no local requests for package '{package}' were recorded"
            )),
            (true, false) => Err(format!(
                "metadata for '{package}' was served locally but its tarball was never fetched"
            )),
            (false, true) => Err(format!(
                "tarball for '{package}' was served locally but its metadata was never fetched"
            )),
        }
    }
}
