//! Common test utilities and helpers
//!
//! Shared fixture building and server setup for the integration tests:
//! real `.tgz` archives assembled in-process, ingested through the actual
//! ingestion path, and served by the actual router.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use flate2::write::GzEncoder;
use flate2::Compression;
use serde_json::Value;
use tempfile::TempDir;

use registry_proxy::access_log::AccessLog;
use registry_proxy::config;
use registry_proxy::ingest::ingest_package;
use registry_proxy::state::AppState;
use registry_proxy::store::RegistryStore;
use registry_proxy::upstream::{UpstreamClient, UpstreamConfig};

/// Address baked into test states that never bind a real socket.
pub const TEST_ADDR: &str = "http://localhost:8080";

/// Build a gzipped tarball in `npm pack` layout: all entries live under a
/// `package/` prefix, with the manifest at `package/package.json`.
pub fn make_tarball(
    path: &Path,
    manifest: &Value,
    extra_files: &[(&str, &[u8])],
) -> PathBuf {
    let file = std::fs::File::create(path).expect("create tarball");
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = tar::Builder::new(encoder);

    let manifest_bytes = serde_json::to_vec_pretty(manifest).expect("serialize manifest");
    append_entry(&mut builder, "package/package.json", &manifest_bytes);
    for (name, data) in extra_files {
        append_entry(&mut builder, &format!("package/{name}"), data);
    }

    let encoder = builder.into_inner().expect("finish tar");
    encoder.finish().expect("finish gzip");
    path.to_path_buf()
}

fn append_entry<W: std::io::Write>(builder: &mut tar::Builder<W>, name: &str, data: &[u8]) {
    let mut header = tar::Header::new_gnu();
    header.set_size(data.len() as u64);
    header.set_mode(0o644);
    header.set_cksum();
    builder.append_data(&mut header, name, data).expect("append entry");
}

/// Minimal manifest for a fixture package.
pub fn manifest(name: &str, version: &str) -> Value {
    serde_json::json!({
        "name": name,
        "version": version,
        "description": "test fixture",
        "dependencies": { "chalk": "^4.0.0" },
    })
}

/// A fully ingested test server state plus the working directory backing it.
pub struct TestSetup {
    pub state: Arc<AppState>,
    pub data_dir: TempDir,
    /// Raw bytes of each fixture archive, keyed in configuration order.
    pub archives: Vec<(String, Vec<u8>)>,
}

/// Ingest the given `(name, version)` fixtures through the real ingestion
/// path and assemble an [`AppState`] around them. Unknown packages are
/// forwarded to `upstream_url`; point it at a stub (or a closed port) as the
/// test requires.
pub async fn create_test_setup(packages: &[(&str, &str)], upstream_url: &str) -> TestSetup {
    let data_dir = TempDir::new().expect("create temp dir");
    let objects_dir = config::objects_dir(data_dir.path());
    std::fs::create_dir_all(&objects_dir).expect("create objects dir");

    let mut records = Vec::new();
    let mut archives = Vec::new();
    for (name, version) in packages {
        let archive_path = data_dir
            .path()
            .join(format!("{}.tgz", name.replace('/', "_")));
        make_tarball(&archive_path, &manifest(name, version), &[]);
        archives.push((
            (*name).to_string(),
            std::fs::read(&archive_path).expect("read archive"),
        ));

        let record = ingest_package(name, &archive_path, &objects_dir)
            .await
            .expect("ingestion failed");
        records.push(record);
    }

    let mut store = RegistryStore::from_records(records);
    store.rewrite_tarball_urls(TEST_ADDR);

    let access_log = AccessLog::open(data_dir.path())
        .await
        .expect("open access log");
    let upstream_client = Arc::new(
        UpstreamClient::new(UpstreamConfig {
            registry_url: upstream_url.trim_end_matches('/').to_string(),
            ..UpstreamConfig::default()
        })
        .expect("create upstream client"),
    );

    let state = Arc::new(AppState {
        store,
        server_addr: TEST_ADDR.to_string(),
        data_dir: data_dir.path().to_path_buf(),
        upstream_client,
        access_log,
    });

    TestSetup {
        state,
        data_dir,
        archives,
    }
}

impl TestSetup {
    /// Full text of the access log as written so far.
    pub fn access_log_text(&self) -> String {
        std::fs::read_to_string(registry_proxy::access_log::log_path(self.data_dir.path()))
            .unwrap_or_default()
    }
}
