//! Archive ingestion.
//!
//! Given a package name and a local `.tgz` archive, ingestion extracts the
//! archive into a private scratch directory, validates its manifest, computes
//! a content digest over the raw archive bytes, copies those bytes into the
//! objects directory under a digest-derived filename, and builds the
//! abbreviated metadata document the server will republish. Ingestion for
//! distinct packages runs concurrently; each call touches only its own scratch
//! directory and object file.

use std::path::Path;

use chrono::Utc;
use serde_json::{json, Value};
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::IngestError;
use crate::hash_utils::{sha1_hash, sha256_hash};
use crate::routing::encode_package_name;
use crate::storage;
use crate::store::PackageRecord;

/// Manifest fields copied into the version document as objects.
const OBJECT_FIELDS: [&str; 7] = [
    "dependencies",
    "devDependencies",
    "peerDependencies",
    "optionalDependencies",
    "bin",
    "directories",
    "engines",
];

/// Ingest one archive and produce its [`PackageRecord`].
///
/// Fails when extraction reports a non-zero status, when no parseable
/// manifest is found, or when the manifest's declared name differs from
/// `name` (a guard against wiring the wrong archive to the wrong slot). Any
/// failure here is fatal to startup.
pub async fn ingest_package(
    name: &str,
    archive: &Path,
    objects_dir: &Path,
) -> Result<PackageRecord, IngestError> {
    debug!(package = %name, archive = %archive.display(), "Ingesting archive");

    let raw_bytes = tokio::fs::read(archive).await.map_err(|source| IngestError::Io {
        package: name.to_string(),
        source,
    })?;

    let manifest = extract_manifest(name, archive).await?;

    let manifest_name = manifest
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| IngestError::ManifestParse {
            package: name.to_string(),
            reason: "manifest has no \"name\" field".to_string(),
        })?;
    if manifest_name != name {
        return Err(IngestError::NameMismatch {
            expected: name.to_string(),
            found: manifest_name.to_string(),
        });
    }

    let version = manifest
        .get("version")
        .and_then(Value::as_str)
        .ok_or_else(|| IngestError::ManifestParse {
            package: name.to_string(),
            reason: "manifest has no \"version\" field".to_string(),
        })?
        .to_string();

    // The digest covers the raw archive bytes, not the extracted tree, so the
    // served copy is provably identical to the supplied fixture.
    let digest = sha256_hash(&raw_bytes);
    let shasum = sha1_hash(&raw_bytes);

    let object_path = objects_dir.join(format!("{digest}.tgz"));
    storage::save_file(&object_path, &raw_bytes)
        .await
        .map_err(|source| IngestError::Io {
            package: name.to_string(),
            source,
        })?;

    let metadata = build_metadata(name, &version, &digest, &shasum, &manifest);

    info!(
        package = %name,
        version = %version,
        digest = %digest,
        size = raw_bytes.len(),
        "Archive ingested"
    );

    Ok(PackageRecord {
        name: name.to_string(),
        version,
        digest,
        object_path,
        metadata,
    })
}

/// Extract the archive into a unique scratch directory and parse the manifest
/// found at its root. Archives produced by `npm pack` nest everything under a
/// `package/` prefix; bare archives keep the manifest at the top level.
async fn extract_manifest(name: &str, archive: &Path) -> Result<Value, IngestError> {
    let scratch = tempfile::tempdir().map_err(|source| IngestError::Io {
        package: name.to_string(),
        source,
    })?;

    let output = Command::new("tar")
        .arg("-xzf")
        .arg(archive)
        .arg("-C")
        .arg(scratch.path())
        .output()
        .await
        .map_err(|e| IngestError::Extraction {
            archive: archive.to_path_buf(),
            detail: format!("failed to run tar: {e}"),
        })?;

    if !output.status.success() {
        return Err(IngestError::Extraction {
            archive: archive.to_path_buf(),
            detail: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    let mut manifest_path = scratch.path().join("package").join("package.json");
    if !manifest_path.is_file() {
        manifest_path = scratch.path().join("package.json");
    }

    let raw = tokio::fs::read(&manifest_path)
        .await
        .map_err(|_| IngestError::ManifestParse {
            package: name.to_string(),
            reason: "no package.json found in extracted archive".to_string(),
        })?;

    serde_json::from_slice(&raw).map_err(|e| IngestError::ManifestParse {
        package: name.to_string(),
        reason: e.to_string(),
    })
}

/// Build the abbreviated metadata document for a single-version package. The
/// tarball reference starts out relative; it is made absolute exactly once,
/// after the listening address is known.
fn build_metadata(
    name: &str,
    version: &str,
    digest: &str,
    shasum: &str,
    manifest: &Value,
) -> Value {
    let tarball = format!("{}/-/{digest}.tgz", encode_package_name(name));

    let mut version_doc = json!({
        "name": name,
        "version": version,
        "dist": {
            "tarball": tarball,
            "shasum": shasum,
        },
    });

    if let Some(doc) = version_doc.as_object_mut() {
        for field in OBJECT_FIELDS {
            let value = manifest.get(field).cloned().unwrap_or_else(|| json!({}));
            doc.insert(field.to_string(), value);
        }
        // bundleDependencies is the one sequence-valued field.
        let bundle = manifest
            .get("bundleDependencies")
            .cloned()
            .unwrap_or_else(|| json!([]));
        doc.insert("bundleDependencies".to_string(), bundle);
    }

    json!({
        "name": name,
        "dist-tags": { "latest": version },
        "modified": Utc::now().to_rfc3339(),
        "versions": { version: version_doc },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_carries_manifest_fields_and_defaults() {
        let manifest = json!({
            "name": "left-pad",
            "version": "1.3.0",
            "dependencies": { "chalk": "^4.0.0" },
            "bin": { "left-pad": "./cli.js" },
        });

        let doc = build_metadata("left-pad", "1.3.0", "abc123", "deadbeef", &manifest);

        assert_eq!(doc["name"], "left-pad");
        assert_eq!(doc["dist-tags"]["latest"], "1.3.0");
        assert!(doc["modified"].is_string());

        let version = &doc["versions"]["1.3.0"];
        assert_eq!(version["dependencies"]["chalk"], "^4.0.0");
        assert_eq!(version["bin"]["left-pad"], "./cli.js");
        assert_eq!(version["devDependencies"], json!({}));
        assert_eq!(version["peerDependencies"], json!({}));
        assert_eq!(version["optionalDependencies"], json!({}));
        assert_eq!(version["bundleDependencies"], json!([]));
        assert_eq!(version["directories"], json!({}));
        assert_eq!(version["engines"], json!({}));
        assert_eq!(version["dist"]["tarball"], "left-pad/-/abc123.tgz");
        assert_eq!(version["dist"]["shasum"], "deadbeef");
    }

    #[test]
    fn scoped_names_are_encoded_in_the_tarball_path() {
        let manifest = json!({ "name": "@scope/pkg", "version": "0.1.0" });
        let doc = build_metadata("@scope/pkg", "0.1.0", "abc123", "deadbeef", &manifest);
        assert_eq!(
            doc["versions"]["0.1.0"]["dist"]["tarball"],
            "%40scope%2Fpkg/-/abc123.tgz"
        );
    }
}
