//! In-memory registry of ingested packages.
//!
//! The store is populated once during startup and is immutable afterwards,
//! with a single exception: the one-time rewrite of every record's tarball
//! URL from relative to absolute form once the listening address is known.
//! Request handlers only ever read from it.

use std::collections::HashMap;
use std::path::PathBuf;

use serde_json::Value;

/// Everything the server knows about one ingested package.
#[derive(Debug, Clone)]
pub struct PackageRecord {
    /// Package identifier; always equals the manifest's `name` field.
    pub name: String,
    /// Semantic version read from the manifest.
    pub version: String,
    /// Lowercase hex SHA256 of the raw archive bytes.
    pub digest: String,
    /// Stored copy of the archive under the objects directory. Never mutated
    /// after ingestion; this copy, not the original archive, is what clients
    /// download.
    pub object_path: PathBuf,
    /// Abbreviated metadata document served for `GET /<name>`.
    pub metadata: Value,
}

impl PackageRecord {
    /// Basename of the stored object, `<digest>.tgz`. Tarball requests must
    /// name this file exactly.
    pub fn object_filename(&self) -> &str {
        self.object_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
    }
}

/// Name-keyed lookup over all ingested packages.
#[derive(Debug, Default)]
pub struct RegistryStore {
    records: HashMap<String, PackageRecord>,
}

impl RegistryStore {
    /// Build the store from ingestion results. Name uniqueness is enforced at
    /// configuration time, so a collision here would be a bug upstream.
    pub fn from_records(records: Vec<PackageRecord>) -> Self {
        let records = records
            .into_iter()
            .map(|record| (record.name.clone(), record))
            .collect();
        Self { records }
    }

    pub fn get(&self, name: &str) -> Option<&PackageRecord> {
        self.records.get(name)
    }

    /// Content-addressed lookup by archive digest.
    pub fn get_by_digest(&self, digest: &str) -> Option<&PackageRecord> {
        self.records.values().find(|record| record.digest == digest)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.records.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Rewrite every record's tarball reference from the relative form
    /// produced at ingestion to an absolute URL under `base_url`. Must run to
    /// completion before the first request is served; clients cannot use
    /// relative URLs. Already-absolute URLs are left alone, which makes the
    /// pass idempotent.
    pub fn rewrite_tarball_urls(&mut self, base_url: &str) {
        let base = base_url.trim_end_matches('/');
        for record in self.records.values_mut() {
            let version = record.version.clone();
            let dist = record
                .metadata
                .get_mut("versions")
                .and_then(|versions| versions.get_mut(&version))
                .and_then(|doc| doc.get_mut("dist"))
                .and_then(Value::as_object_mut);
            if let Some(dist) = dist {
                if let Some(relative) = dist.get("tarball").and_then(Value::as_str) {
                    if !relative.starts_with("http://") && !relative.starts_with("https://") {
                        let absolute = format!("{base}/{relative}");
                        dist.insert("tarball".to_string(), Value::String(absolute));
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(name: &str, version: &str, digest: &str) -> PackageRecord {
        PackageRecord {
            name: name.to_string(),
            version: version.to_string(),
            digest: digest.to_string(),
            object_path: PathBuf::from(format!("/data/objects/{digest}.tgz")),
            metadata: json!({
                "name": name,
                "dist-tags": { "latest": version },
                "versions": {
                    version: {
                        "name": name,
                        "version": version,
                        "dist": {
                            "tarball": format!("{name}/-/{digest}.tgz"),
                            "shasum": "0000"
                        }
                    }
                }
            }),
        }
    }

    #[test]
    fn lookup_by_name_and_digest() {
        let store = RegistryStore::from_records(vec![
            record("alpha", "1.0.0", "aaaa"),
            record("beta", "2.1.0", "bbbb"),
        ]);

        assert_eq!(store.len(), 2);
        assert_eq!(store.get("alpha").unwrap().version, "1.0.0");
        assert!(store.get("gamma").is_none());
        assert_eq!(store.get_by_digest("bbbb").unwrap().name, "beta");
        assert!(store.get_by_digest("cccc").is_none());
    }

    #[test]
    fn object_filename_is_digest_derived() {
        let store = RegistryStore::from_records(vec![record("alpha", "1.0.0", "aaaa")]);
        assert_eq!(store.get("alpha").unwrap().object_filename(), "aaaa.tgz");
    }

    #[test]
    fn rewrite_makes_tarball_urls_absolute_exactly_once() {
        let mut store = RegistryStore::from_records(vec![record("alpha", "1.0.0", "aaaa")]);

        store.rewrite_tarball_urls("http://127.0.0.1:4873");
        let tarball = store.get("alpha").unwrap().metadata["versions"]["1.0.0"]["dist"]
            ["tarball"]
            .as_str()
            .unwrap()
            .to_string();
        assert_eq!(tarball, "http://127.0.0.1:4873/alpha/-/aaaa.tgz");

        // A second pass must not mangle an already-absolute URL.
        store.rewrite_tarball_urls("http://127.0.0.1:4873");
        let again = store.get("alpha").unwrap().metadata["versions"]["1.0.0"]["dist"]
            ["tarball"]
            .as_str()
            .unwrap();
        assert_eq!(again, tarball);
    }
}
