//! Startup configuration for the registry proxy.
//!
//! A configuration names the working directory and the fixed set of packages
//! to ingest, each as a `name=path` pair pointing at a local `.tgz` archive.
//! Everything here is validated before the server binds a socket; a bad
//! configuration never gets as far as listening.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::upstream::UpstreamConfig;

/// Directory under the data dir holding one file per distinct archive digest.
pub const OBJECTS_DIR: &str = "objects";

/// Configuration errors, all fatal before any listening occurs.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("no packages configured; pass at least one --package <name>=<archive>")]
    NoPackages,

    #[error("invalid package spec '{spec}'; expected <name>=<archive>")]
    InvalidPackageSpec { spec: String },

    #[error("package '{name}' configured more than once")]
    DuplicatePackage { name: String },

    #[error("archive for package '{name}' not found at {}", .path.display())]
    MissingArchive { name: String, path: PathBuf },

    #[error("invalid upstream registry URL '{url}': {reason}")]
    InvalidUpstreamUrl { url: String, reason: String },
}

/// One configured package: the name to serve it under and the archive to
/// serve it from.
#[derive(Debug, Clone)]
pub struct PackageSource {
    pub name: String,
    pub archive: PathBuf,
}

/// Validated startup configuration.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Working directory for objects, the access log, and the ready marker.
    pub data_dir: PathBuf,
    /// Packages to ingest; names are unique.
    pub packages: Vec<PackageSource>,
    /// Upstream registry that unknown packages are forwarded to.
    pub upstream: UpstreamConfig,
}

impl ProxyConfig {
    /// Build a configuration from CLI inputs, validating everything eagerly.
    pub fn from_cli(
        data_dir: PathBuf,
        package_specs: &[String],
        upstream_url: &str,
    ) -> Result<Self, ConfigError> {
        if package_specs.is_empty() {
            return Err(ConfigError::NoPackages);
        }

        let mut seen = HashSet::new();
        let mut packages = Vec::with_capacity(package_specs.len());
        for spec in package_specs {
            let source = parse_package_spec(spec)?;
            if !seen.insert(source.name.clone()) {
                return Err(ConfigError::DuplicatePackage { name: source.name });
            }
            if !source.archive.is_file() {
                return Err(ConfigError::MissingArchive {
                    name: source.name,
                    path: source.archive,
                });
            }
            packages.push(source);
        }

        let upstream = UpstreamConfig {
            registry_url: validate_upstream_url(upstream_url)?,
            ..UpstreamConfig::default()
        };

        Ok(Self {
            data_dir,
            packages,
            upstream,
        })
    }

    pub fn objects_dir(&self) -> PathBuf {
        self.data_dir.join(OBJECTS_DIR)
    }
}

/// Parse a `name=path` package spec. Both halves must be non-empty.
pub fn parse_package_spec(spec: &str) -> Result<PackageSource, ConfigError> {
    match spec.split_once('=') {
        Some((name, path)) if !name.is_empty() && !path.is_empty() => Ok(PackageSource {
            name: name.to_string(),
            archive: PathBuf::from(path),
        }),
        _ => Err(ConfigError::InvalidPackageSpec {
            spec: spec.to_string(),
        }),
    }
}

fn validate_upstream_url(raw: &str) -> Result<String, ConfigError> {
    let parsed = url::Url::parse(raw).map_err(|e| ConfigError::InvalidUpstreamUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidUpstreamUrl {
            url: raw.to_string(),
            reason: format!("unsupported scheme '{}'", parsed.scheme()),
        });
    }
    Ok(raw.trim_end_matches('/').to_string())
}

/// Objects directory for a given data dir, for callers without a full config.
pub fn objects_dir(data_dir: &Path) -> PathBuf {
    data_dir.join(OBJECTS_DIR)
}
