//! Request classification.
//!
//! Every inbound path is interpreted as `/<name>`, `/<name>/<ignored>` or
//! `/<name>/<ignored>/<tarball>`; the middle segment is the upstream
//! registry's own path convention and is never interpreted here. A single
//! classification step produces a [`RouteDecision`] that the dispatcher
//! consumes, so the serve-local versus forward split lives in exactly one
//! place.

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

use crate::store::RegistryStore;

/// Characters left verbatim by JavaScript's `encodeURIComponent`, which is
/// what registry clients use to escape package names in URLs.
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Percent-encode a package name for use as a URL path segment.
pub fn encode_package_name(name: &str) -> String {
    utf8_percent_encode(name, URI_COMPONENT).to_string()
}

/// Percent-decode one path segment. Returns `None` when the segment decodes
/// to invalid UTF-8; callers treat that as an unknown package.
pub fn decode_segment(segment: &str) -> Option<String> {
    percent_decode_str(segment)
        .decode_utf8()
        .ok()
        .map(|decoded| decoded.into_owned())
}

/// What kind of local resource a request targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalKind {
    Metadata,
    Tarball(String),
}

/// Outcome of classifying one request path against the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteDecision {
    /// The path names an ingested package; serve it without touching the
    /// network.
    Local { name: String, kind: LocalKind },
    /// Unknown package (or undecodable path); relay to the upstream registry.
    Proxy { name: String },
}

/// Classify a request path. Never fails: anything that does not resolve to a
/// known package falls through to the proxy.
pub fn classify(path: &str, store: &RegistryStore) -> RouteDecision {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    let Some(first) = segments.first() else {
        return RouteDecision::Proxy {
            name: String::new(),
        };
    };

    let Some(name) = decode_segment(first) else {
        return RouteDecision::Proxy {
            name: (*first).to_string(),
        };
    };

    if store.get(&name).is_none() {
        return RouteDecision::Proxy { name };
    }

    if segments.len() >= 3 {
        let last = segments[segments.len() - 1];
        let filename = decode_segment(last).unwrap_or_else(|| last.to_string());
        RouteDecision::Local {
            name,
            kind: LocalKind::Tarball(filename),
        }
    } else {
        RouteDecision::Local {
            name,
            kind: LocalKind::Metadata,
        }
    }
}
