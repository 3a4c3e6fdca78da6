//! Proxy forwarder for requests that target no ingested package.
//!
//! The forwarder relays the inbound request to the public registry with the
//! same method, path and headers (the host header is dropped so the client
//! sets the upstream's), streaming the request body out and the response
//! status, headers and body back without buffering either direction. A
//! failure on either leg costs only the affected request; the server itself
//! carries on.

use std::time::Duration;

use axum::{
    body::Body,
    extract::Request,
    http::{header, HeaderMap, HeaderName, Method},
    response::Response,
};
use reqwest::{redirect, Client};
use tracing::{debug, warn};

use crate::error::{AppError, AppResult};

/// Connection settings for the upstream registry.
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    /// Base URL of the public registry, without a trailing slash.
    pub registry_url: String,
    /// HTTP request timeout for upstream calls.
    pub timeout: Duration,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            registry_url: "https://registry.npmjs.org".to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Hop-by-hop headers are transport details of one connection; a relay must
/// not forward them on either leg.
const HOP_BY_HOP: [HeaderName; 7] = [
    header::CONNECTION,
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for name in &HOP_BY_HOP {
        headers.remove(name);
    }
}

/// HTTP client for relaying requests to the upstream registry.
#[derive(Debug)]
pub struct UpstreamClient {
    client: Client,
    config: UpstreamConfig,
}

impl UpstreamClient {
    pub fn new(config: UpstreamConfig) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            // Redirects are relayed to the caller, not followed here.
            .redirect(redirect::Policy::none())
            .user_agent(concat!("registry-proxy/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AppError::Internal(format!("failed to create HTTP client: {e}")))?;

        Ok(Self { client, config })
    }

    pub fn registry_url(&self) -> &str {
        &self.config.registry_url
    }

    /// Relay `req` to the upstream registry and stream its response back
    /// verbatim. Network or protocol errors map to a 502 for this request
    /// alone.
    pub async fn forward(&self, req: Request) -> AppResult<Response> {
        let path_and_query = req
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| "/".to_string());
        let url = format!("{}{}", self.config.registry_url, path_and_query);

        let (parts, body) = req.into_parts();
        let mut headers = parts.headers;
        headers.remove(header::HOST);
        strip_hop_by_hop(&mut headers);

        debug!(method = %parts.method, url = %url, "Forwarding request upstream");

        let mut builder = self
            .client
            .request(parts.method.clone(), &url)
            .headers(headers);
        // Bodiless methods must not pick up a chunked transfer encoding from
        // an attached empty stream; some upstreams reject that outright.
        if !matches!(parts.method, Method::GET | Method::HEAD) {
            builder = builder.body(reqwest::Body::wrap_stream(body.into_data_stream()));
        }

        let upstream_response = builder
            .send()
            .await
            .map_err(|e| {
                warn!(url = %url, error = %e, "Upstream request failed");
                AppError::BadGateway(e.to_string())
            })?;

        let status = upstream_response.status();
        let mut response_headers = upstream_response.headers().clone();
        strip_hop_by_hop(&mut response_headers);

        debug!(url = %url, status = %status, "Relaying upstream response");

        let mut response = Response::builder()
            .status(status)
            .body(Body::from_stream(upstream_response.bytes_stream()))
            .map_err(|e| AppError::Internal(format!("failed to build relay response: {e}")))?;
        *response.headers_mut() = response_headers;

        Ok(response)
    }
}
