//! Server lifecycle and request dispatch.
//!
//! Startup is strictly ordered: ingest every configured archive concurrently,
//! bind an ephemeral loopback socket, rewrite tarball URLs to absolute form
//! using the now-known address, publish the readiness marker, then serve
//! until the process exits. No request is serviced before the marker exists,
//! and partial ingestion failure aborts startup rather than degrading.

use std::fmt;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::{Request, State},
    http::Method,
    response::{IntoResponse, Response},
    Router,
};
use futures_util::future::try_join_all;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::access_log::AccessLog;
use crate::config::ProxyConfig;
use crate::error::{AppError, AppResult};
use crate::ingest;
use crate::npm;
use crate::readiness;
use crate::routing::{self, LocalKind, RouteDecision};
use crate::state::AppState;
use crate::store::RegistryStore;
use crate::upstream::UpstreamClient;

/// Lifecycle phases the server moves through, in order. Construction itself
/// is the uninitialized state; each later phase is logged as it is entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerPhase {
    Ingesting,
    Bound,
    Ready,
    Serving,
    Closed,
}

impl fmt::Display for ServerPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let phase = match self {
            ServerPhase::Ingesting => "ingesting",
            ServerPhase::Bound => "bound",
            ServerPhase::Ready => "ready",
            ServerPhase::Serving => "serving",
            ServerPhase::Closed => "closed",
        };
        f.write_str(phase)
    }
}

fn transition(phase: ServerPhase) {
    info!(phase = %phase, "Server lifecycle transition");
}

/// Run the registry proxy to the serving state and block until shutdown.
pub async fn run_server(config: ProxyConfig) -> Result<()> {
    transition(ServerPhase::Ingesting);
    let objects_dir = config.objects_dir();
    tokio::fs::create_dir_all(&objects_dir)
        .await
        .with_context(|| format!("failed to create {}", objects_dir.display()))?;

    // Each ingestion writes a distinct key and object file, so they can all
    // run at once; one failure aborts startup for the lot.
    let records = try_join_all(
        config
            .packages
            .iter()
            .map(|pkg| ingest::ingest_package(&pkg.name, &pkg.archive, &objects_dir)),
    )
    .await
    .context("archive ingestion failed")?;
    let mut store = RegistryStore::from_records(records);
    info!(packages = store.len(), "All archives ingested");

    // Loopback-only, ephemeral port: the OS picks, the marker publishes.
    let listener = TcpListener::bind(SocketAddr::from((Ipv4Addr::LOCALHOST, 0)))
        .await
        .context("failed to bind loopback listener")?;
    let addr = listener.local_addr().context("listener has no address")?;
    let base_url = format!("http://{addr}");
    transition(ServerPhase::Bound);
    info!(address = %base_url, "Listening socket bound");

    // Clients must never see a relative tarball URL, so the rewrite runs to
    // completion before the marker makes the address discoverable.
    store.rewrite_tarball_urls(&base_url);

    let access_log = AccessLog::open(&config.data_dir)
        .await
        .context("failed to open access log")?;
    let upstream_client = Arc::new(UpstreamClient::new(config.upstream.clone())?);
    info!(upstream = %upstream_client.registry_url(), "Upstream registry configured");

    let state = Arc::new(AppState {
        store,
        server_addr: base_url.clone(),
        data_dir: config.data_dir.clone(),
        upstream_client,
        access_log,
    });

    readiness::write_marker(&config.data_dir, &base_url)
        .await
        .context("failed to publish readiness marker")?;
    transition(ServerPhase::Ready);

    let app = build_router(state);

    transition(ServerPhase::Serving);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    transition(ServerPhase::Closed);
    Ok(())
}

/// Build the application router. A single fallback handler sees every
/// request; per-path routes would swallow the unknown paths that must reach
/// the proxy.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .fallback(handle_request)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "Failed to install shutdown signal handler");
    }
}

async fn handle_request(State(state): State<Arc<AppState>>, req: Request) -> Response {
    match dispatch(&state, req).await {
        Ok(response) => response,
        Err(err) => err.into_response(),
    }
}

/// Classify and dispatch one request. The access log line for the request
/// itself is written before anything else; outcome lines follow only once
/// the outcome is certain.
async fn dispatch(state: &AppState, req: Request) -> AppResult<Response> {
    let raw_path = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());
    state.access_log.request(req.method(), &raw_path).await?;

    if req.method() != Method::GET && req.method() != Method::HEAD {
        return Err(AppError::MethodNotAllowed);
    }

    match routing::classify(req.uri().path(), &state.store) {
        RouteDecision::Local { name, kind } => {
            // The store is immutable while serving, so the record is still
            // there; a miss would mean a routing bug, and proxying is the
            // safe answer for anything unroutable.
            let Some(record) = state.store.get(&name) else {
                state.access_log.proxied(&name).await?;
                return state.upstream_client.forward(req).await;
            };

            match kind {
                LocalKind::Metadata => {
                    let response = npm::metadata_response(record)?;
                    state.access_log.local_metadata(&name).await?;
                    Ok(response)
                }
                LocalKind::Tarball(filename) => {
                    // A filename mismatch 404s before this point and must not
                    // leave a local-hit line behind.
                    let response = npm::tarball_response(record, &filename).await?;
                    state.access_log.local_tar(&name).await?;
                    Ok(response)
                }
            }
        }
        RouteDecision::Proxy { name } => {
            state.access_log.proxied(&name).await?;
            state.upstream_client.forward(req).await
        }
    }
}
