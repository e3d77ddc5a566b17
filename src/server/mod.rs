//! HTTP API server
//!
//! Exposes the download service to external callers.
//!
//! # Endpoints
//!
//! - `POST /download` - Accept a download request (202, runs in background)
//! - `GET /download/status` - Current status snapshot
//! - `GET /download/events` - SSE stream of status snapshots
//! - `GET /download/destinations` - Configured destination names
//! - `GET /health` - Service health and engine availability
//!
//! # Example
//!
//! ```no_run
//! use fetchd::server::Server;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let server = Server::new(7070);
//! server.start().await?;
//! # Ok(())
//! # }
//! ```

use std::convert::Infallible;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use axum::{
    extract::{DefaultBodyLimit, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    response::Json,
    routing::{get, post},
    Router,
};
use futures_util::{Stream, StreamExt};
use serde::Serialize;
use serde_json::{json, Value};
use tokio_stream::wrappers::BroadcastStream;

use crate::config::Config;
use crate::download::{DownloadRequest, DownloadStatus, Orchestrator, StatusStore};
use crate::engine;

/// SSE event name carried by the push channel.
const STATUS_EVENT: &str = "download_status";

// Maximum request body size (64KB); download requests are tiny.
const MAX_BODY_SIZE: usize = 64 * 1024;

/// Server state shared across handlers.
pub struct AppState {
    /// Orchestrator driving the engine; shared with the worker task.
    pub orchestrator: Arc<Orchestrator>,
    /// Set while a download worker is running; guards the single slot.
    busy: AtomicBool,
}

/// API server configuration.
#[derive(Debug)]
pub struct Server {
    /// Port to listen on.
    port: u16,
    /// Address to bind to (defaults to 127.0.0.1 for security).
    bind_address: String,
    /// Destination configuration for the orchestrator.
    config: Config,
}

impl Default for Server {
    fn default() -> Self {
        Self::new(7070)
    }
}

impl Server {
    /// Create a new server with the specified port.
    /// By default, binds to 127.0.0.1 (localhost only) for security.
    pub fn new(port: u16) -> Self {
        Self {
            port,
            bind_address: "127.0.0.1".to_string(),
            config: Config::default(),
        }
    }

    /// Set the bind address.
    /// Use "0.0.0.0" to allow network access, "127.0.0.1" (default) for
    /// localhost only.
    pub fn with_bind_address(mut self, addr: impl Into<String>) -> Self {
        self.bind_address = addr.into();
        self
    }

    /// Set the destination configuration.
    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Build the router with all routes.
    pub fn build_router(&self) -> Router {
        let store = Arc::new(StatusStore::new());
        let orchestrator = Orchestrator::new(store)
            .with_destinations(self.config.destinations.clone())
            .with_default_destination(self.config.default_destination.clone());

        let state = Arc::new(AppState {
            orchestrator: Arc::new(orchestrator),
            busy: AtomicBool::new(false),
        });

        Router::new()
            .route("/download", post(download_handler))
            .route("/download/status", get(status_handler))
            .route("/download/events", get(events_handler))
            .route("/download/destinations", get(destinations_handler))
            .route("/health", get(health_handler))
            .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
            .with_state(state)
    }

    /// Start the server with graceful shutdown.
    pub async fn start(&self) -> Result<()> {
        let router = self.build_router();
        let addr = format!("{}:{}", self.bind_address, self.port);

        tracing::info!("starting server on {}", addr);

        if self.bind_address == "0.0.0.0" {
            tracing::warn!(
                "server is binding to 0.0.0.0 which exposes the API to the network; \
                 use 127.0.0.1 (default) for local-only access"
            );
        }

        let listener = tokio::net::TcpListener::bind(&addr).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::AddrInUse {
                anyhow::anyhow!(
                    "port {} is already in use. Another fetchd instance may be running; \
                     stop it or pick a different port with --port",
                    self.port
                )
            } else {
                anyhow::anyhow!("failed to bind to {}: {}", addr, e)
            }
        })?;

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        Ok(())
    }

    /// Get the port.
    pub fn port(&self) -> u16 {
        self.port
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to install ctrl-c handler: {}", e);
    }
    tracing::info!("shutdown signal received");
}

// =============================================================================
// Response Types
// =============================================================================

/// Health check response.
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    engine: &'static str,
    download_active: bool,
}

// =============================================================================
// Handlers
// =============================================================================

/// Accept a download request and run it on a background worker.
///
/// Replies 202 immediately; progress is observable via `/download/status`
/// and `/download/events`. One download at a time: a second request while
/// one is active gets 409. The busy flag is only released after the
/// worker's final status publish, so a new download can never begin before
/// the previous one's terminal status is visible.
async fn download_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<DownloadRequest>,
) -> (StatusCode, Json<Value>) {
    if request.url.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "url must not be empty" })),
        );
    }

    if state.busy.swap(true, Ordering::SeqCst) {
        return (
            StatusCode::CONFLICT,
            Json(json!({ "error": "a download is already in progress" })),
        );
    }

    let worker_state = Arc::clone(&state);
    tokio::task::spawn_blocking(move || {
        let status = worker_state.orchestrator.run(&request);
        tracing::info!("download finished: {} ({})", status.url, status.phase);
        worker_state.busy.store(false, Ordering::SeqCst);
    });

    (
        StatusCode::ACCEPTED,
        Json(json!({ "status": "download started" })),
    )
}

/// Current status snapshot; Idle default if no download has ever run.
async fn status_handler(State(state): State<Arc<AppState>>) -> Json<DownloadStatus> {
    Json(state.orchestrator.store().snapshot())
}

/// SSE stream of status snapshots, one event per store update.
///
/// Best-effort delivery: a subscriber that lags simply skips the missed
/// snapshots, and there is no replay for late subscribers.
async fn events_handler(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.orchestrator.store().subscribe();
    let stream = BroadcastStream::new(rx).filter_map(|update| async move {
        match update {
            Ok(status) => Event::default()
                .event(STATUS_EVENT)
                .json_data(&status)
                .ok()
                .map(Ok),
            // Lagged receiver: drop the gap, keep streaming.
            Err(_) => None,
        }
    });
    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// List configured destination names.
async fn destinations_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({ "destinations": state.orchestrator.destination_names() }))
}

/// Health check handler.
///
/// Reports whether the download engine can be located, so observers can
/// surface an actionable error before the first download is attempted.
async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let engine = match engine::locate() {
        Some(_) => "ok",
        None => "missing",
    };
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        engine,
        download_active: state.busy.load(Ordering::SeqCst),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_defaults_to_localhost() {
        let server = Server::new(7070);
        assert_eq!(server.port(), 7070);
        assert_eq!(server.bind_address, "127.0.0.1");
    }

    #[test]
    fn test_build_router_succeeds() {
        let server = Server::new(0).with_config(Config::default());
        let _router = server.build_router();
    }
}
