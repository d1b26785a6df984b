//! HTTP control server for the companion side.
//!
//! Lets a local UI drive the wearable and read back what the listener has
//! received:
//! - `GET /health`
//! - `GET /status` returns the UI snapshot and transparency stats
//! - `POST /recording/start` and `POST /recording/stop` broadcast the control
//!   messages to every reachable wearable
//!
//! # Architecture
//!
//! ```text
//! UI ──→ POST /recording/start ──→ CompanionController ──→ transport ──→ wearable
//!  ↑                                                                      │
//!  └──── GET /status ◀── UiState ◀── RemoteListener ◀── channels ◀────────┘
//! ```

use crate::session::channel::{NodeInfo, TransportError};
use crate::session::control::CompanionController;
use crate::session::ui::{UiSnapshot, UiState};
use crate::transparency::{SharedTransparencyLog, TransparencyStats};
use axum::{
    extract::State,
    http::{HeaderValue, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to bind to (0 for random)
    pub port: u16,
}

impl ServerConfig {
    pub fn new(port: u16) -> Self {
        Self { port }
    }
}

/// Shared server state
pub struct ServerState {
    controller: CompanionController,
    ui: UiState,
    log: SharedTransparencyLog,
}

impl ServerState {
    pub fn new(controller: CompanionController, ui: UiState, log: SharedTransparencyLog) -> Self {
        Self { controller, ui, log }
    }
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// GET /status response
#[derive(Serialize)]
pub struct StatusResponse {
    pub ui: UiSnapshot,
    pub stats: TransparencyStats,
}

/// Response from the recording endpoints
#[derive(Serialize)]
pub struct RecordingResponse {
    pub status: String,
    pub nodes: Vec<NodeInfo>,
}

/// Error response
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

/// GET /health
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// GET /status
async fn status(State(state): State<Arc<ServerState>>) -> Json<StatusResponse> {
    Json(StatusResponse {
        ui: state.ui.snapshot(),
        stats: state.log.stats(),
    })
}

/// POST /recording/start
async fn start_recording(
    State(state): State<Arc<ServerState>>,
) -> Result<Json<RecordingResponse>, ApiError> {
    let nodes = state.controller.start_recording().await.map_err(transport_error)?;
    recording_response(nodes, "recording")
}

/// POST /recording/stop
async fn stop_recording(
    State(state): State<Arc<ServerState>>,
) -> Result<Json<RecordingResponse>, ApiError> {
    let nodes = state.controller.stop_recording().await.map_err(transport_error)?;
    recording_response(nodes, "stopped")
}

fn recording_response(
    nodes: Vec<NodeInfo>,
    status: &str,
) -> Result<Json<RecordingResponse>, ApiError> {
    if nodes.is_empty() {
        return Err((
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: "No reachable watch advertises the collector capability".to_string(),
                code: "NO_WATCH".to_string(),
            }),
        ));
    }

    Ok(Json(RecordingResponse {
        status: status.to_string(),
        nodes,
    }))
}

fn transport_error(e: TransportError) -> ApiError {
    tracing::error!("Control message failed: {}", e);
    (
        StatusCode::BAD_GATEWAY,
        Json(ErrorResponse {
            error: format!("Transport error: {}", e),
            code: "TRANSPORT_ERROR".to_string(),
        }),
    )
}

/// Run the HTTP server
pub async fn run(
    config: ServerConfig,
    state: Arc<ServerState>,
) -> anyhow::Result<(SocketAddr, tokio::sync::oneshot::Sender<()>)> {
    let app = Router::new()
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/recording/start", post(start_recording))
        .route("/recording/stop", post(stop_recording))
        .layer(
            CorsLayer::new()
                .allow_origin([
                    HeaderValue::from_static("http://localhost"),
                    HeaderValue::from_static("http://127.0.0.1"),
                ])
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], config.port));
    let listener = TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    tracing::info!("Companion control server listening on http://{}", actual_addr);

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
                tracing::info!("Server shutdown signal received");
            })
            .await
        {
            tracing::error!("Server error: {}", e);
        }
    });

    Ok((actual_addr, shutdown_tx))
}
