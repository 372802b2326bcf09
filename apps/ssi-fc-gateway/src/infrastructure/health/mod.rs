//! Health Check and Metrics Endpoint
//!
//! HTTP endpoint reporting session and stream state, plus Prometheus metrics.
//!
//! # Endpoints
//!
//! - `GET /health` - JSON health status
//! - `GET /healthz` - liveness probe (simple OK)
//! - `GET /readyz` - readiness probe (both sessions held, no stream closed)
//! - `GET /metrics` - Prometheus metrics in text format

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::application::services::{DataGateway, TradingGateway};
use crate::domain::stream::StreamState;
use crate::infrastructure::metrics::get_metrics_handle;

// =============================================================================
// Health Response Types
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Overall status.
    pub status: HealthStatus,
    /// Gateway version.
    pub version: String,
    /// Server uptime in seconds.
    pub uptime_secs: u64,
    /// Current time.
    pub current_time: DateTime<Utc>,
    /// Market-data session.
    pub data: SessionInfo,
    /// Trading session.
    pub trading: SessionInfo,
}

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Both sessions held and both streams connected.
    Healthy,
    /// Sessions held but a stream is not connected.
    Degraded,
    /// A session is missing or a stream has given up.
    Unhealthy,
}

/// State of one venue session and its stream.
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    /// Whether a bearer token is held.
    pub authenticated: bool,
    /// When the current token was issued.
    pub issued_at: Option<DateTime<Utc>>,
    /// Stream connection state.
    pub stream: StreamState,
    /// Subscribed channels.
    pub channels: usize,
    /// Trading cursor, if tracked.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<u64>,
}

// =============================================================================
// Health Server State
// =============================================================================

/// Shared state for the health server.
#[derive(Debug)]
pub struct HealthServerState {
    version: String,
    started_at: Instant,
    data: DataGateway,
    trading: TradingGateway,
}

impl HealthServerState {
    /// Create health server state over both gateways.
    #[must_use]
    pub fn new(version: String, data: DataGateway, trading: TradingGateway) -> Self {
        Self {
            version,
            started_at: Instant::now(),
            data,
            trading,
        }
    }
}

// =============================================================================
// Health Server
// =============================================================================

/// Health check HTTP server.
pub struct HealthServer {
    port: u16,
    state: Arc<HealthServerState>,
    cancel: CancellationToken,
}

impl HealthServer {
    /// Create a new health server.
    #[must_use]
    pub const fn new(port: u16, state: Arc<HealthServerState>, cancel: CancellationToken) -> Self {
        Self {
            port,
            state,
            cancel,
        }
    }

    /// Run the health server until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `HealthServerError` if binding fails or the HTTP server
    /// encounters a fatal error while running.
    pub async fn run(self) -> Result<(), HealthServerError> {
        let app = router(self.state);

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| HealthServerError::BindFailed(self.port, e.to_string()))?;

        tracing::info!(port = self.port, "Health server listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(|e| HealthServerError::ServerFailed(e.to_string()))?;

        tracing::info!("Health server stopped");
        Ok(())
    }
}

fn router(state: Arc<HealthServerState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/healthz", get(liveness_handler))
        .route("/readyz", get(readiness_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

// =============================================================================
// HTTP Handlers
// =============================================================================

async fn health_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    let response = build_health_response(&state);
    let status_code = match response.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status_code, Json(response))
}

async fn liveness_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn readiness_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    let response = build_health_response(&state);
    if response.status == HealthStatus::Unhealthy {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
    } else {
        (StatusCode::OK, "READY")
    }
}

async fn metrics_handler() -> impl IntoResponse {
    get_metrics_handle().map_or_else(
        || {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [("content-type", "text/plain")],
                "Metrics not initialized".to_string(),
            )
        },
        |handle| {
            (
                StatusCode::OK,
                [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
                handle.render(),
            )
        },
    )
}

fn build_health_response(state: &HealthServerState) -> HealthResponse {
    let data = SessionInfo {
        authenticated: state.data.is_authenticated(),
        issued_at: state.data.current_session().ok().map(|s| s.issued_at()),
        stream: state.data.stream_state(),
        channels: state.data.stream().channels().len(),
        cursor: state.data.stream().cursor(),
    };
    let trading = SessionInfo {
        authenticated: state.trading.is_authenticated(),
        issued_at: state.trading.current_session().ok().map(|s| s.issued_at()),
        stream: state.trading.stream_state(),
        channels: state.trading.stream().channels().len(),
        cursor: state.trading.stream().cursor(),
    };

    HealthResponse {
        status: determine_health_status(&data, &trading),
        version: state.version.clone(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        current_time: Utc::now(),
        data,
        trading,
    }
}

fn determine_health_status(data: &SessionInfo, trading: &SessionInfo) -> HealthStatus {
    let sessions = [data, trading];
    if sessions.iter().any(|s| !s.authenticated || s.stream.is_closed()) {
        HealthStatus::Unhealthy
    } else if sessions.iter().all(|s| s.stream == StreamState::Connected) {
        HealthStatus::Healthy
    } else {
        HealthStatus::Degraded
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Health server errors.
#[derive(Debug, thiserror::Error)]
pub enum HealthServerError {
    /// Failed to bind to port.
    #[error("failed to bind to port {0}: {1}")]
    BindFailed(u16, String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}

// =============================================================================
// Tests
// =============================================================================
