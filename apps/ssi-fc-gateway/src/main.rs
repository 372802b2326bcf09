//! SSI `FastConnect` Gateway Binary
//!
//! Authenticates the data and trading sessions, starts both streams with
//! logging handlers, and serves health and metrics until shutdown.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin ssi-fc-gateway
//! ```
//!
//! # Environment Variables
//!
//! ## Required
//! - `DATA_CONSUMER_ID`, `DATA_CONSUMER_SECRET`: market-data credentials
//! - `TRADING_CONSUMER_ID`, `TRADING_CONSUMER_SECRET`: trading credentials
//!
//! ## Optional
//! - `TRADING_PRIVATE_KEY`: RSA key for order signing (PEM, base64 or XML export)
//! - `TRADING_PIN_CODE`: trading PIN
//! - `DATA_URL`, `DATA_STREAM_URL`, `TRADING_URL`, `TRADING_STREAM_URL`: endpoint overrides
//! - `TRADING_DEVICE_ID`, `GATEWAY_USER_AGENT`: device identity sent with orders
//! - `GATEWAY_HTTP_TIMEOUT_SECS`, `GATEWAY_TOKEN_TTL_SECS`: REST timeout and token lifetime
//! - `GATEWAY_HEARTBEAT_INTERVAL_SECS`, `GATEWAY_IDLE_TIMEOUT_SECS`: stream liveness
//! - `GATEWAY_RECONNECT_DELAY_INITIAL_MS`, `GATEWAY_RECONNECT_DELAY_MAX_SECS`,
//!   `GATEWAY_RECONNECT_DELAY_MULTIPLIER`, `GATEWAY_MAX_RECONNECT_ATTEMPTS`: backoff
//! - `GATEWAY_HEALTH_PORT`: health and metrics HTTP port (default: 8082)
//! - `OTEL_ENABLED`, `OTEL_EXPORTER_OTLP_ENDPOINT`, `OTEL_SERVICE_NAME`: span export
//! - `RUST_LOG`: log filter (default: info)

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use ssi_fc_gateway::infrastructure::health::{HealthServer, HealthServerState};
use ssi_fc_gateway::infrastructure::telemetry;
use ssi_fc_gateway::{EventKind, Gateway, GatewaySettings, StreamEvent, init_metrics};
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Time allowed for streams to close after shutdown is requested.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

const TRADING_KINDS: [EventKind; 4] = [
    EventKind::OrderUpdate,
    EventKind::OrderMatch,
    EventKind::OrderError,
    EventKind::PortfolioUpdate,
];

const LIFECYCLE_KINDS: [EventKind; 5] = [
    EventKind::Error,
    EventKind::Disconnected,
    EventKind::Reconnecting,
    EventKind::Reconnected,
    EventKind::Terminated,
];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if rustls::crypto::ring::default_provider().install_default().is_err() {
        eprintln!("rustls crypto provider already installed");
    }

    load_dotenv();

    let _telemetry_guard = telemetry::init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting SSI FastConnect gateway");

    if let Err(e) = init_metrics() {
        tracing::warn!(error = %e, "Prometheus recorder not installed");
    }

    let settings = GatewaySettings::from_env()
        .inspect_err(|e| tracing::error!(error = %e, "Invalid configuration"))
        .context("loading configuration")?;
    log_settings(&settings);

    let gateway = Gateway::connect(settings.data, settings.trading)
        .await
        .inspect_err(|e| {
            tracing::error!(error = %e, "Initial authentication failed, refusing to serve");
        })
        .context("authenticating venue sessions")?;

    register_log_handlers(&gateway);
    gateway.data().start_stream().context("starting market-data stream")?;
    gateway.trading().start_stream().context("starting trading stream")?;

    let shutdown_token = CancellationToken::new();

    let health_state = Arc::new(HealthServerState::new(
        env!("CARGO_PKG_VERSION").to_string(),
        gateway.data().clone(),
        gateway.trading().clone(),
    ));
    let health_server =
        HealthServer::new(settings.server.health_port, health_state, shutdown_token.clone());
    tokio::spawn(async move {
        if let Err(e) = health_server.run().await {
            tracing::error!(error = %e, "Health server error");
        }
    });

    tracing::info!("Gateway ready");

    await_shutdown(shutdown_token).await;

    gateway.close();
    let drained = tokio::time::timeout(SHUTDOWN_TIMEOUT, async {
        tokio::join!(gateway.data().stream().wait(), gateway.trading().stream().wait())
    })
    .await;
    match drained {
        Ok((data, trading)) => {
            for (session, result) in [("data", data), ("trading", trading)] {
                if let Err(e) = result {
                    tracing::warn!(session, error = %e, "Stream ended with error");
                }
            }
        }
        Err(_) => tracing::warn!(
            timeout_secs = SHUTDOWN_TIMEOUT.as_secs(),
            "Streams did not close in time"
        ),
    }

    tracing::info!("Gateway stopped");
    Ok(())
}

/// Log every stream event, mirroring the venue feed into the process log.
fn register_log_handlers(gateway: &Gateway) {
    gateway.data().register_handler(EventKind::MarketData, |event: &StreamEvent| {
        tracing::debug!(
            channel = event.channel.as_deref().unwrap_or_default(),
            payload = %event.payload,
            "Market data"
        );
    });

    for kind in TRADING_KINDS {
        gateway.trading().register_handler(kind, move |event: &StreamEvent| {
            tracing::info!(
                kind = kind.as_str(),
                cursor = ?event.cursor,
                payload = %event.payload,
                "Trading event"
            );
        });
    }

    for kind in LIFECYCLE_KINDS {
        let log = move |session: &'static str| {
            move |event: &StreamEvent| {
                tracing::warn!(
                    session,
                    kind = kind.as_str(),
                    cursor = ?event.cursor,
                    detail = %event.payload,
                    "Stream lifecycle"
                );
            }
        };
        gateway.data().register_handler(kind, log("data"));
        gateway.trading().register_handler(kind, log("trading"));
    }
}

/// Log the parsed configuration.
fn log_settings(settings: &GatewaySettings) {
    tracing::info!(
        data_url = settings.data.base_url(),
        trading_url = settings.trading.base_url(),
        signing = settings.trading.signer().is_some(),
        health_port = settings.server.health_port,
        "Configuration loaded"
    );
    tracing::debug!(
        data_stream_url = settings.data.stream_url(),
        trading_stream_url = settings.trading.stream_url(),
        "Stream endpoints"
    );
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Ctrl+C handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();
}
