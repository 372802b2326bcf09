#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::items_after_statements
    )
)]

//! SSI `FastConnect` Gateway - Data and Trading Sessions
//!
//! Holds two authenticated sessions against SSI `FastConnect`: a market-data
//! feed and a trading channel. Caller requests are forwarded to the venue's
//! REST endpoints with bearer tokens attached and, for order mutations, an
//! RSA signature over the exact bytes sent. Each session also supervises one
//! streaming connection that reconnects with backoff and reports gaps.
//!
//! # Layers (inside to outside)
//!
//! - **Domain**: Session, order and stream event types
//!   - `session`: Bearer tokens and the authenticated session record
//!   - `order`: Order bodies, request ids, numeric coercion
//!   - `stream`: Stream states and event kinds
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: The token provider contract
//!   - `services`: Data, trading and combined gateway facades
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `ssi`: Token exchange, request signing and REST dispatch
//!   - `stream`: Hub codec, handler registry and the stream supervisor
//!   - `config`: Environment configuration and session settings
//!   - `health`: Health check HTTP endpoint
//!   - `metrics`, `telemetry`: Prometheus metrics and tracing
//!
//! # Data Flow
//!
//! ```text
//! caller -> DataGateway/TradingGateway -> Dispatcher (+ X-Signature) -> venue REST
//!                                                                  <- JSON, unmodified
//! venue hub -> StreamSupervisor -> StreamCodec -> HandlerRegistry -> handlers
//!                     ^
//!                     +-- SessionManager (bearer token, refresh on reconnect)
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Session, order and stream types.
pub mod domain;

/// Application layer - Gateway facades and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

/// Gateway error type.
pub mod error;

// =============================================================================
// Re-exports
// =============================================================================

// Errors
pub use error::{ErrorKind, ErrorPayload, GatewayError};

// Domain types
pub use domain::order::{
    Market, NumericInput, OrderType, RequestIdGenerator, Side, SsiOrder, StopType,
};
pub use domain::session::{BearerToken, Session, SessionKind};
pub use domain::stream::{EventKind, StreamEvent, StreamState};

// Gateways
pub use application::ports::TokenProvider;
pub use application::services::{DataGateway, Gateway, TradingGateway};

// Infrastructure config
pub use infrastructure::config::{
    ConfigError, GatewaySettings, ServerSettings, SessionConfig, StreamSettings,
};

// Venue adapters
pub use infrastructure::ssi::{
    Dispatcher, QueryParams, RequestSigner, SIGNATURE_HEADER, SessionManager, SignedEnvelope,
};
pub use infrastructure::stream::StreamSupervisor;

// Health server
pub use infrastructure::health::{HealthServer, HealthServerError, HealthServerState};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
