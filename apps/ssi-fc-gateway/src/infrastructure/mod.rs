//! Infrastructure Layer - Adapters and external integrations.
//!
//! Concrete implementations of the ports defined in the application layer,
//! plus the ambient services the binary runs alongside them.

/// Configuration loading and session settings.
pub mod config;

/// SSI `FastConnect` REST adapters: token exchange, signing, dispatch.
pub mod ssi;

/// Supervised streaming connections.
pub mod stream;

/// Health check HTTP endpoint.
pub mod health;

/// Prometheus metrics instrumentation.
pub mod metrics;

/// OpenTelemetry tracing integration.
pub mod telemetry;
