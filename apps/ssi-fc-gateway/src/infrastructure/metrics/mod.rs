//! Prometheus Metrics Module
//!
//! Exposes gateway metrics via Prometheus format for monitoring.
//!
//! # Metrics Categories
//!
//! - **Authentication**: Token exchanges by session and outcome
//! - **REST**: Venue requests by session, method and outcome, plus latency
//! - **Streams**: Delivered events, malformed frames, reconnects and state
//!
//! # Integration
//!
//! Metrics are exposed at `/metrics` on the health server port.

use std::sync::OnceLock;
use std::time::Duration;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

use crate::domain::session::SessionKind;
use crate::domain::stream::{EventKind, StreamState};

// =============================================================================
// Global Metrics Handle
// =============================================================================

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the Prometheus metrics recorder.
///
/// Subsequent calls return the handle installed by the first.
///
/// # Errors
///
/// Returns an error if the global recorder cannot be installed.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }

    let handle = PrometheusBuilder::new().install_recorder()?;
    register_metrics();
    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

/// Get the Prometheus handle for rendering metrics.
///
/// Returns `None` if metrics have not been initialized.
#[must_use]
pub fn get_metrics_handle() -> Option<PrometheusHandle> {
    PROMETHEUS_HANDLE.get().cloned()
}

// =============================================================================
// Metric Registration
// =============================================================================

fn register_metrics() {
    describe_counter!(
        "ssi_gateway_auth_exchanges_total",
        "Token exchanges by session and outcome"
    );

    describe_counter!(
        "ssi_gateway_rest_requests_total",
        "Venue REST requests by session, method and outcome"
    );
    describe_histogram!(
        "ssi_gateway_rest_request_seconds",
        "Venue REST request latency"
    );

    describe_counter!(
        "ssi_gateway_stream_events_total",
        "Events delivered to stream handlers"
    );
    describe_counter!(
        "ssi_gateway_stream_malformed_frames_total",
        "Inbound stream frames dropped because they could not be decoded"
    );
    describe_counter!(
        "ssi_gateway_stream_handler_panics_total",
        "Stream handlers that panicked while processing an event"
    );
    describe_counter!(
        "ssi_gateway_reconnects_total",
        "Stream reconnection attempts"
    );
    describe_gauge!(
        "ssi_gateway_stream_connected",
        "Whether the stream is connected (1) or not (0)"
    );
}

// =============================================================================
// Metric Recording Functions
// =============================================================================

/// Record a token exchange outcome.
pub fn record_auth_exchange(session: SessionKind, success: bool) {
    counter!(
        "ssi_gateway_auth_exchanges_total",
        "session" => session.as_str(),
        "outcome" => outcome(success)
    )
    .increment(1);
}

/// Record a completed venue REST request.
pub fn record_rest_request(
    session: SessionKind,
    method: &'static str,
    success: bool,
    elapsed: Duration,
) {
    counter!(
        "ssi_gateway_rest_requests_total",
        "session" => session.as_str(),
        "method" => method,
        "outcome" => outcome(success)
    )
    .increment(1);
    histogram!(
        "ssi_gateway_rest_request_seconds",
        "session" => session.as_str(),
        "method" => method
    )
    .record(elapsed.as_secs_f64());
}

/// Record an event delivered to handlers.
pub fn record_stream_event(session: SessionKind, kind: EventKind) {
    counter!(
        "ssi_gateway_stream_events_total",
        "session" => session.as_str(),
        "kind" => kind.as_str()
    )
    .increment(1);
}

/// Record a dropped malformed frame.
pub fn record_malformed_frame(session: SessionKind) {
    counter!(
        "ssi_gateway_stream_malformed_frames_total",
        "session" => session.as_str()
    )
    .increment(1);
}

/// Record a handler panic.
pub fn record_handler_panic(session: SessionKind, kind: EventKind) {
    counter!(
        "ssi_gateway_stream_handler_panics_total",
        "session" => session.as_str(),
        "kind" => kind.as_str()
    )
    .increment(1);
}

/// Record a reconnection attempt.
pub fn record_reconnect(session: SessionKind) {
    counter!(
        "ssi_gateway_reconnects_total",
        "session" => session.as_str()
    )
    .increment(1);
}

/// Update the connected gauge from a state change.
pub fn set_stream_state(session: SessionKind, state: StreamState) {
    let connected = if matches!(state, StreamState::Connected) { 1.0 } else { 0.0 };
    gauge!(
        "ssi_gateway_stream_connected",
        "session" => session.as_str()
    )
    .set(connected);
}

const fn outcome(success: bool) -> &'static str {
    if success { "success" } else { "failure" }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_labels() {
        assert_eq!(outcome(true), "success");
        assert_eq!(outcome(false), "failure");
    }

    #[test]
    fn recording_without_recorder_is_a_no_op() {
        record_auth_exchange(SessionKind::Data, true);
        record_rest_request(SessionKind::Trading, "POST", false, Duration::from_millis(5));
        record_stream_event(SessionKind::Data, EventKind::MarketData);
        set_stream_state(SessionKind::Trading, StreamState::Connected);
    }
}
