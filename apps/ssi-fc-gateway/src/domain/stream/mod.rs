//! Stream Types
//!
//! Connection lifecycle states published by the stream supervisor and the
//! events it hands to registered handlers.
//!
//! # Lifecycle
//!
//! ```text
//! Disconnected -> Connecting -> Connected -> Reconnecting -> Connected ...
//!                                     \                \
//!                                      +-> Closed <-----+ (close or budget spent)
//! ```
//!
//! Transitions that lose the connection are also delivered to handlers as
//! lifecycle events, so consumers can tell when a gap in the feed may exist.

use std::fmt;

use serde::{Deserialize, Serialize};

// =============================================================================
// Stream State
// =============================================================================

/// Connection state of a supervised stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamState {
    /// Not connected and not trying to connect.
    Disconnected,
    /// First connection attempt in progress.
    Connecting,
    /// Connected and receiving frames.
    Connected,
    /// Connection lost; backing off before the next attempt.
    Reconnecting,
    /// Closed by the owner or after the retry budget was spent.
    Closed,
}

impl StreamState {
    /// Get the state name used in logs and health output.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Closed => "closed",
        }
    }

    /// Check whether the state is terminal.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }
}

impl fmt::Display for StreamState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Event Kinds
// =============================================================================

/// Kind of event delivered to stream handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Market data broadcast on a subscribed channel.
    MarketData,
    /// Order status change.
    OrderUpdate,
    /// Order fill.
    OrderMatch,
    /// Order rejected after acceptance.
    OrderError,
    /// Portfolio or cash change.
    PortfolioUpdate,
    /// Error reported by the venue hub.
    Error,
    /// The connection dropped.
    Disconnected,
    /// A reconnect attempt is about to start.
    Reconnecting,
    /// The connection was re-established; events in between may be missing.
    Reconnected,
    /// The retry budget is spent and the stream will not reconnect.
    Terminated,
}

impl EventKind {
    /// Map a venue trading event `type` to its kind.
    #[must_use]
    pub fn from_trading_type(value: &str) -> Option<Self> {
        match value {
            "orderEvent" => Some(Self::OrderUpdate),
            "orderMatchEvent" => Some(Self::OrderMatch),
            "orderError" => Some(Self::OrderError),
            "clientPortfolioEvent" => Some(Self::PortfolioUpdate),
            _ => None,
        }
    }

    /// Check whether events of this kind advance the trading cursor.
    #[must_use]
    pub const fn advances_cursor(&self) -> bool {
        matches!(
            self,
            Self::OrderUpdate | Self::OrderMatch | Self::OrderError | Self::PortfolioUpdate
        )
    }

    /// Check whether this is a connection lifecycle event.
    #[must_use]
    pub const fn is_lifecycle(&self) -> bool {
        matches!(
            self,
            Self::Disconnected | Self::Reconnecting | Self::Reconnected | Self::Terminated
        )
    }

    /// Get the kind name used in logs and metrics labels.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::MarketData => "market_data",
            Self::OrderUpdate => "order_update",
            Self::OrderMatch => "order_match",
            Self::OrderError => "order_error",
            Self::PortfolioUpdate => "portfolio_update",
            Self::Error => "error",
            Self::Disconnected => "disconnected",
            Self::Reconnecting => "reconnecting",
            Self::Reconnected => "reconnected",
            Self::Terminated => "terminated",
        }
    }
}

// =============================================================================
// Stream Event
// =============================================================================

/// An event delivered to stream handlers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamEvent {
    /// Event kind.
    pub kind: EventKind,
    /// Channel the event arrived on, for market data.
    pub channel: Option<String>,
    /// Venue payload, passed through as received.
    pub payload: serde_json::Value,
    /// Trading cursor after this event, when the stream tracks one.
    pub cursor: Option<u64>,
}

impl StreamEvent {
    /// Create a venue event.
    #[must_use]
    pub const fn new(kind: EventKind, channel: Option<String>, payload: serde_json::Value) -> Self {
        Self {
            kind,
            channel,
            payload,
            cursor: None,
        }
    }

    /// Create a lifecycle event carrying a detail payload.
    #[must_use]
    pub const fn lifecycle(
        kind: EventKind,
        payload: serde_json::Value,
        cursor: Option<u64>,
    ) -> Self {
        Self {
            kind,
            channel: None,
            payload,
            cursor,
        }
    }

    /// Read the venue notification id from the payload or its `data`
    /// object, if present.
    #[must_use]
    pub fn notify_id(&self) -> Option<u64> {
        let lookup = |value: &serde_json::Value| {
            value.get("notifyId").or_else(|| value.get("notifyID")).cloned()
        };
        let value = lookup(&self.payload).or_else(|| self.payload.get("data").and_then(lookup))?;
        value
            .as_u64()
            .or_else(|| value.as_str().and_then(|text| text.parse().ok()))
    }
}
