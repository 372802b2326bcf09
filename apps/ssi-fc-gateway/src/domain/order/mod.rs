//! Order Types
//!
//! Order payloads accepted by the venue's stock and derivative order
//! endpoints, plus the per-session request identifier generator attached to
//! every order mutation.
//!
//! # Wire Shape
//!
//! [`SsiOrder`] serializes to the venue's camelCase JSON. Fields left as
//! `None` are omitted from the body entirely, so the signed bytes only ever
//! contain what the caller set plus the fields stamped by the gateway
//! (`requestID`, `deviceId`, `userAgent`, `code`).

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::GatewayError;

// =============================================================================
// Enums
// =============================================================================

/// Order side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    /// Buy.
    #[serde(rename = "B")]
    Buy,
    /// Sell.
    #[serde(rename = "S")]
    Sell,
}

/// Market segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Market {
    /// Equities.
    #[serde(rename = "VN")]
    Stock,
    /// Futures and other derivatives.
    #[serde(rename = "VNFE")]
    Derivative,
}

/// Venue order types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderType {
    /// Limit order.
    Lo,
    /// At the opening.
    Ato,
    /// At the closing.
    Atc,
    /// Market order (HOSE).
    Mp,
    /// Market-to-limit.
    Mtl,
    /// Match or kill.
    Mok,
    /// Match and kill.
    Mak,
    /// Post-close limit order.
    Plo,
    /// Good till date.
    Gtd,
}

/// Stop order trigger types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopType {
    /// Trigger on price moving down.
    #[serde(rename = "D")]
    Down,
    /// Trigger on price moving up.
    #[serde(rename = "U")]
    Up,
    /// Trailing up.
    #[serde(rename = "V")]
    TrailingUp,
    /// Trailing down.
    #[serde(rename = "E")]
    TrailingDown,
    /// One-cancels-other.
    #[serde(rename = "O")]
    Oco,
    /// Bull/bear bracket.
    #[serde(rename = "B")]
    BullBear,
}

// =============================================================================
// Order
// =============================================================================

/// Order body for new, modify and cancel requests.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SsiOrder {
    /// Trading account.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
    /// Side.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buy_sell: Option<Side>,
    /// Market segment.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub market: Option<Market>,
    /// Order type.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_type: Option<OrderType>,
    /// Limit price.
    #[serde(
        default,
        with = "rust_decimal::serde::float_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub price: Option<Decimal>,
    /// Quantity.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quantity: Option<u64>,
    /// Instrument symbol.
    #[serde(rename = "instrumentID", skip_serializing_if = "Option::is_none")]
    pub instrument_id: Option<String>,
    /// Order channel.
    #[serde(rename = "channelID", skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    /// Request identifier, stamped by the gateway.
    #[serde(rename = "requestID", skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// Whether this is a stop order.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_order: Option<bool>,
    /// Stop trigger price.
    #[serde(
        default,
        with = "rust_decimal::serde::float_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub stop_price: Option<Decimal>,
    /// Stop trigger type.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_type: Option<StopType>,
    /// Trailing step.
    #[serde(
        default,
        with = "rust_decimal::serde::float_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub stop_step: Option<Decimal>,
    /// Stop-loss step.
    #[serde(
        default,
        with = "rust_decimal::serde::float_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub loss_step: Option<Decimal>,
    /// Take-profit step.
    #[serde(
        default,
        with = "rust_decimal::serde::float_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub profit_step: Option<Decimal>,
    /// Trading PIN, stamped by the gateway.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Device id, stamped by the gateway.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    /// User agent, stamped by the gateway.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}

impl SsiOrder {
    /// Create a limit order.
    #[must_use]
    pub fn limit(
        account: impl Into<String>,
        instrument_id: impl Into<String>,
        side: Side,
        market: Market,
        price: Decimal,
        quantity: u64,
    ) -> Self {
        Self {
            account: Some(account.into()),
            instrument_id: Some(instrument_id.into()),
            buy_sell: Some(side),
            market: Some(market),
            order_type: Some(OrderType::Lo),
            price: Some(price),
            quantity: Some(quantity),
            ..Self::default()
        }
    }
}

// =============================================================================
// Request Identifiers
// =============================================================================

/// Monotonic request identifier source.
///
/// Seeded from wall-clock milliseconds so identifiers do not repeat across
/// process restarts, then incremented per call so they never repeat within a
/// session even under concurrent use.
#[derive(Debug)]
pub struct RequestIdGenerator {
    next: AtomicU64,
}

impl RequestIdGenerator {
    /// Create a generator seeded from the current time.
    #[must_use]
    pub fn new() -> Self {
        let seed = u64::try_from(Utc::now().timestamp_millis()).unwrap_or_default();
        Self::starting_at(seed)
    }

    /// Create a generator with an explicit first value.
    #[must_use]
    pub const fn starting_at(seed: u64) -> Self {
        Self {
            next: AtomicU64::new(seed),
        }
    }

    /// Take the next identifier.
    pub fn next_id(&self) -> String {
        self.next.fetch_add(1, Ordering::Relaxed).to_string()
    }
}

impl Default for RequestIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Numeric Input
// =============================================================================

/// A numeric value that may arrive as a number or as text.
///
/// Callers forwarding user input often hold prices as strings; the venue
/// expects a number. [`NumericInput::to_decimal`] coerces both.
#[derive(Debug, Clone, PartialEq)]
pub enum NumericInput {
    /// Floating point value.
    Number(f64),
    /// Textual value, e.g. `"25000"`.
    Text(String),
    /// Exact decimal value.
    Decimal(Decimal),
}

impl NumericInput {
    /// Coerce to a decimal.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::InvalidRequest`] if the text is not a number or
    /// the float is not finite.
    pub fn to_decimal(&self) -> Result<Decimal, GatewayError> {
        match self {
            Self::Number(value) => Decimal::try_from(*value)
                .map_err(|_| GatewayError::InvalidRequest(format!("not a finite number: {value}"))),
            Self::Text(text) => {
                let trimmed = text.trim();
                Decimal::from_str(trimmed)
                    .or_else(|_| Decimal::from_scientific(trimmed))
                    .map_err(|_| GatewayError::InvalidRequest(format!("not a number: {text:?}")))
            }
            Self::Decimal(value) => Ok(*value),
        }
    }

    /// Coerce and render in canonical form (no trailing zeros).
    ///
    /// # Errors
    ///
    /// See [`NumericInput::to_decimal`].
    pub fn to_canonical_string(&self) -> Result<String, GatewayError> {
        Ok(self.to_decimal()?.normalize().to_string())
    }
}

impl fmt::Display for NumericInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(value) => write!(f, "{value}"),
            Self::Text(text) => f.write_str(text),
            Self::Decimal(value) => write!(f, "{value}"),
        }
    }
}

impl From<f64> for NumericInput {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<i64> for NumericInput {
    fn from(value: i64) -> Self {
        Self::Decimal(Decimal::from(value))
    }
}

impl From<Decimal> for NumericInput {
    fn from(value: Decimal) -> Self {
        Self::Decimal(value)
    }
}

impl From<&str> for NumericInput {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for NumericInput {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn dec(value: &str) -> Decimal {
        Decimal::from_str(value).unwrap()
    }

    #[test]
    fn unset_fields_are_omitted() {
        let order = SsiOrder {
            account: Some("0001".to_string()),
            ..SsiOrder::default()
        };
        let json = serde_json::to_value(&order).unwrap();
        assert_eq!(json, serde_json::json!({ "account": "0001" }));
    }

    #[test]
    fn order_uses_venue_field_names() {
        let mut order = SsiOrder::limit("0001", "SSI", Side::Buy, Market::Stock, dec("25000"), 100);
        order.request_id = Some("42".to_string());
        order.channel_id = Some("IW".to_string());
        order.stop_type = Some(StopType::TrailingDown);

        let json = serde_json::to_value(&order).unwrap();
        assert_eq!(json["instrumentID"], "SSI");
        assert_eq!(json["requestID"], "42");
        assert_eq!(json["channelID"], "IW");
        assert_eq!(json["buySell"], "B");
        assert_eq!(json["market"], "VN");
        assert_eq!(json["orderType"], "LO");
        assert_eq!(json["stopType"], "E");
        assert_eq!(json["price"], 25000.0);
        assert_eq!(json["quantity"], 100);
    }

    #[test]
    fn derivative_market_serializes_as_vnfe() {
        let json = serde_json::to_value(Market::Derivative).unwrap();
        assert_eq!(json, "VNFE");
    }

    #[test]
    fn request_ids_are_unique_and_increasing() {
        let generator = RequestIdGenerator::starting_at(1_000);
        assert_eq!(generator.next_id(), "1000");
        assert_eq!(generator.next_id(), "1001");
    }

    #[test]
    fn request_ids_unique_across_threads() {
        let generator = std::sync::Arc::new(RequestIdGenerator::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let generator = std::sync::Arc::clone(&generator);
                std::thread::spawn(move || {
                    (0..250).map(|_| generator.next_id()).collect::<Vec<_>>()
                })
            })
            .collect();

        let mut all: Vec<String> = handles.into_iter().flat_map(|h| h.join().unwrap()).collect();
        let total = all.len();
        all.sort();
        all.dedup();
        assert_eq!(all.len(), total);
    }

    #[test_case(NumericInput::Number(25000.0), "25000" ; "float")]
    #[test_case(NumericInput::Text("25000".into()), "25000" ; "integer text")]
    #[test_case(NumericInput::Text(" 25000.50 ".into()), "25000.5" ; "padded decimal text")]
    #[test_case(NumericInput::Text("2.5e4".into()), "25000" ; "scientific text")]
    #[test_case(NumericInput::from(25_000_i64), "25000" ; "integer")]
    fn numeric_input_coerces(input: NumericInput, expected: &str) {
        assert_eq!(input.to_canonical_string().unwrap(), expected);
    }

    #[test_case(NumericInput::Text("abc".into()) ; "letters")]
    #[test_case(NumericInput::Text(String::new()) ; "empty")]
    #[test_case(NumericInput::Number(f64::NAN) ; "nan")]
    fn numeric_input_rejects(input: NumericInput) {
        assert!(matches!(input.to_decimal(), Err(GatewayError::InvalidRequest(_))));
    }
}
