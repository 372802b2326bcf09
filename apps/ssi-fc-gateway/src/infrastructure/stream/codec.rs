//! Stream Codec Module
//!
//! Encodes subscription frames and decodes inbound hub frames for the
//! venue's SignalR-style streaming endpoints.
//!
//! # Frames
//!
//! Outbound subscription:
//! ```json
//! {"H":"FcMarketDataV2Hub","M":"SwitchChannels","A":[["X:SSI","B:ALL"]],"I":0}
//! ```
//!
//! Inbound:
//! ```json
//! {}
//! {"C":"d-1,2","M":[{"H":"FcMarketDataV2Hub","M":"Broadcast","A":["{\"DataType\":\"X\",...}"]}]}
//! {"I":"0","E":"channel not allowed"}
//! ```
//!
//! Hub arguments arrive either as JSON objects or as strings holding JSON;
//! both are accepted.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::session::SessionKind;
use crate::domain::stream::{EventKind, StreamEvent};

/// Market-data hub name.
pub const DATA_HUB: &str = "FcMarketDataV2Hub";
/// Trading hub name.
pub const TRADING_HUB: &str = "BroadcastHubV2";
/// Path appended to the stream base URL.
pub const SIGNALR_PATH: &str = "v2.0/signalr";

/// Codec errors.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// JSON encoding/decoding failed.
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// Frame did not have the expected shape.
    #[error("invalid frame: {0}")]
    InvalidFormat(String),
}

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    /// Empty keep-alive or connection-init frame.
    KeepAlive,
    /// Hub invocations in venue send order.
    Events {
        /// Venue message cursor, when present.
        cursor: Option<String>,
        /// Decoded events.
        events: Vec<StreamEvent>,
        /// Invocations in this frame that could not be decoded.
        malformed: usize,
    },
    /// Reply to one of our invocations.
    InvocationResult {
        /// Invocation id.
        id: String,
        /// Error text, if the invocation failed.
        error: Option<String>,
    },
}

#[derive(Debug, Serialize)]
struct SubscribeFrame<'a> {
    #[serde(rename = "H")]
    hub: &'a str,
    #[serde(rename = "M")]
    method: &'a str,
    #[serde(rename = "A")]
    args: [&'a [String]; 1],
    #[serde(rename = "I")]
    id: u64,
}

#[derive(Debug, Deserialize)]
struct RawFrame {
    #[serde(rename = "C", default)]
    cursor: Option<String>,
    #[serde(rename = "M", default)]
    messages: Option<Vec<Value>>,
    #[serde(rename = "I", default)]
    id: Option<Value>,
    #[serde(rename = "E", default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawInvocation {
    #[serde(rename = "M")]
    method: String,
    #[serde(rename = "A", default)]
    args: Vec<Value>,
}

/// Codec for one hub.
#[derive(Debug, Clone, Copy)]
pub struct StreamCodec {
    session: SessionKind,
}

impl StreamCodec {
    /// Create a codec for the given session's hub.
    #[must_use]
    pub const fn new(session: SessionKind) -> Self {
        Self { session }
    }

    /// Get the hub name.
    #[must_use]
    pub const fn hub(&self) -> &'static str {
        match self.session {
            SessionKind::Data => DATA_HUB,
            SessionKind::Trading => TRADING_HUB,
        }
    }

    /// Encode a `SwitchChannels` subscription frame.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn encode_subscribe(&self, channels: &[String], id: u64) -> Result<String, CodecError> {
        let frame = SubscribeFrame {
            hub: self.hub(),
            method: "SwitchChannels",
            args: [channels],
            id,
        };
        Ok(serde_json::to_string(&frame)?)
    }

    /// Decode an inbound text frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame is not a JSON object. Individual
    /// invocations that cannot be decoded are counted in
    /// [`InboundFrame::Events::malformed`] instead.
    pub fn decode(&self, text: &str) -> Result<InboundFrame, CodecError> {
        let value: Value = serde_json::from_str(text.trim())?;
        let Value::Object(map) = &value else {
            return Err(CodecError::InvalidFormat(format!(
                "expected JSON object, got {}",
                type_name(&value)
            )));
        };
        if map.is_empty() {
            return Ok(InboundFrame::KeepAlive);
        }

        let raw: RawFrame = serde_json::from_value(value)?;

        if let Some(messages) = raw.messages {
            let mut events = Vec::with_capacity(messages.len());
            let mut malformed = 0;
            for message in messages {
                match self.decode_invocation(message) {
                    Ok(Some(event)) => events.push(event),
                    Ok(None) => {}
                    Err(e) => {
                        tracing::debug!(
                            session = %self.session,
                            error = %e,
                            "Dropping undecodable invocation"
                        );
                        malformed += 1;
                    }
                }
            }
            return Ok(InboundFrame::Events {
                cursor: raw.cursor,
                events,
                malformed,
            });
        }

        if let Some(id) = raw.id {
            let id = match id {
                Value::String(s) => s,
                other => other.to_string(),
            };
            return Ok(InboundFrame::InvocationResult { id, error: raw.error });
        }

        // Init ("S"), group token ("G") and cursor-only frames carry nothing for handlers.
        Ok(InboundFrame::KeepAlive)
    }

    fn decode_invocation(&self, message: Value) -> Result<Option<StreamEvent>, CodecError> {
        let invocation: RawInvocation = serde_json::from_value(message)?;
        let argument = invocation.args.into_iter().next();

        match invocation.method.as_str() {
            "Broadcast" => {
                let payload = unwrap_argument(argument)?;
                match self.session {
                    SessionKind::Data => {
                        let channel = payload
                            .get("DataType")
                            .and_then(Value::as_str)
                            .map(str::to_string);
                        Ok(Some(StreamEvent::new(EventKind::MarketData, channel, payload)))
                    }
                    SessionKind::Trading => {
                        let kind = payload
                            .get("type")
                            .and_then(Value::as_str)
                            .ok_or_else(|| {
                                CodecError::InvalidFormat("trading event without type".to_string())
                            })?;
                        match EventKind::from_trading_type(kind) {
                            Some(kind) => Ok(Some(StreamEvent::new(kind, None, payload))),
                            None => {
                                tracing::debug!(
                                    event_type = kind,
                                    "Ignoring unknown trading event type"
                                );
                                Ok(None)
                            }
                        }
                    }
                }
            }
            "Error" => {
                let payload = argument.map(parse_embedded).unwrap_or(Value::Null);
                Ok(Some(StreamEvent::new(EventKind::Error, None, payload)))
            }
            other => {
                tracing::debug!(method = other, "Ignoring unknown hub method");
                Ok(None)
            }
        }
    }
}

fn unwrap_argument(argument: Option<Value>) -> Result<Value, CodecError> {
    match argument {
        Some(Value::String(text)) => Ok(serde_json::from_str(&text)?),
        Some(value @ Value::Object(_)) => Ok(value),
        Some(other) => Err(CodecError::InvalidFormat(format!(
            "expected object argument, got {}",
            type_name(&other)
        ))),
        None => Err(CodecError::InvalidFormat("invocation without arguments".to_string())),
    }
}

fn parse_embedded(value: Value) -> Value {
    match value {
        Value::String(text) => serde_json::from_str(&text).unwrap_or(Value::String(text)),
        other => other,
    }
}

const fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn subscribe_frame_shape() {
        let codec = StreamCodec::new(SessionKind::Data);
        let frame = codec
            .encode_subscribe(&["X:SSI".to_string(), "B:ALL".to_string()], 3)
            .unwrap();
        let value: Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(
            value,
            json!({ "H": "FcMarketDataV2Hub", "M": "SwitchChannels", "A": [["X:SSI", "B:ALL"]], "I": 3 })
        );
    }

    #[test]
    fn empty_object_is_keep_alive() {
        let codec = StreamCodec::new(SessionKind::Data);
        assert_eq!(codec.decode("{}").unwrap(), InboundFrame::KeepAlive);
        assert_eq!(codec.decode(r#"{"S":1,"M":null}"#).unwrap(), InboundFrame::KeepAlive);
    }

    #[test]
    fn data_broadcast_with_string_argument() {
        let codec = StreamCodec::new(SessionKind::Data);
        let inner = json!({ "DataType": "X", "Content": "{\"Symbol\":\"SSI\"}" }).to_string();
        let frame = json!({
            "C": "d-1",
            "M": [{ "H": DATA_HUB, "M": "Broadcast", "A": [inner] }]
        })
        .to_string();

        let InboundFrame::Events { cursor, events, malformed } = codec.decode(&frame).unwrap() else {
            panic!("expected events");
        };
        assert_eq!(cursor.as_deref(), Some("d-1"));
        assert_eq!(malformed, 0);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::MarketData);
        assert_eq!(events[0].channel.as_deref(), Some("X"));
    }

    #[test]
    fn trading_broadcast_maps_type() {
        let codec = StreamCodec::new(SessionKind::Trading);
        let frame = json!({
            "M": [
                { "H": TRADING_HUB, "M": "Broadcast", "A": [{ "type": "orderMatchEvent", "data": {} }] },
                { "H": TRADING_HUB, "M": "Broadcast", "A": [{ "type": "clientPortfolioEvent", "data": {} }] },
                { "H": TRADING_HUB, "M": "Broadcast", "A": [{ "type": "somethingNew" }] }
            ]
        })
        .to_string();

        let InboundFrame::Events { events, malformed, .. } = codec.decode(&frame).unwrap() else {
            panic!("expected events");
        };
        let kinds: Vec<_> = events.iter().map(|e| e.kind).collect();
        assert_eq!(kinds, [EventKind::OrderMatch, EventKind::PortfolioUpdate]);
        assert_eq!(malformed, 0);
    }

    #[test]
    fn hub_error_becomes_error_event() {
        let codec = StreamCodec::new(SessionKind::Trading);
        let frame = json!({ "M": [{ "H": TRADING_HUB, "M": "Error", "A": ["token expired"] }] }).to_string();
        let InboundFrame::Events { events, .. } = codec.decode(&frame).unwrap() else {
            panic!("expected events");
        };
        assert_eq!(events[0].kind, EventKind::Error);
        assert_eq!(events[0].payload, json!("token expired"));
    }

    #[test]
    fn bad_invocation_is_counted_not_fatal() {
        let codec = StreamCodec::new(SessionKind::Data);
        let frame = json!({
            "M": [
                { "H": DATA_HUB, "M": "Broadcast", "A": ["{not json"] },
                { "H": DATA_HUB, "M": "Broadcast", "A": [{ "DataType": "B" }] }
            ]
        })
        .to_string();
        let InboundFrame::Events { events, malformed, .. } = codec.decode(&frame).unwrap() else {
            panic!("expected events");
        };
        assert_eq!(events.len(), 1);
        assert_eq!(malformed, 1);
    }

    #[test]
    fn invocation_result() {
        let codec = StreamCodec::new(SessionKind::Data);
        assert_eq!(
            codec.decode(r#"{"I":"4","E":"not allowed"}"#).unwrap(),
            InboundFrame::InvocationResult {
                id: "4".to_string(),
                error: Some("not allowed".to_string())
            }
        );
    }

    #[test]
    fn non_object_frames_are_rejected() {
        let codec = StreamCodec::new(SessionKind::Data);
        assert!(matches!(codec.decode("[1,2]"), Err(CodecError::InvalidFormat(_))));
        assert!(matches!(codec.decode("not json"), Err(CodecError::Json(_))));
    }
}
