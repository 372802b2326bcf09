//! Gateway error taxonomy.
//!
//! Every fallible gateway operation returns [`GatewayError`]. Callers that
//! need to hand the failure to a client render it with
//! [`GatewayError::payload`], which keeps the error kind and, where the venue
//! supplied them, the original status and message.

use serde::Serialize;
use thiserror::Error;

/// Errors surfaced by the session, dispatch and streaming layers.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GatewayError {
    /// Token exchange was refused by the venue or could not be completed.
    #[error("authentication failed: {message}")]
    AuthenticationFailed {
        /// HTTP or envelope status reported by the venue, if any.
        status: Option<u16>,
        /// Upstream error payload or transport failure description.
        message: String,
    },

    /// No valid token is cached for the session.
    #[error("session is not authenticated")]
    Unauthenticated,

    /// A signed call was attempted but no private key is configured.
    #[error("signed request attempted without a configured private key")]
    SigningUnavailable,

    /// The private key could not produce a signature.
    #[error("request signing failed: {0}")]
    Signing(String),

    /// The venue answered with a non-success HTTP status.
    #[error("venue rejected request with status {status}: {body}")]
    VenueRejected {
        /// HTTP status code.
        status: u16,
        /// Raw response body.
        body: String,
    },

    /// Network failure, timeout or refused connection.
    #[error("venue unreachable: {0}")]
    VenueUnreachable(String),

    /// The streaming connection was lost and the reconnect budget is spent.
    #[error("stream terminated after {attempts} reconnect attempts")]
    StreamTerminated {
        /// Reconnect attempts made before giving up.
        attempts: u32,
    },

    /// Caller supplied a value that cannot be sent to the venue.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The venue answered 2xx with a body that is not JSON.
    #[error("failed to decode venue response: {0}")]
    Decode(String),
}

/// Discriminant of [`GatewayError`] as exposed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// See [`GatewayError::AuthenticationFailed`].
    AuthenticationFailed,
    /// See [`GatewayError::Unauthenticated`].
    Unauthenticated,
    /// See [`GatewayError::SigningUnavailable`] and [`GatewayError::Signing`].
    SigningUnavailable,
    /// See [`GatewayError::VenueRejected`].
    VenueRejected,
    /// See [`GatewayError::VenueUnreachable`] and [`GatewayError::Decode`].
    VenueUnreachable,
    /// See [`GatewayError::StreamTerminated`].
    StreamTerminated,
    /// See [`GatewayError::InvalidRequest`].
    InvalidRequest,
}

/// Structured error body handed back to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorPayload {
    /// Error kind.
    pub kind: ErrorKind,
    /// Venue status, when one was received.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    /// Human readable description or the venue's original message.
    pub message: String,
}

impl GatewayError {
    /// Get the caller-facing kind of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::AuthenticationFailed { .. } => ErrorKind::AuthenticationFailed,
            Self::Unauthenticated => ErrorKind::Unauthenticated,
            Self::SigningUnavailable | Self::Signing(_) => ErrorKind::SigningUnavailable,
            Self::VenueRejected { .. } => ErrorKind::VenueRejected,
            Self::VenueUnreachable(_) | Self::Decode(_) => ErrorKind::VenueUnreachable,
            Self::StreamTerminated { .. } => ErrorKind::StreamTerminated,
            Self::InvalidRequest(_) => ErrorKind::InvalidRequest,
        }
    }

    /// Get the venue status attached to this error, if any.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::AuthenticationFailed { status, .. } => *status,
            Self::VenueRejected { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Build the structured payload for this error.
    ///
    /// Venue errors carry the upstream message verbatim rather than the
    /// formatted `Display` text.
    #[must_use]
    pub fn payload(&self) -> ErrorPayload {
        let message = match self {
            Self::AuthenticationFailed { message, .. } => message.clone(),
            Self::VenueRejected { body, .. } => body.clone(),
            other => other.to_string(),
        };

        ErrorPayload {
            kind: self.kind(),
            status: self.status(),
            message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejected_payload_keeps_venue_body() {
        let err = GatewayError::VenueRejected {
            status: 400,
            body: r#"{"message":"Invalid price"}"#.to_string(),
        };
        let payload = err.payload();
        assert_eq!(payload.kind, ErrorKind::VenueRejected);
        assert_eq!(payload.status, Some(400));
        assert_eq!(payload.message, r#"{"message":"Invalid price"}"#);
    }

    #[test]
    fn payload_serializes_kind_in_screaming_case() {
        let json = serde_json::to_value(GatewayError::Unauthenticated.payload()).unwrap();
        assert_eq!(json["kind"], "UNAUTHENTICATED");
        assert!(json.get("status").is_none());
    }

    #[test]
    fn signing_errors_share_a_kind() {
        assert_eq!(
            GatewayError::Signing("bad key".to_string()).kind(),
            GatewayError::SigningUnavailable.kind()
        );
    }

    #[test]
    fn auth_failure_exposes_upstream_status() {
        let err = GatewayError::AuthenticationFailed {
            status: Some(401),
            message: "Consumer secret is invalid".to_string(),
        };
        assert_eq!(err.status(), Some(401));
        assert_eq!(err.payload().message, "Consumer secret is invalid");
    }
}
