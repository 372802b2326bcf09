//! Session Types
//!
//! A [`Session`] is the result of a successful token exchange with the venue.
//! It is either fully populated or absent: there is no way to construct one
//! with an empty bearer token.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};

// =============================================================================
// Session Kind
// =============================================================================

/// Which venue channel a session belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionKind {
    /// Market-data session (`fc-data`).
    Data,
    /// Order-management session (`fc-tradeapi`).
    Trading,
}

impl SessionKind {
    /// Get the session kind name used in logs and metrics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Data => "data",
            Self::Trading => "trading",
        }
    }
}

impl fmt::Display for SessionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Bearer Token
// =============================================================================

/// Non-empty bearer token issued by the venue.
///
/// The `Debug` implementation redacts the token for safe logging.
#[derive(Clone, PartialEq, Eq)]
pub struct BearerToken(String);

impl BearerToken {
    /// Wrap a token, rejecting empty or whitespace-only values.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Option<Self> {
        let token = token.into();
        if token.trim().is_empty() {
            None
        } else {
            Some(Self(token))
        }
    }

    /// Get the raw token.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Get the `Authorization` header value (`Bearer <token>`).
    #[must_use]
    pub fn header_value(&self) -> String {
        format!("Bearer {}", self.0)
    }
}

impl fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BearerToken([REDACTED])")
    }
}

// =============================================================================
// Session
// =============================================================================

/// An authenticated venue session.
#[derive(Debug, Clone)]
pub struct Session {
    token: BearerToken,
    device_id: Option<String>,
    user_agent: Option<String>,
    issued_at: DateTime<Utc>,
}

impl Session {
    /// Create a session from a freshly issued token.
    #[must_use]
    pub const fn new(token: BearerToken, issued_at: DateTime<Utc>) -> Self {
        Self {
            token,
            device_id: None,
            user_agent: None,
            issued_at,
        }
    }

    /// Attach the device identity sent along with order mutations.
    #[must_use]
    pub fn with_device(
        mut self,
        device_id: impl Into<String>,
        user_agent: impl Into<String>,
    ) -> Self {
        self.device_id = Some(device_id.into());
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Get the bearer token.
    #[must_use]
    pub const fn token(&self) -> &BearerToken {
        &self.token
    }

    /// Get the device id bound to this session.
    #[must_use]
    pub fn device_id(&self) -> Option<&str> {
        self.device_id.as_deref()
    }

    /// Get the user agent bound to this session.
    #[must_use]
    pub fn user_agent(&self) -> Option<&str> {
        self.user_agent.as_deref()
    }

    /// Get the time the token was issued.
    #[must_use]
    pub const fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    /// Check whether the token is older than `ttl` at `now`.
    #[must_use]
    pub fn is_expired(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        let Ok(ttl) = chrono::Duration::from_std(ttl) else {
            return false;
        };
        now.signed_duration_since(self.issued_at) >= ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_token_is_rejected() {
        assert!(BearerToken::new("").is_none());
        assert!(BearerToken::new("   ").is_none());
        assert!(BearerToken::new("abc").is_some());
    }

    #[test]
    fn token_debug_is_redacted() {
        let token = BearerToken::new("secret-token").unwrap();
        let debug = format!("{token:?}");
        assert!(!debug.contains("secret-token"));
    }

    #[test]
    fn header_value_uses_bearer_scheme() {
        let token = BearerToken::new("abc").unwrap();
        assert_eq!(token.header_value(), "Bearer abc");
    }

    #[test]
    fn session_expiry() {
        let issued = Utc::now();
        let session = Session::new(BearerToken::new("t").unwrap(), issued);
        let ttl = Duration::from_secs(60);

        assert!(!session.is_expired(ttl, issued + chrono::Duration::seconds(59)));
        assert!(session.is_expired(ttl, issued + chrono::Duration::seconds(60)));
    }

    #[test]
    fn device_identity_is_optional() {
        let session = Session::new(BearerToken::new("t").unwrap(), Utc::now());
        assert!(session.device_id().is_none());

        let session = session.with_device("dev-1", "agent/1.0");
        assert_eq!(session.device_id(), Some("dev-1"));
        assert_eq!(session.user_agent(), Some("agent/1.0"));
    }
}
