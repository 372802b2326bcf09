//! Session Credentials
//!
//! Immutable identity material and endpoints for one venue session. Data
//! and trading sessions each own an independent [`SessionConfig`].

use std::fmt;
use std::time::Duration;

use crate::domain::session::SessionKind;
use crate::infrastructure::ssi::RequestSigner;

use super::settings::{ConfigError, StreamSettings};

/// Default market-data REST endpoint.
pub const DEFAULT_DATA_URL: &str = "https://fc-data.ssi.com.vn/";
/// Default market-data streaming endpoint.
pub const DEFAULT_DATA_STREAM_URL: &str = "wss://fc-data.ssi.com.vn/";
/// Default trading REST endpoint.
pub const DEFAULT_TRADING_URL: &str = "https://fc-tradeapi.ssi.com.vn/";
/// Default trading streaming endpoint.
pub const DEFAULT_TRADING_STREAM_URL: &str = "wss://fc-tradehub.ssi.com.vn/";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(8 * 60 * 60);

/// Credentials and endpoints for one venue session.
///
/// The `Debug` implementation redacts the secret, private key and PIN.
#[derive(Clone)]
pub struct SessionConfig {
    kind: SessionKind,
    consumer_id: String,
    consumer_secret: String,
    signer: Option<RequestSigner>,
    code: Option<String>,
    base_url: String,
    stream_url: String,
    timeout: Duration,
    token_ttl: Duration,
    device_id: Option<String>,
    user_agent: Option<String>,
    stream: StreamSettings,
}

impl SessionConfig {
    /// Create a market-data session config with default endpoints.
    ///
    /// # Errors
    ///
    /// Returns an error if the consumer id or secret is empty.
    pub fn data(
        consumer_id: impl Into<String>,
        consumer_secret: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        Self::new(
            SessionKind::Data,
            consumer_id.into(),
            consumer_secret.into(),
            DEFAULT_DATA_URL,
            DEFAULT_DATA_STREAM_URL,
        )
    }

    /// Create a trading session config with default endpoints.
    ///
    /// # Errors
    ///
    /// Returns an error if the consumer id or secret is empty.
    pub fn trading(
        consumer_id: impl Into<String>,
        consumer_secret: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        Self::new(
            SessionKind::Trading,
            consumer_id.into(),
            consumer_secret.into(),
            DEFAULT_TRADING_URL,
            DEFAULT_TRADING_STREAM_URL,
        )
    }

    fn new(
        kind: SessionKind,
        consumer_id: String,
        consumer_secret: String,
        base_url: &str,
        stream_url: &str,
    ) -> Result<Self, ConfigError> {
        if consumer_id.trim().is_empty() {
            return Err(ConfigError::EmptyValue("consumer_id".to_string()));
        }
        if consumer_secret.trim().is_empty() {
            return Err(ConfigError::EmptyValue("consumer_secret".to_string()));
        }

        Ok(Self {
            kind,
            consumer_id,
            consumer_secret,
            signer: None,
            code: None,
            base_url: base_url.to_string(),
            stream_url: stream_url.to_string(),
            timeout: DEFAULT_TIMEOUT,
            token_ttl: DEFAULT_TOKEN_TTL,
            device_id: None,
            user_agent: None,
            stream: StreamSettings::default(),
        })
    }

    /// Attach the private key used to sign order mutations.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidPrivateKey`] if the key cannot be parsed.
    pub fn with_private_key(mut self, key_material: &str) -> Result<Self, ConfigError> {
        let signer = RequestSigner::from_key_material(key_material)
            .map_err(|e| ConfigError::InvalidPrivateKey(e.to_string()))?;
        self.signer = Some(signer);
        Ok(self)
    }

    /// Attach an already-loaded signer.
    #[must_use]
    pub fn with_signer(mut self, signer: RequestSigner) -> Self {
        self.signer = Some(signer);
        self
    }

    /// Set the trading PIN sent with token exchange and orders.
    #[must_use]
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Override the REST endpoint.
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Override the streaming endpoint.
    #[must_use]
    pub fn with_stream_url(mut self, url: impl Into<String>) -> Self {
        self.stream_url = url.into();
        self
    }

    /// Set the per-request HTTP timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set how long an issued token is considered fresh.
    #[must_use]
    pub const fn with_token_ttl(mut self, ttl: Duration) -> Self {
        self.token_ttl = ttl;
        self
    }

    /// Set the device id attached to trading sessions.
    #[must_use]
    pub fn with_device_id(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = Some(device_id.into());
        self
    }

    /// Set the user agent attached to trading sessions.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// Set the streaming connection settings.
    #[must_use]
    pub fn with_stream_settings(mut self, stream: StreamSettings) -> Self {
        self.stream = stream;
        self
    }

    /// Get the session kind.
    #[must_use]
    pub const fn kind(&self) -> SessionKind {
        self.kind
    }

    /// Get the consumer id.
    #[must_use]
    pub fn consumer_id(&self) -> &str {
        &self.consumer_id
    }

    /// Get the consumer secret.
    #[must_use]
    pub fn consumer_secret(&self) -> &str {
        &self.consumer_secret
    }

    /// Get the request signer, if a private key is configured.
    #[must_use]
    pub const fn signer(&self) -> Option<&RequestSigner> {
        self.signer.as_ref()
    }

    /// Get the trading PIN.
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    /// Get the REST endpoint.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Get the streaming endpoint.
    #[must_use]
    pub fn stream_url(&self) -> &str {
        &self.stream_url
    }

    /// Get the HTTP timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Get the token TTL.
    #[must_use]
    pub const fn token_ttl(&self) -> Duration {
        self.token_ttl
    }

    /// Get the configured device id.
    #[must_use]
    pub fn device_id(&self) -> Option<&str> {
        self.device_id.as_deref()
    }

    /// Get the configured user agent.
    #[must_use]
    pub fn user_agent(&self) -> Option<&str> {
        self.user_agent.as_deref()
    }

    /// Get the streaming settings.
    #[must_use]
    pub const fn stream_settings(&self) -> &StreamSettings {
        &self.stream
    }
}

impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConfig")
            .field("kind", &self.kind)
            .field("consumer_id", &self.consumer_id)
            .field("consumer_secret", &"[REDACTED]")
            .field("private_key", &self.signer.as_ref().map(|_| "[REDACTED]"))
            .field("code", &self.code.as_ref().map(|_| "[REDACTED]"))
            .field("base_url", &self.base_url)
            .field("stream_url", &self.stream_url)
            .field("timeout", &self.timeout)
            .field("token_ttl", &self.token_ttl)
            .field("device_id", &self.device_id)
            .field("user_agent", &self.user_agent)
            .finish_non_exhaustive()
    }
}
