//! Gateway Configuration Settings
//!
//! Configuration types for the gateway, loaded from environment variables.

use std::time::Duration;

use super::session::SessionConfig;

/// Streaming connection settings.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamSettings {
    /// Heartbeat ping interval.
    pub heartbeat_interval: Duration,
    /// Time without any inbound frame before the connection is considered dead.
    pub idle_timeout: Duration,
    /// Initial reconnection delay.
    pub reconnect_delay_initial: Duration,
    /// Maximum reconnection delay.
    pub reconnect_delay_max: Duration,
    /// Reconnection delay multiplier for exponential backoff.
    pub reconnect_delay_multiplier: f64,
    /// Maximum reconnection attempts before giving up (0 = unlimited).
    pub max_reconnect_attempts: u32,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(90),
            reconnect_delay_initial: Duration::from_millis(500),
            reconnect_delay_max: Duration::from_secs(30),
            reconnect_delay_multiplier: 2.0,
            max_reconnect_attempts: 10,
        }
    }
}

impl StreamSettings {
    /// Check that the liveness timers can run.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidSetting`] if the heartbeat or idle
    /// timeout is zero, or if the idle timeout does not exceed the heartbeat.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.heartbeat_interval.is_zero() {
            return Err(ConfigError::InvalidSetting(
                "heartbeat interval must be greater than zero".to_string(),
            ));
        }
        if self.idle_timeout <= self.heartbeat_interval {
            return Err(ConfigError::InvalidSetting(format!(
                "idle timeout ({:?}) must exceed heartbeat interval ({:?})",
                self.idle_timeout, self.heartbeat_interval
            )));
        }
        Ok(())
    }
}

/// Server port settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    /// Health check and metrics HTTP port.
    pub health_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { health_port: 8082 }
    }
}

/// Complete gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewaySettings {
    /// Market-data session.
    pub data: SessionConfig,
    /// Trading session.
    pub trading: SessionConfig,
    /// Server port settings.
    pub server: ServerSettings,
}

impl GatewaySettings {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required environment variables are missing or
    /// empty, or if the trading private key cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// See [`GatewaySettings::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = EnvReader { lookup };

        let timeout = env.duration_secs("GATEWAY_HTTP_TIMEOUT_SECS", Duration::from_secs(10))?;
        let token_ttl =
            env.duration_secs("GATEWAY_TOKEN_TTL_SECS", Duration::from_secs(8 * 60 * 60))?;
        let user_agent = env
            .optional("GATEWAY_USER_AGENT")
            .unwrap_or_else(|| format!("ssi-fc-gateway/{}", env!("CARGO_PKG_VERSION")));

        let defaults = StreamSettings::default();
        let stream = StreamSettings {
            heartbeat_interval: env
                .duration_secs("GATEWAY_HEARTBEAT_INTERVAL_SECS", defaults.heartbeat_interval)?,
            idle_timeout: env.duration_secs("GATEWAY_IDLE_TIMEOUT_SECS", defaults.idle_timeout)?,
            reconnect_delay_initial: env.duration_millis(
                "GATEWAY_RECONNECT_DELAY_INITIAL_MS",
                defaults.reconnect_delay_initial,
            )?,
            reconnect_delay_max: env
                .duration_secs("GATEWAY_RECONNECT_DELAY_MAX_SECS", defaults.reconnect_delay_max)?,
            reconnect_delay_multiplier: env.parse(
                "GATEWAY_RECONNECT_DELAY_MULTIPLIER",
                defaults.reconnect_delay_multiplier,
            )?,
            max_reconnect_attempts: env
                .parse("GATEWAY_MAX_RECONNECT_ATTEMPTS", defaults.max_reconnect_attempts)?,
        };
        stream.validate()?;

        let mut data = SessionConfig::data(
            env.required("DATA_CONSUMER_ID")?,
            env.required("DATA_CONSUMER_SECRET")?,
        )?
        .with_timeout(timeout)
        .with_token_ttl(token_ttl)
        .with_stream_settings(stream.clone());
        if let Some(url) = env.optional("DATA_URL") {
            data = data.with_base_url(url);
        }
        if let Some(url) = env.optional("DATA_STREAM_URL") {
            data = data.with_stream_url(url);
        }

        let mut trading = SessionConfig::trading(
            env.required("TRADING_CONSUMER_ID")?,
            env.required("TRADING_CONSUMER_SECRET")?,
        )?
        .with_timeout(timeout)
        .with_token_ttl(token_ttl)
        .with_user_agent(user_agent)
        .with_stream_settings(stream);
        if let Some(key) = env.optional("TRADING_PRIVATE_KEY") {
            trading = trading.with_private_key(&key)?;
        }
        if let Some(code) = env.optional("TRADING_PIN_CODE") {
            trading = trading.with_code(code);
        }
        if let Some(url) = env.optional("TRADING_URL") {
            trading = trading.with_base_url(url);
        }
        if let Some(url) = env.optional("TRADING_STREAM_URL") {
            trading = trading.with_stream_url(url);
        }
        if let Some(device_id) = env.optional("TRADING_DEVICE_ID") {
            trading = trading.with_device_id(device_id);
        }

        let server = ServerSettings {
            health_port: env.parse("GATEWAY_HEALTH_PORT", ServerSettings::default().health_port)?,
        };

        Ok(Self {
            data,
            trading,
            server,
        })
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// Private key could not be loaded.
    #[error("invalid private key: {0}")]
    InvalidPrivateKey(String),
    /// Environment variable could not be parsed.
    #[error("invalid value {value:?} for environment variable {key}")]
    Invalid {
        /// Variable name.
        key: String,
        /// Raw value.
        value: String,
    },
    /// Settings are individually valid but unusable together.
    #[error("invalid settings: {0}")]
    InvalidSetting(String),
}

struct EnvReader<F> {
    lookup: F,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn required(&self, key: &str) -> Result<String, ConfigError> {
        let value = (self.lookup)(key).ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))?;
        if value.trim().is_empty() {
            return Err(ConfigError::EmptyValue(key.to_string()));
        }
        Ok(value)
    }

    fn optional(&self, key: &str) -> Option<String> {
        (self.lookup)(key).filter(|v| !v.trim().is_empty())
    }

    fn parse<T: std::str::FromStr>(&self, key: &str, default: T) -> Result<T, ConfigError> {
        match self.optional(key) {
            Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid {
                key: key.to_string(),
                value: raw,
            }),
            None => Ok(default),
        }
    }

    fn duration_secs(&self, key: &str, default: Duration) -> Result<Duration, ConfigError> {
        self.parse(key, default.as_secs()).map(Duration::from_secs)
    }

    fn duration_millis(&self, key: &str, default: Duration) -> Result<Duration, ConfigError> {
        let default = u64::try_from(default.as_millis()).unwrap_or(u64::MAX);
        self.parse(key, default).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const REQUIRED: &[(&str, &str)] = &[
        ("DATA_CONSUMER_ID", "data-id"),
        ("DATA_CONSUMER_SECRET", "data-secret"),
        ("TRADING_CONSUMER_ID", "trade-id"),
        ("TRADING_CONSUMER_SECRET", "trade-secret"),
    ];

    #[test]
    fn test_stream_settings_default() {
        let settings = StreamSettings::default();
        assert_eq!(settings.heartbeat_interval, Duration::from_secs(30));
        assert_eq!(settings.reconnect_delay_initial, Duration::from_millis(500));
        assert_eq!(settings.max_reconnect_attempts, 10);
    }

    #[test]
    fn test_required_variables() {
        let err = GatewaySettings::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(key) if key == "DATA_CONSUMER_ID"));

        let mut vars = REQUIRED.to_vec();
        vars[3] = ("TRADING_CONSUMER_SECRET", "");
        let err = GatewaySettings::from_lookup(lookup(&vars)).unwrap_err();
        assert!(matches!(err, ConfigError::EmptyValue(key) if key == "TRADING_CONSUMER_SECRET"));
    }

    #[test]
    fn test_defaults_applied() {
        let settings = GatewaySettings::from_lookup(lookup(REQUIRED)).unwrap();
        assert_eq!(settings.server.health_port, 8082);
        assert_eq!(settings.data.consumer_id(), "data-id");
        assert_eq!(settings.trading.timeout(), Duration::from_secs(10));
        assert!(settings.trading.user_agent().unwrap().starts_with("ssi-fc-gateway/"));
        assert!(settings.data.user_agent().is_none());
    }

    #[test]
    fn test_overrides_applied() {
        let mut vars = REQUIRED.to_vec();
        vars.extend([
            ("TRADING_URL", "http://localhost:9000/"),
            ("TRADING_PIN_CODE", "123456"),
            ("TRADING_DEVICE_ID", "device-1"),
            ("GATEWAY_MAX_RECONNECT_ATTEMPTS", "3"),
            ("GATEWAY_RECONNECT_DELAY_INITIAL_MS", "50"),
            ("GATEWAY_HEALTH_PORT", "9100"),
        ]);

        let settings = GatewaySettings::from_lookup(lookup(&vars)).unwrap();
        assert_eq!(settings.trading.base_url(), "http://localhost:9000/");
        assert_eq!(settings.trading.code(), Some("123456"));
        assert_eq!(settings.trading.device_id(), Some("device-1"));
        assert_eq!(settings.trading.stream_settings().max_reconnect_attempts, 3);
        assert_eq!(
            settings.data.stream_settings().reconnect_delay_initial,
            Duration::from_millis(50)
        );
        assert_eq!(settings.server.health_port, 9100);
    }

    #[test]
    fn test_unparsable_value_names_the_key() {
        for (key, value) in [
            ("GATEWAY_HTTP_TIMEOUT_SECS", "abc"),
            ("GATEWAY_HEALTH_PORT", "not-a-port"),
            ("GATEWAY_RECONNECT_DELAY_MULTIPLIER", "fast"),
        ] {
            let mut vars = REQUIRED.to_vec();
            vars.push((key, value));
            let err = GatewaySettings::from_lookup(lookup(&vars)).unwrap_err();
            assert!(
                matches!(&err, ConfigError::Invalid { key: k, value: v } if k == key && v == value),
                "unexpected error for {key}: {err:?}"
            );
        }
    }

    #[test]
    fn test_zero_heartbeat_rejected() {
        let mut vars = REQUIRED.to_vec();
        vars.push(("GATEWAY_HEARTBEAT_INTERVAL_SECS", "0"));
        let err = GatewaySettings::from_lookup(lookup(&vars)).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidSetting(_)));
    }

    #[test]
    fn test_idle_timeout_must_exceed_heartbeat() {
        for idle in ["0", "30"] {
            let mut vars = REQUIRED.to_vec();
            vars.extend([
                ("GATEWAY_HEARTBEAT_INTERVAL_SECS", "30"),
                ("GATEWAY_IDLE_TIMEOUT_SECS", idle),
            ]);
            let err = GatewaySettings::from_lookup(lookup(&vars)).unwrap_err();
            assert!(matches!(err, ConfigError::InvalidSetting(_)), "idle={idle}");
        }
    }

    #[test]
    fn test_invalid_private_key() {
        let mut vars = REQUIRED.to_vec();
        vars.push(("TRADING_PRIVATE_KEY", "garbage!"));
        let err = GatewaySettings::from_lookup(lookup(&vars)).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPrivateKey(_)));
    }
}
