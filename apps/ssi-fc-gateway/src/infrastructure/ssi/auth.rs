//! Session Manager
//!
//! Owns the bearer token for one venue session and performs the token
//! exchange against `AccessToken`.
//!
//! # Single Flight
//!
//! Exchanges are serialised by an async mutex guarding an
//! [`ExchangeLedger`]. A caller records the ledger generation before
//! queueing; if the generation moved by the time it holds the lock, an
//! exchange finished while it waited and it returns that outcome instead of
//! starting another. N concurrent `authenticate()` calls therefore produce
//! one network exchange.
//!
//! # Session Writes
//!
//! The session is held as `RwLock<Option<Arc<Session>>>` and only ever
//! replaced wholesale after an exchange completes. A caller cancelled
//! mid-exchange leaves the previous session in place.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use reqwest::Client;
use tokio::sync::Mutex;

use super::api_types::{
    AccessTokenData, AccessTokenRequest, VenueEnvelope, data_paths, join_url, trading_paths,
};
use crate::application::ports::TokenProvider;
use crate::domain::session::{BearerToken, Session, SessionKind};
use crate::error::GatewayError;
use crate::infrastructure::config::SessionConfig;
use crate::infrastructure::metrics;

/// Result of the most recent exchange, shared with queued callers.
#[derive(Debug, Default)]
struct ExchangeLedger {
    completed: u64,
    last_failure: Option<GatewayError>,
}

/// Holds and refreshes the session for one venue channel.
#[derive(Debug)]
pub struct SessionManager {
    config: Arc<SessionConfig>,
    client: Client,
    session: RwLock<Option<Arc<Session>>>,
    ledger: Mutex<ExchangeLedger>,
    completed: AtomicU64,
    device_id: String,
    user_agent: String,
}

impl SessionManager {
    /// Create a manager with no session.
    #[must_use]
    pub fn new(config: Arc<SessionConfig>, client: Client) -> Self {
        let device_id = config
            .device_id()
            .map_or_else(|| uuid::Uuid::new_v4().to_string(), str::to_string);
        let user_agent = config.user_agent().map_or_else(
            || format!("ssi-fc-gateway/{}", env!("CARGO_PKG_VERSION")),
            str::to_string,
        );

        Self {
            config,
            client,
            session: RwLock::new(None),
            ledger: Mutex::new(ExchangeLedger::default()),
            completed: AtomicU64::new(0),
            device_id,
            user_agent,
        }
    }

    /// Get the session config.
    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Exchange credentials for a bearer token.
    ///
    /// Callers that queued behind an in-flight exchange receive its outcome.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::AuthenticationFailed`] if the venue refuses
    /// the credentials or cannot be reached. The previous session, if any,
    /// is kept.
    pub async fn authenticate(&self) -> Result<Arc<Session>, GatewayError> {
        let observed = self.completed.load(Ordering::Acquire);
        let mut ledger = self.ledger.lock().await;

        if ledger.completed != observed {
            if let Some(err) = &ledger.last_failure {
                return Err(err.clone());
            }
            if let Ok(session) = self.current_session() {
                return Ok(session);
            }
        }

        self.exchange_locked(&mut ledger).await
    }

    /// Check whether a session is held.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.session.read().is_some()
    }

    async fn exchange_locked(
        &self,
        ledger: &mut ExchangeLedger,
    ) -> Result<Arc<Session>, GatewayError> {
        let result = self.exchange().await;

        ledger.completed += 1;
        self.completed.store(ledger.completed, Ordering::Release);
        metrics::record_auth_exchange(self.kind(), result.is_ok());

        match result {
            Ok(session) => {
                let session = Arc::new(session);
                *self.session.write() = Some(Arc::clone(&session));
                ledger.last_failure = None;
                tracing::info!(session = %self.kind(), "Authenticated");
                Ok(session)
            }
            Err(err) => {
                tracing::warn!(session = %self.kind(), error = %err, "Authentication failed");
                ledger.last_failure = Some(err.clone());
                Err(err)
            }
        }
    }

    async fn exchange(&self) -> Result<Session, GatewayError> {
        let kind = self.config.kind();
        let (path, body) = match kind {
            SessionKind::Data => (
                data_paths::ACCESS_TOKEN,
                AccessTokenRequest::data(self.config.consumer_id(), self.config.consumer_secret()),
            ),
            SessionKind::Trading => (
                trading_paths::ACCESS_TOKEN,
                AccessTokenRequest::trading(
                    self.config.consumer_id(),
                    self.config.consumer_secret(),
                    self.config.code(),
                ),
            ),
        };
        let url = join_url(self.config.base_url(), path);
        tracing::debug!(session = %kind, url = %url, "Requesting access token");

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| auth_failed(None, e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| auth_failed(Some(status.as_u16()), e.to_string()))?;

        if !status.is_success() {
            return Err(auth_failed(Some(status.as_u16()), text));
        }

        let envelope: VenueEnvelope<AccessTokenData> = serde_json::from_str(&text)
            .map_err(|e| {
                auth_failed(
                    Some(status.as_u16()),
                    format!("undecodable token response: {e}"),
                )
            })?;

        if envelope.status != 200 {
            return Err(auth_failed(
                Some(envelope.status),
                envelope.message.unwrap_or(text),
            ));
        }

        let token = envelope
            .data
            .and_then(|data| data.access_token)
            .and_then(BearerToken::new)
            .ok_or_else(|| {
                auth_failed(
                    Some(envelope.status),
                    "token response without accessToken".to_string(),
                )
            })?;

        let session = Session::new(token, Utc::now());
        Ok(match kind {
            SessionKind::Data => session,
            SessionKind::Trading => session.with_device(&self.device_id, &self.user_agent),
        })
    }
}

#[async_trait]
impl TokenProvider for SessionManager {
    fn kind(&self) -> SessionKind {
        self.config.kind()
    }

    fn current_session(&self) -> Result<Arc<Session>, GatewayError> {
        self.session.read().clone().ok_or(GatewayError::Unauthenticated)
    }

    async fn refresh_if_expired(&self) -> Result<Arc<Session>, GatewayError> {
        if let Ok(session) = self.current_session() {
            if !session.is_expired(self.config.token_ttl(), Utc::now()) {
                return Ok(session);
            }
            tracing::info!(session = %self.kind(), "Token expired, refreshing");
        }
        self.authenticate().await
    }

    async fn force_refresh(&self, stale: &BearerToken) -> Result<Arc<Session>, GatewayError> {
        let mut ledger = self.ledger.lock().await;

        if let Ok(session) = self.current_session() {
            if session.token() != stale {
                return Ok(session);
            }
        }

        tracing::info!(session = %self.kind(), "Token rejected, forcing refresh");
        self.exchange_locked(&mut ledger).await
    }
}

fn auth_failed(status: Option<u16>, message: String) -> GatewayError {
    GatewayError::AuthenticationFailed { status, message }
}
