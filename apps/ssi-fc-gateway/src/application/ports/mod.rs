//! Port Interfaces
//!
//! Defines the interfaces (ports) the application layer depends on. These
//! are the contracts that infrastructure adapters must implement.
//!
//! ## Driven Ports (Outbound)
//!
//! - [`TokenProvider`]: Access to the current venue session and its refresh
//!   operations. Implemented by the session manager; consumed by the
//!   dispatcher and the stream supervisor.

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::session::{BearerToken, Session, SessionKind};
use crate::error::GatewayError;

/// Source of bearer tokens for one venue session.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Which session this provider manages.
    fn kind(&self) -> SessionKind;

    /// Get the current session.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Unauthenticated`] if no session is held.
    fn current_session(&self) -> Result<Arc<Session>, GatewayError>;

    /// Get the current bearer token.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Unauthenticated`] if no session is held.
    fn current_token(&self) -> Result<BearerToken, GatewayError> {
        self.current_session().map(|session| session.token().clone())
    }

    /// Re-authenticate if the session is missing or older than its TTL.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::AuthenticationFailed`] if a required exchange
    /// fails.
    async fn refresh_if_expired(&self) -> Result<Arc<Session>, GatewayError>;

    /// Re-authenticate because `stale` was rejected, unless another caller
    /// already replaced it.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::AuthenticationFailed`] if the exchange fails.
    async fn force_refresh(&self, stale: &BearerToken) -> Result<Arc<Session>, GatewayError>;
}
