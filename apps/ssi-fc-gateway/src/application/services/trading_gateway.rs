//! Trading facade.
//!
//! Order mutations are signed POSTs. Before signing, each order is stamped
//! with a fresh request id, the session's device identity and the configured
//! trading PIN, so the signature always covers the final body. Account
//! queries are bearer-authenticated GETs.

use std::sync::Arc;

use serde_json::Value;

use super::channel::SessionChannel;
use crate::domain::order::{NumericInput, RequestIdGenerator, SsiOrder};
use crate::domain::session::{Session, SessionKind};
use crate::domain::stream::{EventKind, StreamEvent, StreamState};
use crate::error::GatewayError;
use crate::infrastructure::config::SessionConfig;
use crate::infrastructure::ssi::QueryParams;
use crate::infrastructure::ssi::api_types::trading_paths;
use crate::infrastructure::stream::StreamSupervisor;

/// Gateway to the trading session.
#[derive(Debug, Clone)]
pub struct TradingGateway {
    channel: SessionChannel,
    request_ids: Arc<RequestIdGenerator>,
}

impl TradingGateway {
    /// Build an unauthenticated gateway.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::InvalidRequest`] if `config` is not a trading
    /// session config, or [`GatewayError::VenueUnreachable`] if the HTTP
    /// client cannot be built.
    pub fn new(config: SessionConfig) -> Result<Self, GatewayError> {
        Ok(Self {
            channel: SessionChannel::open(config, SessionKind::Trading)?,
            request_ids: Arc::new(RequestIdGenerator::new()),
        })
    }

    /// Build a gateway and authenticate it.
    ///
    /// # Errors
    ///
    /// As [`TradingGateway::new`], plus [`GatewayError::AuthenticationFailed`].
    pub async fn connect(config: SessionConfig) -> Result<Self, GatewayError> {
        let gateway = Self::new(config)?;
        gateway.authenticate().await?;
        Ok(gateway)
    }

    /// Exchange credentials and PIN for a bearer token.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::AuthenticationFailed`] if the venue refuses.
    pub async fn authenticate(&self) -> Result<Arc<Session>, GatewayError> {
        self.channel.session.authenticate().await
    }

    /// Check whether a session is held.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.channel.session.is_authenticated()
    }

    // -------------------------------------------------------------------------
    // Order Mutations
    // -------------------------------------------------------------------------

    /// Place a stock order.
    ///
    /// # Errors
    ///
    /// - [`GatewayError::Unauthenticated`] if no session is held
    /// - [`GatewayError::SigningUnavailable`] if no private key is configured
    /// - the dispatcher's error for the call
    pub async fn new_order(&self, order: SsiOrder) -> Result<Value, GatewayError> {
        self.submit(trading_paths::NEW_ORDER, order).await
    }

    /// Modify a stock order.
    ///
    /// # Errors
    ///
    /// See [`TradingGateway::new_order`].
    pub async fn modify_order(&self, order: SsiOrder) -> Result<Value, GatewayError> {
        self.submit(trading_paths::MODIFY_ORDER, order).await
    }

    /// Cancel a stock order.
    ///
    /// # Errors
    ///
    /// See [`TradingGateway::new_order`].
    pub async fn cancel_order(&self, order: SsiOrder) -> Result<Value, GatewayError> {
        self.submit(trading_paths::CANCEL_ORDER, order).await
    }

    /// Place a derivative order.
    ///
    /// # Errors
    ///
    /// See [`TradingGateway::new_order`].
    pub async fn new_der_order(&self, order: SsiOrder) -> Result<Value, GatewayError> {
        self.submit(trading_paths::DER_NEW_ORDER, order).await
    }

    /// Modify a derivative order.
    ///
    /// # Errors
    ///
    /// See [`TradingGateway::new_order`].
    pub async fn modify_der_order(&self, order: SsiOrder) -> Result<Value, GatewayError> {
        self.submit(trading_paths::DER_MODIFY_ORDER, order).await
    }

    /// Cancel a derivative order.
    ///
    /// # Errors
    ///
    /// See [`TradingGateway::new_order`].
    pub async fn cancel_der_order(&self, order: SsiOrder) -> Result<Value, GatewayError> {
        self.submit(trading_paths::DER_CANCEL_ORDER, order).await
    }

    async fn submit(&self, path: &'static str, mut order: SsiOrder) -> Result<Value, GatewayError> {
        let session = self.channel.current_session()?;

        order.request_id = Some(self.request_ids.next_id());
        order.device_id = session.device_id().map(str::to_string);
        order.user_agent = session.user_agent().map(str::to_string);
        order.code = self.channel.session.config().code().map(str::to_string);

        tracing::info!(
            path,
            request_id = order.request_id.as_deref().unwrap_or_default(),
            account = order.account.as_deref().unwrap_or_default(),
            instrument = order.instrument_id.as_deref().unwrap_or_default(),
            "Submitting order"
        );

        self.channel.dispatcher.post(path, &order, true).await
    }

    // -------------------------------------------------------------------------
    // Queries
    // -------------------------------------------------------------------------

    /// Ask the venue to send a one-time password.
    ///
    /// # Errors
    ///
    /// Returns the dispatcher's error for the call.
    pub async fn get_otp(&self) -> Result<Value, GatewayError> {
        let config = self.channel.session.config();
        let query = QueryParams::new()
            .param("consumerID", config.consumer_id())
            .param("consumerSecret", config.consumer_secret());
        self.get(trading_paths::GET_OTP, &query).await
    }

    /// Order history between two `dd/mm/yyyy` dates.
    ///
    /// # Errors
    ///
    /// Returns the dispatcher's error for the call.
    pub async fn get_order_history(
        &self,
        account: &str,
        start_date: &str,
        end_date: &str,
    ) -> Result<Value, GatewayError> {
        let query = QueryParams::new()
            .param("account", account)
            .param("startDate", start_date)
            .param("endDate", end_date);
        self.get(trading_paths::ORDER_HISTORY, &query).await
    }

    /// Today's order book.
    ///
    /// # Errors
    ///
    /// Returns the dispatcher's error for the call.
    pub async fn get_order_book(&self, account: &str) -> Result<Value, GatewayError> {
        self.get_for_account(trading_paths::ORDER_BOOK, account).await
    }

    /// Today's order book including every modification.
    ///
    /// # Errors
    ///
    /// Returns the dispatcher's error for the call.
    pub async fn get_audit_order_book(&self, account: &str) -> Result<Value, GatewayError> {
        self.get_for_account(trading_paths::AUDIT_ORDER_BOOK, account).await
    }

    /// Stock positions.
    ///
    /// # Errors
    ///
    /// Returns the dispatcher's error for the call.
    pub async fn get_position(&self, account: &str) -> Result<Value, GatewayError> {
        self.get_for_account(trading_paths::STOCK_POSITION, account).await
    }

    /// Derivative positions, optionally summarised.
    ///
    /// # Errors
    ///
    /// Returns the dispatcher's error for the call.
    pub async fn get_der_position(
        &self,
        account: &str,
        query_summary: bool,
    ) -> Result<Value, GatewayError> {
        let query = QueryParams::new()
            .param("account", account)
            .param("querySummary", query_summary);
        self.get(trading_paths::DER_POSITION, &query).await
    }

    /// Maximum buyable quantity at a price.
    ///
    /// The price may be given as a number or as text; it is sent as a number.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::InvalidRequest`] without a network call if the
    /// price is not numeric, otherwise the dispatcher's error for the call.
    pub async fn get_max_buy_qty(
        &self,
        account: &str,
        instrument_id: &str,
        price: impl Into<NumericInput>,
    ) -> Result<Value, GatewayError> {
        let price = price.into().to_canonical_string()?;
        let query = QueryParams::new()
            .param("account", account)
            .param("instrumentID", instrument_id)
            .param("price", price);
        self.get(trading_paths::MAX_BUY_QTY, &query).await
    }

    /// Maximum sellable quantity.
    ///
    /// # Errors
    ///
    /// Returns the dispatcher's error for the call.
    pub async fn get_max_sell_qty(
        &self,
        account: &str,
        instrument_id: &str,
    ) -> Result<Value, GatewayError> {
        let query = QueryParams::new()
            .param("account", account)
            .param("instrumentID", instrument_id);
        self.get(trading_paths::MAX_SELL_QTY, &query).await
    }

    /// Cash account balance.
    ///
    /// # Errors
    ///
    /// Returns the dispatcher's error for the call.
    pub async fn get_account_balance(&self, account: &str) -> Result<Value, GatewayError> {
        self.get_for_account(trading_paths::ACCOUNT_BALANCE, account).await
    }

    /// Derivative account balance.
    ///
    /// # Errors
    ///
    /// Returns the dispatcher's error for the call.
    pub async fn get_der_account_balance(&self, account: &str) -> Result<Value, GatewayError> {
        self.get_for_account(trading_paths::DER_ACCOUNT_BALANCE, account).await
    }

    /// Purchasing power and margin ratio.
    ///
    /// # Errors
    ///
    /// Returns the dispatcher's error for the call.
    pub async fn get_ppmmr_account(&self, account: &str) -> Result<Value, GatewayError> {
        self.get_for_account(trading_paths::PPMMR_ACCOUNT, account).await
    }

    async fn get_for_account(&self, path: &str, account: &str) -> Result<Value, GatewayError> {
        let query = QueryParams::new().param("account", account);
        self.get(path, &query).await
    }

    async fn get(&self, path: &str, query: &QueryParams) -> Result<Value, GatewayError> {
        self.channel.dispatcher.get(path, query).await
    }

    // -------------------------------------------------------------------------
    // Streaming
    // -------------------------------------------------------------------------

    /// Prepare the order and portfolio stream.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Unauthenticated`] if no session is held.
    pub fn init_stream(&self) -> Result<(), GatewayError> {
        self.channel.stream.init_stream()
    }

    /// Start the order and portfolio stream.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Unauthenticated`] if no session is held.
    pub fn start_stream(&self) -> Result<(), GatewayError> {
        self.channel.stream.start()
    }

    /// Subscribe to a hub channel.
    ///
    /// Returns `false` if already subscribed.
    pub fn register_channel(&self, channel: impl Into<String>) -> bool {
        self.channel.register_channel(channel)
    }

    /// Register a handler for one event kind.
    pub fn register_handler<F>(&self, kind: EventKind, handler: F)
    where
        F: Fn(&StreamEvent) + Send + Sync + 'static,
    {
        self.channel.register_handler(kind, handler);
    }

    /// Get the stream's connection state.
    #[must_use]
    pub fn stream_state(&self) -> StreamState {
        self.channel.stream_state()
    }

    /// Get the stream supervisor.
    #[must_use]
    pub fn stream(&self) -> &StreamSupervisor {
        &self.channel.stream
    }

    /// Get the current session, if any.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Unauthenticated`] if no session is held.
    pub fn current_session(&self) -> Result<Arc<Session>, GatewayError> {
        self.channel.current_session()
    }
}
