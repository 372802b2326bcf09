//! Market-data facade.
//!
//! Every query is a bearer-authenticated GET under `api/v2/Market/` with its
//! parameters prefixed `lookupRequest.`. Responses are returned as the venue
//! sent them.

use std::sync::Arc;

use serde_json::Value;

use super::channel::SessionChannel;
use crate::domain::session::{Session, SessionKind};
use crate::domain::stream::{EventKind, StreamEvent, StreamState};
use crate::error::GatewayError;
use crate::infrastructure::config::SessionConfig;
use crate::infrastructure::ssi::QueryParams;
use crate::infrastructure::ssi::api_types::data_paths;
use crate::infrastructure::stream::StreamSupervisor;

const LOOKUP_PREFIX: &str = "lookupRequest.";

/// Gateway to the market-data session.
#[derive(Debug, Clone)]
pub struct DataGateway {
    channel: SessionChannel,
}

impl DataGateway {
    /// Build an unauthenticated gateway.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::InvalidRequest`] if `config` is not a data
    /// session config, or [`GatewayError::VenueUnreachable`] if the HTTP
    /// client cannot be built.
    pub fn new(config: SessionConfig) -> Result<Self, GatewayError> {
        Ok(Self {
            channel: SessionChannel::open(config, SessionKind::Data)?,
        })
    }

    /// Build a gateway and authenticate it.
    ///
    /// # Errors
    ///
    /// As [`DataGateway::new`], plus [`GatewayError::AuthenticationFailed`].
    pub async fn connect(config: SessionConfig) -> Result<Self, GatewayError> {
        let gateway = Self::new(config)?;
        gateway.authenticate().await?;
        Ok(gateway)
    }

    /// Exchange credentials for a bearer token.
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
    // Queries
    // -------------------------------------------------------------------------

    /// List securities on a market.
    ///
    /// # Errors
    ///
    /// Returns the dispatcher's error for the call.
    pub async fn get_securities(
        &self,
        market: &str,
        page_index: u32,
        page_size: u32,
    ) -> Result<Value, GatewayError> {
        let query = lookup()
            .param("market", market)
            .param("pageIndex", page_index)
            .param("pageSize", page_size);
        self.get(data_paths::SECURITIES, &query).await
    }

    /// Get details of one security.
    ///
    /// # Errors
    ///
    /// Returns the dispatcher's error for the call.
    pub async fn get_securities_details(
        &self,
        market: &str,
        symbol: &str,
        page_index: u32,
        page_size: u32,
    ) -> Result<Value, GatewayError> {
        let query = lookup()
            .param("market", market)
            .param("pageIndex", page_index)
            .param("pageSize", page_size)
            .param("symbol", symbol);
        self.get(data_paths::SECURITIES_DETAILS, &query).await
    }

    /// List constituents of an index.
    ///
    /// # Errors
    ///
    /// Returns the dispatcher's error for the call.
    pub async fn get_index_components(
        &self,
        index_code: &str,
        page_index: u32,
        page_size: u32,
    ) -> Result<Value, GatewayError> {
        let query = lookup()
            .param("indexCode", index_code)
            .param("pageIndex", page_index)
            .param("pageSize", page_size);
        self.get(data_paths::INDEX_COMPONENTS, &query).await
    }

    /// List indexes on an exchange.
    ///
    /// # Errors
    ///
    /// Returns the dispatcher's error for the call.
    pub async fn get_index_list(
        &self,
        exchange: &str,
        page_index: u32,
        page_size: u32,
    ) -> Result<Value, GatewayError> {
        let query = lookup()
            .param("exchange", exchange)
            .param("pageIndex", page_index)
            .param("pageSize", page_size);
        self.get(data_paths::INDEX_LIST, &query).await
    }

    /// Daily OHLC bars for a symbol. Dates are `dd/mm/yyyy`.
    ///
    /// # Errors
    ///
    /// Returns the dispatcher's error for the call.
    pub async fn get_daily_ohlc(
        &self,
        symbol: &str,
        from_date: &str,
        to_date: &str,
        page_index: u32,
        page_size: u32,
        ascending: bool,
    ) -> Result<Value, GatewayError> {
        let query = bars_query(
            "symbol", symbol, from_date, to_date, page_index, page_size, ascending,
        );
        self.get(data_paths::DAILY_OHLC, &query).await
    }

    /// Intraday OHLC bars for a symbol.
    ///
    /// # Errors
    ///
    /// Returns the dispatcher's error for the call.
    pub async fn get_intraday_ohlc(
        &self,
        symbol: &str,
        from_date: &str,
        to_date: &str,
        page_index: u32,
        page_size: u32,
        ascending: bool,
    ) -> Result<Value, GatewayError> {
        let query = bars_query(
            "symbol", symbol, from_date, to_date, page_index, page_size, ascending,
        );
        self.get(data_paths::INTRADAY_OHLC, &query).await
    }

    /// Daily values for an index.
    ///
    /// # Errors
    ///
    /// Returns the dispatcher's error for the call.
    pub async fn get_daily_index(
        &self,
        index_id: &str,
        from_date: &str,
        to_date: &str,
        page_index: u32,
        page_size: u32,
        ascending: bool,
    ) -> Result<Value, GatewayError> {
        let query = bars_query(
            "indexId", index_id, from_date, to_date, page_index, page_size, ascending,
        );
        self.get(data_paths::DAILY_INDEX, &query).await
    }

    /// Daily prices for a symbol on a market.
    ///
    /// # Errors
    ///
    /// Returns the dispatcher's error for the call.
    pub async fn get_daily_stock_price(
        &self,
        symbol: &str,
        market: &str,
        from_date: &str,
        to_date: &str,
        page_index: u32,
        page_size: u32,
    ) -> Result<Value, GatewayError> {
        let query = lookup()
            .param("symbol", symbol)
            .param("fromDate", from_date)
            .param("toDate", to_date)
            .param("pageIndex", page_index)
            .param("pageSize", page_size)
            .param("market", market);
        self.get(data_paths::DAILY_STOCK_PRICE, &query).await
    }

    async fn get(&self, path: &str, query: &QueryParams) -> Result<Value, GatewayError> {
        self.channel.dispatcher.get(path, query).await
    }

    // -------------------------------------------------------------------------
    // Streaming
    // -------------------------------------------------------------------------

    /// Prepare the market-data stream.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Unauthenticated`] if no session is held.
    pub fn init_stream(&self) -> Result<(), GatewayError> {
        self.channel.stream.init_stream()
    }

    /// Start the market-data stream.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Unauthenticated`] if no session is held.
    pub fn start_stream(&self) -> Result<(), GatewayError> {
        self.channel.stream.start()
    }

    /// Subscribe to a channel such as `X:SSI` or `B:ALL`.
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

fn lookup() -> QueryParams {
    QueryParams::with_prefix(LOOKUP_PREFIX)
}

fn bars_query(
    key: &str,
    value: &str,
    from_date: &str,
    to_date: &str,
    page_index: u32,
    page_size: u32,
    ascending: bool,
) -> QueryParams {
    lookup()
        .param(key, value)
        .param("fromDate", from_date)
        .param("toDate", to_date)
        .param("pageIndex", page_index)
        .param("pageSize", page_size)
        .param("ascending", ascending)
}
