//! Composition root holding both venue sessions.

use super::data_gateway::DataGateway;
use super::trading_gateway::TradingGateway;
use crate::error::GatewayError;
use crate::infrastructure::config::SessionConfig;

/// Both gateways, authenticated.
///
/// Obtainable only through [`Gateway::connect`], so holding one means both
/// token exchanges succeeded.
#[derive(Debug, Clone)]
pub struct Gateway {
    data: DataGateway,
    trading: TradingGateway,
}

impl Gateway {
    /// Build both gateways and authenticate them concurrently.
    ///
    /// # Errors
    ///
    /// Returns the first failure; no handle is produced unless both sessions
    /// authenticated.
    pub async fn connect(
        data: SessionConfig,
        trading: SessionConfig,
    ) -> Result<Self, GatewayError> {
        let data = DataGateway::new(data)?;
        let trading = TradingGateway::new(trading)?;

        tokio::try_join!(data.authenticate(), trading.authenticate())?;
        tracing::info!("Data and trading sessions authenticated");

        Ok(Self { data, trading })
    }

    /// Get the market-data gateway.
    #[must_use]
    pub const fn data(&self) -> &DataGateway {
        &self.data
    }

    /// Get the trading gateway.
    #[must_use]
    pub const fn trading(&self) -> &TradingGateway {
        &self.trading
    }

    /// Close both streams.
    pub fn close(&self) {
        self.data.stream().close();
        self.trading.stream().close();
    }
}
