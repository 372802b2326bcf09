//! Application Services
//!
//! Facades over the two venue sessions.
//!
//! - [`DataGateway`]: market-data queries and the market-data stream
//! - [`TradingGateway`]: signed order mutations, account queries and the
//!   order/portfolio stream
//! - [`Gateway`]: authenticates both and hands them out together

mod channel;
mod data_gateway;
mod gateway;
mod trading_gateway;

pub use data_gateway::DataGateway;
pub use gateway::Gateway;
pub use trading_gateway::TradingGateway;
