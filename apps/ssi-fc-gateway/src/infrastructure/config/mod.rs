//! Configuration Module
//!
//! Session credentials and gateway settings loaded from the environment.

mod session;
mod settings;

pub use session::{
    DEFAULT_DATA_STREAM_URL, DEFAULT_DATA_URL, DEFAULT_TRADING_STREAM_URL, DEFAULT_TRADING_URL,
    SessionConfig,
};
pub use settings::{ConfigError, GatewaySettings, ServerSettings, StreamSettings};
