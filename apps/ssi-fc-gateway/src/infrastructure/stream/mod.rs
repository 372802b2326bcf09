//! Venue streaming: hub codec, handler registry, reconnect policy and the
//! supervisor that ties them to one long-lived connection.

pub mod codec;
pub mod reconnect;
pub mod registry;
pub mod supervisor;

pub use codec::{CodecError, DATA_HUB, InboundFrame, StreamCodec, TRADING_HUB};
pub use reconnect::{ReconnectConfig, ReconnectPolicy};
pub use registry::{EventHandler, HandlerRegistry};
pub use supervisor::StreamSupervisor;
