//! Application Layer - Use cases and port definitions.
//!
//! Gateway facades that forward caller requests to the venue, and the port
//! interfaces they are built against.

/// Port interfaces implemented by infrastructure adapters.
pub mod ports;

/// Data, trading and combined gateway facades.
pub mod services;
