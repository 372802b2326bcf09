//! Domain Layer - Session, order and stream types.
//!
//! This layer holds the venue-independent value types the gateway passes
//! between its components. Nothing here performs I/O.

/// Order payloads and request identifiers.
pub mod order;

/// Authenticated session state.
pub mod session;

/// Stream lifecycle states and delivered events.
pub mod stream;
