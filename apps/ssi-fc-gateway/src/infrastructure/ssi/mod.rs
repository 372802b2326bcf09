//! SSI FastConnect REST Adapters
//!
//! - **auth**: Token exchange and session ownership ([`SessionManager`])
//! - **signer**: RSA request signatures ([`RequestSigner`])
//! - **http_client**: Authenticated request dispatch ([`Dispatcher`])
//! - **query**: Structured query parameters ([`QueryParams`])
//! - **api_types**: Endpoint paths and token exchange bodies

pub mod api_types;
pub mod auth;
pub mod http_client;
pub mod query;
pub mod signer;

pub use auth::SessionManager;
pub use http_client::{Dispatcher, SIGNATURE_HEADER, SignedEnvelope, build_http_client};
pub use query::QueryParams;
pub use signer::{KeyError, RequestSigner};
