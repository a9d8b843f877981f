//! Entry-point facade for a messaging namespace.
//!
//! # Purpose
//! Builds a [`Namespace`] from ordered options, dials secured AMQP connections
//! to its host, and authorizes entity paths on those connections through a
//! claims-based-security exchange before any message traffic flows.
//!
//! # How it fits
//! Senders and receivers sit above this crate: they ask the namespace for a
//! connection, negotiate a claim for their entity, and only then attach links.
//! Credential parsing and token signing live in `sable-auth`; dialing and the
//! CBS `put-token` exchange live in `sable-transport`.
//!
//! # Key invariants
//! - A namespace is logically frozen once [`Namespace::new`] returns.
//! - Every connection returned by [`Namespace::new_connection`] is owned by its
//!   caller; nothing here pools or retries.
//! - Claim negotiation keeps no state; it may be repeated per entity or to
//!   refresh an expiring claim.
//!
//! # Examples
//! ```rust
//! use sable_client::{Namespace, with_connection_string};
//!
//! let namespace = Namespace::new([with_connection_string(
//!     "Endpoint=sb://contoso.servicebus.windows.net/;SharedAccessKeyName=send;SharedAccessKey=c2VjcmV0",
//! )])
//! .expect("namespace");
//! assert_eq!(namespace.amqp_host_uri(), "amqps://contoso.servicebus.windows.net/");
//! assert_eq!(
//!     namespace.entity_audience("myqueue"),
//!     "amqps://contoso.servicebus.windows.net/myqueue"
//! );
//! ```
//!
//! # Common pitfalls
//! - Attaching links on a connection whose claim negotiation has not succeeded.
//! - Expecting `new_connection` to retry; wrap it if the caller needs backoff.
use sable_transport::ClientProperties;

pub mod config;
pub mod environment;
pub mod error;
pub mod handler;
pub mod namespace;

pub use config::NamespaceConfig;
pub use environment::Environment;
pub use error::{NamespaceError, Result};
pub use handler::{DispositionAction, Handler, Message};
pub use namespace::{
    Namespace, NamespaceOption, with_client_properties, with_connection_string, with_environment,
    with_max_sessions, with_token_provider,
};
pub use sable_auth::{SasTokenProvider, Token, TokenProvider, TokenType};
pub use sable_transport::{
    AmqpConnection, AmqpConnector, ClaimExchange, Connector, DialOptions, TransportConfig,
    TransportError,
};
pub use tokio_util::sync::CancellationToken;

/// Semantic version advertised in connection properties.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Size multiplier for entity size settings: `5 * MEGABYTES` is 5 GB.
pub const MEGABYTES: u64 = 1024;

pub const PRODUCT: &str = "MSRustClient";

pub const USER_AGENT: &str = "/rust-service-bus";

/// Connection properties identifying this client build.
pub fn default_client_properties() -> ClientProperties {
    ClientProperties::new(PRODUCT, VERSION, USER_AGENT)
}

#[cfg(test)]
mod tests;
