//! Credential primitives for sable namespace clients.
//!
//! # Purpose
//! Turns an opaque namespace connection string into structured credentials and
//! produces the bearer tokens that claims-based security exchanges carry.
//!
//! # How it fits
//! `sable-client` parses the connection string while building a namespace and
//! installs a [`TokenProvider`]; the claim negotiator asks that provider for a
//! token per audience and hands it to `sable-transport`.
//!
//! # Key invariants
//! - Token providers are `Send + Sync` and may be shared by concurrent negotiations.
//! - SAS signatures are scoped to a single audience and expire after the
//!   provider's validity window.
//!
//! # Examples
//! ```rust
//! use sable_auth::parse_connection_string;
//!
//! let parsed = parse_connection_string(
//!     "Endpoint=sb://contoso.servicebus.windows.net/;SharedAccessKeyName=send;SharedAccessKey=secret",
//! )
//! .expect("parse");
//! assert_eq!(parsed.namespace, "contoso");
//! assert_eq!(parsed.suffix, "servicebus.windows.net");
//! ```
//!
//! # Common pitfalls
//! - Logging a [`Token`] value or the shared access key leaks credentials.

mod connstr;
mod errors;
mod token;

pub use connstr::{ParsedConnection, parse_connection_string};
pub use errors::{AuthError, AuthResult};
pub use token::{
    DEFAULT_TOKEN_VALIDITY, SAS_KEY_ENV, SAS_KEY_NAME_ENV, SasTokenProvider, Token, TokenProvider,
    TokenType,
};
