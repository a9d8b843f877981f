// Failure taxonomy for namespace construction, dialing, and claim negotiation.
use sable_auth::AuthError;
use sable_transport::TransportError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, NamespaceError>;

#[derive(Debug, Error)]
pub enum NamespaceError {
    #[error("invalid namespace configuration: {0}")]
    Configuration(String),
    #[error("invalid connection string")]
    ConnectionStringInvalid(#[source] AuthError),
    #[error("token provider failed")]
    TokenProvider(#[source] AuthError),
    #[error("connection to {host} failed")]
    Connection {
        host: String,
        #[source]
        source: TransportError,
    },
    #[error("claim for {audience} rejected")]
    ClaimRejected {
        audience: String,
        #[source]
        source: TransportError,
    },
    #[error("{operation} cancelled")]
    Cancelled { operation: &'static str },
}

impl NamespaceError {
    /// True for failures caused by options or credentials rather than the network.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            NamespaceError::Configuration(_) | NamespaceError::ConnectionStringInvalid(_)
        )
    }
}
