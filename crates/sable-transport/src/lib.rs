// AMQP transport configuration and connection primitives.
use async_trait::async_trait;
use fe2o3_amqp::connection::ConnectionHandle;
use fe2o3_amqp::sasl_profile::SaslProfile;
use fe2o3_amqp::types::definitions::Fields;
use fe2o3_amqp::types::primitives::{Symbol, Value};
use fe2o3_amqp::Connection;
use std::sync::atomic::{AtomicU64, Ordering};

mod cbs;
mod errors;

pub use cbs::ClaimExchange;
pub use errors::{BoxError, TransportError};

/// Default bound on concurrently active sessions per connection.
pub const DEFAULT_MAX_SESSIONS: u16 = u16::MAX;

/// Version of the compiler that built this crate.
pub const RUSTC_VERSION: &str = env!("SABLE_RUSTC_VERSION");

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// Identifying properties advertised on the AMQP `open` frame.
///
/// ```
/// use sable_transport::ClientProperties;
///
/// let props = ClientProperties::new("MSRustClient", "0.1.0", "/rust-service-bus");
/// let keys: Vec<_> = props.entries().into_iter().map(|(key, _)| key).collect();
/// assert_eq!(keys, ["product", "version", "platform", "framework", "user-agent"]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientProperties {
    pub product: String,
    pub version: String,
    pub platform: String,
    pub framework: String,
    pub user_agent: String,
}

impl ClientProperties {
    /// Build properties for the current host; platform and framework are detected.
    pub fn new(
        product: impl Into<String>,
        version: impl Into<String>,
        user_agent: impl Into<String>,
    ) -> Self {
        Self {
            product: product.into(),
            version: version.into(),
            platform: std::env::consts::OS.to_string(),
            framework: format!("rust/{RUSTC_VERSION}"),
            user_agent: user_agent.into(),
        }
    }

    pub fn entries(&self) -> Vec<(&'static str, &str)> {
        vec![
            ("product", self.product.as_str()),
            ("version", self.version.as_str()),
            ("platform", self.platform.as_str()),
            ("framework", self.framework.as_str()),
            ("user-agent", self.user_agent.as_str()),
        ]
    }

    fn to_fields(&self) -> Fields {
        let mut fields = Fields::default();
        for (key, value) in self.entries() {
            fields.insert(Symbol::from(key), Value::String(value.to_string()));
        }
        fields
    }
}

/// Connection-level settings a namespace applies to every dial.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportConfig {
    pub max_sessions: u16,
    pub properties: ClientProperties,
}

impl TransportConfig {
    pub fn new(properties: ClientProperties) -> Self {
        Self {
            max_sessions: DEFAULT_MAX_SESSIONS,
            properties,
        }
    }

    pub fn dial_options(&self) -> DialOptions {
        DialOptions {
            max_sessions: self.max_sessions,
            properties: self.properties.clone(),
        }
    }
}

/// Options handed to a [`Connector`] for a single dial.
///
/// Transport-level authentication is always SASL ANONYMOUS; authorization
/// happens afterwards through a claim exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialOptions {
    pub max_sessions: u16,
    pub properties: ClientProperties,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// Process-local connection identifier used for tracing/logging.
pub struct ConnectionId(pub u64);

impl ConnectionId {
    pub fn next() -> Self {
        Self(NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Debug, Clone)]
/// Metadata about a live AMQP connection.
pub struct ConnectionInfo {
    pub id: ConnectionId,
    pub host: String,
    pub container_id: String,
}

/// Highest channel number to advertise so that at most `max_sessions`
/// sessions are active; AMQP channels are numbered from zero.
fn channel_max(max_sessions: u16) -> u16 {
    max_sessions.saturating_sub(1)
}

/// Opens transport connections to a broker host.
#[async_trait]
pub trait Connector: Send + Sync {
    type Connection: Send;

    async fn dial(
        &self,
        host_uri: &str,
        options: &DialOptions,
    ) -> Result<Self::Connection, TransportError>;
}

/// [`Connector`] backed by `fe2o3-amqp`, with TLS for `amqps://` hosts.
#[derive(Debug, Clone, Default)]
pub struct AmqpConnector;

#[async_trait]
impl Connector for AmqpConnector {
    type Connection = AmqpConnection;

    async fn dial(
        &self,
        host_uri: &str,
        options: &DialOptions,
    ) -> Result<AmqpConnection, TransportError> {
        let id = ConnectionId::next();
        let container_id = format!("sable-{}-{}", std::process::id(), id.0);
        tracing::debug!(
            host = host_uri,
            connection_id = id.0,
            max_sessions = options.max_sessions,
            "dialing amqp connection"
        );
        let handle = Connection::builder()
            .container_id(container_id.clone())
            .channel_max(channel_max(options.max_sessions))
            .properties(options.properties.to_fields())
            .sasl_profile(SaslProfile::Anonymous)
            .open(host_uri)
            .await
            .map_err(|err| TransportError::Dial {
                host: host_uri.to_string(),
                source: Box::new(err),
            })?;
        tracing::debug!(host = host_uri, connection_id = id.0, "amqp connection open");
        Ok(AmqpConnection {
            handle,
            info: ConnectionInfo {
                id,
                host: host_uri.to_string(),
                container_id,
            },
        })
    }
}

/// Open AMQP connection owned by the caller that dialed it.
pub struct AmqpConnection {
    handle: ConnectionHandle<()>,
    info: ConnectionInfo,
}

impl AmqpConnection {
    pub fn info(&self) -> &ConnectionInfo {
        &self.info
    }

    /// Underlying handle, for opening sessions and links above this layer.
    pub fn handle_mut(&mut self) -> &mut ConnectionHandle<()> {
        &mut self.handle
    }

    pub async fn close(mut self) -> Result<(), TransportError> {
        self.handle
            .close()
            .await
            .map_err(|err| TransportError::Close(Box::new(err)))?;
        tracing::debug!(connection_id = self.info.id.0, "amqp connection closed");
        Ok(())
    }
}

impl std::fmt::Debug for AmqpConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AmqpConnection")
            .field("info", &self.info)
            .finish_non_exhaustive()
    }
}
