//! Namespace construction, host derivation, dialing, and claim negotiation.
//!
//! # Design notes
//! Options are boxed closures applied in order over a mutable namespace; the
//! first failure aborts construction so no partially configured namespace is
//! ever returned. Later options win when two touch the same field.
//!
//! Both network operations take a [`CancellationToken`] and race it against
//! every await point, so a cancelled caller never observes a false success.
use crate::config::NamespaceConfig;
use crate::environment::Environment;
use crate::error::{NamespaceError, Result};
use crate::default_client_properties;
use sable_auth::{SasTokenProvider, TokenProvider, parse_connection_string};
use sable_transport::{
    AmqpConnection, AmqpConnector, ClaimExchange, ClientProperties, Connector, TransportConfig,
};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// A configuration step applied while building a [`Namespace`].
pub type NamespaceOption = Box<dyn FnOnce(&mut Namespace) -> Result<()> + Send>;

/// Identity and capability bundle for one broker namespace.
#[derive(Clone)]
pub struct Namespace {
    /// Namespace segment of the broker host, e.g. `contoso`.
    pub name: String,
    pub token_provider: Option<Arc<dyn TokenProvider>>,
    pub environment: Environment,
    pub transport: TransportConfig,
}

impl Namespace {
    /// Start from the public cloud with no name and no provider, then apply
    /// `options` in order.
    ///
    /// ```
    /// use sable_client::{Environment, Namespace};
    ///
    /// let namespace = Namespace::new([]).expect("namespace");
    /// assert_eq!(namespace.environment, Environment::public_cloud());
    /// assert!(namespace.name.is_empty());
    /// assert!(namespace.token_provider.is_none());
    /// ```
    pub fn new<I>(options: I) -> Result<Self>
    where
        I: IntoIterator<Item = NamespaceOption>,
    {
        let mut namespace = Self {
            name: String::new(),
            token_provider: None,
            environment: Environment::public_cloud(),
            transport: TransportConfig::new(default_client_properties()),
        };
        for option in options {
            option(&mut namespace)?;
        }
        Ok(namespace)
    }

    /// Build a namespace from loaded configuration.
    pub fn from_config(config: &NamespaceConfig) -> Result<Self> {
        let mut options: Vec<NamespaceOption> = Vec::new();
        if let Some(name) = config.environment.as_deref() {
            let environment = Environment::from_name(name).ok_or_else(|| {
                NamespaceError::Configuration(format!("unknown cloud environment: {name}"))
            })?;
            options.push(with_environment(environment));
        }
        if let Some(conn_str) = config.connection_string.clone() {
            options.push(with_connection_string(conn_str));
        }
        options.push(with_max_sessions(config.max_sessions));
        Self::new(options)
    }

    pub fn amqp_host_uri(&self) -> String {
        self.host_uri("amqps")
    }

    pub fn https_host_uri(&self) -> String {
        self.host_uri("https")
    }

    /// Audience a claim for `entity_path` is scoped to. The path is appended
    /// verbatim.
    pub fn entity_audience(&self, entity_path: &str) -> String {
        self.amqp_host_uri() + entity_path
    }

    fn host_uri(&self, scheme: &str) -> String {
        format!(
            "{scheme}://{}.{}/",
            self.name, self.environment.service_bus_endpoint_suffix
        )
    }

    /// Dial the namespace host over AMQP with TLS.
    pub async fn new_connection(&self, cancel: &CancellationToken) -> Result<AmqpConnection> {
        self.new_connection_with(&AmqpConnector, cancel).await
    }

    /// Dial the namespace host through `connector`.
    ///
    /// The transport authenticates anonymously; authorization is deferred to
    /// [`Namespace::negotiate_claim`].
    pub async fn new_connection_with<C>(
        &self,
        connector: &C,
        cancel: &CancellationToken,
    ) -> Result<C::Connection>
    where
        C: Connector + ?Sized,
    {
        let host = self.amqp_host_uri();
        let options = self.transport.dial_options();
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(NamespaceError::Cancelled {
                operation: "new_connection",
            }),
            result = connector.dial(&host, &options) => match result {
                Ok(connection) => {
                    tracing::debug!(host = %host, "namespace connection established");
                    Ok(connection)
                }
                Err(source) => {
                    tracing::warn!(host = %host, error = %source, "namespace connection failed");
                    Err(NamespaceError::Connection {
                        host: host.clone(),
                        source,
                    })
                }
            },
        }
    }

    /// Authorize `entity_path` on an open connection.
    ///
    /// The token is requested before anything is sent, so a failing provider
    /// never reaches the network. The `sable.namespace.negotiate_claim` span
    /// covers the whole call and closes on every exit path.
    pub async fn negotiate_claim<X>(
        &self,
        cancel: &CancellationToken,
        connection: &mut X,
        entity_path: &str,
    ) -> Result<()>
    where
        X: ClaimExchange + ?Sized,
    {
        let audience = self.entity_audience(entity_path);
        let span = tracing::info_span!(
            "sable.namespace.negotiate_claim",
            namespace = %self.name,
            entity_path
        );
        self.negotiate_claim_inner(cancel, connection, &audience)
            .instrument(span)
            .await
    }

    async fn negotiate_claim_inner<X>(
        &self,
        cancel: &CancellationToken,
        connection: &mut X,
        audience: &str,
    ) -> Result<()>
    where
        X: ClaimExchange + ?Sized,
    {
        let provider = self.token_provider.as_ref().ok_or_else(|| {
            NamespaceError::Configuration("token provider not configured".to_string())
        })?;
        let token = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(NamespaceError::Cancelled {
                    operation: "negotiate_claim",
                });
            }
            result = provider.get_token(audience) => {
                result.map_err(NamespaceError::TokenProvider)?
            }
        };
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(NamespaceError::Cancelled {
                operation: "negotiate_claim",
            }),
            result = connection.put_token(audience, &token) => match result {
                Ok(()) => {
                    tracing::debug!(expiry = token.expiry, "claim accepted");
                    Ok(())
                }
                Err(source) if source.is_rejection() => {
                    tracing::warn!(error = %source, "claim rejected");
                    Err(NamespaceError::ClaimRejected {
                        audience: audience.to_string(),
                        source,
                    })
                }
                Err(source) => {
                    tracing::warn!(error = %source, "claim exchange failed");
                    Err(NamespaceError::Connection {
                        host: self.amqp_host_uri(),
                        source,
                    })
                }
            },
        }
    }
}

impl std::fmt::Debug for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Namespace")
            .field("name", &self.name)
            .field("has_token_provider", &self.token_provider.is_some())
            .field("environment", &self.environment)
            .field("transport", &self.transport)
            .finish()
    }
}

/// Configure name and SAS credentials from a connection string of the form
/// `Endpoint=sb://<namespace>.<suffix>/;SharedAccessKeyName=<name>;SharedAccessKey=<key>`.
pub fn with_connection_string(conn_str: impl Into<String>) -> NamespaceOption {
    let conn_str = conn_str.into();
    Box::new(move |namespace| {
        let parsed =
            parse_connection_string(&conn_str).map_err(NamespaceError::ConnectionStringInvalid)?;
        if !parsed.namespace.is_empty() {
            namespace.name = parsed.namespace;
        }
        let provider = SasTokenProvider::new(parsed.key_name, parsed.key)
            .map_err(NamespaceError::TokenProvider)?;
        namespace.token_provider = Some(Arc::new(provider));
        Ok(())
    })
}

pub fn with_environment(environment: Environment) -> NamespaceOption {
    Box::new(move |namespace| {
        namespace.environment = environment;
        Ok(())
    })
}

pub fn with_token_provider(provider: Arc<dyn TokenProvider>) -> NamespaceOption {
    Box::new(move |namespace| {
        namespace.token_provider = Some(provider);
        Ok(())
    })
}

/// Override the per-connection session bound (defaults to 65535).
pub fn with_max_sessions(max_sessions: u16) -> NamespaceOption {
    Box::new(move |namespace| {
        if max_sessions == 0 {
            return Err(NamespaceError::Configuration(
                "max_sessions must be at least 1".to_string(),
            ));
        }
        namespace.transport.max_sessions = max_sessions;
        Ok(())
    })
}

pub fn with_client_properties(properties: ClientProperties) -> NamespaceOption {
    Box::new(move |namespace| {
        namespace.transport.properties = properties;
        Ok(())
    })
}
