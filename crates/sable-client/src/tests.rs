use super::*;
use async_trait::async_trait;
use sable_auth::{AuthError, AuthResult};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::time::{Duration, sleep, timeout};

const CONN_STR: &str = "Endpoint=sb://contoso.servicebus.windows.net/;SharedAccessKeyName=send;SharedAccessKey=c2VjcmV0";

fn transport_failure(message: &str) -> sable_transport::BoxError {
    Box::new(std::io::Error::other(message.to_string()))
}

#[derive(Default)]
struct RecordingConnector {
    dials: Mutex<Vec<(String, DialOptions)>>,
    fail: bool,
    pending: bool,
}

#[async_trait]
impl Connector for RecordingConnector {
    type Connection = FakeConnection;

    async fn dial(
        &self,
        host_uri: &str,
        options: &DialOptions,
    ) -> std::result::Result<FakeConnection, TransportError> {
        self.dials
            .lock()
            .expect("dials lock")
            .push((host_uri.to_string(), options.clone()));
        if self.pending {
            std::future::pending::<()>().await;
        }
        if self.fail {
            return Err(TransportError::Dial {
                host: host_uri.to_string(),
                source: transport_failure("connection refused"),
            });
        }
        Ok(FakeConnection::default())
    }
}

#[derive(Clone, Copy, Debug, Default)]
enum ExchangeBehavior {
    #[default]
    Accept,
    Reject,
    LinkError,
    ExchangeError,
    Pending,
}

#[derive(Debug, Default)]
struct FakeConnection {
    behavior: ExchangeBehavior,
    calls: Vec<(String, Token)>,
}

impl FakeConnection {
    fn with_behavior(behavior: ExchangeBehavior) -> Self {
        Self {
            behavior,
            calls: Vec::new(),
        }
    }
}

#[async_trait]
impl ClaimExchange for FakeConnection {
    async fn put_token(
        &mut self,
        audience: &str,
        token: &Token,
    ) -> std::result::Result<(), TransportError> {
        self.calls.push((audience.to_string(), token.clone()));
        match self.behavior {
            ExchangeBehavior::Accept => Ok(()),
            ExchangeBehavior::Reject => Err(TransportError::Rejected {
                audience: audience.to_string(),
                source: transport_failure("401 unauthorized"),
            }),
            ExchangeBehavior::LinkError => {
                Err(TransportError::Link(transport_failure("link detached")))
            }
            ExchangeBehavior::ExchangeError => {
                Err(TransportError::Exchange(transport_failure("reply lost")))
            }
            ExchangeBehavior::Pending => std::future::pending().await,
        }
    }
}

struct FailingProvider;

#[async_trait]
impl TokenProvider for FailingProvider {
    async fn get_token(&self, _audience: &str) -> AuthResult<Token> {
        Err(AuthError::Provider("vault unavailable".to_string()))
    }
}

struct PendingProvider;

#[async_trait]
impl TokenProvider for PendingProvider {
    async fn get_token(&self, _audience: &str) -> AuthResult<Token> {
        std::future::pending().await
    }
}

#[derive(Default)]
struct CountingProvider {
    calls: AtomicUsize,
}

#[async_trait]
impl TokenProvider for CountingProvider {
    async fn get_token(&self, audience: &str) -> AuthResult<Token> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        // Yield so concurrent negotiations interleave.
        tokio::task::yield_now().await;
        Ok(Token {
            token_type: TokenType::Jwt,
            value: format!("token-for:{audience}"),
            expiry: 4_102_444_800,
        })
    }
}

fn contoso() -> Namespace {
    Namespace::new([with_connection_string(CONN_STR)]).expect("namespace")
}

#[test]
fn contoso_host_uris_and_audience() {
    let namespace = contoso();
    assert_eq!(namespace.name, "contoso");
    assert_eq!(
        namespace.amqp_host_uri(),
        "amqps://contoso.servicebus.windows.net/"
    );
    assert_eq!(
        namespace.https_host_uri(),
        "https://contoso.servicebus.windows.net/"
    );
    assert_eq!(
        namespace.entity_audience("myqueue"),
        "amqps://contoso.servicebus.windows.net/myqueue"
    );
    assert_eq!(
        namespace.entity_audience(""),
        "amqps://contoso.servicebus.windows.net/"
    );
}

#[test]
fn host_uris_follow_environment_suffix() {
    let namespace = Namespace::new([
        with_connection_string(CONN_STR),
        with_environment(Environment::china_cloud()),
    ])
    .expect("namespace");
    assert_eq!(
        namespace.amqp_host_uri(),
        "amqps://contoso.servicebus.chinacloudapi.cn/"
    );
}

#[tokio::test]
async fn zero_options_dial_public_cloud_with_empty_name() {
    let namespace = Namespace::new([]).expect("namespace");
    assert!(namespace.name.is_empty());
    assert!(namespace.token_provider.is_none());
    assert_eq!(namespace.environment, Environment::public_cloud());

    let connector = RecordingConnector::default();
    let cancel = CancellationToken::new();
    namespace
        .new_connection_with(&connector, &cancel)
        .await
        .expect("connect");
    let dials = connector.dials.lock().expect("dials lock");
    assert_eq!(dials.len(), 1);
    assert_eq!(dials[0].0, "amqps://.servicebus.windows.net/");
}

#[tokio::test]
async fn connection_string_installs_sas_provider() {
    let namespace = contoso();
    let provider = namespace.token_provider.as_ref().expect("provider");
    let audience = namespace.entity_audience("myqueue");
    let token = provider.get_token(&audience).await.expect("token");

    assert_eq!(token.token_type, TokenType::Sas);
    let expected = SasTokenProvider::new("send", "c2VjcmV0")
        .expect("provider")
        .sign(&audience, token.expiry)
        .expect("sign");
    assert_eq!(token.value, expected);
}

#[test]
fn malformed_connection_string_is_configuration_error() {
    let err = Namespace::new([with_connection_string("not a connection string")])
        .expect_err("malformed");
    assert!(matches!(err, NamespaceError::ConnectionStringInvalid(_)));
    assert!(err.is_configuration());
}

#[test]
fn empty_shared_access_key_is_configuration_error() {
    let err = Namespace::new([with_connection_string(
        "Endpoint=sb://contoso.servicebus.windows.net/;SharedAccessKeyName=send;SharedAccessKey=",
    )])
    .expect_err("empty key");
    assert!(matches!(err, NamespaceError::ConnectionStringInvalid(_)));
    assert!(err.is_configuration());
}

#[test]
fn later_options_override_earlier_ones() {
    let namespace = Namespace::new([
        with_environment(Environment::german_cloud()),
        with_environment(Environment::us_government_cloud()),
    ])
    .expect("namespace");
    assert_eq!(namespace.environment, Environment::us_government_cloud());

    let namespace = Namespace::new([
        with_connection_string(CONN_STR),
        with_connection_string(
            "Endpoint=sb://fabrikam.servicebus.windows.net/;SharedAccessKeyName=listen;SharedAccessKey=abc",
        ),
    ])
    .expect("namespace");
    assert_eq!(namespace.name, "fabrikam");
}

#[test]
fn first_failing_option_aborts_construction() {
    let applied = Arc::new(AtomicUsize::new(0));
    let counter = applied.clone();
    let after: NamespaceOption = Box::new(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });
    let err = Namespace::new([with_connection_string("Endpoint=contoso"), after])
        .expect_err("first option fails");
    assert!(matches!(err, NamespaceError::ConnectionStringInvalid(_)));
    assert_eq!(applied.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn dial_options_carry_sessions_and_properties() {
    let default_ns = Namespace::new([]).expect("namespace");
    assert_eq!(default_ns.transport.max_sessions, 65535);

    let namespace = Namespace::new([with_max_sessions(8)]).expect("namespace");
    let connector = RecordingConnector::default();
    namespace
        .new_connection_with(&connector, &CancellationToken::new())
        .await
        .expect("connect");
    let dials = connector.dials.lock().expect("dials lock");
    let options = &dials[0].1;
    assert_eq!(options.max_sessions, 8);
    assert_eq!(options.properties.product, PRODUCT);
    assert_eq!(options.properties.version, VERSION);
    assert_eq!(options.properties.user_agent, USER_AGENT);
}

#[test]
fn zero_max_sessions_is_rejected() {
    let err = Namespace::new([with_max_sessions(0)]).expect_err("zero sessions");
    assert!(matches!(err, NamespaceError::Configuration(_)));
}

#[tokio::test]
async fn dial_failure_reports_host() {
    let connector = RecordingConnector {
        fail: true,
        ..Default::default()
    };
    let err = contoso()
        .new_connection_with(&connector, &CancellationToken::new())
        .await
        .expect_err("dial fails");
    match err {
        NamespaceError::Connection { host, source } => {
            assert_eq!(host, "amqps://contoso.servicebus.windows.net/");
            assert!(matches!(source, TransportError::Dial { .. }));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn cancelled_before_dial_does_not_connect() {
    let connector = RecordingConnector::default();
    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = contoso()
        .new_connection_with(&connector, &cancel)
        .await
        .expect_err("cancelled");
    assert!(matches!(
        err,
        NamespaceError::Cancelled {
            operation: "new_connection"
        }
    ));
    assert!(connector.dials.lock().expect("dials lock").is_empty());
}

#[tokio::test]
async fn cancellation_interrupts_pending_dial() {
    let connector = RecordingConnector {
        pending: true,
        ..Default::default()
    };
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });
    let err = timeout(
        Duration::from_secs(5),
        contoso().new_connection_with(&connector, &cancel),
    )
    .await
    .expect("cancellation observed")
    .expect_err("cancelled");
    assert!(matches!(err, NamespaceError::Cancelled { .. }));
}

#[tokio::test]
async fn negotiate_claim_sends_token_for_entity_audience() {
    let namespace = contoso();
    let mut connection = FakeConnection::default();
    namespace
        .negotiate_claim(&CancellationToken::new(), &mut connection, "myqueue")
        .await
        .expect("claim");
    assert_eq!(connection.calls.len(), 1);
    let (audience, token) = &connection.calls[0];
    assert_eq!(audience, "amqps://contoso.servicebus.windows.net/myqueue");
    assert_eq!(token.token_type, TokenType::Sas);
    assert!(token.value.starts_with("SharedAccessSignature "));
}

#[tokio::test]
async fn failing_provider_never_reaches_the_broker() {
    let namespace = Namespace::new([
        with_connection_string(CONN_STR),
        with_token_provider(Arc::new(FailingProvider)),
    ])
    .expect("namespace");
    let mut connection = FakeConnection::default();
    let err = namespace
        .negotiate_claim(&CancellationToken::new(), &mut connection, "myqueue")
        .await
        .expect_err("provider fails");
    assert!(matches!(err, NamespaceError::TokenProvider(_)));
    assert!(connection.calls.is_empty());
}

#[tokio::test]
async fn missing_provider_is_configuration_error() {
    let namespace = Namespace::new([]).expect("namespace");
    let mut connection = FakeConnection::default();
    let err = namespace
        .negotiate_claim(&CancellationToken::new(), &mut connection, "myqueue")
        .await
        .expect_err("no provider");
    assert!(matches!(err, NamespaceError::Configuration(_)));
    assert!(connection.calls.is_empty());
}

#[tokio::test]
async fn broker_rejection_maps_to_claim_rejected() {
    let mut connection = FakeConnection::with_behavior(ExchangeBehavior::Reject);
    let err = contoso()
        .negotiate_claim(&CancellationToken::new(), &mut connection, "myqueue")
        .await
        .expect_err("rejected");
    match err {
        NamespaceError::ClaimRejected { audience, source } => {
            assert_eq!(audience, "amqps://contoso.servicebus.windows.net/myqueue");
            assert!(source.is_rejection());
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn link_failure_maps_to_connection_error() {
    let mut connection = FakeConnection::with_behavior(ExchangeBehavior::LinkError);
    let err = contoso()
        .negotiate_claim(&CancellationToken::new(), &mut connection, "myqueue")
        .await
        .expect_err("link error");
    assert!(matches!(err, NamespaceError::Connection { .. }));
}

#[tokio::test]
async fn interrupted_exchange_is_not_a_rejection() {
    let mut connection = FakeConnection::with_behavior(ExchangeBehavior::ExchangeError);
    let err = contoso()
        .negotiate_claim(&CancellationToken::new(), &mut connection, "myqueue")
        .await
        .expect_err("exchange error");
    match err {
        NamespaceError::Connection { host, source } => {
            assert_eq!(host, "amqps://contoso.servicebus.windows.net/");
            assert!(matches!(source, TransportError::Exchange(_)));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn cancellation_before_broker_response_is_reported() {
    let namespace = contoso();
    let mut connection = FakeConnection::with_behavior(ExchangeBehavior::Pending);
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });
    let err = timeout(
        Duration::from_secs(5),
        namespace.negotiate_claim(&cancel, &mut connection, "myqueue"),
    )
    .await
    .expect("cancellation observed")
    .expect_err("cancelled");
    assert!(matches!(
        err,
        NamespaceError::Cancelled {
            operation: "negotiate_claim"
        }
    ));
    assert_eq!(connection.calls.len(), 1);
}

#[tokio::test]
async fn cancellation_while_fetching_token_skips_exchange() {
    let namespace = Namespace::new([with_token_provider(Arc::new(PendingProvider))])
        .expect("namespace");
    let mut connection = FakeConnection::default();
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });
    let err = timeout(
        Duration::from_secs(5),
        namespace.negotiate_claim(&cancel, &mut connection, "myqueue"),
    )
    .await
    .expect("cancellation observed")
    .expect_err("cancelled");
    assert!(matches!(err, NamespaceError::Cancelled { .. }));
    assert!(connection.calls.is_empty());
}

#[tokio::test]
async fn concurrent_negotiations_share_one_namespace() {
    let provider = Arc::new(CountingProvider::default());
    let namespace = Namespace::new([
        with_connection_string(CONN_STR),
        with_token_provider(provider.clone()),
    ])
    .expect("namespace");
    let cancel = CancellationToken::new();
    let mut first = FakeConnection::default();
    let mut second = FakeConnection::default();

    let (a, b) = tokio::join!(
        namespace.negotiate_claim(&cancel, &mut first, "queue-a"),
        namespace.negotiate_claim(&cancel, &mut second, "queue-b"),
    );
    a.expect("first claim");
    b.expect("second claim");

    assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    assert_eq!(
        first.calls[0].0,
        "amqps://contoso.servicebus.windows.net/queue-a"
    );
    assert_eq!(
        second.calls[0].1.value,
        "token-for:amqps://contoso.servicebus.windows.net/queue-b"
    );
}

#[tokio::test]
async fn closure_handlers_settle_messages() {
    let handler = |_cancel: CancellationToken, message: Message| async move {
        if message.body.is_empty() {
            DispositionAction::DeadLetter {
                reason: Some("empty body".to_string()),
            }
        } else {
            DispositionAction::Complete
        }
    };
    let cancel = CancellationToken::new();
    let message = Message::new(&b"hello"[..]).with_id("m-1");
    assert_eq!(message.id.as_deref(), Some("m-1"));
    assert_eq!(
        handler.handle(&cancel, message).await,
        DispositionAction::Complete
    );
    assert_eq!(
        handler.handle(&cancel, Message::default()).await,
        DispositionAction::DeadLetter {
            reason: Some("empty body".to_string())
        }
    );
}

mod config_loading {
    use super::*;
    use crate::config::{
        CONFIG_PATH_ENV, CONNECTION_STRING_ENV, ENVIRONMENT_ENV, MAX_SESSIONS_ENV,
    };
    use serial_test::serial;
    use std::io::Write;

    struct EnvGuard {
        key: &'static str,
        prev: Option<String>,
    }

    impl EnvGuard {
        fn set(key: &'static str, value: &str) -> Self {
            let prev = std::env::var(key).ok();
            unsafe {
                std::env::set_var(key, value);
            }
            Self { key, prev }
        }

        fn unset(key: &'static str) -> Self {
            let prev = std::env::var(key).ok();
            unsafe {
                std::env::remove_var(key);
            }
            Self { key, prev }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            match &self.prev {
                Some(value) => unsafe {
                    std::env::set_var(self.key, value);
                },
                None => unsafe {
                    std::env::remove_var(self.key);
                },
            }
        }
    }

    fn clear_env() -> Vec<EnvGuard> {
        vec![
            EnvGuard::unset(CONNECTION_STRING_ENV),
            EnvGuard::unset(ENVIRONMENT_ENV),
            EnvGuard::unset(MAX_SESSIONS_ENV),
            EnvGuard::unset(CONFIG_PATH_ENV),
        ]
    }

    fn write_yaml(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().expect("tempfile");
        file.write_all(contents.as_bytes()).expect("write yaml");
        file
    }

    #[test]
    #[serial]
    fn defaults_without_env_or_file() {
        let _guards = clear_env();
        let config = NamespaceConfig::from_env_or_yaml(None).expect("config");
        assert_eq!(config, NamespaceConfig::default());
        assert_eq!(config.max_sessions, 65535);
    }

    #[test]
    #[serial]
    fn env_values_are_applied_and_zero_is_ignored() {
        let _guards = clear_env();
        let _conn = EnvGuard::set(CONNECTION_STRING_ENV, CONN_STR);
        let _env = EnvGuard::set(ENVIRONMENT_ENV, "AzureChinaCloud");
        let _sessions = EnvGuard::set(MAX_SESSIONS_ENV, "0");
        let config = NamespaceConfig::from_env_or_yaml(None).expect("config");
        assert_eq!(config.connection_string.as_deref(), Some(CONN_STR));
        assert_eq!(config.environment.as_deref(), Some("AzureChinaCloud"));
        assert_eq!(config.max_sessions, 65535);
        assert!(!format!("{config:?}").contains("c2VjcmV0"));
    }

    #[test]
    #[serial]
    fn yaml_overrides_env() {
        let _guards = clear_env();
        let _env = EnvGuard::set(ENVIRONMENT_ENV, "AzureChinaCloud");
        let file = write_yaml("environment: AzureUSGovernmentCloud\nmax_sessions: 16\n");
        let path = file.path().to_str().expect("utf8 path");
        let config = NamespaceConfig::from_env_or_yaml(Some(path)).expect("config");
        assert_eq!(config.environment.as_deref(), Some("AzureUSGovernmentCloud"));
        assert_eq!(config.max_sessions, 16);
    }

    #[test]
    #[serial]
    fn yaml_path_can_come_from_env() {
        let _guards = clear_env();
        let file = write_yaml("max_sessions: 0\nenvironment: \"\"\n");
        let path = file.path().to_str().expect("utf8 path");
        let _path = EnvGuard::set(CONFIG_PATH_ENV, path);
        let config = NamespaceConfig::from_env_or_yaml(None).expect("config");
        assert_eq!(config, NamespaceConfig::default());
    }

    #[test]
    #[serial]
    fn invalid_yaml_is_an_error() {
        let _guards = clear_env();
        let file = write_yaml("max_sessions: [not, a, number]\n");
        let path = file.path().to_str().expect("utf8 path");
        let err = NamespaceConfig::from_env_or_yaml(Some(path)).expect_err("bad yaml");
        assert!(err.to_string().contains("parse client config yaml"));
    }

    #[test]
    #[serial]
    fn missing_file_is_an_error() {
        let _guards = clear_env();
        let err = NamespaceConfig::from_env_or_yaml(Some("/nonexistent/sable-client.yaml"))
            .expect_err("missing file");
        assert!(err.to_string().contains("read client config"));
    }

    #[test]
    fn from_config_builds_namespace() {
        let config = NamespaceConfig {
            connection_string: Some(CONN_STR.to_string()),
            environment: Some("azurechinacloud".to_string()),
            max_sessions: 32,
        };
        let namespace = Namespace::from_config(&config).expect("namespace");
        assert_eq!(
            namespace.amqp_host_uri(),
            "amqps://contoso.servicebus.chinacloudapi.cn/"
        );
        assert_eq!(namespace.transport.max_sessions, 32);
        assert!(namespace.token_provider.is_some());
    }

    #[test]
    fn from_config_rejects_unknown_environment() {
        let config = NamespaceConfig {
            environment: Some("MarsCloud".to_string()),
            ..NamespaceConfig::default()
        };
        let err = Namespace::from_config(&config).expect_err("unknown cloud");
        assert!(matches!(err, NamespaceError::Configuration(_)));
    }
}
