// Probe binary: dials a namespace and negotiates a claim for each entity path.
use anyhow::{Context, Result, bail};
use clap::Parser;
use sable_client::{CancellationToken, Namespace, NamespaceConfig, NamespaceError};
use std::future::Future;
use std::time::Duration;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "sable-probe")]
#[command(about = "Check that a namespace accepts claims for the given entities")]
struct Args {
    /// YAML config file (overrides SABLE_CLIENT_CONFIG)
    #[arg(long)]
    config: Option<String>,

    /// Namespace connection string
    #[arg(long, env = "SABLE_CONNECTION_STRING", hide_env_values = true)]
    connection_string: Option<String>,

    /// Cloud environment name, e.g. AzurePublicCloud
    #[arg(long)]
    environment: Option<String>,

    /// Entity path to authorize; repeat for several entities
    #[arg(long = "entity", required = true)]
    entities: Vec<String>,

    /// Give up after this many seconds (0 = wait indefinitely)
    #[arg(long, default_value = "30")]
    timeout_secs: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let mut config = NamespaceConfig::from_env_or_yaml(args.config.as_deref())?;
    if let Some(conn_str) = args.connection_string {
        config.connection_string = Some(conn_str);
    }
    if let Some(environment) = args.environment {
        config.environment = Some(environment);
    }
    let namespace = Namespace::from_config(&config).context("build namespace")?;
    if namespace.token_provider.is_none() {
        bail!("no credentials configured; pass --connection-string or set SABLE_CONNECTION_STRING");
    }
    info!(
        host = %namespace.amqp_host_uri(),
        entities = args.entities.len(),
        "probing namespace"
    );

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        let timeout_secs = args.timeout_secs;
        tokio::spawn(async move {
            wait_for_shutdown(tokio::signal::ctrl_c(), timeout_secs).await;
            cancel.cancel();
        });
    }

    let mut connection = namespace
        .new_connection(&cancel)
        .await
        .context("open namespace connection")?;
    info!(connection_id = connection.info().id.0, "connection open");

    let mut failures = 0usize;
    for entity in &args.entities {
        match namespace
            .negotiate_claim(&cancel, &mut connection, entity)
            .await
        {
            Ok(()) => info!(entity = %entity, "claim accepted"),
            Err(err @ NamespaceError::Cancelled { .. }) => {
                error!(entity = %entity, error = %err, "probe cancelled");
                failures += 1;
                break;
            }
            Err(err) => {
                error!(entity = %entity, error = %err, "claim failed");
                failures += 1;
            }
        }
    }

    if let Err(err) = connection.close().await {
        tracing::warn!(error = %err, "connection close failed");
    }
    if failures > 0 {
        bail!("{failures} of {} claims failed", args.entities.len());
    }
    info!("all claims accepted");
    Ok(())
}

/// Resolve on the interrupt signal or after `timeout_secs` (0 = no timeout).
/// A signal handler that fails to install is logged and ignored.
async fn wait_for_shutdown<S>(signal: S, timeout_secs: u64)
where
    S: Future<Output = std::io::Result<()>>,
{
    let signal = async {
        if let Err(err) = signal.await {
            tracing::warn!(error = %err, "interrupt handler unavailable");
            std::future::pending::<()>().await;
        }
    };
    if timeout_secs == 0 {
        signal.await;
        return;
    }
    tokio::select! {
        _ = signal => {}
        _ = tokio::time::sleep(Duration::from_secs(timeout_secs)) => {
            tracing::warn!(timeout_secs, "probe timed out");
        }
    }
}
