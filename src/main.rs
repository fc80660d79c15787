//! docsearch -- accession-number document search server.
//!
//! Stateless: every request lists the container afresh.  SIGTERM/SIGINT
//! stop accepting connections and wait for in-flight searches up to
//! `server.shutdown_timeout` seconds.

use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use docsearch::config::{Config, LoggingConfig};

/// Command-line arguments for the docsearch server.
#[derive(Parser, Debug)]
#[command(
    name = "docsearch",
    version,
    about = "Accession-number document search over Azure Blob Storage"
)]
struct Cli {
    /// Path to the YAML configuration file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<String>,

    /// Override the bind address (host:port).
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config: Config = match &cli.config {
        Some(path) => docsearch::config::load_config(path)?,
        None => docsearch::config::from_env(),
    };

    init_tracing(&config.logging);
    match &cli.config {
        Some(path) => info!("Loaded configuration from {}", path),
        None => info!("No configuration file given, using defaults and environment"),
    }

    let bind_addr = cli
        .bind
        .unwrap_or_else(|| format!("{}:{}", config.server.host, config.server.port));

    if config.observability.metrics {
        docsearch::metrics::init_metrics()?;
        docsearch::metrics::describe_metrics();
        info!("Prometheus metrics initialized");
    }

    let backend = docsearch::Backend::from_config(&config)?;
    match &backend {
        docsearch::Backend::Azure(_) => {
            info!(
                "Azure storage backend: container={} signed_urls={}",
                config.storage.container, config.download.signed_urls
            );
            if config.storage.connection_string.is_none() {
                warn!(
                    "{} is not set; searches will fail until it is configured",
                    docsearch::config::ENV_CONNECTION_STRING
                );
            }
        }
        docsearch::Backend::Memory(_) => {
            info!(
                "Memory storage backend: {} blobs",
                config.storage.memory.blobs.len()
            );
        }
    }

    let shutdown_timeout = Duration::from_secs(config.server.shutdown_timeout);
    let state = Arc::new(docsearch::AppState::new(config, backend));
    let app = docsearch::server::app(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("docsearch listening on {}", bind_addr);

    let server = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .into_future();
    tokio::select! {
        result = server => result?,
        _ = drain_deadline(shutdown_timeout) => {
            warn!("In-flight requests did not finish within {:?}, exiting", shutdown_timeout);
        }
    }

    info!("docsearch shut down");

    Ok(())
}

/// Install the global subscriber. `RUST_LOG` wins over `logging.level`.
fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if logging.format.eq_ignore_ascii_case("json") {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Wait for SIGTERM or SIGINT (Ctrl+C), then return to trigger graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT, shutting down");
        },
        _ = terminate => {
            info!("Received SIGTERM, shutting down");
        },
    }
}

/// Resolves `timeout` after a shutdown signal; never resolves otherwise.
async fn drain_deadline(timeout: Duration) {
    shutdown_signal().await;
    tokio::time::sleep(timeout).await;
}
