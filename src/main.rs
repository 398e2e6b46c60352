//! s3proxy -- anonymous HTTP gateway in front of a single S3 bucket.
//!
//! Configuration comes from an optional YAML file overlaid with the
//! environment (`AWS_REGION`, `S3PROXY_S3_BUCKET`, ...).  SIGTERM/SIGINT
//! stop accepting connections and drain in-flight requests, bounded by
//! `server.shutdown_timeout`.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{info, warn};

use s3proxy::config::{Config, LoggingConfig};
use s3proxy::storage::fetcher::ObjectFetcher;

/// Command-line arguments for the s3proxy server.
#[derive(Parser, Debug)]
#[command(
    name = "s3proxy",
    version,
    about = "Anonymous HTTP gateway in front of a single S3 bucket"
)]
struct Cli {
    /// Path to an optional YAML configuration file.
    #[arg(short, long)]
    config: Option<String>,

    /// Override the bind address (host:port).
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => s3proxy::config::load_config(path)?,
        None => Config::default(),
    };
    config.apply_env_overrides();

    init_tracing(&config.logging);
    if let Some(path) = &cli.config {
        info!("Loaded configuration from {}", path);
    }

    config.validate()?;

    let bind_addr = cli
        .bind
        .unwrap_or_else(|| format!("{}:{}", config.server.host, config.server.port));

    if config.observability.metrics {
        s3proxy::metrics::init_metrics()?;
        s3proxy::metrics::describe_metrics();
        info!("Prometheus metrics initialized");
    }

    // One fetcher for the whole process; every request shares it.
    let fetcher: Arc<dyn ObjectFetcher> =
        Arc::new(s3proxy::storage::s3::S3Fetcher::new(&config.storage.s3).await?);

    if config.observability.admin_enabled() {
        let admin_addr = format!(
            "{}:{}",
            config.server.host, config.observability.admin_port
        );
        let admin = s3proxy::server::admin_app(&config.observability);
        let admin_listener = tokio::net::TcpListener::bind(&admin_addr).await?;
        info!("Admin endpoints listening on {}", admin_addr);
        tokio::spawn(async move {
            if let Err(e) = axum::serve(admin_listener, admin).await {
                warn!("Admin listener stopped: {}", e);
            }
        });
    }

    let shutdown_timeout = Duration::from_secs(config.server.shutdown_timeout);
    let state = Arc::new(s3proxy::AppState { config, fetcher });
    let app = s3proxy::server::app(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("s3proxy listening on {}", bind_addr);

    // Graceful shutdown: on SIGTERM/SIGINT, stop accepting new connections
    // and wait for in-flight requests, but no longer than the timeout.
    let (signal_tx, signal_rx) = tokio::sync::oneshot::channel::<()>();
    let server = async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                shutdown_signal().await;
                let _ = signal_tx.send(());
            })
            .await
    };

    tokio::select! {
        res = server => res?,
        _ = async {
            let _ = signal_rx.await;
            tokio::time::sleep(shutdown_timeout).await;
        } => {
            warn!("Shutdown timeout of {:?} elapsed, dropping in-flight requests", shutdown_timeout);
        }
    }

    info!("s3proxy shut down");

    Ok(())
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over `logging.level`.
fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&logging.level));

    if logging.format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

/// Wait for SIGTERM or SIGINT (Ctrl+C), then return to trigger graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, shutting down");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, shutting down");
        },
    }
}
