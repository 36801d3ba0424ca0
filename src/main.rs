use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use slidegate::config::{LoggingConfig, SlidegateConfig};
use slidegate::http::HttpServer;

/// Sliding-window rate limiting HTTP server.
#[derive(Parser, Debug)]
#[command(name = "slidegate", version, about)]
struct Args {
    /// Path to a YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address, overriding the configuration
    #[arg(short, long)]
    addr: Option<SocketAddr>,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = SlidegateConfig::load(args.config.as_deref())?;
    if let Some(addr) = args.addr {
        config.server.http_addr = addr;
    }
    if args.log_json {
        config.logging.json = true;
    }

    init_tracing(&config.logging);

    info!("Starting slidegate");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!(
        http_addr = %config.server.http_addr,
        layers = config.rate_limiting.layers.len(),
        "Configuration loaded"
    );

    let server = HttpServer::from_config(&config)?;
    server.serve_with_shutdown(shutdown_signal()).await?;

    info!("slidegate stopped");
    Ok(())
}

/// `RUST_LOG` wins over the configured level when set.
fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true);

    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
