//! opsx-core: the core service daemon.
//!
//! Serves the `Core` RPC service over the transports selected by
//! `--server-mode`, and stops them together on SIGINT/SIGTERM.

use std::path::PathBuf;
use std::sync::LazyLock;

use clap::Parser;
use tracing::{error, info, warn};

use opsx::config::{ConfigSource, ServerFlags};
use opsx::{ServerHandle, UnionServer, logging};

static LONG_VERSION: LazyLock<String> = LazyLock::new(opsx::version::long_version);

/// opsx-core: one RPC service over gRPC, an HTTP gateway, or both.
#[derive(Parser)]
#[command(name = "opsx-core")]
#[command(version = opsx::PKG_VERSION, long_version = LONG_VERSION.as_str())]
#[command(about = "opsx core service")]
struct Args {
    /// Path to configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(flatten)]
    flags: ServerFlags,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Load and validate configuration before anything listens
    let loaded = ConfigSource::new("opsx-core", args.config).load(&args.flags)?;
    logging::init(&loaded.options.log)?;
    let cfg = loaded.options.config()?;

    info!(
        version = opsx::version_string(),
        built = opsx::version::BUILD_TIMESTAMP,
        config = ?loaded.path,
        mode = %cfg.server_mode,
        "opsx-core starting"
    );

    let server = UnionServer::new(cfg.clone()).await.inspect_err(|e| {
        error!(error = %e, "startup failed");
    })?;

    tokio::spawn(stop_on_signal(server.handle(), cfg.shutdown_timeout));

    server.run().await?;
    Ok(())
}

/// Wait for SIGINT or SIGTERM, then stop the server gracefully.
async fn stop_on_signal(handle: ServerHandle, timeout: std::time::Duration) {
    shutdown_signal().await;
    info!("shutdown signal received");
    match handle.graceful_stop(timeout).await {
        Ok(report) if report.is_clean() => {}
        Ok(report) => warn!(?report, "some bindings did not drain"),
        Err(e) => error!(error = %e, "graceful stop did not complete"),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
