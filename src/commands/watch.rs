//! Watch command implementation.
//!
//! Runs a background monitor whose listener prints every refresh until a
//! shutdown signal arrives or the requested duration elapses.

use std::time::Duration;
use tokio::signal;
use tracing::{info, warn};

use herakles_proc_load_monitor::{BackgroundMonitor, Config, ConfigFormat};

use super::UsageRecord;

pub async fn command_watch(
    config: &Config,
    duration_secs: Option<u64>,
    format: ConfigFormat,
) -> anyhow::Result<()> {
    let monitor = BackgroundMonitor::with_provider(config.refresh_interval()?, config.provider())?;

    monitor.on_refresh(move |cpu, memory| {
        match UsageRecord::now(cpu, memory).render(format) {
            Ok(line) => println!("{line}"),
            Err(e) => warn!("Failed to render usage record: {}", e),
        }
    })?;
    monitor.start()?;

    let deadline = async {
        match duration_secs {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        _ = shutdown_signal() => {}
        _ = deadline => {
            info!("Watch duration elapsed");
        }
    }

    // stop() joins the worker thread
    tokio::task::spawn_blocking(move || monitor.stop()).await?;
    info!("Watch finished");
    Ok(())
}

/// Completes on SIGINT (Ctrl+C) or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
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
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C), shutting down gracefully...");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down gracefully...");
        }
    }
}
