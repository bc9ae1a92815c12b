//! `--daemon`: run the monitor loop until signalled.

use std::future::Future;

use tokio::signal::unix::{signal, SignalKind};

use crate::config::SyncConfig;
use crate::monitor::MonitorLoop;

use super::Services;

/// Resolves on the first SIGTERM or SIGINT.
///
/// Falls back to Ctrl-C only when the SIGTERM handler cannot be installed.
pub async fn shutdown_signal() {
    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = term.recv() => tracing::info!("Received SIGTERM"),
                _ = tokio::signal::ctrl_c() => tracing::info!("Received SIGINT"),
            }
        }
        Err(e) => {
            tracing::warn!("Cannot install SIGTERM handler: {}", e);
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Received SIGINT");
        }
    }
}

/// Handle the `--daemon` command.
///
/// Cycle failures never stop the loop; only `shutdown` does. Exits 0 after
/// a clean shutdown.
pub async fn handle_daemon_command<F>(config: &SyncConfig, services: &Services, shutdown: F) -> u8
where
    F: Future<Output = ()>,
{
    let mut monitor = match MonitorLoop::new(
        config,
        services.catalog.clone(),
        services.store.clone(),
        services.service.clone(),
    ) {
        Ok(monitor) => monitor,
        Err(e) => {
            eprintln!("Error: {}", e);
            return e.exit_code();
        }
    };

    if !config.enabled {
        tracing::warn!("Sync is disabled in the config, the daemon will idle");
    }

    let ticks = monitor.run_until(shutdown).await;
    let status = monitor.status();
    tracing::info!(
        "Monitor loop stopped after {} tick(s), {} consecutive failure(s)",
        ticks,
        status.consecutive_failures
    );
    0
}
