//! One-shot `sync` command.

use crate::config::SyncConfig;
use crate::monitor::{log_report, CycleReport, MonitorLoop};

use super::Services;

/// Run exactly one cycle and report it.
pub async fn run_single_cycle(config: &SyncConfig, services: &Services) -> Result<CycleReport, u8> {
    let mut monitor = match MonitorLoop::new(
        config,
        services.catalog.clone(),
        services.store.clone(),
        services.service.clone(),
    ) {
        Ok(monitor) => monitor,
        Err(e) => {
            eprintln!("Error: {}", e);
            return Err(e.exit_code());
        }
    };

    let report = monitor.run_cycle().await;
    log_report(&report);
    Ok(report)
}

/// Handle the `sync` command.
///
/// Exit code is 0 for a clean cycle, 1 when the cycle was skipped, failed
/// in an operational stage or could not reload the proxy, and 2 for
/// internal errors.
pub async fn handle_sync_command(config: &SyncConfig, services: &Services) -> u8 {
    match run_single_cycle(config, services).await {
        Ok(report) => {
            println!("{}", report.summary());
            report.exit_code()
        }
        Err(code) => code,
    }
}
