//! Lifecycle passthrough for the daemon's own service unit.

use crate::config::SyncConfig;
use crate::traits::ServiceAction;

use super::Services;

/// Handle `start`, `stop`, `restart` and `status`.
///
/// Prints the service manager's output and exits 0 on success, 1 otherwise.
pub async fn handle_service_command(
    action: ServiceAction,
    config: &SyncConfig,
    services: &Services,
) -> u8 {
    let unit = config.daemon_service.as_str();
    match services.service.run(action, unit).await {
        Ok(output) => {
            print!("{}", output.stdout);
            eprint!("{}", output.stderr);
            if output.success {
                0
            } else {
                eprintln!("Error: {} {} failed: {}", action, unit, output.describe());
                1
            }
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}
