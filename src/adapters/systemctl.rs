//! Service manager adapter invoking an external executable.

use async_trait::async_trait;

use crate::error::{SyncError, SyncResult};
use crate::traits::{ServiceAction, ServiceController, ServiceOutput};

/// [`ServiceController`] running `<manager> <action> <unit>`.
///
/// The manager defaults to `systemctl`; any executable with the same
/// argument convention (e.g. `service`-style wrappers) works.
#[derive(Debug, Clone)]
pub struct SystemctlController {
    manager: String,
}

impl SystemctlController {
    pub fn new(manager: impl Into<String>) -> Self {
        Self {
            manager: manager.into(),
        }
    }

    pub fn manager(&self) -> &str {
        &self.manager
    }
}

impl Default for SystemctlController {
    fn default() -> Self {
        Self::new("systemctl")
    }
}

#[async_trait]
impl ServiceController for SystemctlController {
    async fn run(&self, action: ServiceAction, unit: &str) -> SyncResult<ServiceOutput> {
        tracing::debug!("Running {} {} {}", self.manager, action, unit);

        let output = tokio::process::Command::new(&self.manager)
            .arg(action.as_str())
            .arg(unit)
            .stdin(std::process::Stdio::null())
            .output()
            .await
            .map_err(|e| SyncError::Service {
                action: action.to_string(),
                unit: unit.to_string(),
                message: format!("cannot run {}: {}", self.manager, e),
            })?;

        Ok(ServiceOutput {
            success: output.status.success(),
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
