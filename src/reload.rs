//! Getting the proxy to adopt a rewritten auth file.

use std::fmt;

use crate::error::{SyncError, SyncResult};
use crate::traits::{ServiceAction, ServiceController};

/// How the proxy picked up the new file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadOutcome {
    Reloaded,
    Restarted,
}

impl fmt::Display for ReloadOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReloadOutcome::Reloaded => f.write_str("reloaded"),
            ReloadOutcome::Restarted => f.write_str("restarted"),
        }
    }
}

/// Signals the proxy: one graceful reload, then at most one restart.
#[derive(Debug, Clone)]
pub struct ReloadCoordinator {
    unit: String,
}

impl ReloadCoordinator {
    pub fn new(unit: impl Into<String>) -> Self {
        Self { unit: unit.into() }
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    pub async fn reload(&self, service: &dyn ServiceController) -> SyncResult<ReloadOutcome> {
        let reload_failure = match service.run(ServiceAction::Reload, &self.unit).await {
            Ok(out) if out.success => {
                tracing::info!("Reloaded {}", self.unit);
                return Ok(ReloadOutcome::Reloaded);
            }
            Ok(out) => out.describe(),
            Err(e) => e.to_string(),
        };

        tracing::warn!(
            stage = "reloading",
            "Reload of {} failed ({}), restarting",
            self.unit,
            reload_failure
        );

        let restart_failure = match service.run(ServiceAction::Restart, &self.unit).await {
            Ok(out) if out.success => {
                tracing::info!("Restarted {}", self.unit);
                return Ok(ReloadOutcome::Restarted);
            }
            Ok(out) => out.describe(),
            Err(e) => e.to_string(),
        };

        Err(SyncError::Reload {
            message: format!(
                "reload of {} failed ({}); restart failed ({})",
                self.unit, reload_failure, restart_failure
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::mock::MockServiceController;

    #[tokio::test]
    async fn test_reload_succeeds() {
        let service = MockServiceController::new();
        let outcome = ReloadCoordinator::new("pgbouncer")
            .reload(&service)
            .await
            .unwrap();
        assert_eq!(outcome, ReloadOutcome::Reloaded);
        assert_eq!(
            service.calls(),
            vec![(ServiceAction::Reload, "pgbouncer".to_string())]
        );
    }

    #[tokio::test]
    async fn test_falls_back_to_one_restart() {
        let service = MockServiceController::new();
        service.fail_action(ServiceAction::Reload, 1, "not running");
        let outcome = ReloadCoordinator::new("pgbouncer")
            .reload(&service)
            .await
            .unwrap();
        assert_eq!(outcome, ReloadOutcome::Restarted);
        assert_eq!(
            service.actions(),
            vec![ServiceAction::Reload, ServiceAction::Restart]
        );
    }

    #[tokio::test]
    async fn test_both_fail_without_further_retry() {
        let service = MockServiceController::new();
        service.fail_action(ServiceAction::Reload, 1, "bad config");
        service.fail_action(ServiceAction::Restart, 1, "bad config");
        let err = ReloadCoordinator::new("pgbouncer")
            .reload(&service)
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Reload { .. }));
        assert_eq!(service.actions().len(), 2);
    }

    #[tokio::test]
    async fn test_unavailable_manager() {
        let service = MockServiceController::new();
        service.set_unavailable(true);
        let err = ReloadCoordinator::new("pgbouncer")
            .reload(&service)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("service manager not found"));
    }
}
