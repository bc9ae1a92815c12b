//! The polling loop.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::Instrument;
use uuid::Uuid;

use super::state::{CycleFailure, CycleReport, CycleSkip, MonitorState, MonitorStatus};
use crate::authfile::{AuthFileSynchronizer, SyncOutcome};
use crate::config::SyncConfig;
use crate::delta::compute_delta;
use crate::error::{ErrorContext, SyncError, SyncResult};
use crate::lock::SyncLock;
use crate::reload::ReloadCoordinator;
use crate::snapshot::StateSnapshotter;
use crate::traits::{CatalogClient, ServiceController, SnapshotStore};

/// Runs snapshot, diff, sync and reload on a fixed interval.
pub struct MonitorLoop {
    catalog: Arc<dyn CatalogClient>,
    store: Arc<dyn SnapshotStore>,
    service: Arc<dyn ServiceController>,
    snapshotter: StateSnapshotter,
    synchronizer: AuthFileSynchronizer,
    reloader: ReloadCoordinator,
    lock_path: PathBuf,
    interval: Duration,
    status: MonitorStatus,
}

impl MonitorLoop {
    pub fn new(
        config: &SyncConfig,
        catalog: Arc<dyn CatalogClient>,
        store: Arc<dyn SnapshotStore>,
        service: Arc<dyn ServiceController>,
    ) -> SyncResult<Self> {
        Ok(Self {
            catalog,
            store,
            service,
            snapshotter: StateSnapshotter::from_config(config)?,
            synchronizer: AuthFileSynchronizer::from_config(config),
            reloader: ReloadCoordinator::new(&config.proxy_service),
            lock_path: config.lock_path(),
            interval: config.interval(),
            status: MonitorStatus::new(config.enabled),
        })
    }

    pub fn status(&self) -> &MonitorStatus {
        &self.status
    }

    fn enter(&mut self, report: &mut CycleReport, state: MonitorState) {
        self.status.transition(state);
        report.states.push(state);
    }

    fn fail(
        &mut self,
        report: &mut CycleReport,
        stage: MonitorState,
        error: SyncError,
    ) {
        let error = error.with_context(
            ErrorContext::new(stage.as_str()).with_cycle_id(report.cycle_id.as_str()),
        );
        tracing::error!(stage = %stage, "Cycle abandoned: {}", error);
        report.failure = Some(CycleFailure::new(stage, &error));
        self.enter(report, MonitorState::Sleeping);
    }

    /// Run exactly one cycle under the sync lock.
    ///
    /// Never returns an error: failures are recorded in the report and the
    /// cycle ends in `Sleeping`. A disabled config skips the cycle without
    /// touching the catalog.
    pub async fn run_cycle(&mut self) -> CycleReport {
        let cycle_id = Uuid::new_v4().to_string();

        if !self.status.enabled {
            self.status.transition(MonitorState::Sleeping);
            return CycleReport::skipped(cycle_id, CycleSkip::Disabled);
        }

        let _lock = match SyncLock::try_acquire(&self.lock_path) {
            Ok(Some(lock)) => lock,
            Ok(None) => {
                tracing::info!(cycle = %cycle_id, "Another sync holds the lock, skipping this tick");
                let report = CycleReport::skipped(cycle_id, CycleSkip::LockBusy);
                self.status.record(&report);
                return report;
            }
            Err(e) => {
                let mut report = CycleReport::new(cycle_id);
                self.fail(&mut report, MonitorState::Idle, e);
                self.status.record(&report);
                return report;
            }
        };

        let span = tracing::info_span!("cycle", cycle = %cycle_id);
        let mut report = CycleReport::new(cycle_id);
        self.recover_interrupted_cycle();
        self.run_stages(&mut report).instrument(span).await;
        self.status.record(&report);
        report
    }

    /// Drop a delta left staged by a cycle that stopped mid-sync.
    ///
    /// The baseline was not committed by that cycle, so the same changes are
    /// recomputed from the catalog.
    fn recover_interrupted_cycle(&self) {
        match self.store.load_staged_delta() {
            Ok(Some(delta)) => {
                tracing::warn!(
                    "Previous cycle stopped while applying {}, recomputing from the catalog",
                    delta.counts()
                );
                self.discard_staged_delta();
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!("Unreadable staged delta, discarding: {}", e);
                self.discard_staged_delta();
            }
        }
    }

    async fn run_stages(&mut self, report: &mut CycleReport) {
        self.enter(report, MonitorState::Snapshotting);
        let snapshot = match self.snapshotter.capture(self.catalog.as_ref()).await {
            Ok(snapshot) => snapshot,
            Err(e) => return self.fail(report, MonitorState::Snapshotting, e),
        };
        tracing::debug!("Captured {} principals", snapshot.len());

        self.enter(report, MonitorState::Diffing);
        let baseline = match self.store.load_baseline() {
            Ok(baseline) => baseline,
            Err(e) => return self.fail(report, MonitorState::Diffing, e),
        };
        let delta = compute_delta(baseline.as_ref(), &snapshot);
        report.delta = Some(delta.counts());

        if delta.is_empty() {
            tracing::debug!("No catalog changes");
            if let Err(e) = self.store.commit(&snapshot) {
                return self.fail(report, MonitorState::Diffing, e);
            }
            return self.enter(report, MonitorState::Sleeping);
        }
        tracing::info!("Catalog changed: {}", delta.counts());

        self.enter(report, MonitorState::Syncing);
        if let Err(e) = self.store.stage_delta(&delta) {
            return self.fail(report, MonitorState::Syncing, e);
        }
        let outcome = self.synchronizer.apply(&delta);
        self.discard_staged_delta();
        let outcome = match outcome {
            Ok(outcome) => outcome,
            // Baseline stays put so the same delta is retried next tick.
            Err(e) => return self.fail(report, MonitorState::Syncing, e),
        };
        report.sync = Some(outcome);

        let commit_result = self.store.commit(&snapshot);

        if let SyncOutcome::Updated { .. } = outcome {
            self.enter(report, MonitorState::Reloading);
            match self.reloader.reload(self.service.as_ref()).await {
                Ok(reload) => report.reload = Some(reload),
                Err(e) => {
                    tracing::error!(stage = "reloading", "{}", e);
                    report.reload_error = Some(e.to_string());
                }
            }
        }

        if let Err(e) = commit_result {
            return self.fail(report, MonitorState::Syncing, e);
        }
        self.enter(report, MonitorState::Sleeping);
    }

    fn discard_staged_delta(&self) {
        if let Err(e) = self.store.discard_delta() {
            tracing::warn!("Could not remove staged delta: {}", e);
        }
    }

    /// Run cycles every interval until `shutdown` resolves.
    ///
    /// Shutdown is only observed between cycles; it cuts the sleep short.
    /// Returns the number of ticks taken.
    pub async fn run_until<F>(&mut self, shutdown: F) -> u64
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        tracing::info!(
            "Monitor loop started (interval: {}s)",
            self.interval.as_secs()
        );

        let mut ticks = 0;
        loop {
            self.status.transition(MonitorState::Idle);
            ticks += 1;

            let report = self.run_cycle().await;
            log_report(&report);

            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("Shutdown requested, monitor loop stopping");
                    break;
                }
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
        ticks
    }
}

/// Log a finished cycle at a level matching its outcome.
pub fn log_report(report: &CycleReport) {
    if report.failure.is_some() {
        tracing::warn!(cycle = %report.cycle_id, "Cycle {}", report.summary());
    } else if report.sync.is_some() || report.reload_error.is_some() {
        tracing::info!(cycle = %report.cycle_id, "Cycle done: {}", report.summary());
    } else {
        tracing::debug!(cycle = %report.cycle_id, "Cycle done: {}", report.summary());
    }
}
