//! Monitor loop states and per-cycle reports.

use chrono::{DateTime, Utc};
use std::fmt;
use std::time::Instant;

use crate::authfile::SyncOutcome;
use crate::error::{ErrorCategory, SyncError};
use crate::models::DeltaCounts;
use crate::reload::ReloadOutcome;

/// Where the monitor loop is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MonitorState {
    Idle,
    Snapshotting,
    Diffing,
    Syncing,
    Reloading,
    Sleeping,
}

impl MonitorState {
    pub fn as_str(&self) -> &'static str {
        match self {
            MonitorState::Idle => "idle",
            MonitorState::Snapshotting => "snapshotting",
            MonitorState::Diffing => "diffing",
            MonitorState::Syncing => "syncing",
            MonitorState::Reloading => "reloading",
            MonitorState::Sleeping => "sleeping",
        }
    }
}

impl fmt::Display for MonitorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a tick did no work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleSkip {
    /// `enabled = false` in the config.
    Disabled,
    /// Another cycle holds the sync lock.
    LockBusy,
}

/// The stage a cycle was abandoned in and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleFailure {
    pub stage: MonitorState,
    pub category: ErrorCategory,
    pub message: String,
    pub exit_code: u8,
}

impl CycleFailure {
    pub fn new(stage: MonitorState, error: &SyncError) -> Self {
        Self {
            stage,
            category: error.category(),
            message: error.to_string(),
            exit_code: error.exit_code(),
        }
    }
}

/// What one monitor cycle did.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub cycle_id: String,
    pub started_at: DateTime<Utc>,
    /// States entered, in order.
    pub states: Vec<MonitorState>,
    pub delta: Option<DeltaCounts>,
    pub sync: Option<SyncOutcome>,
    pub reload: Option<ReloadOutcome>,
    /// Reload and restart both failed. Does not fail the cycle.
    pub reload_error: Option<String>,
    pub failure: Option<CycleFailure>,
    pub skipped: Option<CycleSkip>,
}

impl CycleReport {
    pub fn new(cycle_id: impl Into<String>) -> Self {
        Self {
            cycle_id: cycle_id.into(),
            started_at: Utc::now(),
            states: Vec::new(),
            delta: None,
            sync: None,
            reload: None,
            reload_error: None,
            failure: None,
            skipped: None,
        }
    }

    pub fn skipped(cycle_id: impl Into<String>, reason: CycleSkip) -> Self {
        let mut report = Self::new(cycle_id);
        report.skipped = Some(reason);
        report
    }

    /// The cycle ran to completion without failing a stage.
    pub fn succeeded(&self) -> bool {
        self.failure.is_none() && self.skipped.is_none()
    }

    pub fn visited(&self, state: MonitorState) -> bool {
        self.states.contains(&state)
    }

    /// Exit code for a one-shot `sync`.
    pub fn exit_code(&self) -> u8 {
        if let Some(failure) = &self.failure {
            return failure.exit_code;
        }
        if self.skipped.is_some() || self.reload_error.is_some() {
            return 1;
        }
        0
    }

    /// One-line human summary.
    pub fn summary(&self) -> String {
        if let Some(skip) = self.skipped {
            return match skip {
                CycleSkip::Disabled => "skipped: sync disabled".to_string(),
                CycleSkip::LockBusy => "skipped: another sync is in progress".to_string(),
            };
        }
        if let Some(failure) = &self.failure {
            return format!("failed while {}: {}", failure.stage, failure.message);
        }

        let mut parts = Vec::new();
        match self.delta {
            Some(counts) if counts.total() > 0 => parts.push(format!("delta {}", counts)),
            _ => parts.push("no catalog changes".to_string()),
        }
        match self.sync {
            Some(SyncOutcome::Updated { upserted, removed }) => {
                parts.push(format!("auth file updated ({} upserted, {} removed)", upserted, removed))
            }
            Some(SyncOutcome::NoOp) => parts.push("auth file unchanged".to_string()),
            None => {}
        }
        if let Some(reload) = self.reload {
            parts.push(format!("proxy {}", reload));
        }
        if let Some(err) = &self.reload_error {
            parts.push(format!("proxy reload failed: {}", err));
        }
        parts.join(", ")
    }
}

/// Long-lived status of the monitor loop.
#[derive(Debug)]
pub struct MonitorStatus {
    pub state: MonitorState,
    pub cycles: u64,
    pub consecutive_failures: u32,
    pub last_success: Option<Instant>,
    pub enabled: bool,
}

impl MonitorStatus {
    pub fn new(enabled: bool) -> Self {
        Self {
            state: MonitorState::Idle,
            cycles: 0,
            consecutive_failures: 0,
            last_success: None,
            enabled,
        }
    }

    pub fn transition(&mut self, state: MonitorState) {
        tracing::trace!("Monitor {} -> {}", self.state, state);
        self.state = state;
    }

    /// Record the end of a cycle.
    pub fn record(&mut self, report: &CycleReport) {
        self.cycles += 1;
        if report.failure.is_some() {
            self.consecutive_failures += 1;
        } else if report.skipped.is_none() {
            if self.consecutive_failures > 0 {
                tracing::info!(
                    "Sync recovered after {} failed cycle(s)",
                    self.consecutive_failures
                );
            }
            self.consecutive_failures = 0;
            self.last_success = Some(Instant::now());
        }
    }
}
