//! Common test utilities for integration tests.
//!
//! [`TestHarness`] wires a temporary directory, a [`MockCatalog`], a snapshot
//! store and a [`MockServiceController`] into a config and a monitor loop.
//!
//! # Example
//!
//! ```ignore
//! let h = TestHarness::new();
//! h.catalog.create_role("alice", Some("pw"), true);
//! let report = h.run_cycle().await;
//! assert!(h.auth_entries().contains_key("alice"));
//! ```

#![allow(dead_code)]

use std::sync::Arc;

use pgbsync::adapters::mock::{InMemorySnapshotStore, MockCatalog, MockServiceController};
use pgbsync::adapters::FileSnapshotStore;
use pgbsync::authfile::{parse_auth_file, AuthMap};
use pgbsync::cli::Services;
use pgbsync::config::SyncConfig;
use pgbsync::monitor::{CycleReport, MonitorLoop};
use pgbsync::traits::SnapshotStore;
use tempfile::TempDir;

/// Everything one scenario needs, rooted in a fresh temporary directory.
pub struct TestHarness {
    pub dir: TempDir,
    pub config: SyncConfig,
    pub catalog: MockCatalog,
    pub store: Arc<dyn SnapshotStore>,
    pub service: MockServiceController,
}

impl TestHarness {
    /// Harness with an in-memory snapshot store and no connection retries.
    pub fn new() -> Self {
        Self::with_store(|_| Arc::new(InMemorySnapshotStore::new()))
    }

    /// Harness persisting snapshots under the temporary state directory.
    pub fn with_file_store() -> Self {
        Self::with_store(|config| Arc::new(FileSnapshotStore::from_config(config)))
    }

    fn with_store<F>(make_store: F) -> Self
    where
        F: FnOnce(&SyncConfig) -> Arc<dyn SnapshotStore>,
    {
        let dir = TempDir::new().expect("temp dir");
        let config = SyncConfig::rooted_at(dir.path()).with_retry(1, 0);
        let store = make_store(&config);
        Self {
            dir,
            config,
            catalog: MockCatalog::new(),
            store,
            service: MockServiceController::new(),
        }
    }

    pub fn services(&self) -> Services {
        Services::new(
            Arc::new(self.catalog.clone()),
            self.store.clone(),
            Arc::new(self.service.clone()),
        )
    }

    pub fn monitor(&self) -> MonitorLoop {
        MonitorLoop::new(
            &self.config,
            Arc::new(self.catalog.clone()),
            self.store.clone(),
            Arc::new(self.service.clone()),
        )
        .expect("monitor loop")
    }

    /// Run one cycle with a fresh monitor loop.
    pub async fn run_cycle(&self) -> CycleReport {
        self.monitor().run_cycle().await
    }

    pub fn auth_file_contents(&self) -> String {
        std::fs::read_to_string(&self.config.auth_file).unwrap_or_default()
    }

    /// Parsed auth file entries; empty when the file does not exist.
    pub fn auth_entries(&self) -> AuthMap {
        parse_auth_file(&self.auth_file_contents()).entries
    }
}
