//! In-memory snapshot store for testing.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{SyncError, SyncResult};
use crate::models::{Delta, Snapshot};
use crate::traits::SnapshotStore;

#[derive(Debug, Default)]
struct Slots {
    baseline: Option<Snapshot>,
    previous: Option<Snapshot>,
    staged: Option<Delta>,
    commits: u32,
    commit_should_fail: bool,
}

/// In-memory [`SnapshotStore`].
///
/// Clones share the same slots, so a test can keep a handle after moving one
/// into the monitor loop.
#[derive(Debug, Clone, Default)]
pub struct InMemorySnapshotStore {
    slots: Arc<Mutex<Slots>>,
}

impl InMemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store starting from an existing baseline.
    pub fn with_baseline(snapshot: Snapshot) -> Self {
        let store = Self::new();
        store.lock().baseline = Some(snapshot);
        store
    }

    fn lock(&self) -> MutexGuard<'_, Slots> {
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Configure whether commit should fail.
    pub fn set_commit_should_fail(&self, should_fail: bool) {
        self.lock().commit_should_fail = should_fail;
    }

    /// Number of successful commits.
    pub fn commits(&self) -> u32 {
        self.lock().commits
    }
}

impl SnapshotStore for InMemorySnapshotStore {
    fn load_baseline(&self) -> SyncResult<Option<Snapshot>> {
        Ok(self.lock().baseline.clone())
    }

    fn load_previous(&self) -> SyncResult<Option<Snapshot>> {
        Ok(self.lock().previous.clone())
    }

    fn commit(&self, snapshot: &Snapshot) -> SyncResult<()> {
        let mut slots = self.lock();
        if slots.commit_should_fail {
            return Err(SyncError::state("memory://snapshot", "mock commit failure"));
        }
        slots.previous = slots.baseline.replace(snapshot.clone());
        slots.commits += 1;
        Ok(())
    }

    fn clear(&self) -> SyncResult<()> {
        let mut slots = self.lock();
        slots.baseline = None;
        slots.previous = None;
        Ok(())
    }

    fn stage_delta(&self, delta: &Delta) -> SyncResult<()> {
        self.lock().staged = Some(delta.clone());
        Ok(())
    }

    fn load_staged_delta(&self) -> SyncResult<Option<Delta>> {
        Ok(self.lock().staged.clone())
    }

    fn discard_delta(&self) -> SyncResult<()> {
        self.lock().staged = None;
        Ok(())
    }
}
