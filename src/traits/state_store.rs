//! Snapshot persistence port.

use crate::error::SyncResult;
use crate::models::{Delta, Snapshot};

/// Two-slot snapshot store plus the ephemeral staged delta.
///
/// The baseline slot holds the latest committed snapshot; committing a new
/// one rotates the old baseline into the previous slot.
pub trait SnapshotStore: Send + Sync {
    /// The latest committed snapshot, if any.
    fn load_baseline(&self) -> SyncResult<Option<Snapshot>>;

    /// The baseline before the latest commit, if any.
    fn load_previous(&self) -> SyncResult<Option<Snapshot>>;

    /// Make `snapshot` the baseline, rotating the current one to previous.
    fn commit(&self, snapshot: &Snapshot) -> SyncResult<()>;

    /// Forget both slots so the next cycle treats every principal as added.
    fn clear(&self) -> SyncResult<()>;

    /// Persist the delta being applied in the current cycle.
    fn stage_delta(&self, delta: &Delta) -> SyncResult<()>;

    /// The staged delta, if a cycle stopped before discarding it.
    fn load_staged_delta(&self) -> SyncResult<Option<Delta>>;

    /// Remove the staged delta. Succeeds when none is staged.
    fn discard_delta(&self) -> SyncResult<()>;
}
