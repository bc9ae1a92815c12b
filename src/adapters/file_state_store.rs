//! File-backed snapshot store.
//!
//! Layout under the state directory:
//!
//! - `snapshot.json`: the baseline
//! - `snapshot.prev.json`: the baseline before the latest commit
//! - `delta.json`: the delta being applied, removed after each cycle
//!
//! Every file is written through a temporary file in the same directory and
//! renamed into place. A commit stages the new baseline before touching the
//! old one, so a failed commit leaves the previous baseline readable.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::models::{Delta, Snapshot};
use crate::traits::SnapshotStore;

/// [`SnapshotStore`] persisting JSON files in a state directory.
#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
    snapshot_path: PathBuf,
    previous_path: PathBuf,
    delta_path: PathBuf,
}

impl FileSnapshotStore {
    pub fn new(state_dir: &Path) -> Self {
        Self::from_config(&SyncConfig {
            state_dir: state_dir.to_path_buf(),
            ..SyncConfig::default()
        })
    }

    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            snapshot_path: config.snapshot_path(),
            previous_path: config.previous_snapshot_path(),
            delta_path: config.delta_path(),
        }
    }

    pub fn delta_path(&self) -> &Path {
        &self.delta_path
    }

    /// [`SnapshotStore::commit`] with a hook run on the staged baseline just
    /// before it replaces the current one. An error from the hook abandons
    /// the commit.
    pub(crate) fn commit_with<F>(&self, snapshot: &Snapshot, before_persist: F) -> SyncResult<()>
    where
        F: FnOnce(&Path) -> io::Result<()>,
    {
        let staged = stage_json(&self.snapshot_path, snapshot)?;

        if self.snapshot_path.exists() {
            // Link rather than rename: the baseline stays in place until the
            // new one lands.
            remove_if_exists(&self.previous_path)?;
            std::fs::hard_link(&self.snapshot_path, &self.previous_path).map_err(|e| {
                SyncError::state(&self.previous_path, format!("cannot rotate baseline: {}", e))
            })?;
        }

        before_persist(staged.path())
            .map_err(|e| SyncError::state(&self.snapshot_path, format!("cannot write: {}", e)))?;
        persist_json(staged, &self.snapshot_path)
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> SyncResult<Option<T>> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(SyncError::state(path, format!("cannot read: {}", e))),
    };
    serde_json::from_str(&contents)
        .map(Some)
        .map_err(|e| SyncError::state(path, format!("corrupt state file: {}", e)))
}

/// Write `value` to a synced temporary file next to `path`.
fn stage_json<T: Serialize>(path: &Path, value: &T) -> SyncResult<tempfile::NamedTempFile> {
    let dir = path
        .parent()
        .ok_or_else(|| SyncError::state(path, "state file has no parent directory"))?;
    std::fs::create_dir_all(dir)
        .map_err(|e| SyncError::state(dir, format!("cannot create state directory: {}", e)))?;

    let json = serde_json::to_vec_pretty(value)
        .map_err(|e| SyncError::state(path, format!("cannot serialize: {}", e)))?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .map_err(|e| SyncError::state(dir, format!("cannot create temp file: {}", e)))?;
    tmp.write_all(&json)
        .and_then(|_| tmp.as_file().sync_all())
        .map_err(|e| SyncError::state(path, format!("cannot write: {}", e)))?;
    Ok(tmp)
}

fn persist_json(tmp: tempfile::NamedTempFile, path: &Path) -> SyncResult<()> {
    tmp.persist(path)
        .map_err(|e| SyncError::state(path, format!("cannot replace: {}", e.error)))?;
    Ok(())
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> SyncResult<()> {
    persist_json(stage_json(path, value)?, path)
}

fn remove_if_exists(path: &Path) -> SyncResult<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(SyncError::state(path, format!("cannot remove: {}", e))),
    }
}

impl SnapshotStore for FileSnapshotStore {
    fn load_baseline(&self) -> SyncResult<Option<Snapshot>> {
        read_json(&self.snapshot_path)
    }

    fn load_previous(&self) -> SyncResult<Option<Snapshot>> {
        read_json(&self.previous_path)
    }

    fn commit(&self, snapshot: &Snapshot) -> SyncResult<()> {
        self.commit_with(snapshot, |_| Ok(()))
    }

    fn clear(&self) -> SyncResult<()> {
        remove_if_exists(&self.snapshot_path)?;
        remove_if_exists(&self.previous_path)
    }

    fn stage_delta(&self, delta: &Delta) -> SyncResult<()> {
        write_json(&self.delta_path, delta)
    }

    fn load_staged_delta(&self) -> SyncResult<Option<Delta>> {
        read_json(&self.delta_path)
    }

    fn discard_delta(&self) -> SyncResult<()> {
        remove_if_exists(&self.delta_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Principal;
    use tempfile::TempDir;

    fn snapshot(names: &[&str]) -> Snapshot {
        Snapshot::from_principals(
            names
                .iter()
                .map(|n| Principal::new(*n, format!("md5{:0>32}", n.len()), true)),
        )
    }

    #[test]
    fn test_empty_store() {
        let dir = TempDir::new().unwrap();
        let store = FileSnapshotStore::new(dir.path());
        assert!(store.load_baseline().unwrap().is_none());
        assert!(store.load_previous().unwrap().is_none());
        assert!(store.discard_delta().is_ok());
    }

    #[test]
    fn test_commit_rotates_baseline() {
        let dir = TempDir::new().unwrap();
        let store = FileSnapshotStore::new(&dir.path().join("state"));

        let first = snapshot(&["alice"]);
        let second = snapshot(&["alice", "bob"]);
        store.commit(&first).unwrap();
        store.commit(&second).unwrap();

        assert!(store.load_baseline().unwrap().unwrap().same_content(&second));
        assert!(store.load_previous().unwrap().unwrap().same_content(&first));
    }

    #[test]
    fn test_failed_commit_keeps_baseline() {
        let dir = TempDir::new().unwrap();
        let store = FileSnapshotStore::new(dir.path());
        let first = snapshot(&["alice", "dave"]);
        store.commit(&first).unwrap();

        let err = store
            .commit_with(&snapshot(&["alice"]), |_| {
                Err(io::Error::new(io::ErrorKind::Other, "no space left on device"))
            })
            .unwrap_err();

        assert!(err.to_string().contains("no space left"));
        assert!(store.load_baseline().unwrap().unwrap().same_content(&first));
        let leftovers = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftovers, 2, "only snapshot.json and snapshot.prev.json remain");
    }

    #[test]
    fn test_clear_forgets_both_slots() {
        let dir = TempDir::new().unwrap();
        let store = FileSnapshotStore::new(dir.path());
        store.commit(&snapshot(&["a"])).unwrap();
        store.commit(&snapshot(&["b"])).unwrap();
        store.clear().unwrap();
        assert!(store.load_baseline().unwrap().is_none());
        assert!(store.load_previous().unwrap().is_none());
    }

    #[test]
    fn test_staged_delta_lifecycle() {
        let dir = TempDir::new().unwrap();
        let store = FileSnapshotStore::new(dir.path());
        let mut delta = Delta::default();
        delta.deleted.insert("carol".to_string());

        store.stage_delta(&delta).unwrap();
        assert_eq!(store.load_staged_delta().unwrap(), Some(delta));
        store.discard_delta().unwrap();
        assert!(!store.delta_path().exists());
    }

    #[test]
    fn test_corrupt_baseline_is_state_error() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("snapshot.json"), "{not json").unwrap();
        let store = FileSnapshotStore::new(dir.path());
        let err = store.load_baseline().unwrap_err();
        assert!(err.to_string().contains("corrupt state file"));
    }
}
