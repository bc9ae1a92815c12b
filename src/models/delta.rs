//! Differences between two snapshots.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::principal::Principal;

/// Added, modified and deleted principals between two snapshots.
///
/// `modified` carries the principal as it appears in the newer snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Delta {
    pub added: BTreeMap<String, Principal>,
    pub modified: BTreeMap<String, Principal>,
    pub deleted: BTreeSet<String>,
}

/// Sizes of each delta set, for logging and reports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeltaCounts {
    pub added: usize,
    pub modified: usize,
    pub deleted: usize,
}

impl DeltaCounts {
    pub fn total(&self) -> usize {
        self.added + self.modified + self.deleted
    }
}

impl std::fmt::Display for DeltaCounts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "+{} ~{} -{}",
            self.added, self.modified, self.deleted
        )
    }
}

impl Delta {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.deleted.is_empty()
    }

    pub fn counts(&self) -> DeltaCounts {
        DeltaCounts {
            added: self.added.len(),
            modified: self.modified.len(),
            deleted: self.deleted.len(),
        }
    }

    /// Whether `username` appears in any of the three sets.
    pub fn contains(&self, username: &str) -> bool {
        self.added.contains_key(username)
            || self.modified.contains_key(username)
            || self.deleted.contains(username)
    }

    /// Added and modified principals, in username order within each set.
    pub fn upserts(&self) -> impl Iterator<Item = &Principal> {
        self.added.values().chain(self.modified.values())
    }
}
