//! Point-in-time reads of the authentication catalog.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::principal::Principal;

/// Immutable set of principals captured in one poll.
///
/// Principals are keyed by username, so two snapshots with the same content
/// compare equal regardless of the order the catalog returned rows in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    taken_at: DateTime<Utc>,
    principals: BTreeMap<String, Principal>,
}

impl Snapshot {
    /// Snapshot with no principals.
    pub fn empty() -> Self {
        Self {
            taken_at: Utc::now(),
            principals: BTreeMap::new(),
        }
    }

    /// Build a snapshot from already-validated principals.
    pub fn new(taken_at: DateTime<Utc>, principals: BTreeMap<String, Principal>) -> Self {
        Self {
            taken_at,
            principals,
        }
    }

    /// Build a snapshot taken now. Later duplicates replace earlier ones.
    pub fn from_principals(principals: impl IntoIterator<Item = Principal>) -> Self {
        let principals = principals
            .into_iter()
            .map(|p| (p.username.clone(), p))
            .collect();
        Self::new(Utc::now(), principals)
    }

    pub fn taken_at(&self) -> DateTime<Utc> {
        self.taken_at
    }

    pub fn get(&self, username: &str) -> Option<&Principal> {
        self.principals.get(username)
    }

    pub fn contains(&self, username: &str) -> bool {
        self.principals.contains_key(username)
    }

    pub fn len(&self) -> usize {
        self.principals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.principals.is_empty()
    }

    /// Principals in username order.
    pub fn iter(&self) -> impl Iterator<Item = &Principal> {
        self.principals.values()
    }

    /// Whether both snapshots describe the same catalog state.
    ///
    /// Ignores capture and observation timestamps.
    pub fn same_content(&self, other: &Snapshot) -> bool {
        self.principals.len() == other.principals.len()
            && self.principals.iter().all(|(name, p)| {
                other
                    .principals
                    .get(name)
                    .is_some_and(|o| !p.differs_from(o))
            })
    }
}

impl Default for Snapshot {
    fn default() -> Self {
        Self::empty()
    }
}
