//! Applies deltas to the proxy's credential file.
//!
//! The file is treated as a patch target: entries for roles that never
//! appear in a delta (an admin user added by hand, say) are preserved.

pub mod format;
pub mod writer;

use std::path::{Path, PathBuf};

pub use format::{
    parse_auth_file, parse_line, render_auth_file, render_entry, AuthFileEntry, AuthMap,
    LineError, ParsedAuthFile, AUTH_FILE_HEADER,
};
pub use writer::{backup_file, prune_backups, write_atomically, AUTH_FILE_MODE};

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::models::{Delta, EncryptionScheme, Principal};

/// Result of applying a delta.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The file was rewritten.
    Updated { upserted: usize, removed: usize },
    /// The resulting entries equal the current ones; nothing was written.
    NoOp,
}

impl SyncOutcome {
    pub fn is_updated(&self) -> bool {
        matches!(self, SyncOutcome::Updated { .. })
    }
}

/// Why an added or modified principal produced no entry change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    EmptyHash,
    SchemeMismatch(Option<EncryptionScheme>),
}

impl SkipReason {
    /// Error describing a wrong-scheme skip, if this is one.
    pub fn to_error(&self, username: &str, expected: EncryptionScheme) -> Option<SyncError> {
        match self {
            SkipReason::EmptyHash => None,
            SkipReason::SchemeMismatch(_) => Some(SyncError::SchemeMismatch {
                username: username.to_string(),
                expected,
            }),
        }
    }
}

/// Entries a delta produces, before anything is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncPlan {
    pub entries: AuthMap,
    pub skipped: Vec<(String, SkipReason)>,
}

/// Compute the entries that result from applying `delta` to `current`.
pub fn plan(current: &AuthMap, delta: &Delta, scheme: EncryptionScheme) -> SyncPlan {
    let mut entries = current.clone();
    let mut skipped = Vec::new();

    for username in &delta.deleted {
        entries.remove(username);
    }

    for principal in delta.upserts() {
        match decide(principal, scheme) {
            Ok(Some(hash)) => {
                entries.insert(principal.username.clone(), hash.to_string());
            }
            Ok(None) => {
                entries.remove(&principal.username);
            }
            Err(reason) => skipped.push((principal.username.clone(), reason)),
        }
    }

    SyncPlan { entries, skipped }
}

/// `Ok(Some(hash))` to upsert, `Ok(None)` to remove, `Err` to leave as is.
fn decide(principal: &Principal, scheme: EncryptionScheme) -> Result<Option<&str>, SkipReason> {
    if !principal.can_login {
        return Ok(None);
    }
    if !principal.has_hash() {
        return Err(SkipReason::EmptyHash);
    }
    if !scheme.matches(&principal.hash) {
        return Err(SkipReason::SchemeMismatch(principal.scheme()));
    }
    Ok(Some(&principal.hash))
}

fn count_changes(before: &AuthMap, after: &AuthMap) -> (usize, usize) {
    let upserted = after
        .iter()
        .filter(|(user, hash)| before.get(*user) != Some(*hash))
        .count();
    let removed = before.keys().filter(|user| !after.contains_key(*user)).count();
    (upserted, removed)
}

/// Keeps the auth file in step with catalog deltas.
#[derive(Debug, Clone)]
pub struct AuthFileSynchronizer {
    path: PathBuf,
    scheme: EncryptionScheme,
    owner: Option<String>,
    backup_dir: PathBuf,
    backup_retention: usize,
}

impl AuthFileSynchronizer {
    pub fn new(path: impl Into<PathBuf>, scheme: EncryptionScheme) -> Self {
        let path = path.into();
        let backup_dir = path
            .parent()
            .map(|p| p.join("backups"))
            .unwrap_or_else(|| PathBuf::from("backups"));
        Self {
            path,
            scheme,
            owner: None,
            backup_dir,
            backup_retention: 10,
        }
    }

    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            path: config.auth_file.clone(),
            scheme: config.scheme,
            owner: config.auth_file_owner.clone(),
            backup_dir: config.backup_dir.clone(),
            backup_retention: config.backup_retention,
        }
    }

    pub fn with_backups(mut self, backup_dir: impl Into<PathBuf>, retention: usize) -> Self {
        self.backup_dir = backup_dir.into();
        self.backup_retention = retention;
        self
    }

    pub fn with_owner(mut self, owner: Option<String>) -> Self {
        self.owner = owner;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn scheme(&self) -> EncryptionScheme {
        self.scheme
    }

    /// Current entries. A missing file reads as empty.
    pub fn read_entries(&self) -> SyncResult<AuthMap> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(AuthMap::new()),
            Err(source) => {
                return Err(SyncError::AuthFileRead {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        let parsed = parse_auth_file(&contents);
        for (line, err) in &parsed.malformed {
            tracing::warn!(
                "Skipping malformed line {} in {}: {}",
                line,
                self.path.display(),
                err
            );
        }
        Ok(parsed.entries)
    }

    /// Apply `delta` to the auth file.
    ///
    /// The file is rewritten only when the resulting entries differ from the
    /// current ones.
    pub fn apply(&self, delta: &Delta) -> SyncResult<SyncOutcome> {
        let current = self.read_entries()?;
        let plan = plan(&current, delta, self.scheme);

        for (username, reason) in &plan.skipped {
            match (reason, reason.to_error(username, self.scheme)) {
                (SkipReason::SchemeMismatch(found), Some(err)) => tracing::warn!(
                    category = %err.category(),
                    found = found.map(|s| s.as_str()).unwrap_or("empty"),
                    "{}, leaving auth file entry untouched",
                    err
                ),
                _ => tracing::warn!(
                    principal = %username,
                    "No hash available, leaving auth file entry untouched"
                ),
            }
        }

        self.replace_if_changed(&current, &plan.entries)
    }

    /// Insert or replace one entry regardless of scheme. Used by bootstrap.
    pub fn upsert_entry(&self, username: &str, hash: &str) -> SyncResult<SyncOutcome> {
        let current = self.read_entries()?;
        let mut next = current.clone();
        next.insert(username.to_string(), hash.to_string());
        self.replace_if_changed(&current, &next)
    }

    fn replace_if_changed(&self, current: &AuthMap, next: &AuthMap) -> SyncResult<SyncOutcome> {
        if current == next {
            tracing::debug!("Auth file {} already up to date", self.path.display());
            return Ok(SyncOutcome::NoOp);
        }

        self.backup();
        write_atomically(&self.path, &render_auth_file(next), self.owner.as_deref())?;

        let (upserted, removed) = count_changes(current, next);
        tracing::info!(
            "Rewrote {} ({} upserted, {} removed, {} entries)",
            self.path.display(),
            upserted,
            removed,
            next.len()
        );
        Ok(SyncOutcome::Updated { upserted, removed })
    }

    /// Back up the current file and prune old backups. Never fails the write.
    fn backup(&self) {
        match backup_file(&self.path, &self.backup_dir) {
            Ok(Some(path)) => tracing::debug!("Backed up auth file to {}", path.display()),
            Ok(None) => {}
            Err(e) => {
                tracing::warn!("Auth file backup failed, continuing: {}", e);
                return;
            }
        }

        let file_name = match self.path.file_name() {
            Some(name) => name.to_string_lossy().to_string(),
            None => return,
        };
        if let Err(e) = prune_backups(&self.backup_dir, &file_name, self.backup_retention) {
            tracing::warn!("Pruning auth file backups failed: {}", e);
        }
    }
}
