//! Authentication catalog port.
//!
//! Abstracts the handful of catalog operations the sync pipeline needs so the
//! snapshotter and hash extractor can be exercised without a live server.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::SyncResult;

/// One role as read from the catalog, before normalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogRow {
    pub username: String,
    /// Stored secret; `None` when the role has no password.
    #[serde(default)]
    pub hash: Option<String>,
    pub can_login: bool,
    /// Expiry; infinite and absent expiries are both `None`.
    #[serde(default)]
    pub valid_until: Option<DateTime<Utc>>,
}

impl CatalogRow {
    pub fn new(username: impl Into<String>, hash: Option<&str>, can_login: bool) -> Self {
        Self {
            username: username.into(),
            hash: hash.map(str::to_string),
            can_login,
            valid_until: None,
        }
    }

    pub fn with_valid_until(mut self, valid_until: Option<DateTime<Utc>>) -> Self {
        self.valid_until = valid_until;
        self
    }
}

/// Operations against the database's authentication catalog.
///
/// Read operations never change catalog state. `set_default_scheme` and
/// `reset_credential` are privileged mutations used only by the self-healing
/// extraction step.
#[async_trait]
pub trait CatalogClient: Send + Sync {
    /// Verify the catalog is reachable.
    async fn ping(&self) -> SyncResult<()>;

    /// All eligible roles as one JSON array of [`CatalogRow`] objects.
    ///
    /// Roles matching any of `excluded_patterns` (regexes) and the
    /// `metrics_account` are filtered server-side.
    async fn fetch_principals_json(
        &self,
        excluded_patterns: &[String],
        metrics_account: Option<&str>,
    ) -> SyncResult<String>;

    /// Every role, one row each, unfiltered.
    async fn fetch_principal_rows(&self) -> SyncResult<Vec<CatalogRow>>;

    /// Stored hash of one role from `pg_authid`.
    ///
    /// `Ok(None)` when the role does not exist or has no password.
    async fn read_stored_hash(&self, username: &str) -> SyncResult<Option<String>>;

    /// Stored hash of one role through the `pg_shadow` view.
    async fn read_shadow_hash(&self, username: &str) -> SyncResult<Option<String>>;

    /// Export one role's entry in auth file format to `dest`.
    async fn export_entry(&self, username: &str, dest: &Path) -> SyncResult<()>;

    /// Current value of `password_encryption`.
    async fn default_scheme(&self) -> SyncResult<String>;

    /// Set `password_encryption` catalog-wide and reload the server config.
    async fn set_default_scheme(&self, setting: &str) -> SyncResult<()>;

    /// Re-hash a role's password under `setting` by reapplying the plaintext.
    async fn reset_credential(&self, username: &str, plaintext: &str, setting: &str)
        -> SyncResult<()>;
}
