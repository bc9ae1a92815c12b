//! In-memory authentication catalog for testing.
//!
//! Roles hold a stored hash produced by a deterministic fake hasher, so tests
//! can rotate passwords and flip the default scheme without a server. The
//! fake hashes have the same shape as real ones (`SCRAM-SHA-256$...`,
//! `md5` + 32 hex digits) and are recognized by [`EncryptionScheme::detect`].
//!
//! [`EncryptionScheme::detect`]: crate::models::EncryptionScheme::detect

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::authfile::render_entry;
use crate::error::{SyncError, SyncResult};
use crate::traits::{CatalogClient, CatalogRow};

#[derive(Debug, Clone)]
struct MockRole {
    hash: Option<String>,
    can_login: bool,
    valid_until: Option<DateTime<Utc>>,
}

#[derive(Debug)]
struct MockCatalogState {
    roles: BTreeMap<String, MockRole>,
    default_scheme: String,
    unreachable_for: u32,
    deny_privilege: bool,
    hide_direct_reads: bool,
    shadow_unavailable: bool,
    export_unavailable: bool,
    mutations_fail: bool,
    mutations: Vec<String>,
    fetch_calls: u32,
}

/// In-memory [`CatalogClient`] for testing.
///
/// # Example
///
/// ```ignore
/// use pgbsync::adapters::mock::MockCatalog;
///
/// let catalog = MockCatalog::new();
/// catalog.create_role("app", Some("s3cret"), true);
/// catalog.set_unreachable_for(2); // next two fetches fail with connectivity errors
/// ```
#[derive(Debug, Clone)]
pub struct MockCatalog {
    state: Arc<Mutex<MockCatalogState>>,
}

impl MockCatalog {
    /// Empty catalog defaulting to `scram-sha-256`.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockCatalogState {
                roles: BTreeMap::new(),
                default_scheme: "scram-sha-256".to_string(),
                unreachable_for: 0,
                deny_privilege: false,
                hide_direct_reads: false,
                shadow_unavailable: false,
                export_unavailable: false,
                mutations_fail: false,
                mutations: Vec::new(),
                fetch_calls: 0,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MockCatalogState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Deterministic stand-in for the server's password hashing.
    pub fn fake_hash(setting: &str, username: &str, plaintext: &str) -> String {
        let digest = hex::encode(Sha256::digest(
            format!("{}:{}:{}", setting, username, plaintext).as_bytes(),
        ));
        if setting == "md5" {
            format!("md5{}", &digest[..32])
        } else {
            format!(
                "SCRAM-SHA-256$4096:{}${}:{}",
                &digest[..16],
                &digest[16..40],
                &digest[40..]
            )
        }
    }

    /// Create a role, hashing `plaintext` with the current default scheme.
    pub fn create_role(&self, username: &str, plaintext: Option<&str>, can_login: bool) {
        let mut state = self.lock();
        let hash = plaintext.map(|p| Self::fake_hash(&state.default_scheme, username, p));
        state.roles.insert(
            username.to_string(),
            MockRole {
                hash,
                can_login,
                valid_until: None,
            },
        );
    }

    /// Create a role with a verbatim stored hash.
    pub fn insert_raw(&self, username: &str, hash: Option<&str>, can_login: bool) {
        self.lock().roles.insert(
            username.to_string(),
            MockRole {
                hash: hash.map(str::to_string),
                can_login,
                valid_until: None,
            },
        );
    }

    /// Change a role's password, hashing with the current default scheme.
    pub fn set_password(&self, username: &str, plaintext: &str) {
        let mut state = self.lock();
        let hash = Self::fake_hash(&state.default_scheme, username, plaintext);
        if let Some(role) = state.roles.get_mut(username) {
            role.hash = Some(hash);
        }
    }

    pub fn set_can_login(&self, username: &str, can_login: bool) {
        if let Some(role) = self.lock().roles.get_mut(username) {
            role.can_login = can_login;
        }
    }

    pub fn set_valid_until(&self, username: &str, valid_until: Option<DateTime<Utc>>) {
        if let Some(role) = self.lock().roles.get_mut(username) {
            role.valid_until = valid_until;
        }
    }

    pub fn drop_role(&self, username: &str) {
        self.lock().roles.remove(username);
    }

    /// Stored hash of a role, for assertions.
    pub fn stored_hash(&self, username: &str) -> Option<String> {
        self.lock()
            .roles
            .get(username)
            .and_then(|r| r.hash.clone())
    }

    /// Set `password_encryption` without recording a mutation.
    pub fn set_default_scheme_setting(&self, setting: &str) {
        self.lock().default_scheme = setting.to_string();
    }

    pub fn default_scheme_setting(&self) -> String {
        self.lock().default_scheme.clone()
    }

    /// Fail the next `count` catalog calls with connectivity errors.
    pub fn set_unreachable_for(&self, count: u32) {
        self.lock().unreachable_for = count;
    }

    /// Fail every `pg_authid` read with a privilege error.
    pub fn set_deny_privilege(&self, deny: bool) {
        self.lock().deny_privilege = deny;
    }

    /// Make single-role `pg_authid` reads return nothing.
    pub fn set_hide_direct_reads(&self, hide: bool) {
        self.lock().hide_direct_reads = hide;
    }

    pub fn set_shadow_unavailable(&self, unavailable: bool) {
        self.lock().shadow_unavailable = unavailable;
    }

    pub fn set_export_unavailable(&self, unavailable: bool) {
        self.lock().export_unavailable = unavailable;
    }

    /// Fail scheme changes and credential resets with a privilege error.
    pub fn set_mutations_fail(&self, fail: bool) {
        self.lock().mutations_fail = fail;
    }

    /// Mutations applied so far, e.g. `set_default_scheme scram-sha-256`.
    pub fn mutations(&self) -> Vec<String> {
        self.lock().mutations.clone()
    }

    /// Number of enumeration calls made (both strategies).
    pub fn fetch_calls(&self) -> u32 {
        self.lock().fetch_calls
    }

    fn check_reachable(state: &mut MockCatalogState) -> SyncResult<()> {
        if state.unreachable_for > 0 {
            state.unreachable_for -= 1;
            return Err(SyncError::Connectivity {
                message: "connection refused (mock)".to_string(),
            });
        }
        Ok(())
    }

    fn check_privilege(state: &MockCatalogState) -> SyncResult<()> {
        if state.deny_privilege {
            return Err(SyncError::Privilege {
                message: "permission denied for table pg_authid (SQLSTATE 42501)".to_string(),
            });
        }
        Ok(())
    }

    fn row(username: &str, role: &MockRole) -> CatalogRow {
        CatalogRow {
            username: username.to_string(),
            hash: role.hash.clone(),
            can_login: role.can_login,
            valid_until: role.valid_until,
        }
    }
}

impl Default for MockCatalog {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CatalogClient for MockCatalog {
    async fn ping(&self) -> SyncResult<()> {
        Self::check_reachable(&mut self.lock())
    }

    async fn fetch_principals_json(
        &self,
        excluded_patterns: &[String],
        metrics_account: Option<&str>,
    ) -> SyncResult<String> {
        let mut state = self.lock();
        state.fetch_calls += 1;
        Self::check_reachable(&mut state)?;
        Self::check_privilege(&state)?;

        let patterns = excluded_patterns
            .iter()
            .map(|p| Regex::new(p))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| SyncError::Catalog {
                message: format!("invalid regular expression: {}", e),
            })?;

        let rows: Vec<CatalogRow> = state
            .roles
            .iter()
            .filter(|(name, _)| !patterns.iter().any(|p| p.is_match(name)))
            .filter(|(name, _)| Some(name.as_str()) != metrics_account)
            .map(|(name, role)| Self::row(name, role))
            .collect();

        serde_json::to_string(&rows).map_err(|e| SyncError::Internal(e.to_string()))
    }

    async fn fetch_principal_rows(&self) -> SyncResult<Vec<CatalogRow>> {
        let mut state = self.lock();
        state.fetch_calls += 1;
        Self::check_reachable(&mut state)?;
        Self::check_privilege(&state)?;
        Ok(state
            .roles
            .iter()
            .map(|(name, role)| Self::row(name, role))
            .collect())
    }

    async fn read_stored_hash(&self, username: &str) -> SyncResult<Option<String>> {
        let mut state = self.lock();
        Self::check_reachable(&mut state)?;
        Self::check_privilege(&state)?;
        if state.hide_direct_reads {
            return Ok(None);
        }
        Ok(state.roles.get(username).and_then(|r| r.hash.clone()))
    }

    async fn read_shadow_hash(&self, username: &str) -> SyncResult<Option<String>> {
        let mut state = self.lock();
        Self::check_reachable(&mut state)?;
        if state.shadow_unavailable {
            return Ok(None);
        }
        Ok(state.roles.get(username).and_then(|r| r.hash.clone()))
    }

    async fn export_entry(&self, username: &str, dest: &Path) -> SyncResult<()> {
        let contents = {
            let mut state = self.lock();
            Self::check_reachable(&mut state)?;
            Self::check_privilege(&state)?;
            if state.export_unavailable {
                return Err(SyncError::Catalog {
                    message: "COPY is not permitted (mock)".to_string(),
                });
            }
            match state.roles.get(username).and_then(|r| r.hash.as_deref()) {
                Some(hash) => format!("{}\n", render_entry(username, hash)),
                None => String::new(),
            }
        };
        std::fs::write(dest, contents).map_err(|e| SyncError::Catalog {
            message: format!("cannot write export to {}: {}", dest.display(), e),
        })
    }

    async fn default_scheme(&self) -> SyncResult<String> {
        let mut state = self.lock();
        Self::check_reachable(&mut state)?;
        Ok(state.default_scheme.clone())
    }

    async fn set_default_scheme(&self, setting: &str) -> SyncResult<()> {
        let mut state = self.lock();
        Self::check_reachable(&mut state)?;
        if state.mutations_fail {
            return Err(SyncError::Privilege {
                message: "must be superuser to execute ALTER SYSTEM (mock)".to_string(),
            });
        }
        state.default_scheme = setting.to_string();
        state
            .mutations
            .push(format!("set_default_scheme {}", setting));
        Ok(())
    }

    async fn reset_credential(
        &self,
        username: &str,
        plaintext: &str,
        setting: &str,
    ) -> SyncResult<()> {
        let mut state = self.lock();
        Self::check_reachable(&mut state)?;
        if state.mutations_fail {
            return Err(SyncError::Privilege {
                message: "permission denied to alter role (mock)".to_string(),
            });
        }
        let hash = Self::fake_hash(setting, username, plaintext);
        match state.roles.get_mut(username) {
            Some(role) => role.hash = Some(hash),
            None => {
                return Err(SyncError::Catalog {
                    message: format!("role \"{}\" does not exist", username),
                })
            }
        }
        state
            .mutations
            .push(format!("reset_credential {} {}", username, setting));
        Ok(())
    }
}
