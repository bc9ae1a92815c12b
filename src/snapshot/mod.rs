//! Catalog enumeration into validated snapshots.

mod filter;

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

pub use filter::PrincipalFilter;

use crate::config::SyncConfig;
use crate::error::{ErrorContext, SyncError, SyncResult};
use crate::extract::{ExtractRequest, HashExtractor};
use crate::models::{EncryptionScheme, Principal, Snapshot};
use crate::traits::{CatalogClient, CatalogRow};

/// How roles are read from the catalog. Both yield identical snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotStrategy {
    /// One `json_agg` query, filtered server-side.
    #[default]
    Aggregate,
    /// One row per role, filtered client-side.
    PerRow,
}

/// Bounded retry for connectivity failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            delay,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(5, Duration::from_secs(2))
    }
}

/// Enumerates proxy-eligible principals.
#[derive(Debug)]
pub struct StateSnapshotter {
    strategy: SnapshotStrategy,
    scheme: EncryptionScheme,
    excluded_patterns: Vec<String>,
    metrics_account: Option<String>,
    filter: PrincipalFilter,
    retry: RetryPolicy,
    extractor: HashExtractor,
}

impl StateSnapshotter {
    pub fn from_config(config: &SyncConfig) -> SyncResult<Self> {
        Ok(Self {
            strategy: config.snapshot_strategy,
            scheme: config.scheme,
            excluded_patterns: config.excluded_patterns.clone(),
            metrics_account: config.metrics_account.clone(),
            filter: PrincipalFilter::from_config(config)?,
            retry: RetryPolicy::new(config.connect_retries, config.retry_delay()),
            extractor: HashExtractor::read_only(),
        })
    }

    pub fn strategy(&self) -> SnapshotStrategy {
        self.strategy
    }

    /// Read, normalize and validate one snapshot.
    ///
    /// Connectivity errors are retried per the retry policy; any other error,
    /// and any validation failure, fails the whole snapshot.
    pub async fn capture(&self, catalog: &dyn CatalogClient) -> SyncResult<Snapshot> {
        let rows = self.fetch_with_retry(catalog).await?;
        let principals = self.normalize(catalog, rows).await;
        validate(&principals)?;
        Ok(Snapshot::from_principals(principals))
    }

    async fn fetch_with_retry(&self, catalog: &dyn CatalogClient) -> SyncResult<Vec<CatalogRow>> {
        let mut attempt = 1;
        loop {
            match self.fetch_rows(catalog).await {
                Ok(rows) => return Ok(rows),
                Err(e) if e.is_retryable() && attempt < self.retry.attempts => {
                    tracing::warn!(
                        stage = "snapshotting",
                        "Catalog unavailable (attempt {}/{}), retrying in {:?}: {}",
                        attempt,
                        self.retry.attempts,
                        self.retry.delay,
                        e
                    );
                    tokio::time::sleep(self.retry.delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    return Err(e.with_context(
                        ErrorContext::new("snapshotting").with_attempts(attempt),
                    ))
                }
            }
        }
    }

    async fn fetch_rows(&self, catalog: &dyn CatalogClient) -> SyncResult<Vec<CatalogRow>> {
        match self.strategy {
            SnapshotStrategy::Aggregate => {
                let json = catalog
                    .fetch_principals_json(&self.excluded_patterns, self.metrics_account.as_deref())
                    .await?;
                serde_json::from_str(&json).map_err(|e| SyncError::Catalog {
                    message: format!("unexpected aggregate result: {}", e),
                })
            }
            SnapshotStrategy::PerRow => Ok(catalog
                .fetch_principal_rows()
                .await?
                .into_iter()
                .filter(|row| !self.filter.is_excluded(&row.username))
                .collect()),
        }
    }

    /// Turn raw rows into principals.
    ///
    /// Hashes are trimmed. A login-capable principal whose hash is empty or in
    /// the wrong scheme goes through the read-only extraction chain; if that
    /// fails the raw value is kept and the synchronizer will skip it.
    pub async fn normalize(&self, catalog: &dyn CatalogClient, rows: Vec<CatalogRow>) -> Vec<Principal> {
        let mut principals = Vec::with_capacity(rows.len());

        for row in rows {
            let mut hash = row.hash.as_deref().map(str::trim).unwrap_or_default().to_string();

            if row.can_login && !self.scheme.matches(&hash) {
                let request = ExtractRequest::new(&row.username, self.scheme);
                match self.extractor.extract(catalog, &request).await {
                    Ok(extracted) => hash = extracted.hash,
                    Err(e) => tracing::warn!(
                        stage = "snapshotting",
                        principal = %row.username,
                        "No {} hash available, keeping stored value: {}",
                        self.scheme,
                        e
                    ),
                }
            }

            principals.push(
                Principal::new(row.username, hash, row.can_login).with_valid_until(row.valid_until),
            );
        }

        principals
    }
}

fn has_control(value: &str) -> bool {
    value.chars().any(char::is_control)
}

/// Reject snapshots the auth file could not represent faithfully.
pub fn validate(principals: &[Principal]) -> SyncResult<()> {
    let mut seen = HashSet::with_capacity(principals.len());
    for principal in principals {
        if principal.username.is_empty() {
            return Err(SyncError::InvalidSnapshot("empty username".to_string()));
        }
        if has_control(&principal.username) {
            return Err(SyncError::InvalidSnapshot(format!(
                "username {:?} contains control characters",
                principal.username
            )));
        }
        if has_control(&principal.hash) {
            return Err(SyncError::InvalidSnapshot(format!(
                "hash of '{}' contains control characters",
                principal.username
            )));
        }
        if !seen.insert(principal.username.as_str()) {
            return Err(SyncError::InvalidSnapshot(format!(
                "duplicate username '{}'",
                principal.username
            )));
        }
    }
    Ok(())
}
