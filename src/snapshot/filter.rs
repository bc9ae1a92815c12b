//! Exclusion of reserved and service roles.

use regex::Regex;

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};

/// Decides which catalog roles are never synced.
#[derive(Debug, Clone)]
pub struct PrincipalFilter {
    patterns: Vec<Regex>,
    metrics_account: Option<String>,
}

impl PrincipalFilter {
    pub fn new(patterns: &[String], metrics_account: Option<&str>) -> SyncResult<Self> {
        let patterns = patterns
            .iter()
            .map(|p| {
                Regex::new(p)
                    .map_err(|e| SyncError::Config(format!("invalid excluded pattern '{}': {}", p, e)))
            })
            .collect::<SyncResult<Vec<_>>>()?;
        Ok(Self {
            patterns,
            metrics_account: metrics_account.map(str::to_string),
        })
    }

    pub fn from_config(config: &SyncConfig) -> SyncResult<Self> {
        Self::new(&config.excluded_patterns, config.metrics_account.as_deref())
    }

    pub fn is_excluded(&self, username: &str) -> bool {
        self.metrics_account.as_deref() == Some(username)
            || self.patterns.iter().any(|p| p.is_match(username))
    }
}
