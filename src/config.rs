//! Daemon and CLI configuration.
//!
//! Configuration is a flat JSON object; every key is optional and falls back
//! to the defaults below. `PGBSYNC_*` environment variables are applied on
//! top of the file.
//!
//! ```json
//! {
//!   "interval_secs": 30,
//!   "scheme": "scram-sha-256",
//!   "auth_file": "/etc/pgbouncer/userlist.txt",
//!   "auth_file_owner": "pgbouncer",
//!   "database_url": "postgres://postgres@localhost:5432/postgres"
//! }
//! ```

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{SyncError, SyncResult};
use crate::models::EncryptionScheme;
use crate::snapshot::SnapshotStrategy;

/// Config file read when `--config` is not given, if it exists.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/pgbsync/config.json";

/// Environment variable holding the bootstrap principal's plaintext password.
pub const BOOTSTRAP_PASSWORD_ENV: &str = "PGBSYNC_BOOTSTRAP_PASSWORD";

const SNAPSHOT_FILE: &str = "snapshot.json";
const PREVIOUS_SNAPSHOT_FILE: &str = "snapshot.prev.json";
const DELTA_FILE: &str = "delta.json";
const LOCK_FILE: &str = "pgbsync.lock";

/// Configuration for the monitor loop and the CLI commands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// When false the daemon idles without touching the catalog.
    pub enabled: bool,
    /// Seconds between monitor cycles.
    pub interval_secs: u64,
    /// Scheme every auth file entry must be encoded with.
    pub scheme: EncryptionScheme,
    /// Proxy credential file.
    pub auth_file: PathBuf,
    /// System user that should own the auth file (no chown when unset).
    pub auth_file_owner: Option<String>,
    /// Directory for timestamped auth file backups.
    pub backup_dir: PathBuf,
    /// Number of backups kept per auth file.
    pub backup_retention: usize,
    /// Directory for snapshot, delta and lock files.
    pub state_dir: PathBuf,
    /// Catalog connection string.
    pub database_url: String,
    /// Connection attempts per snapshot before the cycle is abandoned.
    pub connect_retries: u32,
    /// Fixed delay between connection attempts.
    pub connect_retry_delay_secs: u64,
    /// Catalog enumeration strategy.
    pub snapshot_strategy: SnapshotStrategy,
    /// Regexes of reserved role names never synced.
    pub excluded_patterns: Vec<String>,
    /// Metrics-service role never synced.
    pub metrics_account: Option<String>,
    /// Principal bootstrapped by `setup`.
    pub bootstrap_user: String,
    /// Allow emitting a plaintext secret as the hash of last resort.
    pub allow_plaintext_fallback: bool,
    /// Service manager unit of the proxy.
    pub proxy_service: String,
    /// Service manager unit of this daemon.
    pub daemon_service: String,
    /// Service manager executable.
    pub service_manager: String,
    /// Default tracing filter when `RUST_LOG` is unset.
    pub log_level: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 30,
            scheme: EncryptionScheme::ScramSha256,
            auth_file: PathBuf::from("/etc/pgbouncer/userlist.txt"),
            auth_file_owner: None,
            backup_dir: PathBuf::from("/var/lib/pgbsync/backups"),
            backup_retention: 10,
            state_dir: PathBuf::from("/var/lib/pgbsync"),
            database_url: "postgres://postgres@localhost:5432/postgres".to_string(),
            connect_retries: 5,
            connect_retry_delay_secs: 2,
            snapshot_strategy: SnapshotStrategy::Aggregate,
            excluded_patterns: vec!["^pg_".to_string()],
            metrics_account: Some("postgres_exporter".to_string()),
            bootstrap_user: "postgres".to_string(),
            allow_plaintext_fallback: false,
            proxy_service: "pgbouncer".to_string(),
            daemon_service: "pgbsync".to_string(),
            service_manager: "systemctl".to_string(),
            log_level: "info".to_string(),
        }
    }
}

impl SyncConfig {
    /// Config rooted at `dir` for auth file, backups and state. Used by tests
    /// and by operators running unprivileged.
    pub fn rooted_at(dir: &Path) -> Self {
        Self {
            auth_file: dir.join("userlist.txt"),
            backup_dir: dir.join("backups"),
            state_dir: dir.join("state"),
            ..Self::default()
        }
    }

    pub fn with_scheme(mut self, scheme: EncryptionScheme) -> Self {
        self.scheme = scheme;
        self
    }

    pub fn with_interval_secs(mut self, secs: u64) -> Self {
        self.interval_secs = secs;
        self
    }

    pub fn with_snapshot_strategy(mut self, strategy: SnapshotStrategy) -> Self {
        self.snapshot_strategy = strategy;
        self
    }

    pub fn with_plaintext_fallback(mut self, allow: bool) -> Self {
        self.allow_plaintext_fallback = allow;
        self
    }

    pub fn with_retry(mut self, retries: u32, delay_secs: u64) -> Self {
        self.connect_retries = retries;
        self.connect_retry_delay_secs = delay_secs;
        self
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.connect_retry_delay_secs)
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.state_dir.join(SNAPSHOT_FILE)
    }

    pub fn previous_snapshot_path(&self) -> PathBuf {
        self.state_dir.join(PREVIOUS_SNAPSHOT_FILE)
    }

    pub fn delta_path(&self) -> PathBuf {
        self.state_dir.join(DELTA_FILE)
    }

    pub fn lock_path(&self) -> PathBuf {
        self.state_dir.join(LOCK_FILE)
    }

    /// Plaintext credential of the bootstrap principal, from the environment.
    pub fn bootstrap_password() -> Option<String> {
        std::env::var(BOOTSTRAP_PASSWORD_ENV)
            .ok()
            .filter(|v| !v.is_empty())
    }

    /// Check invariants serde cannot express.
    pub fn validate(&self) -> SyncResult<()> {
        if self.interval_secs == 0 {
            return Err(SyncError::Config("interval_secs must be at least 1".to_string()));
        }
        if self.connect_retries == 0 {
            return Err(SyncError::Config("connect_retries must be at least 1".to_string()));
        }
        if self.auth_file.as_os_str().is_empty() {
            return Err(SyncError::Config("auth_file must not be empty".to_string()));
        }
        if self.state_dir.as_os_str().is_empty() {
            return Err(SyncError::Config("state_dir must not be empty".to_string()));
        }
        if self.bootstrap_user.trim().is_empty() {
            return Err(SyncError::Config("bootstrap_user must not be empty".to_string()));
        }
        for pattern in &self.excluded_patterns {
            Regex::new(pattern).map_err(|e| {
                SyncError::Config(format!("invalid excluded pattern '{}': {}", pattern, e))
            })?;
        }
        Ok(())
    }
}

/// Load configuration.
///
/// Reads `path` when given (it must exist), otherwise [`DEFAULT_CONFIG_PATH`]
/// when present, otherwise starts from defaults. Environment overrides are
/// applied last, then the result is validated.
pub fn load_config(path: Option<&Path>) -> SyncResult<SyncConfig> {
    let mut config = match path {
        Some(path) => read_config_file(path)?,
        None => {
            let default_path = Path::new(DEFAULT_CONFIG_PATH);
            if default_path.exists() {
                read_config_file(default_path)?
            } else {
                SyncConfig::default()
            }
        }
    };
    apply_env_overrides(&mut config)?;
    config.validate()?;
    Ok(config)
}

/// Load configuration from a JSON string (useful for testing).
pub fn load_config_from_str(json: &str) -> SyncResult<SyncConfig> {
    let mut config: SyncConfig = serde_json::from_str(json)
        .map_err(|e| SyncError::Config(format!("invalid config: {}", e)))?;
    apply_env_overrides(&mut config)?;
    config.validate()?;
    Ok(config)
}

fn read_config_file(path: &Path) -> SyncResult<SyncConfig> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| SyncError::Config(format!("cannot read {}: {}", path.display(), e)))?;
    serde_json::from_str(&contents)
        .map_err(|e| SyncError::Config(format!("invalid config {}: {}", path.display(), e)))
}

/// Apply `PGBSYNC_*` environment variable overrides to a config.
///
/// Supported env vars:
/// - `PGBSYNC_ENABLED`
/// - `PGBSYNC_INTERVAL_SECS`
/// - `PGBSYNC_SCHEME`
/// - `PGBSYNC_AUTH_FILE`
/// - `PGBSYNC_AUTH_FILE_OWNER`
/// - `PGBSYNC_STATE_DIR`
/// - `PGBSYNC_BACKUP_DIR`
/// - `PGBSYNC_DATABASE_URL`
/// - `PGBSYNC_ALLOW_PLAINTEXT_FALLBACK`
/// - `PGBSYNC_PROXY_SERVICE`
/// - `PGBSYNC_LOG_LEVEL`
pub fn apply_env_overrides(config: &mut SyncConfig) -> SyncResult<()> {
    if let Ok(val) = std::env::var("PGBSYNC_ENABLED") {
        config.enabled = parse_bool("PGBSYNC_ENABLED", &val)?;
    }
    if let Ok(val) = std::env::var("PGBSYNC_INTERVAL_SECS") {
        config.interval_secs = val.trim().parse().map_err(|_| {
            SyncError::Config(format!("PGBSYNC_INTERVAL_SECS is not a number: '{}'", val))
        })?;
    }
    if let Ok(val) = std::env::var("PGBSYNC_SCHEME") {
        config.scheme = val
            .parse()
            .map_err(|e| SyncError::Config(format!("PGBSYNC_SCHEME: {}", e)))?;
    }
    if let Ok(val) = std::env::var("PGBSYNC_AUTH_FILE") {
        config.auth_file = PathBuf::from(val);
    }
    if let Ok(val) = std::env::var("PGBSYNC_AUTH_FILE_OWNER") {
        config.auth_file_owner = Some(val).filter(|v| !v.is_empty());
    }
    if let Ok(val) = std::env::var("PGBSYNC_STATE_DIR") {
        config.state_dir = PathBuf::from(val);
    }
    if let Ok(val) = std::env::var("PGBSYNC_BACKUP_DIR") {
        config.backup_dir = PathBuf::from(val);
    }
    if let Ok(val) = std::env::var("PGBSYNC_DATABASE_URL") {
        config.database_url = val;
    }
    if let Ok(val) = std::env::var("PGBSYNC_ALLOW_PLAINTEXT_FALLBACK") {
        config.allow_plaintext_fallback = parse_bool("PGBSYNC_ALLOW_PLAINTEXT_FALLBACK", &val)?;
    }
    if let Ok(val) = std::env::var("PGBSYNC_PROXY_SERVICE") {
        config.proxy_service = val;
    }
    if let Ok(val) = std::env::var("PGBSYNC_LOG_LEVEL") {
        config.log_level = val;
    }
    Ok(())
}

fn parse_bool(name: &str, value: &str) -> SyncResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(SyncError::Config(format!(
            "{} must be a boolean, got '{}'",
            name, other
        ))),
    }
}
