//! One-time bootstrap (`setup`).
//!
//! Seeds the auth file with the bootstrap principal so the proxy can connect
//! before the first monitor cycle, then forgets any baseline and runs a full
//! cycle so every principal is synced from scratch.

use std::path::Path;

use crate::authfile::AuthFileSynchronizer;
use crate::config::SyncConfig;
use crate::error::{ErrorContext, ResultExt, SyncError, SyncResult};
use crate::extract::{ExtractRequest, ExtractedHash, HashExtractor};
use crate::lock::SyncLock;
use crate::monitor::CycleReport;

use super::sync::run_single_cycle;
use super::Services;

fn create_dir(path: &Path) -> SyncResult<()> {
    std::fs::create_dir_all(path)
        .map_err(|e| SyncError::state(path, format!("cannot create directory: {}", e)))
}

/// Bootstrap the auth file under the sync lock. Returns the extracted hash.
pub async fn bootstrap(
    config: &SyncConfig,
    services: &Services,
    plaintext: Option<&str>,
) -> SyncResult<ExtractedHash> {
    create_dir(&config.state_dir)?;
    create_dir(&config.backup_dir)?;

    let _lock = SyncLock::acquire(&config.lock_path())?;

    services
        .catalog
        .ping()
        .await
        .context(ErrorContext::new("setup"))?;

    let user = config.bootstrap_user.as_str();
    let extractor = HashExtractor::full_chain(config.allow_plaintext_fallback);
    tracing::debug!("Bootstrap extraction chain: {:?}", extractor);
    let request = ExtractRequest::new(user, config.scheme).with_plaintext(plaintext);
    let extracted = extractor
        .extract(services.catalog.as_ref(), &request)
        .await
        .context(ErrorContext::new("setup").with_principal(user))?;
    tracing::info!("Bootstrap hash for {} obtained via {}", user, extracted.source);

    AuthFileSynchronizer::from_config(config)
        .upsert_entry(user, &extracted.hash)
        .context(ErrorContext::new("setup").with_principal(user))?;

    services.store.clear().context(ErrorContext::new("setup"))?;
    Ok(extracted)
}

/// Bootstrap, then run one full cycle.
pub async fn run_setup(
    config: &SyncConfig,
    services: &Services,
    plaintext: Option<&str>,
) -> Result<CycleReport, u8> {
    if let Err(e) = bootstrap(config, services, plaintext).await {
        eprintln!("Error: setup failed: {}", e);
        return Err(e.exit_code());
    }
    run_single_cycle(config, services).await
}

/// Handle the `setup` command.
pub async fn handle_setup_command(
    config: &SyncConfig,
    services: &Services,
    plaintext: Option<String>,
) -> u8 {
    if plaintext.is_none() {
        tracing::debug!(
            "{} not set, bootstrap relies on catalog reads",
            crate::config::BOOTSTRAP_PASSWORD_ENV
        );
    }

    match run_setup(config, services, plaintext.as_deref()).await {
        Ok(report) => {
            println!("Setup complete: {}", report.summary());
            report.exit_code()
        }
        Err(code) => code,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::mock::{InMemorySnapshotStore, MockCatalog, MockServiceController};
    use crate::extract::HashSource;
    use crate::models::Snapshot;
    use crate::traits::SnapshotStore;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn services(catalog: &MockCatalog, store: &InMemorySnapshotStore) -> Services {
        Services::new(
            Arc::new(catalog.clone()),
            Arc::new(store.clone()),
            Arc::new(MockServiceController::new()),
        )
    }

    #[tokio::test]
    async fn test_bootstrap_writes_entry_and_clears_baseline() {
        let dir = TempDir::new().unwrap();
        let config = SyncConfig::rooted_at(dir.path());
        let catalog = MockCatalog::new();
        catalog.create_role("postgres", Some("pw"), true);
        let store = InMemorySnapshotStore::with_baseline(Snapshot::empty());

        let extracted = bootstrap(&config, &services(&catalog, &store), None)
            .await
            .unwrap();
        assert_eq!(extracted.source, HashSource::DirectRead);
        assert!(config.backup_dir.is_dir());
        assert!(store.load_baseline().unwrap().is_none());

        let contents = std::fs::read_to_string(&config.auth_file).unwrap();
        assert!(contents.contains(&extracted.hash));
    }

    #[tokio::test]
    async fn test_setup_runs_full_cycle() {
        let dir = TempDir::new().unwrap();
        let config = SyncConfig::rooted_at(dir.path());
        let catalog = MockCatalog::new();
        catalog.create_role("postgres", Some("pw"), true);
        catalog.create_role("app", Some("apw"), true);
        let store = InMemorySnapshotStore::new();

        let code = handle_setup_command(&config, &services(&catalog, &store), None).await;
        assert_eq!(code, 0);
        let contents = std::fs::read_to_string(&config.auth_file).unwrap();
        assert!(contents.contains("\"postgres\""));
        assert!(contents.contains("\"app\""));
        assert_eq!(store.commits(), 1);
    }

    #[tokio::test]
    async fn test_setup_keeps_backup_of_original_file() {
        let dir = TempDir::new().unwrap();
        let config = SyncConfig::rooted_at(dir.path());
        std::fs::write(&config.auth_file, "\"legacy_admin\" \"ORIGINAL\"\n").unwrap();
        let catalog = MockCatalog::new();
        catalog.create_role("postgres", Some("pw"), true);
        catalog.create_role("app", Some("apw"), true);
        let store = InMemorySnapshotStore::new();

        let code = handle_setup_command(&config, &services(&catalog, &store), None).await;
        assert_eq!(code, 0);

        // Bootstrap and the first cycle both rewrite the file within a second.
        let backups: Vec<String> = std::fs::read_dir(&config.backup_dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| std::fs::read_to_string(e.path()).unwrap())
            .collect();
        assert_eq!(backups.len(), 2);
        assert!(backups
            .iter()
            .any(|b| b.contains("ORIGINAL") && !b.contains("\"postgres\"")));
    }

    #[tokio::test]
    async fn test_setup_fails_when_no_strategy_succeeds() {
        let dir = TempDir::new().unwrap();
        let config = SyncConfig::rooted_at(dir.path());
        let catalog = MockCatalog::new();
        catalog.create_role("postgres", Some("pw"), true);
        catalog.set_hide_direct_reads(true);
        catalog.set_shadow_unavailable(true);
        catalog.set_export_unavailable(true);
        let store = InMemorySnapshotStore::new();

        let code = handle_setup_command(&config, &services(&catalog, &store), None).await;
        assert_eq!(code, 1);
        assert!(!config.auth_file.exists());
    }
}
