//! End-to-end sync scenarios against the in-memory catalog.
//!
//! Each test drives whole monitor cycles (snapshot, diff, sync, reload) and
//! inspects the resulting auth file.

mod common;

use common::TestHarness;
use pgbsync::adapters::mock::MockCatalog;
use pgbsync::authfile::SyncOutcome;
use pgbsync::cli::handle_setup_command;
use pgbsync::models::DeltaCounts;
use pgbsync::monitor::MonitorState;
use pgbsync::reload::ReloadOutcome;
use pgbsync::traits::ServiceAction;

#[tokio::test]
async fn test_bootstrap_adds_every_principal() {
    let h = TestHarness::new();
    h.catalog.create_role("alice", Some("a-pw"), true);

    let report = h.run_cycle().await;

    assert!(report.succeeded());
    assert_eq!(
        report.delta,
        Some(DeltaCounts {
            added: 1,
            modified: 0,
            deleted: 0
        })
    );
    let entries = h.auth_entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries.get("alice"), h.catalog.stored_hash("alice").as_ref());
    assert!(entries["alice"].starts_with("SCRAM-SHA-256$"));
    assert_eq!(report.reload, Some(ReloadOutcome::Reloaded));
}

#[tokio::test]
async fn test_rotation_replaces_entry() {
    let h = TestHarness::new();
    h.catalog.create_role("bob", Some("h1"), true);
    h.run_cycle().await;
    let old_hash = h.auth_entries()["bob"].clone();

    h.catalog.set_password("bob", "h2");
    let report = h.run_cycle().await;

    assert_eq!(report.delta.map(|d| d.modified), Some(1));
    let entries = h.auth_entries();
    assert_eq!(entries.len(), 1);
    assert_ne!(entries["bob"], old_hash);
    assert_eq!(entries.get("bob"), h.catalog.stored_hash("bob").as_ref());
    assert_eq!(h.auth_file_contents().matches("\"bob\"").count(), 1);
}

#[tokio::test]
async fn test_deactivation_removes_entry() {
    let h = TestHarness::new();
    h.catalog.create_role("carol", Some("h3"), true);
    h.catalog.create_role("dan", Some("h5"), true);
    h.run_cycle().await;

    h.catalog.set_can_login("carol", false);
    let report = h.run_cycle().await;

    assert_eq!(report.delta.map(|d| d.modified), Some(1));
    assert_eq!(
        report.sync,
        Some(SyncOutcome::Updated {
            upserted: 0,
            removed: 1
        })
    );
    let entries = h.auth_entries();
    assert!(!entries.contains_key("carol"));
    assert!(entries.contains_key("dan"));
}

#[tokio::test]
async fn test_reactivation_restores_entry() {
    let h = TestHarness::new();
    h.catalog.create_role("carol", Some("h3"), false);
    h.run_cycle().await;
    assert!(!h.auth_entries().contains_key("carol"));

    h.catalog.set_can_login("carol", true);
    h.run_cycle().await;
    assert!(h.auth_entries().contains_key("carol"));
}

#[tokio::test]
async fn test_removal_deletes_entry() {
    let h = TestHarness::new();
    h.catalog.create_role("dave", Some("h4"), true);
    h.run_cycle().await;

    h.catalog.drop_role("dave");
    let report = h.run_cycle().await;

    assert_eq!(report.delta.map(|d| d.deleted), Some(1));
    assert!(h.auth_entries().is_empty());
}

#[tokio::test]
async fn test_setup_self_heals_legacy_scheme() {
    let h = TestHarness::new();
    h.catalog.set_default_scheme_setting("md5");
    h.catalog.create_role("postgres", Some("pg-pw"), true);
    assert!(h
        .catalog
        .stored_hash("postgres")
        .unwrap()
        .starts_with("md5"));

    let code = handle_setup_command(&h.config, &h.services(), Some("pg-pw".to_string())).await;

    assert_eq!(code, 0);
    assert_eq!(h.catalog.default_scheme_setting(), "scram-sha-256");
    assert!(h
        .catalog
        .mutations()
        .contains(&"set_default_scheme scram-sha-256".to_string()));

    let entries = h.auth_entries();
    assert!(entries["postgres"].starts_with("SCRAM-SHA-256$"));
    assert_eq!(
        entries["postgres"],
        MockCatalog::fake_hash("scram-sha-256", "postgres", "pg-pw")
    );
}

#[tokio::test]
async fn test_no_op_cycle_never_reloads() {
    let h = TestHarness::new();
    h.catalog.create_role("erin", Some("pw"), true);
    h.run_cycle().await;
    let before = h.auth_file_contents();

    let report = h.run_cycle().await;

    assert_eq!(report.delta, Some(DeltaCounts::default()));
    assert_eq!(report.sync, None);
    assert!(!report.visited(MonitorState::Syncing));
    assert!(!report.visited(MonitorState::Reloading));
    assert_eq!(h.service.actions(), vec![ServiceAction::Reload]);
    assert_eq!(h.auth_file_contents(), before);
}

#[tokio::test]
async fn test_reserved_and_metrics_roles_are_never_synced() {
    let h = TestHarness::new();
    h.catalog.create_role("pg_monitor", Some("x"), true);
    h.catalog.create_role("postgres_exporter", Some("y"), true);
    h.catalog.create_role("app", Some("z"), true);

    h.run_cycle().await;

    let entries = h.auth_entries();
    assert_eq!(entries.keys().collect::<Vec<_>>(), vec!["app"]);
}
