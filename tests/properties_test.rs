//! Invariants that must hold across cycles regardless of catalog contents.

mod common;

use std::os::unix::fs::PermissionsExt;

use common::TestHarness;
use pgbsync::authfile::{parse_auth_file, render_auth_file, AuthMap};
use pgbsync::models::EncryptionScheme;
use pgbsync::monitor::MonitorState;
use pgbsync::reload::ReloadOutcome;
use pgbsync::traits::{ServiceAction, SnapshotStore};

#[tokio::test]
async fn test_repeated_cycles_are_idempotent() {
    let h = TestHarness::new();
    h.catalog.create_role("a", Some("1"), true);
    h.catalog.create_role("b", Some("2"), true);
    h.catalog.create_role("c", Some("3"), false);

    h.run_cycle().await;
    let first = h.auth_file_contents();
    for _ in 0..3 {
        let report = h.run_cycle().await;
        assert_eq!(report.sync, None);
    }
    assert_eq!(h.auth_file_contents(), first);
}

#[tokio::test]
async fn test_unmanaged_entries_survive() {
    let h = TestHarness::new();
    let mut manual = AuthMap::new();
    manual.insert("admin".to_string(), "md5deadbeefdeadbeefdeadbeefdeadbeef".to_string());
    std::fs::write(&h.config.auth_file, render_auth_file(&manual)).unwrap();

    h.catalog.create_role("app", Some("pw"), true);
    h.run_cycle().await;
    h.catalog.drop_role("app");
    h.run_cycle().await;

    let entries = h.auth_entries();
    assert_eq!(entries.keys().collect::<Vec<_>>(), vec!["admin"]);
}

#[tokio::test]
async fn test_awkward_usernames_round_trip() {
    let h = TestHarness::new();
    for name in ["we\"ird", "with space", "ünïcode", "quote\"\"twice"] {
        h.catalog.create_role(name, Some("pw"), true);
    }

    h.run_cycle().await;

    let parsed = parse_auth_file(&h.auth_file_contents());
    assert!(parsed.malformed.is_empty());
    for name in ["we\"ird", "with space", "ünïcode", "quote\"\"twice"] {
        assert_eq!(parsed.entries.get(name), h.catalog.stored_hash(name).as_ref());
    }
}

#[tokio::test]
async fn test_failed_sync_keeps_baseline_and_retries() {
    let h = TestHarness::new();
    h.catalog.create_role("app", Some("pw"), true);
    std::fs::create_dir(&h.config.auth_file).unwrap();

    let report = h.run_cycle().await;
    let failure = report.failure.expect("sync should fail");
    assert_eq!(failure.stage, MonitorState::Syncing);
    assert!(h.store.load_baseline().unwrap().is_none());
    assert!(h.service.actions().is_empty());

    std::fs::remove_dir(&h.config.auth_file).unwrap();
    let report = h.run_cycle().await;
    assert!(report.succeeded());
    assert!(h.auth_entries().contains_key("app"));
    assert!(h.store.load_baseline().unwrap().is_some());
}

#[tokio::test]
async fn test_unreachable_catalog_leaves_file_untouched() {
    let h = TestHarness::new();
    h.catalog.create_role("app", Some("pw"), true);
    h.run_cycle().await;
    let before = h.auth_file_contents();

    h.catalog.drop_role("app");
    h.catalog.set_unreachable_for(1);
    let report = h.run_cycle().await;

    assert_eq!(report.failure.map(|f| f.stage), Some(MonitorState::Snapshotting));
    assert_eq!(h.auth_file_contents(), before);
}

#[tokio::test]
async fn test_retries_ride_out_a_blip() {
    let mut h = TestHarness::new();
    h.config = h.config.clone().with_retry(3, 0);
    h.catalog.create_role("app", Some("pw"), true);
    h.catalog.set_unreachable_for(2);

    let report = h.run_cycle().await;
    assert!(report.succeeded());
    assert!(h.auth_entries().contains_key("app"));
}

#[tokio::test]
async fn test_wrong_scheme_principal_is_skipped() {
    let h = TestHarness::new();
    h.catalog
        .insert_raw("legacy", Some("md5ffffffffffffffffffffffffffffffff"), true);
    h.catalog.create_role("modern", Some("pw"), true);

    let report = h.run_cycle().await;

    assert!(report.succeeded());
    let entries = h.auth_entries();
    assert!(!entries.contains_key("legacy"));
    assert!(entries.contains_key("modern"));
}

#[tokio::test]
async fn test_md5_target_scheme() {
    let mut h = TestHarness::new();
    h.config = h.config.clone().with_scheme(EncryptionScheme::Md5);
    h.catalog.set_default_scheme_setting("md5");
    h.catalog.create_role("app", Some("pw"), true);

    h.run_cycle().await;
    assert!(h.auth_entries()["app"].starts_with("md5"));
}

#[tokio::test]
async fn test_auth_file_is_private_and_backed_up() {
    let h = TestHarness::new();
    h.catalog.create_role("app", Some("pw"), true);
    h.run_cycle().await;

    let mode = std::fs::metadata(&h.config.auth_file).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o600);

    h.catalog.set_password("app", "pw2");
    h.run_cycle().await;
    let backups = std::fs::read_dir(&h.config.backup_dir).unwrap().count();
    assert_eq!(backups, 1);
}

#[tokio::test]
async fn test_reload_falls_back_to_restart() {
    let h = TestHarness::new();
    h.service.fail_action(ServiceAction::Reload, 1, "not running");
    h.catalog.create_role("app", Some("pw"), true);

    let report = h.run_cycle().await;
    assert_eq!(report.reload, Some(ReloadOutcome::Restarted));
    assert_eq!(report.exit_code(), 0);
}

#[tokio::test]
async fn test_reload_failure_does_not_fail_cycle() {
    let h = TestHarness::new();
    h.service.fail_action(ServiceAction::Reload, 1, "bad config");
    h.service.fail_action(ServiceAction::Restart, 1, "bad config");
    h.catalog.create_role("app", Some("pw"), true);

    let report = h.run_cycle().await;
    assert!(report.failure.is_none());
    assert!(report.reload_error.is_some());
    assert_eq!(report.exit_code(), 1);
    assert!(h.store.load_baseline().unwrap().is_some());
    assert_eq!(h.service.actions().len(), 2);
}

#[tokio::test]
async fn test_file_store_persists_across_restarts() {
    let h = TestHarness::with_file_store();
    h.catalog.create_role("app", Some("pw"), true);
    h.run_cycle().await;
    assert!(h.config.snapshot_path().exists());

    // A new monitor loop (as after a daemon restart) sees the same baseline
    let report = h.run_cycle().await;
    assert_eq!(report.sync, None);

    h.catalog.set_password("app", "pw2");
    h.run_cycle().await;
    assert!(h.config.previous_snapshot_path().exists());
    assert!(!h.config.delta_path().exists());
}
