//! Reconciliation behavior of the fleet registry.

use std::collections::BTreeSet;
use std::io::Write;

use termfleet::config::{AccountConfig, SupervisorConfig};
use termfleet::supervisor::{Fleet, WorkerCommand};

fn account(login: i64, enabled: bool) -> AccountConfig {
    AccountConfig {
        name: Some(format!("Test {login}")),
        login,
        password: "pw".into(),
        server: "Demo".into(),
        terminal_path: "/opt/terminal".into(),
        enabled,
        update_interval: 1,
    }
}

fn test_fleet(accounts_file: std::path::PathBuf) -> Fleet {
    let config = SupervisorConfig {
        accounts_file,
        tick_interval_secs: 1,
        grace_period_secs: 2,
    };
    // A harmless stand-in worker; most tests never start it
    let command = WorkerCommand::new("/bin/sh".into(), vec!["-c".into(), "sleep 30".into()]);
    Fleet::new(config, command)
}

#[tokio::test]
async fn test_disabled_login_is_not_instantiated() {
    let fleet = test_fleet("unused.json".into());

    let outcome = fleet
        .reconcile(vec![account(111, true), account(222, true), account(333, false)])
        .await
        .unwrap();

    assert_eq!(outcome.created, vec![111, 222]);
    let views = fleet.views().await;
    assert_eq!(views.len(), 2);
    assert!(views.iter().all(|v| v.state == "STOPPED"));

    let logins: BTreeSet<i64> = views.iter().map(|v| v.login).collect();
    assert_eq!(logins, [111, 222].into_iter().collect());
}

#[tokio::test]
async fn test_reconcile_is_idempotent() {
    let fleet = test_fleet("unused.json".into());
    let accounts = vec![account(111, true), account(222, true)];

    fleet.reconcile(accounts.clone()).await.unwrap();
    let outcome = fleet.reconcile(accounts).await.unwrap();

    assert!(outcome.created.is_empty());
    assert!(outcome.removed.is_empty());
    assert_eq!(outcome.updated, vec![111, 222]);
    assert_eq!(fleet.len().await, 2);
}

#[tokio::test]
async fn test_removed_login_is_stopped_and_sandbox_removed() {
    let fleet = test_fleet("unused.json".into());
    fleet
        .reconcile(vec![account(111, true), account(222, true)])
        .await
        .unwrap();

    fleet.start(111).await.unwrap();
    let sandbox = fleet
        .view(111)
        .await
        .and_then(|v| v.sandbox)
        .expect("started instance has a sandbox");
    assert!(sandbox.is_dir());

    // 111 disappears from the source
    let outcome = fleet.reconcile(vec![account(222, true)]).await.unwrap();
    assert_eq!(outcome.removed, vec![111]);

    // orphan stop happened synchronously: sandbox is already gone
    assert!(!sandbox.exists());
    assert!(fleet.view(111).await.is_none());
    assert_eq!(fleet.len().await, 1);
}

#[tokio::test]
async fn test_config_update_does_not_restart_running_worker() {
    let fleet = test_fleet("unused.json".into());
    fleet.reconcile(vec![account(111, true)]).await.unwrap();
    fleet.start(111).await.unwrap();

    let mut updated = account(111, true);
    updated.server = "Live".into();
    fleet.reconcile(vec![updated]).await.unwrap();

    let view = fleet.view(111).await.unwrap();
    // still the same live process, new config takes effect on next start
    assert_eq!(view.state, "STARTING");
    assert_eq!(view.server, "Live");

    fleet.stop(111).await.unwrap();
}

#[tokio::test]
async fn test_malformed_source_leaves_previous_set_untouched() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"[{{"login": 111, "password": "pw", "server": "Demo", "terminal_path": "/x"}}]"#
    )
    .unwrap();

    let fleet = test_fleet(file.path().to_path_buf());
    fleet.reload().await.unwrap();
    assert_eq!(fleet.len().await, 1);

    // corrupt the source
    std::fs::write(file.path(), "{definitely not json").unwrap();
    let result = fleet.reload().await;
    assert!(result.is_err());

    // previous instance set retained in full
    assert_eq!(fleet.len().await, 1);
    assert!(fleet.view(111).await.is_some());
}

#[tokio::test]
async fn test_stop_all_on_shutdown_cleans_sandboxes() {
    let fleet = test_fleet("unused.json".into());
    fleet
        .reconcile(vec![account(111, true), account(222, true)])
        .await
        .unwrap();

    assert_eq!(fleet.start_all().await, 2);
    let sandboxes: Vec<_> = fleet
        .views()
        .await
        .into_iter()
        .filter_map(|v| v.sandbox)
        .collect();
    assert_eq!(sandboxes.len(), 2);

    fleet.shutdown().await;

    for sandbox in sandboxes {
        assert!(!sandbox.exists());
    }
    let views = fleet.views().await;
    assert!(views.iter().all(|v| v.state == "STOPPED"));

    // stopping an already stopped fleet is safe
    assert_eq!(fleet.stop_all().await, 0);
}
