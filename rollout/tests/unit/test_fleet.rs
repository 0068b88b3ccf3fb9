//! Fleet operations end to end, with local directories as servers

use std::collections::HashSet;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio::sync::{mpsc, Notify};
use tokio_test::{assert_err, assert_ok};

use rollout::errors::{ErrorKind, RolloutError};
use rollout::fleet::{CancelHandle, Completion, TargetSelector};
use rollout::release::Tag;
use rollout::script::ScriptName;

use crate::support::{
    collect_output, config, prod, servers, FaultyProvider, Fixture, FlakyProvider,
};

fn deployed_tag(completion: Option<&Completion>) -> String {
    match completion {
        Some(Completion::Deployed { tag, .. }) => tag.to_string(),
        other => panic!("expected a deploy completion, got {:?}", other),
    }
}

#[tokio::test]
async fn test_deploy_isolates_unreachable_server() {
    let fixture = Fixture::new();
    let config = config(3, 3, false);
    let targets = servers(&config);
    let provider = FlakyProvider {
        inner: fixture.provider(),
        unreachable: HashSet::from([targets[1].id()]),
    };
    let orchestrator = fixture.orchestrator_with(config, Arc::new(provider));

    let report = assert_ok!(orchestrator.deploy(&prod()).await);
    assert_eq!(report.results.len(), 3);
    assert_eq!(report.succeeded().count(), 2);
    assert!(!report.is_success());

    let failed: Vec<_> = report.failed().collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].server, targets[1].id());
    assert_eq!(failed[0].failure().unwrap().kind, ErrorKind::Connection);

    for index in [0, 2] {
        let server = &targets[index];
        let result = report.get(&server.id()).unwrap();
        let tag = deployed_tag(result.completion());
        assert_eq!(fixture.current(server).as_deref(), Some(tag.as_str()));
        assert_eq!(fixture.release_dirs(server), vec![tag]);
    }
    assert!(!fixture.app_root(&targets[1]).exists());

    // results keep target order
    let order: Vec<_> = report.results.iter().map(|r| r.server.clone()).collect();
    let expected: Vec<_> = targets.iter().map(|s| s.id()).collect();
    assert_eq!(order, expected);
}

#[tokio::test]
async fn test_deploy_ships_files_and_starts_binary() {
    let fixture = Fixture::new();
    fixture.write("static/tmp/cache.bin", "skip me");
    let config = config(1, 3, false);
    let server = servers(&config).remove(0);
    let (tx, rx) = mpsc::unbounded_channel();
    let orchestrator = fixture.orchestrator(config).with_output(tx);

    let report = assert_ok!(orchestrator.deploy(&prod()).await);
    assert!(report.is_success());
    let tag = deployed_tag(report.results[0].completion());

    let release = fixture.app_root(&server).join("releases").join(&tag);
    assert!(release.join("web").is_file());
    assert!(release.join("static/index.html").is_file());
    assert!(!release.join("static/tmp").exists());

    // the local copy of the archive survives the deploy
    assert!(fixture.project_dir().join("tmp/web.tar.gz").is_file());

    let root = fixture.app_root(&server);
    assert!(root.join("restart.sh").is_file());
    assert!(root.join("rollback.sh").is_file());
    assert!(root.join("pid/web.pid").is_file());

    drop(orchestrator);
    let _ = collect_output(rx);
}

#[tokio::test]
async fn test_rollback_list_and_rollback() {
    let fixture = Fixture::new();
    let config = config(2, 3, false);
    let targets = servers(&config);
    let orchestrator = fixture.orchestrator(config);

    let first = deployed_tag(orchestrator.deploy(&prod()).await.unwrap().results[0].completion());
    let second = deployed_tag(orchestrator.deploy(&prod()).await.unwrap().results[0].completion());
    assert!(second > first);

    let report = assert_ok!(orchestrator.rollback_list(&prod()).await);
    for result in &report.results {
        match result.completion() {
            Some(Completion::Releases { releases }) => {
                let tags: Vec<String> = releases.iter().map(|r| r.tag.to_string()).collect();
                assert_eq!(tags, vec![second.clone(), first.clone()]);
                assert!(releases[0].active);
                assert!(!releases[1].active);
            }
            other => panic!("expected releases, got {:?}", other),
        }
    }

    let report = assert_ok!(orchestrator.rollback(&prod(), &first).await);
    assert!(report.is_success());
    for (result, server) in report.results.iter().zip(&targets) {
        assert_eq!(
            result.completion(),
            Some(&Completion::RolledBack {
                tag: Tag::parse(&first).unwrap()
            })
        );
        assert_eq!(fixture.current(server).as_deref(), Some(first.as_str()));
    }

    let report = assert_ok!(orchestrator.rollback(&prod(), "20000101-000000").await);
    assert_eq!(report.failed().count(), 2);
    for result in &report.results {
        assert_eq!(result.failure().unwrap().kind, ErrorKind::RollbackNotFound);
    }
    for server in &targets {
        assert_eq!(fixture.current(server).as_deref(), Some(first.as_str()));
    }
}

#[tokio::test]
async fn test_status_after_deploy() {
    let fixture = Fixture::new();
    let config = config(1, 3, false);
    let orchestrator = fixture.orchestrator(config);

    let report = assert_ok!(orchestrator.status(&prod()).await);
    assert_eq!(
        report.results[0].completion(),
        Some(&Completion::Status {
            active: None,
            pid: None,
            running: false
        })
    );

    let tag = deployed_tag(orchestrator.deploy(&prod()).await.unwrap().results[0].completion());
    let report = assert_ok!(orchestrator.status(&prod()).await);
    match report.results[0].completion() {
        Some(Completion::Status { active, pid, .. }) => {
            assert_eq!(active.as_ref().map(|t| t.to_string()), Some(tag));
            assert!(pid.is_some());
        }
        other => panic!("expected status, got {:?}", other),
    }
}

#[tokio::test]
async fn test_kill_removes_pid_file() {
    let fixture = Fixture::new();
    let config = config(1, 3, false);
    let server = servers(&config).remove(0);
    let orchestrator = fixture.orchestrator(config);

    assert_ok!(orchestrator.deploy(&prod()).await);
    assert!(fixture.app_root(&server).join("pid/web.pid").is_file());

    let report = assert_ok!(orchestrator.kill(&prod()).await);
    assert!(report.is_success());
    assert!(!fixture.app_root(&server).join("pid/web.pid").exists());

    let report = assert_ok!(orchestrator.restart(&prod()).await);
    assert!(report.is_success());
    assert!(fixture.app_root(&server).join("pid/web.pid").is_file());
}

#[tokio::test]
async fn test_inspect_touches_no_server() {
    let fixture = Fixture::new();
    let config = config(2, 3, false);
    let orchestrator = fixture.orchestrator(config);

    let report = assert_ok!(orchestrator.inspect(&prod(), ScriptName::Deploy).await);
    assert_eq!(report.results.len(), 2);
    for result in &report.results {
        match result.completion() {
            Some(Completion::Script { script }) => {
                assert!(script.starts_with("set -e\n"));
                assert!(script.contains("nohup ./web -port 8080"));
                assert!(script.contains("export MODE=production"));
            }
            other => panic!("expected a script, got {:?}", other),
        }
    }
    assert_eq!(std::fs::read_dir(fixture.servers.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_unknown_set_is_config_error() {
    let fixture = Fixture::new();
    let orchestrator = fixture.orchestrator(config(2, 3, false));

    let selectors = vec![TargetSelector::Set("staging".to_string())];
    let err = assert_err!(orchestrator.deploy(&selectors).await);
    assert!(matches!(err, RolloutError::ConfigError(_)));

    let err = assert_err!(orchestrator.status(&[]).await);
    assert!(matches!(err, RolloutError::ConfigError(_)));

    assert_eq!(std::fs::read_dir(fixture.servers.path()).unwrap().count(), 0);
    assert!(!fixture.project_dir().join("tmp/web.tar.gz").exists());
}

#[tokio::test]
async fn test_cancelled_before_dispatch() {
    let fixture = Fixture::new();
    let config = config(2, 3, false);
    let targets = servers(&config);
    let (cancel, signal) = CancelHandle::new();
    cancel.cancel();
    let orchestrator = fixture.orchestrator(config).with_cancel(signal);

    let report = assert_ok!(orchestrator.deploy(&prod()).await);
    assert_eq!(report.failed().count(), 2);
    for result in &report.results {
        assert_eq!(result.failure().unwrap().kind, ErrorKind::Cancelled);
    }
    for server in &targets {
        assert!(fixture.current(server).is_none());
    }
}

#[tokio::test]
async fn test_cancel_during_staging_keeps_previous_release() {
    let fixture = Fixture::new();
    let config = config(1, 3, false);
    let server = servers(&config).remove(0);

    let first = assert_ok!(fixture.orchestrator(config.clone()).deploy(&prod()).await);
    let first_tag = deployed_tag(first.results[0].completion());

    let uploading = Arc::new(Notify::new());
    let provider = FaultyProvider {
        stalled_upload: Some(uploading.clone()),
        ..FaultyProvider::new(fixture.provider())
    };
    let closed = provider.closed.clone();
    let (cancel, signal) = CancelHandle::new();
    let orchestrator = fixture
        .orchestrator_with(config, Arc::new(provider))
        .with_cancel(signal);

    let env = prod();
    let (report, ()) = tokio::join!(orchestrator.deploy(&env), async {
        uploading.notified().await;
        cancel.cancel();
    });
    let report = assert_ok!(report);
    let failure = report.results[0].failure().unwrap();
    assert_eq!(failure.kind, ErrorKind::Cancelled);
    assert!(failure.detail.contains("staging"), "{}", failure.detail);

    assert_eq!(fixture.current(&server).as_deref(), Some(first_tag.as_str()));
    assert_eq!(fixture.release_dirs(&server), vec![first_tag]);
    assert_eq!(closed.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_prune_failure_still_restarts() {
    let fixture = Fixture::new();
    let config = config(1, 3, false);
    let server = servers(&config).remove(0);
    let provider = FaultyProvider {
        failing_prefix: Some("rm -rf ".to_string()),
        ..FaultyProvider::new(fixture.provider())
    };
    let orchestrator = fixture.orchestrator_with(config, Arc::new(provider));

    let report = assert_ok!(orchestrator.deploy(&prod()).await);
    let failure = report.results[0].failure().unwrap();
    assert_eq!(failure.kind, ErrorKind::Script);
    assert!(failure.detail.contains("rm: busy"), "{}", failure.detail);

    // activated and restarted before pruning ran
    let dirs = fixture.release_dirs(&server);
    assert_eq!(dirs.len(), 1);
    assert_eq!(fixture.current(&server).as_ref(), Some(&dirs[0]));
    let root = fixture.app_root(&server);
    assert!(root.join("restart.sh").is_file());
    assert!(root.join("rollback.sh").is_file());
    assert!(root.join("pid/web.pid").is_file());
}

#[tokio::test]
async fn test_override_with_undefined_field() {
    let fixture = Fixture::new();
    fixture.write("deploy.tmpl", "{{ SyncFiles }}\n{{ Nope }}");
    let mut config = config(1, 3, false);
    config.app.deploy_script = Some("deploy.tmpl".to_string());
    let orchestrator = fixture.orchestrator(config);

    let err = assert_err!(orchestrator.deploy(&prod()).await);
    assert!(matches!(err, RolloutError::ConfigError(_)));
    assert_eq!(std::fs::read_dir(fixture.servers.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_override_template_runs() {
    let fixture = Fixture::new();
    fixture.write(
        "restart.tmpl",
        "set -e\necho restarting {{ App.Name }} on {{ Server.Host }}\n{{ RestartServer }}",
    );
    let mut config = config(1, 3, false);
    config.app.restart_script = Some("restart.tmpl".to_string());
    let (tx, rx) = mpsc::unbounded_channel();
    let orchestrator = fixture.orchestrator(config).with_output(tx);

    assert_ok!(orchestrator.deploy(&prod()).await);
    let report = assert_ok!(orchestrator.restart(&prod()).await);
    assert!(report.is_success());

    drop(orchestrator);
    let lines = collect_output(rx);
    assert!(lines
        .iter()
        .any(|l| l.line == "restarting web on 10.0.0.1" && l.server == "app@10.0.0.1:22"));
}
