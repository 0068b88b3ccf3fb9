//! Migration programs built, shipped and run on local servers

use tokio::sync::mpsc;
use tokio_test::{assert_err, assert_ok};

use rollout::errors::{ErrorKind, RolloutError};
use rollout::fleet::Completion;
use rollout::migrate::MigrationSpec;

use crate::support::{collect_output, config, prod, servers, Fixture};

fn specs(raw: &[&str]) -> Vec<MigrationSpec> {
    raw.iter().map(|s| s.parse().unwrap()).collect()
}

#[tokio::test]
async fn test_programs_run_in_order() {
    let fixture = Fixture::new();
    let config = config(2, 3, false);
    let (tx, rx) = mpsc::unbounded_channel();
    let orchestrator = fixture.orchestrator(config).with_output(tx);

    let report = assert_ok!(
        orchestrator
            .run(&prod(), specs(&["migrations/users.go -v", "migrations/seed.go"]))
            .await
    );
    assert!(report.is_success());
    for result in &report.results {
        assert_eq!(
            result.completion(),
            Some(&Completion::Migrated {
                programs: vec!["users".to_string(), "seed".to_string()]
            })
        );
    }

    drop(orchestrator);
    let lines = collect_output(rx);
    let first: Vec<&str> = lines
        .iter()
        .filter(|l| l.server == "app@10.0.0.1:22")
        .map(|l| l.line.as_str())
        .collect();
    assert_eq!(first.len(), 2);
    assert!(first[0].starts_with("ran migrations/users.go") && first[0].ends_with(" -v"));
    assert!(first[1].starts_with("ran migrations/seed.go"));
}

#[tokio::test]
async fn test_failure_stops_remaining_programs() {
    let fixture = Fixture::new();
    let config = config(1, 3, false);
    let server = servers(&config).remove(0);
    let (tx, rx) = mpsc::unbounded_channel();
    let orchestrator = fixture.orchestrator(config).with_output(tx);

    let report = assert_ok!(
        orchestrator
            .run(&prod(), specs(&["ok.go", "fail.go", "after.go"]))
            .await
    );
    let failure = report.results[0].failure().unwrap();
    assert_eq!(failure.kind, ErrorKind::Migration);
    assert!(failure.detail.contains("fail"));

    drop(orchestrator);
    let lines: Vec<String> = collect_output(rx).into_iter().map(|l| l.line).collect();
    assert!(lines.iter().any(|l| l.starts_with("ran ok.go")));
    assert!(lines.iter().any(|l| l == "failing fail.go"));
    assert!(!lines.iter().any(|l| l.contains("after.go")));

    // the archive stays on both sides for inspection
    assert!(fixture
        .project_dir()
        .join("tmp/migrations.tar.gz")
        .is_file());
    assert!(fixture.app_root(&server).join("migrations.tar.gz").is_file());
    assert!(fixture.app_root(&server).join("migrations/after").is_file());
}

#[tokio::test]
async fn test_spec_env_overrides_server_env() {
    let fixture = Fixture::new();
    let mut config = config(2, 3, false);
    for server in config.servers.get_mut("prod").unwrap() {
        server.envs.insert("MODE".to_string(), "server".to_string());
    }
    let (tx, rx) = mpsc::unbounded_channel();
    let orchestrator = fixture.orchestrator(config).with_output(tx);

    let report = assert_ok!(
        orchestrator
            .run(&prod(), specs(&["plain.go", "MODE=override tuned.go"]))
            .await
    );
    assert!(report.is_success());

    drop(orchestrator);
    let lines: Vec<String> = collect_output(rx)
        .into_iter()
        .filter(|l| l.server == "app@10.0.0.2:22")
        .map(|l| l.line)
        .collect();
    assert_eq!(
        lines,
        vec!["ran plain.go MODE=server", "ran tuned.go MODE=override"]
    );
}

#[tokio::test]
async fn test_duplicate_sources_get_distinct_names() {
    let fixture = Fixture::new();
    let config = config(1, 3, false);
    let orchestrator = fixture.orchestrator(config);

    let report = assert_ok!(
        orchestrator
            .run(&prod(), specs(&["seed.go a", "seed.go b"]))
            .await
    );
    assert_eq!(
        report.results[0].completion(),
        Some(&Completion::Migrated {
            programs: vec!["seed".to_string(), "seed-2".to_string()]
        })
    );
}

#[tokio::test]
async fn test_suffixed_source_does_not_shadow_repeat() {
    let fixture = Fixture::new();
    let config = config(1, 3, false);
    let (tx, rx) = mpsc::unbounded_channel();
    let orchestrator = fixture.orchestrator(config).with_output(tx);

    let report = assert_ok!(
        orchestrator
            .run(&prod(), specs(&["seed.go", "seed-2.go", "seed.go"]))
            .await
    );
    assert_eq!(
        report.results[0].completion(),
        Some(&Completion::Migrated {
            programs: vec!["seed".to_string(), "seed-2".to_string(), "seed-3".to_string()]
        })
    );

    drop(orchestrator);
    let sources: Vec<String> = collect_output(rx)
        .into_iter()
        .filter_map(|l| l.line.split_whitespace().nth(1).map(str::to_string))
        .collect();
    assert_eq!(sources, vec!["seed.go", "seed-2.go", "seed.go"]);
}

#[tokio::test]
async fn test_no_programs_is_config_error() {
    let fixture = Fixture::new();
    let orchestrator = fixture.orchestrator(config(1, 3, false));

    let err = assert_err!(orchestrator.run(&prod(), Vec::new()).await);
    assert!(matches!(err, RolloutError::ConfigError(_)));
    assert_eq!(std::fs::read_dir(fixture.servers.path()).unwrap().count(), 0);
}

#[test]
fn test_spec_without_program() {
    assert!("".parse::<MigrationSpec>().is_err());
    assert!("MODE=staging".parse::<MigrationSpec>().is_err());
}
