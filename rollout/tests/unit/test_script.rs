//! Script rendering and execution of the rendered scripts

use tokio_test::assert_ok;

use rollout::config::{AppSpec, ServerSpec};
use rollout::errors::RolloutError;
use rollout::script::{ScriptContext, ScriptEngine, ScriptName};
use rollout::session::{Env, SessionProvider};
use rollout::storage::RemoteLayout;

use crate::support::{config, prod, servers, Fixture, APP};

fn context(app: &AppSpec) -> ScriptContext {
    let server = ServerSpec::new("app", "10.0.0.1", 22);
    ScriptContext::new(app, &server, &RemoteLayout::new(APP))
}

#[tokio::test]
async fn test_default_deploy_layout() {
    let fixture = Fixture::new();
    let app = AppSpec::new(APP);
    let engine = assert_ok!(ScriptEngine::load(&app, fixture.project_dir()).await);

    let ctx = context(&app);
    let script = engine.render(ScriptName::Deploy, &ctx).unwrap();
    assert_eq!(
        script,
        format!("set -e\n{}\n{}", ctx.sync_files, ctx.restart_server)
    );

    let kill = engine.render(ScriptName::Kill, &ctx).unwrap();
    assert_eq!(kill, format!("set -e\n{}", ctx.kill_server));
}

#[tokio::test]
async fn test_override_is_read_from_project() {
    let fixture = Fixture::new();
    fixture.write(
        "scripts/restart.sh",
        "{% for arg in App.Args %}[{{ arg }}]{% endfor %} -> {{ LogFile }}",
    );
    let mut app = AppSpec::new(APP);
    app.args = vec!["-port".to_string(), "8080".to_string()];
    app.restart_script = Some("scripts/restart.sh".to_string());

    let engine = assert_ok!(ScriptEngine::load(&app, fixture.project_dir()).await);
    let script = engine.render(ScriptName::Restart, &context(&app)).unwrap();
    assert_eq!(script, "[-port][8080] -> rollout/web/log/web.log");

    // the deploy script keeps its default
    let deploy = engine.render(ScriptName::Deploy, &context(&app)).unwrap();
    assert!(deploy.starts_with("set -e\nmkdir -p"));
}

#[tokio::test]
async fn test_missing_override_is_config_error() {
    let fixture = Fixture::new();
    let mut app = AppSpec::new(APP);
    app.deploy_script = Some("scripts/missing.sh".to_string());

    let err = ScriptEngine::load(&app, fixture.project_dir())
        .await
        .err()
        .unwrap();
    assert!(matches!(err, RolloutError::ConfigError(_)));
    assert!(err.to_string().contains("missing.sh"));
}

#[tokio::test]
async fn test_invalid_template_is_config_error() {
    let fixture = Fixture::new();
    fixture.write("deploy.tmpl", "{% if %}");
    let mut app = AppSpec::new(APP);
    app.deploy_script = Some("deploy.tmpl".to_string());

    let err = ScriptEngine::load(&app, fixture.project_dir())
        .await
        .err()
        .unwrap();
    assert!(matches!(err, RolloutError::ConfigError(_)));
}

#[tokio::test]
async fn test_installed_rollback_helper() {
    let fixture = Fixture::new();
    let config = config(1, 3, false);
    let server = servers(&config).remove(0);
    let orchestrator = fixture.orchestrator(config);

    let first = orchestrator.deploy(&prod()).await.unwrap();
    assert!(first.is_success());
    let second = orchestrator.deploy(&prod()).await.unwrap();
    assert!(second.is_success());

    let root = fixture.app_root(&server);
    let dirs = fixture.release_dirs(&server);
    assert_eq!(dirs.len(), 2);

    let provider = fixture.provider();
    let session = provider.connect(&server).await.unwrap();

    let listing = session
        .run("sh rollout/web/rollback.sh ls", &Env::new())
        .await
        .unwrap()
        .into_result()
        .unwrap();
    let lines: Vec<&str> = listing.stdout.lines().collect();
    assert_eq!(
        lines,
        vec![dirs[0].clone(), format!("{} (current)", dirs[1])]
    );

    let output = session
        .run(&format!("sh rollout/web/rollback.sh {}", dirs[0]), &Env::new())
        .await
        .unwrap();
    assert!(output.success(), "rollback.sh failed: {}", output.stderr);
    assert_eq!(fixture.current(&server).as_deref(), Some(dirs[0].as_str()));
    assert!(root.join("pid/web.pid").is_file());

    let output = session
        .run("sh rollout/web/rollback.sh 19990101-000000", &Env::new())
        .await
        .unwrap();
    assert_eq!(output.code, 1);
    assert_eq!(fixture.current(&server).as_deref(), Some(dirs[0].as_str()));
}
