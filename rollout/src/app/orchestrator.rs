//! User-level operations
//!
//! Every operation resolves its targets and does all fallible local work
//! (templates, build, packaging) before the first session opens. An `Err`
//! therefore means nothing reached any server; per-server failures are
//! inside the returned [`FleetReport`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use crate::app::options::RolloutOptions;
use crate::build::{BuildProvider, CommandBuilder};
use crate::config::{Config, ServerSpec};
use crate::errors::RolloutError;
use crate::fleet::{
    resolve_targets, Action, CancelSignal, Completion, DeployPlan, FleetExecutor, FleetReport,
    OperationResult, ScriptSet, TargetSelector,
};
use crate::migrate::{self, MigrationSpec};
use crate::package::{Archive, Packager};
use crate::script::{ScriptContext, ScriptEngine, ScriptName};
use crate::session::{OutputSink, SessionProvider};
use crate::storage::{LocalLayout, RemoteLayout};

pub struct Orchestrator {
    config: Config,
    project_dir: PathBuf,
    local: LocalLayout,
    builder: Arc<dyn BuildProvider>,
    executor: FleetExecutor,
}

impl Orchestrator {
    pub fn new(
        config: Config,
        project_dir: impl Into<PathBuf>,
        provider: Arc<dyn SessionProvider>,
        builder: Arc<dyn BuildProvider>,
    ) -> Self {
        let project_dir = project_dir.into();
        let executor = FleetExecutor::new(
            provider,
            RemoteLayout::new(&config.app.name),
            config.retention(),
        );
        Self {
            local: LocalLayout::for_project(&project_dir),
            config,
            project_dir,
            builder,
            executor,
        }
    }

    /// Orchestrator using the configured transport and `go build`
    pub fn from_options(config: Config, options: &RolloutOptions) -> Self {
        let builder = Arc::new(CommandBuilder::new(&options.project_dir));
        Self::new(
            config,
            &options.project_dir,
            options.transport.provider(),
            builder,
        )
    }

    pub fn with_cancel(mut self, cancel: CancelSignal) -> Self {
        self.executor = self.executor.with_cancel(cancel);
        self
    }

    pub fn with_output(mut self, sink: OutputSink) -> Self {
        self.executor = self.executor.with_output(sink);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn local_layout(&self) -> &LocalLayout {
        &self.local
    }

    /// Build, package and ship a new release, then restart
    pub async fn deploy(&self, selectors: &[TargetSelector]) -> Result<FleetReport, RolloutError> {
        let targets = self.targets(selectors)?;
        let scripts = self.render_all(ScriptName::Deploy, &targets).await?;

        let binary = self
            .builder
            .build(&self.config.app, &self.config.platform())
            .await?;
        let archive = self.package(binary).await?;

        let plan = DeployPlan {
            archive,
            now: Utc::now(),
            scripts,
        };
        Ok(self
            .executor
            .dispatch(&targets, Action::Deploy(Arc::new(plan)))
            .await)
    }

    pub async fn restart(&self, selectors: &[TargetSelector]) -> Result<FleetReport, RolloutError> {
        let targets = self.targets(selectors)?;
        let scripts = self.render_all(ScriptName::Restart, &targets).await?;
        Ok(self
            .executor
            .dispatch(&targets, Action::Restart(Arc::new(scripts)))
            .await)
    }

    pub async fn kill(&self, selectors: &[TargetSelector]) -> Result<FleetReport, RolloutError> {
        let targets = self.targets(selectors)?;
        let scripts = self.render_all(ScriptName::Kill, &targets).await?;
        Ok(self
            .executor
            .dispatch(&targets, Action::Kill(Arc::new(scripts)))
            .await)
    }

    /// Active release and process state of each server
    pub async fn status(&self, selectors: &[TargetSelector]) -> Result<FleetReport, RolloutError> {
        let targets = self.targets(selectors)?;
        Ok(self.executor.dispatch(&targets, Action::Status).await)
    }

    pub async fn rollback_list(
        &self,
        selectors: &[TargetSelector],
    ) -> Result<FleetReport, RolloutError> {
        let targets = self.targets(selectors)?;
        Ok(self.executor.dispatch(&targets, Action::RollbackList).await)
    }

    /// Re-activate `tag` and restart
    pub async fn rollback(
        &self,
        selectors: &[TargetSelector],
        tag: &str,
    ) -> Result<FleetReport, RolloutError> {
        let targets = self.targets(selectors)?;
        let scripts = self.render_all(ScriptName::Restart, &targets).await?;
        let action = Action::Rollback {
            tag: tag.to_string(),
            scripts: Arc::new(scripts),
        };
        Ok(self.executor.dispatch(&targets, action).await)
    }

    /// Build, ship and run migration programs
    pub async fn run(
        &self,
        selectors: &[TargetSelector],
        specs: Vec<MigrationSpec>,
    ) -> Result<FleetReport, RolloutError> {
        let targets = self.targets(selectors)?;
        let plan = migrate::prepare(
            self.builder.as_ref(),
            &self.config.platform(),
            &self.local,
            specs,
        )
        .await?;
        Ok(self
            .executor
            .dispatch(&targets, Action::Run(Arc::new(plan)))
            .await)
    }

    /// Render a script for every target without running anything
    pub async fn inspect(
        &self,
        selectors: &[TargetSelector],
        name: ScriptName,
    ) -> Result<FleetReport, RolloutError> {
        let targets = self.targets(selectors)?;
        let engine = ScriptEngine::load(&self.config.app, &self.project_dir).await?;
        let results = targets
            .iter()
            .map(|server| {
                let script = self.render(&engine, name, server)?;
                Ok(OperationResult::new(server.id(), Ok(Completion::Script { script })))
            })
            .collect::<Result<Vec<_>, RolloutError>>()?;
        Ok(FleetReport { results })
    }

    /// Follow each server's log until cancelled
    pub async fn tail_log(&self, selectors: &[TargetSelector]) -> Result<FleetReport, RolloutError> {
        let targets = self.targets(selectors)?;
        Ok(self.executor.dispatch(&targets, Action::TailLog).await)
    }

    fn targets(&self, selectors: &[TargetSelector]) -> Result<Vec<ServerSpec>, RolloutError> {
        let targets = resolve_targets(&self.config, selectors)?;
        info!(
            "Targets: {}",
            targets.iter().map(ServerSpec::id).collect::<Vec<_>>().join(", ")
        );
        Ok(targets)
    }

    fn render(
        &self,
        engine: &ScriptEngine,
        name: ScriptName,
        server: &ServerSpec,
    ) -> Result<String, RolloutError> {
        let context = ScriptContext::new(&self.config.app, server, self.executor.layout());
        engine.render(name, &context)
    }

    async fn render_all(
        &self,
        name: ScriptName,
        targets: &[ServerSpec],
    ) -> Result<ScriptSet, RolloutError> {
        let engine = ScriptEngine::load(&self.config.app, &self.project_dir).await?;
        targets
            .iter()
            .map(|server| Ok((server.id(), self.render(&engine, name, server)?)))
            .collect()
    }

    async fn package(&self, binary: PathBuf) -> Result<Archive, RolloutError> {
        let root = self.project_dir.clone();
        let app = self.config.app.clone();
        let archive = tokio::task::spawn_blocking(move || {
            Packager::new(root, &app).package(Path::new(&binary))
        })
        .await
        .map_err(|e| RolloutError::PackagingError(format!("packaging task failed: {}", e)))??;

        self.local
            .release_archive_file(&self.config.app.name)
            .write_atomic(archive.bytes())
            .await?;
        Ok(archive)
    }
}
