//! Concurrent dispatch of one action across a target list

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::config::ServerSpec;
use crate::errors::RolloutError;
use crate::fleet::cancel::CancelSignal;
use crate::fleet::report::{Completion, FleetReport, OperationResult};
use crate::migrate::{self, MigrationPlan};
use crate::package::Archive;
use crate::release::{ReleaseManager, Retention, Tag};
use crate::session::{shell, Env, OutputLine, OutputSink, RemoteSession, SessionProvider};
use crate::storage::RemoteLayout;

/// Rendered scripts keyed by server identity
pub type ScriptSet = HashMap<String, String>;

/// Everything a deploy worker needs, shared by all workers
#[derive(Debug, Clone)]
pub struct DeployPlan {
    pub archive: Archive,
    /// Clock reading used to derive the release tag
    pub now: DateTime<Utc>,
    pub scripts: ScriptSet,
}

/// Work performed on every target
#[derive(Debug, Clone)]
pub enum Action {
    Deploy(Arc<DeployPlan>),
    Restart(Arc<ScriptSet>),
    Kill(Arc<ScriptSet>),
    Status,
    RollbackList,
    Rollback { tag: String, scripts: Arc<ScriptSet> },
    Run(Arc<MigrationPlan>),
    TailLog,
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::Deploy(_) => "deploy",
            Action::Restart(_) => "restart",
            Action::Kill(_) => "kill",
            Action::Status => "status",
            Action::RollbackList => "rollback ls",
            Action::Rollback { .. } => "rollback",
            Action::Run(_) => "run",
            Action::TailLog => "log",
        }
    }
}

/// Runs one worker per target and collects their results
pub struct FleetExecutor {
    provider: Arc<dyn SessionProvider>,
    layout: RemoteLayout,
    retention: Retention,
    cancel: CancelSignal,
    output: Option<OutputSink>,
}

impl FleetExecutor {
    pub fn new(provider: Arc<dyn SessionProvider>, layout: RemoteLayout, retention: Retention) -> Self {
        Self {
            provider,
            layout,
            retention,
            cancel: CancelSignal::never(),
            output: None,
        }
    }

    pub fn with_cancel(mut self, cancel: CancelSignal) -> Self {
        self.cancel = cancel;
        self
    }

    /// Forward remote program output to `sink`
    pub fn with_output(mut self, sink: OutputSink) -> Self {
        self.output = Some(sink);
        self
    }

    pub fn layout(&self) -> &RemoteLayout {
        &self.layout
    }

    /// Run `action` on every target concurrently. Returns once every target
    /// has a terminal result; results keep target order.
    pub async fn dispatch(&self, targets: &[ServerSpec], action: Action) -> FleetReport {
        info!("Dispatching {} to {} servers", action.name(), targets.len());
        let (tx, mut rx) = mpsc::channel::<(usize, OperationResult)>(targets.len().max(1));

        for (index, server) in targets.iter().enumerate() {
            let worker = Worker {
                provider: self.provider.clone(),
                layout: self.layout.clone(),
                retention: self.retention,
                cancel: self.cancel.clone(),
                sink: self.sink(),
                server: server.clone(),
                action: action.clone(),
            };
            let tx = tx.clone();
            tokio::spawn(async move {
                let id = worker.server.id();
                let result = worker.run().await;
                let _ = tx.send((index, OperationResult::new(id, result))).await;
            });
        }
        drop(tx);

        let mut slots: Vec<Option<OperationResult>> = vec![None; targets.len()];
        while let Some((index, result)) = rx.recv().await {
            match result.failure() {
                Some(failure) => error!("[{}] {} failed: {}", result.server, action.name(), failure.detail),
                None => info!("[{}] {} succeeded", result.server, action.name()),
            }
            slots[index] = Some(result);
        }

        let results = slots
            .into_iter()
            .zip(targets)
            .map(|(slot, server)| {
                slot.unwrap_or_else(|| {
                    error!("[{}] worker terminated without a result", server.id());
                    OperationResult::new(
                        server.id(),
                        Err(RolloutError::IoError(std::io::Error::other(
                            "worker terminated without a result",
                        ))),
                    )
                })
            })
            .collect();
        FleetReport { results }
    }

    fn sink(&self) -> OutputSink {
        match &self.output {
            Some(sink) => sink.clone(),
            // nobody listens; sends are dropped
            None => mpsc::unbounded_channel().0,
        }
    }
}

/// One target's sequential steps
struct Worker {
    provider: Arc<dyn SessionProvider>,
    layout: RemoteLayout,
    retention: Retention,
    cancel: CancelSignal,
    sink: OutputSink,
    server: ServerSpec,
    action: Action,
}

impl Worker {
    async fn run(&self) -> Result<Completion, RolloutError> {
        self.cancel.check("connecting")?;
        let session = self.step("connect", self.provider.connect(&self.server)).await?;
        let result = self.perform(session.as_ref()).await;
        session.close().await;
        result
    }

    /// Abandon the step when cancellation is requested
    async fn step<T, F>(&self, name: &str, fut: F) -> Result<T, RolloutError>
    where
        F: Future<Output = Result<T, RolloutError>>,
    {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                Err(RolloutError::Cancelled(format!("cancelled during {}", name)))
            }
            result = fut => result,
        }
    }

    async fn perform(&self, session: &dyn RemoteSession) -> Result<Completion, RolloutError> {
        match &self.action {
            Action::Deploy(plan) => self.deploy(session, plan).await,
            Action::Restart(scripts) | Action::Kill(scripts) => {
                let script = self.script(scripts)?;
                self.step("script", self.run_script(session, script)).await?;
                Ok(Completion::Done)
            }
            Action::Status => self.status(session).await,
            Action::RollbackList => {
                let releases = self.step("listing", self.open(session)).await?;
                Ok(Completion::Releases {
                    releases: releases.list(),
                })
            }
            Action::Rollback { tag, scripts } => {
                let script = self.script(scripts)?;
                let mut releases = self.step("listing", self.open(session)).await?;
                self.cancel.check("activation")?;
                let tag = releases.rollback(tag).await?;
                self.step("restart", self.run_script(session, script)).await?;
                Ok(Completion::RolledBack { tag })
            }
            Action::Run(plan) => {
                let programs = self
                    .step(
                        "migration",
                        migrate::execute(session, &self.layout, plan, &self.sink),
                    )
                    .await?;
                Ok(Completion::Migrated { programs })
            }
            Action::TailLog => self.tail(session).await,
        }
    }

    /// stage, activate, run the deploy script, then prune. Pruning is
    /// cleanup: its failure is reported but the restart has already run.
    async fn deploy(&self, session: &dyn RemoteSession, plan: &DeployPlan) -> Result<Completion, RolloutError> {
        let script = self.script(&plan.scripts)?;
        let mut releases = self.step("listing", self.open(session)).await?;
        let tag = self.step("staging", releases.stage(&plan.archive, plan.now)).await?;

        // Point of no return: activation is never interrupted
        self.cancel.check("activation")?;
        releases.activate(&tag).await?;

        self.step("deploy script", self.run_script(session, script)).await?;
        let pruned = self.step("pruning", releases.prune()).await?;
        Ok(Completion::Deployed { tag, pruned })
    }

    async fn status(&self, session: &dyn RemoteSession) -> Result<Completion, RolloutError> {
        let releases = self.step("listing", self.open(session)).await?;
        let active: Option<Tag> = releases.active().map(|r| r.tag.clone());

        let script = format!(
            "pid_file={}\n\
             if [ -f \"$pid_file\" ]; then\n\
             pid=$(cat \"$pid_file\")\n\
             echo \"pid $pid\"\n\
             if kill -0 \"$pid\" 2>/dev/null; then echo running; fi\n\
             fi",
            shell::path(&self.layout.pid_file(&self.server))
        );
        let output = self
            .step("status", session.run(&script, &Env::new()))
            .await?
            .into_result()?;

        let mut pid = None;
        let mut running = false;
        for line in output.stdout.lines() {
            match line.split_once(' ') {
                Some(("pid", value)) => pid = value.trim().parse().ok(),
                _ if line.trim() == "running" => running = true,
                _ => {}
            }
        }
        Ok(Completion::Status {
            active,
            pid,
            running,
        })
    }

    async fn tail(&self, session: &dyn RemoteSession) -> Result<Completion, RolloutError> {
        let path = self.layout.log_file(&self.server);
        let mut lines = self.step("tail", session.tail(&path)).await?;
        let id = self.server.id();
        loop {
            tokio::select! {
                biased;
                // Following a log has no state to protect
                _ = self.cancel.cancelled() => return Ok(Completion::Done),
                line = lines.next() => match line {
                    Some(Ok(line)) => {
                        let _ = self.sink.send(OutputLine { server: id.clone(), line });
                    }
                    Some(Err(err)) => return Err(err),
                    None => return Ok(Completion::Done),
                },
            }
        }
    }

    async fn open<'s>(&'s self, session: &'s dyn RemoteSession) -> Result<ReleaseManager<'s>, RolloutError> {
        ReleaseManager::open(session, &self.layout, self.retention).await
    }

    async fn run_script(&self, session: &dyn RemoteSession, script: &str) -> Result<(), RolloutError> {
        debug!("[{}] running script:\n{}", self.server.id(), script);
        let output = session.run(script, &Env::new()).await?;
        let id = self.server.id();
        for line in output.stdout.lines().chain(output.stderr.lines()) {
            let _ = self.sink.send(OutputLine {
                server: id.clone(),
                line: line.to_string(),
            });
        }
        output.into_result().map(|_| ())
    }

    fn script<'a>(&self, scripts: &'a ScriptSet) -> Result<&'a str, RolloutError> {
        scripts
            .get(&self.server.id())
            .map(String::as_str)
            .ok_or_else(|| {
                RolloutError::ConfigError(format!("no script rendered for {}", self.server.id()))
            })
    }
}
