//! Building, shipping and running migrations

use std::path::PathBuf;

use serde::Serialize;
use tracing::{info, warn};

use crate::build::{BuildProvider, Platform};
use crate::errors::RolloutError;
use crate::migrate::spec::{program_names, MigrationSpec};
use crate::package::{Archive, ArchiveBuilder};
use crate::session::{shell, Env, OutputSink, RemoteSession};
use crate::storage::{LocalLayout, RemoteLayout};

/// One built migration program
#[derive(Debug, Clone, Serialize)]
pub struct MigrationProgram {
    pub name: String,
    pub spec: MigrationSpec,
}

/// Programs packed into one archive, ready to ship
#[derive(Debug, Clone)]
pub struct MigrationPlan {
    pub programs: Vec<MigrationProgram>,
    pub archive: Archive,
}

/// Build every spec, pack the programs, and persist the archive locally
/// before anything is transferred
pub async fn prepare(
    builder: &dyn BuildProvider,
    platform: &Platform,
    layout: &LocalLayout,
    specs: Vec<MigrationSpec>,
) -> Result<MigrationPlan, RolloutError> {
    if specs.is_empty() {
        return Err(RolloutError::ConfigError(
            "no migration programs given".to_string(),
        ));
    }

    let dir = layout.migrations_dir();
    dir.recreate().await?;

    let names = program_names(&specs);
    let mut built: Vec<(String, PathBuf)> = Vec::with_capacity(specs.len());
    for (name, spec) in names.iter().zip(&specs) {
        let output = dir.file(name);
        let path = builder
            .build_program(&spec.source, output.path(), platform)
            .await?;
        built.push((name.clone(), path));
    }

    let archive = tokio::task::spawn_blocking(move || {
        let mut archive = ArchiveBuilder::new();
        for (name, path) in &built {
            archive.append_executable(name, path)?;
        }
        archive.finish()
    })
    .await
    .map_err(|e| RolloutError::PackagingError(format!("packaging task failed: {}", e)))??;

    let persisted = layout.migration_archive_file();
    persisted.write_atomic(archive.bytes()).await?;
    info!(
        "Packed {} migrations into {}",
        names.len(),
        persisted.path().display()
    );

    Ok(MigrationPlan {
        programs: names
            .into_iter()
            .zip(specs)
            .map(|(name, spec)| MigrationProgram { name, spec })
            .collect(),
        archive,
    })
}

/// Ship the archive to one server and run its programs in order, stopping
/// at the first failure. Returns the names of the programs that ran.
pub async fn execute(
    session: &dyn RemoteSession,
    layout: &RemoteLayout,
    plan: &MigrationPlan,
    sink: &OutputSink,
) -> Result<Vec<String>, RolloutError> {
    let server = session.server();
    let remote_archive = layout.migration_archive();
    let remote_dir = shell::path(&layout.migrations_dir());

    session.upload(plan.archive.bytes(), &remote_archive).await?;
    let extract = format!(
        "set -e\nrm -rf {dir}\nmkdir -p {dir}\ntar -xzf {archive} -C {dir}",
        dir = remote_dir,
        archive = shell::path(&remote_archive),
    );
    let output = session.run(&extract, &Env::new()).await?;
    if !output.success() {
        return Err(RolloutError::TransferError(format!(
            "extracting migrations failed: {}",
            output.stderr.trim()
        )));
    }

    let mut ran = Vec::with_capacity(plan.programs.len());
    for program in &plan.programs {
        let mut env = server.envs.clone();
        env.extend(program.spec.envs.clone());

        let mut cmd = format!("cd {} && ./{}", remote_dir, shell::quote(&program.name));
        if !program.spec.args.is_empty() {
            cmd.push(' ');
            cmd.push_str(&shell::join(&program.spec.args));
        }

        info!("[{}] Running migration {}", server.id(), program.name);
        let code = session.run_streamed(&cmd, &env, sink).await?;
        if code != 0 {
            warn!(
                "[{}] Migration {} exited with status {}",
                server.id(),
                program.name,
                code
            );
            return Err(RolloutError::MigrationError(format!(
                "{} exited with status {}",
                program.name, code
            )));
        }
        ran.push(program.name.clone());
    }

    Ok(ran)
}
