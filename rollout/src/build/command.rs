//! Builds through `go build` or a configured build command

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info};

use crate::build::{BuildProvider, Platform};
use crate::config::AppSpec;
use crate::errors::RolloutError;
use crate::session::process;
use crate::storage::LocalLayout;

/// Runs build commands in the project directory
#[derive(Debug, Clone)]
pub struct CommandBuilder {
    work_dir: PathBuf,
    layout: LocalLayout,
}

impl CommandBuilder {
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        let work_dir = work_dir.into();
        let layout = LocalLayout::for_project(&work_dir);
        Self { work_dir, layout }
    }

    fn go_build(&self, output: &Path, package: &str, platform: &Platform) -> Command {
        let mut cmd = Command::new("go");
        cmd.arg("build")
            .arg("-o")
            .arg(output)
            .arg(package)
            .current_dir(&self.work_dir)
            .env("GOOS", &platform.os)
            .env("GOARCH", &platform.arch);
        cmd
    }

    async fn execute(&self, cmd: Command, what: &str) -> Result<(), RolloutError> {
        debug!("Running build for {}: {:?}", what, cmd.as_std());
        let output = process::output(cmd, None)
            .await
            .map_err(|e| RolloutError::BuildError(format!("failed to start build of {}: {}", what, e)))?;
        if !output.success() {
            return Err(RolloutError::BuildError(format!(
                "build of {} exited with status {}: {}",
                what,
                output.code,
                output.stderr.trim()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl BuildProvider for CommandBuilder {
    async fn build(&self, app: &AppSpec, platform: &Platform) -> Result<PathBuf, RolloutError> {
        let binary = self.layout.binary_file(&app.name);
        info!("Building {} for {}", app.name, platform);

        let cmd = match app.build_cmd.as_deref().filter(|c| !c.trim().is_empty()) {
            Some(build_cmd) => {
                let mut cmd = Command::new("sh");
                cmd.arg("-c")
                    .arg(build_cmd)
                    .current_dir(&self.work_dir)
                    .env("GOOS", &platform.os)
                    .env("GOARCH", &platform.arch);
                cmd
            }
            None => {
                let package = if app.import_path.is_empty() {
                    "."
                } else {
                    app.import_path.as_str()
                };
                self.go_build(binary.path(), package, platform)
            }
        };

        self.execute(cmd, &app.name).await?;

        if !binary.exists().await {
            return Err(RolloutError::BuildError(format!(
                "build finished but {} does not exist",
                binary.path().display()
            )));
        }
        Ok(binary.path().to_path_buf())
    }

    async fn build_program(
        &self,
        source: &str,
        output: &Path,
        platform: &Platform,
    ) -> Result<PathBuf, RolloutError> {
        info!("Building migration {} for {}", source, platform);
        self.execute(self.go_build(output, source, platform), source)
            .await?;
        Ok(output.to_path_buf())
    }
}
