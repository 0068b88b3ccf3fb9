//! Sessions against local directories
//!
//! Every server gets its own directory under a root, used as that server's
//! `$HOME`. Commands run through `sh -c` exactly as they would remotely, which
//! makes this transport useful for rehearsing a rollout on one machine.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::config::ServerSpec;
use crate::errors::RolloutError;
use crate::filesys::dir::Dir;
use crate::session::{
    process, shell, CommandOutput, Env, LineStream, OutputSink, RemoteSession, SessionProvider,
};

/// Opens sessions rooted in local directories
#[derive(Debug, Clone)]
pub struct LocalProvider {
    root: PathBuf,
}

impl LocalProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory standing in for a server's home
    pub fn home_of(&self, server: &ServerSpec) -> PathBuf {
        let name: String = server
            .id()
            .chars()
            .map(|c| if c == ':' || c == '/' { '_' } else { c })
            .collect();
        self.root.join(name)
    }
}

#[async_trait]
impl SessionProvider for LocalProvider {
    async fn connect(&self, server: &ServerSpec) -> Result<Box<dyn RemoteSession>, RolloutError> {
        let home = Dir::new(self.home_of(server));
        home.create()
            .await
            .map_err(|e| RolloutError::ConnectionError(format!("{}: {}", server.id(), e)))?;
        debug!("Opened local session for {} at {}", server.id(), home.path().display());
        Ok(Box::new(LocalSession {
            server: server.clone(),
            home: home.path().to_path_buf(),
        }))
    }
}

/// One server emulated by a local directory
pub struct LocalSession {
    server: ServerSpec,
    home: PathBuf,
}

impl LocalSession {
    fn command(&self, script: &str, env: &Env) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c")
            .arg(script)
            .current_dir(&self.home)
            .env("HOME", &self.home)
            .envs(env);
        cmd
    }
}

#[async_trait]
impl RemoteSession for LocalSession {
    fn server(&self) -> &ServerSpec {
        &self.server
    }

    async fn run(&self, cmd: &str, env: &Env) -> Result<CommandOutput, RolloutError> {
        debug!("[{}] $ {}", self.server.id(), cmd);
        process::output(self.command(cmd, env), None)
            .await
            .map_err(|e| RolloutError::ConnectionError(e.to_string()))
    }

    async fn run_streamed(
        &self,
        cmd: &str,
        env: &Env,
        sink: &OutputSink,
    ) -> Result<i32, RolloutError> {
        debug!("[{}] $ {}", self.server.id(), cmd);
        process::streamed(self.command(cmd, env), &self.server.id(), sink)
            .await
            .map_err(|e| RolloutError::ConnectionError(e.to_string()))
    }

    async fn upload(&self, bytes: &[u8], remote_path: &str) -> Result<(), RolloutError> {
        let target = if Path::new(remote_path).is_absolute() {
            PathBuf::from(remote_path)
        } else {
            self.home.join(remote_path)
        };
        crate::filesys::file::File::new(target)
            .write_atomic(bytes)
            .await
            .map_err(|e| RolloutError::TransferError(format!("upload of {} failed: {}", remote_path, e)))
    }

    async fn tail(&self, path: &str) -> Result<LineStream, RolloutError> {
        let script = format!("tail -n 20 -F {}", shell::path(path));
        process::lines(self.command(&script, &Env::new()))
            .map_err(|e| RolloutError::ConnectionError(e.to_string()))
    }
}
