//! Remote session capability
//!
//! A session is an authenticated channel to one server. The fleet executor
//! opens one per target and never shares it between workers.

pub mod local;
pub mod process;
pub mod shell;
pub mod ssh;

use std::collections::BTreeMap;

use async_trait::async_trait;
use futures::stream::BoxStream;
use tokio::sync::mpsc;

use crate::config::ServerSpec;
use crate::errors::RolloutError;

pub use local::LocalProvider;
pub use ssh::{SshOptions, SshProvider};

/// Environment passed to a remote command
pub type Env = BTreeMap<String, String>;

/// Lines of a followed remote file
pub type LineStream = BoxStream<'static, Result<String, RolloutError>>;

/// Receives remote program output as it is produced
pub type OutputSink = mpsc::UnboundedSender<OutputLine>;

/// One line of remote output, tagged with its server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine {
    pub server: String,
    pub line: String,
}

/// Result of a finished remote command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub code: i32,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == 0
    }

    /// Turn a non-zero exit into a script error carrying stderr
    pub fn into_result(self) -> Result<Self, RolloutError> {
        if self.success() {
            Ok(self)
        } else {
            Err(RolloutError::ScriptError {
                code: self.code,
                stderr: self.stderr.trim().to_string(),
            })
        }
    }
}

/// An open channel to one server
#[async_trait]
pub trait RemoteSession: Send + Sync {
    /// The server this session is connected to
    fn server(&self) -> &ServerSpec;

    /// Run a shell command in the remote home directory
    async fn run(&self, cmd: &str, env: &Env) -> Result<CommandOutput, RolloutError>;

    /// Run a shell command, forwarding its combined output line by line
    async fn run_streamed(
        &self,
        cmd: &str,
        env: &Env,
        sink: &OutputSink,
    ) -> Result<i32, RolloutError> {
        let output = self.run(cmd, env).await?;
        let server = self.server().id();
        for line in output.stdout.lines().chain(output.stderr.lines()) {
            let _ = sink.send(OutputLine {
                server: server.clone(),
                line: line.to_string(),
            });
        }
        Ok(output.code)
    }

    /// Write bytes to a path relative to the remote home directory
    async fn upload(&self, bytes: &[u8], remote_path: &str) -> Result<(), RolloutError>;

    /// Follow a remote file
    async fn tail(&self, path: &str) -> Result<LineStream, RolloutError>;

    /// Release the channel
    async fn close(&self) {}
}

/// Opens sessions
#[async_trait]
pub trait SessionProvider: Send + Sync {
    async fn connect(&self, server: &ServerSpec) -> Result<Box<dyn RemoteSession>, RolloutError>;
}

/// Parent directory of a slash separated remote path
pub(crate) fn remote_parent(path: &str) -> Option<&str> {
    path.rsplit_once('/')
        .map(|(parent, _)| parent)
        .filter(|parent| !parent.is_empty())
}
