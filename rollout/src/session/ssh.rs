//! Sessions over the system `ssh` client

use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::config::ServerSpec;
use crate::errors::RolloutError;
use crate::session::{
    process, remote_parent, shell, CommandOutput, Env, LineStream, OutputSink, RemoteSession,
    SessionProvider,
};

/// ssh reserves this exit status for its own failures
const SSH_FAILURE: i32 = 255;

/// Options passed to every ssh invocation
#[derive(Debug, Clone)]
pub struct SshOptions {
    /// Connection timeout
    pub connect_timeout: Duration,

    /// Extra `-o` options, e.g. `StrictHostKeyChecking=accept-new`
    pub extra_options: Vec<String>,
}

impl Default for SshOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            extra_options: Vec::new(),
        }
    }
}

/// Opens ssh sessions
#[derive(Debug, Clone, Default)]
pub struct SshProvider {
    options: SshOptions,
}

impl SshProvider {
    pub fn new(options: SshOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl SessionProvider for SshProvider {
    async fn connect(&self, server: &ServerSpec) -> Result<Box<dyn RemoteSession>, RolloutError> {
        let session = SshSession {
            server: server.clone(),
            options: self.options.clone(),
        };

        // Run `true` once so authentication problems surface as connection errors
        let check = process::output(session.command("true"), None)
            .await
            .map_err(|e| RolloutError::ConnectionError(format!("failed to run ssh: {}", e)))?;
        if !check.success() {
            return Err(RolloutError::ConnectionError(format!(
                "{}: {}",
                server.id(),
                check.stderr.trim()
            )));
        }

        debug!("Connected to {}", server.id());
        Ok(Box::new(session))
    }
}

/// One server reached through ssh
pub struct SshSession {
    server: ServerSpec,
    options: SshOptions,
}

impl SshSession {
    fn command(&self, remote_cmd: &str) -> Command {
        let mut cmd = Command::new("ssh");
        cmd.arg("-p")
            .arg(self.server.port.to_string())
            .arg("-o")
            .arg("BatchMode=yes")
            .arg("-o")
            .arg(format!(
                "ConnectTimeout={}",
                self.options.connect_timeout.as_secs().max(1)
            ));
        for option in &self.options.extra_options {
            cmd.arg("-o").arg(option);
        }
        cmd.arg(self.server.destination())
            .arg("--")
            .arg(remote_cmd);
        cmd
    }

    /// The login shell may not be POSIX; always hand the script to `sh`
    fn script(cmd: &str, env: &Env) -> String {
        let script = format!("{}{}", shell::exports(env), cmd);
        format!("sh -c {}", shell::quote(&script))
    }

    fn connection_lost(&self, output: &CommandOutput) -> Option<RolloutError> {
        (output.code == SSH_FAILURE).then(|| {
            RolloutError::ConnectionError(format!(
                "{}: {}",
                self.server.id(),
                output.stderr.trim()
            ))
        })
    }
}

#[async_trait]
impl RemoteSession for SshSession {
    fn server(&self) -> &ServerSpec {
        &self.server
    }

    async fn run(&self, cmd: &str, env: &Env) -> Result<CommandOutput, RolloutError> {
        debug!("[{}] $ {}", self.server.id(), cmd);
        let output = process::output(self.command(&Self::script(cmd, env)), None)
            .await
            .map_err(|e| RolloutError::ConnectionError(e.to_string()))?;
        match self.connection_lost(&output) {
            Some(err) => Err(err),
            None => Ok(output),
        }
    }

    async fn run_streamed(
        &self,
        cmd: &str,
        env: &Env,
        sink: &OutputSink,
    ) -> Result<i32, RolloutError> {
        debug!("[{}] $ {}", self.server.id(), cmd);
        let code = process::streamed(self.command(&Self::script(cmd, env)), &self.server.id(), sink)
            .await
            .map_err(|e| RolloutError::ConnectionError(e.to_string()))?;
        if code == SSH_FAILURE {
            return Err(RolloutError::ConnectionError(format!(
                "{}: connection lost",
                self.server.id()
            )));
        }
        Ok(code)
    }

    async fn upload(&self, bytes: &[u8], remote_path: &str) -> Result<(), RolloutError> {
        debug!(
            "[{}] uploading {} bytes to {}",
            self.server.id(),
            bytes.len(),
            remote_path
        );
        let partial = format!("{}.{}.part", remote_path, uuid::Uuid::new_v4());
        let mut script = String::new();
        if let Some(parent) = remote_parent(remote_path) {
            script.push_str(&format!("mkdir -p {} && ", shell::path(parent)));
        }
        script.push_str(&format!(
            "cat > {partial} && mv -f {partial} {target}",
            partial = shell::path(&partial),
            target = shell::path(remote_path)
        ));

        let output = process::output(self.command(&Self::script(&script, &Env::new())), Some(bytes))
            .await
            .map_err(|e| RolloutError::TransferError(e.to_string()))?;
        if !output.success() {
            return Err(RolloutError::TransferError(format!(
                "upload of {} failed: {}",
                remote_path,
                output.stderr.trim()
            )));
        }
        Ok(())
    }

    async fn tail(&self, path: &str) -> Result<LineStream, RolloutError> {
        let script = format!("tail -n 20 -F {}", shell::path(path));
        process::lines(self.command(&Self::script(&script, &Env::new())))
            .map_err(|e| RolloutError::ConnectionError(e.to_string()))
    }
}
