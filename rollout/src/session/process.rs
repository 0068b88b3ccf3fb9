//! Child process plumbing shared by the transports

use std::io::ErrorKind;
use std::process::Stdio;

use futures::StreamExt;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;

use crate::errors::RolloutError;
use crate::session::{CommandOutput, LineStream, OutputLine, OutputSink};

/// Run to completion, optionally feeding stdin, and capture output.
///
/// stdin is written while stdout and stderr drain, so a child that talks
/// before it has read everything cannot stall on a full pipe.
pub async fn output(mut cmd: Command, stdin: Option<&[u8]>) -> std::io::Result<CommandOutput> {
    cmd.stdin(if stdin.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    })
    .stdout(Stdio::piped())
    .stderr(Stdio::piped())
    .kill_on_drop(true);

    let mut child = cmd.spawn()?;
    let pipe = child.stdin.take();

    let feed = async move {
        if let (Some(bytes), Some(mut pipe)) = (stdin, pipe) {
            pipe.write_all(bytes).await?;
            pipe.shutdown().await?;
        }
        Ok::<(), std::io::Error>(())
    };
    let (fed, output) = tokio::join!(feed, child.wait_with_output());
    let output = output?;
    match fed {
        // the child exited without reading everything; its status tells why
        Err(e) if e.kind() == ErrorKind::BrokenPipe => {}
        other => other?,
    }

    Ok(CommandOutput {
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        code: output.status.code().unwrap_or(-1),
    })
}

/// Run to completion, forwarding stdout and stderr lines as they arrive
pub async fn streamed(mut cmd: Command, server: &str, sink: &OutputSink) -> std::io::Result<i32> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd.spawn()?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| std::io::Error::other("stdout not captured"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| std::io::Error::other("stderr not captured"))?;

    let mut out = BufReader::new(stdout).lines();
    let mut err = BufReader::new(stderr).lines();
    let (mut out_done, mut err_done) = (false, false);

    while !(out_done && err_done) {
        let line = tokio::select! {
            line = out.next_line(), if !out_done => match line? {
                Some(line) => Some(line),
                None => {
                    out_done = true;
                    None
                }
            },
            line = err.next_line(), if !err_done => match line? {
                Some(line) => Some(line),
                None => {
                    err_done = true;
                    None
                }
            },
        };
        if let Some(line) = line {
            let _ = sink.send(OutputLine {
                server: server.to_string(),
                line,
            });
        }
    }

    let status = child.wait().await?;
    Ok(status.code().unwrap_or(-1))
}

/// Spawn a long-lived command and expose its stdout as a line stream.
///
/// Dropping the stream kills the child.
pub fn lines(mut cmd: Command) -> std::io::Result<LineStream> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true);

    let mut child = cmd.spawn()?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| std::io::Error::other("stdout not captured"))?;
    let reader = BufReader::new(stdout).lines();

    let stream = futures::stream::unfold(Some((reader, child)), |state| async move {
        let (mut reader, child) = state?;
        match reader.next_line().await {
            Ok(Some(line)) => Some((Ok(line), Some((reader, child)))),
            Ok(None) => None,
            Err(e) => Some((Err(RolloutError::from(e)), None)),
        }
    });

    Ok(stream.boxed())
}
