//! External process execution with combined output capture.
//!
//! Every external tool invocation in the pipeline goes through
//! [`run_captured`]: the child's stdout and stderr are drained concurrently
//! into one buffer while the caller awaits the exit status, and the whole
//! wait is raced against the caller's cancellation token.

use std::process::Stdio;

use bpfkit_core::error::{BpfkitError, Result};
use bpfkit_core::exec::ExecOutput;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

/// Run a command to completion, capturing combined stdout+stderr.
///
/// When `stdin_script` is given, the child's stdin is a pipe fed by a
/// dedicated writer task that closes the pipe once the script is written.
/// The writer runs concurrently with the wait on the child: a child that
/// starts emitting output before it has consumed its whole stdin would
/// otherwise deadlock against a full pipe buffer.
///
/// Cancellation kills the child and returns [`BpfkitError::Cancelled`].
pub async fn run_captured(
    cancel: &CancellationToken,
    mut command: Command,
    stdin_script: Option<&'static str>,
) -> Result<ExecOutput> {
    command.stdout(Stdio::piped()).stderr(Stdio::piped());
    command.stdin(if stdin_script.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    });
    command.kill_on_drop(true);

    let mut child = command.spawn()?;

    if let Some(script) = stdin_script {
        let mut stdin = child.stdin.take().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::BrokenPipe, "child stdin unavailable")
        })?;
        tokio::spawn(async move {
            if let Err(e) = stdin.write_all(script.as_bytes()).await {
                tracing::debug!(error = %e, "script writer: child closed stdin early");
            }
            // Dropping the handle closes the pipe and unblocks the child's read.
        });
    }

    let mut stdout = child.stdout.take().ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::BrokenPipe, "child stdout unavailable")
    })?;
    let mut stderr = child.stderr.take().ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::BrokenPipe, "child stderr unavailable")
    })?;

    let stdout_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        let _ = stdout.read_to_end(&mut buf).await;
        buf
    });
    let stderr_task = tokio::spawn(async move {
        let mut buf = Vec::new();
        let _ = stderr.read_to_end(&mut buf).await;
        buf
    });

    tokio::select! {
        _ = cancel.cancelled() => {
            let _ = child.start_kill();
            let _ = child.wait().await;
            Err(BpfkitError::Cancelled(
                "external process terminated by cancellation".to_string(),
            ))
        }
        status = child.wait() => {
            let status = status?;
            let mut output = stdout_task.await.unwrap_or_default();
            output.extend(stderr_task.await.unwrap_or_default());
            Ok(ExecOutput {
                output,
                exit_code: status.code().unwrap_or(-1),
            })
        }
    }
}
