//! Shell-based step execution on the host.

use crate::runner::{OutputLine, OutputStream, RunnerConfig, StepContext, StepOutcome, StepRunner};
use async_trait::async_trait;
use gantry_core::Result;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Shell runner for executing commands inside a job's workspace.
pub struct ShellRunner {
    #[allow(dead_code)]
    config: RunnerConfig,
}

impl ShellRunner {
    pub fn new(config: RunnerConfig) -> Self {
        Self { config }
    }
}

impl Default for ShellRunner {
    fn default() -> Self {
        Self::new(RunnerConfig::default())
    }
}

#[async_trait]
impl StepRunner for ShellRunner {
    async fn execute(
        &self,
        ctx: &StepContext,
        output_tx: mpsc::Sender<OutputLine>,
    ) -> Result<StepOutcome> {
        let start = std::time::Instant::now();

        info!(command = %ctx.command, workspace = %ctx.workspace.display(), "Executing shell command");

        let mut child = Command::new("sh")
            .arg("-c")
            .arg(&ctx.command)
            .current_dir(&ctx.workspace)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                gantry_core::Error::Environment(format!("Failed to spawn process: {}", e))
            })?;

        let stdout = child.stdout.take().unwrap();
        let stderr = child.stderr.take().unwrap();

        // Stream stdout
        let stdout_tx = output_tx.clone();
        let stdout_handle = tokio::spawn(async move {
            let reader = BufReader::new(stdout);
            let mut lines = reader.lines();
            let mut line_num = 0u32;

            while let Ok(Some(line)) = lines.next_line().await {
                line_num += 1;
                let output = OutputLine {
                    stream: OutputStream::Stdout,
                    content: line,
                    line_number: line_num,
                    timestamp: chrono::Utc::now(),
                };
                if stdout_tx.send(output).await.is_err() {
                    break;
                }
            }
        });

        // Stream stderr
        let stderr_tx = output_tx;
        let stderr_handle = tokio::spawn(async move {
            let reader = BufReader::new(stderr);
            let mut lines = reader.lines();
            let mut line_num = 0u32;

            while let Ok(Some(line)) = lines.next_line().await {
                line_num += 1;
                let output = OutputLine {
                    stream: OutputStream::Stderr,
                    content: line,
                    line_number: line_num,
                    timestamp: chrono::Utc::now(),
                };
                if stderr_tx.send(output).await.is_err() {
                    break;
                }
            }
        });

        let wait_result = match timeout(ctx.timeout, child.wait()).await {
            Ok(result) => result,
            Err(_) => {
                warn!(timeout = ?ctx.timeout, "Command timed out, killing process");
                let _ = child.kill().await;
                let _ = stdout_handle.await;
                let _ = stderr_handle.await;
                return Ok(StepOutcome::timed_out(start.elapsed().as_millis() as u64));
            }
        };

        // Wait for output streaming to complete
        let _ = stdout_handle.await;
        let _ = stderr_handle.await;

        let status = wait_result.map_err(|e| {
            gantry_core::Error::Environment(format!("Failed to wait for process: {}", e))
        })?;

        let exit_code = status.code().unwrap_or(-1);
        let duration_ms = start.elapsed().as_millis() as u64;

        debug!(exit_code, duration_ms, "Command completed");

        Ok(StepOutcome::completed(exit_code, duration_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gantry_core::run::FailureReason;
    use std::path::PathBuf;
    use tokio::time::Duration;

    fn ctx(command: &str, timeout: Duration) -> StepContext {
        StepContext {
            workspace: PathBuf::from("/tmp"),
            command: command.to_string(),
            timeout,
        }
    }

    #[tokio::test]
    async fn test_shell_runner_success() {
        let runner = ShellRunner::default();
        let (tx, mut rx) = mpsc::channel(100);

        let outcome = runner
            .execute(&ctx("echo hello", Duration::from_secs(10)), tx)
            .await
            .unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.exit_code, Some(0));
        assert_eq!(outcome.reason, None);

        let line = rx.recv().await.unwrap();
        assert_eq!(line.content, "hello");
        assert_eq!(line.stream, OutputStream::Stdout);
    }

    #[tokio::test]
    async fn test_shell_runner_nonzero_exit() {
        let runner = ShellRunner::default();
        let (tx, _rx) = mpsc::channel(100);

        let outcome = runner
            .execute(&ctx("exit 3", Duration::from_secs(10)), tx)
            .await
            .unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.exit_code, Some(3));
        assert_eq!(outcome.reason, Some(FailureReason::NonzeroExit));
    }

    #[tokio::test]
    async fn test_shell_runner_timeout_is_an_outcome() {
        let runner = ShellRunner::default();
        let (tx, _rx) = mpsc::channel(100);

        let outcome = runner
            .execute(&ctx("sleep 5", Duration::from_millis(200)), tx)
            .await
            .unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.exit_code, None);
        assert_eq!(outcome.reason, Some(FailureReason::Timeout));
    }

    #[tokio::test]
    async fn test_shell_runner_captures_stderr() {
        let runner = ShellRunner::default();
        let (tx, mut rx) = mpsc::channel(100);

        let outcome = runner
            .execute(&ctx("echo oops >&2", Duration::from_secs(10)), tx)
            .await
            .unwrap();
        assert!(outcome.success);

        let line = rx.recv().await.unwrap();
        assert_eq!(line.content, "oops");
        assert_eq!(line.stream, OutputStream::Stderr);
    }
}
