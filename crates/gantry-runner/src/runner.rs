//! Core runner trait and types.

use async_trait::async_trait;
use gantry_core::Result;
use gantry_core::run::FailureReason;
use std::path::PathBuf;
use tokio::sync::mpsc;
use tokio::time::Duration;

/// Output line from step execution.
#[derive(Debug, Clone)]
pub struct OutputLine {
    pub stream: OutputStream,
    pub content: String,
    pub line_number: u32,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Output stream type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// Outcome of one command execution.
///
/// A timeout or nonzero exit is an outcome, not an error: the executor
/// records it in the step's result and applies the short-circuit rule. An
/// `Err` from a runner means the command could not be started at all.
#[derive(Debug, Clone)]
pub struct StepOutcome {
    /// Exit code of the command; `None` when it was killed on timeout.
    pub exit_code: Option<i32>,
    pub success: bool,
    pub reason: Option<FailureReason>,
    pub duration_ms: u64,
}

impl StepOutcome {
    pub fn completed(exit_code: i32, duration_ms: u64) -> Self {
        Self {
            exit_code: Some(exit_code),
            success: exit_code == 0,
            reason: (exit_code != 0).then_some(FailureReason::NonzeroExit),
            duration_ms,
        }
    }

    pub fn timed_out(duration_ms: u64) -> Self {
        Self {
            exit_code: None,
            success: false,
            reason: Some(FailureReason::Timeout),
            duration_ms,
        }
    }
}

/// Context for executing one step's command.
///
/// The command is already resolved: a `uses` reference has been turned into
/// its concrete invocation before it reaches a runner.
#[derive(Debug, Clone)]
pub struct StepContext {
    pub workspace: PathBuf,
    pub command: String,
    pub timeout: Duration,
}

/// Trait for step execution.
#[async_trait]
pub trait StepRunner: Send + Sync {
    /// Execute a command, streaming output to the provided channel.
    async fn execute(
        &self,
        ctx: &StepContext,
        output_tx: mpsc::Sender<OutputLine>,
    ) -> Result<StepOutcome>;
}

/// Configuration for step execution.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Capacity of the per-step output channel.
    pub output_capacity: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            output_capacity: 256,
        }
    }
}
