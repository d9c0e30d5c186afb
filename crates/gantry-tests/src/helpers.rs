//! Stub ports and test utilities.

use async_trait::async_trait;
use futures::StreamExt;
use gantry_core::Result;
use gantry_core::events::Event;
use gantry_core::ids::RunId;
use gantry_core::pipeline::JobDefinition;
use gantry_core::ports::{EventBus, InMemoryEventBus, JobExecutor, RunReporter};
use gantry_core::run::{
    FailureReason, JobResult, JobStatus, RunResult, StepResult, StepStatus,
};
use gantry_runner::{OutputLine, OutputStream, StepContext, StepOutcome, StepRunner};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::time::Duration;

/// Step runner with scripted outcomes, keyed by resolved command.
///
/// Records every invocation so tests can assert that short-circuited steps
/// were never run.
pub struct ScriptedRunner {
    failing: HashSet<String>,
    timing_out: HashSet<String>,
    invocations: Mutex<Vec<String>>,
}

impl ScriptedRunner {
    pub fn all_success() -> Self {
        Self {
            failing: HashSet::new(),
            timing_out: HashSet::new(),
            invocations: Mutex::new(Vec::new()),
        }
    }

    /// Commands in `commands` fail with exit code 1; everything else succeeds.
    pub fn failing_on(commands: &[&str]) -> Self {
        let mut runner = Self::all_success();
        runner.failing = commands.iter().map(|s| s.to_string()).collect();
        runner
    }

    /// Commands in `commands` are reported as timed out.
    pub fn timing_out_on(commands: &[&str]) -> Self {
        let mut runner = Self::all_success();
        runner.timing_out = commands.iter().map(|s| s.to_string()).collect();
        runner
    }

    /// Every command executed so far, in order.
    pub fn invocations(&self) -> Vec<String> {
        self.invocations.lock().unwrap().clone()
    }

    /// How many times the given command was executed.
    pub fn count(&self, command: &str) -> usize {
        self.invocations
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.as_str() == command)
            .count()
    }
}

#[async_trait]
impl StepRunner for ScriptedRunner {
    async fn execute(
        &self,
        ctx: &StepContext,
        output_tx: mpsc::Sender<OutputLine>,
    ) -> Result<StepOutcome> {
        self.invocations.lock().unwrap().push(ctx.command.clone());

        let _ = output_tx
            .send(OutputLine {
                stream: OutputStream::Stdout,
                content: format!("$ {}", ctx.command),
                line_number: 1,
                timestamp: chrono::Utc::now(),
            })
            .await;

        if self.timing_out.contains(&ctx.command) {
            return Ok(StepOutcome::timed_out(5));
        }
        if self.failing.contains(&ctx.command) {
            return Ok(StepOutcome::completed(1, 1));
        }
        Ok(StepOutcome::completed(0, 1))
    }
}

/// Start and finish times of one stub job execution.
#[derive(Debug, Clone)]
pub struct JobSpan {
    pub name: String,
    pub started: Instant,
    pub finished: Instant,
}

/// Job executor with per-job scripted outcomes and delays.
///
/// Records a [`JobSpan`] per execution so barrier tests can assert that a
/// whole concurrency group reached a terminal state before the next group
/// started.
pub struct ScriptedJobExecutor {
    failing: HashSet<String>,
    delays: HashMap<String, Duration>,
    spans: Mutex<Vec<JobSpan>>,
}

impl ScriptedJobExecutor {
    pub fn new() -> Self {
        Self {
            failing: HashSet::new(),
            delays: HashMap::new(),
            spans: Mutex::new(Vec::new()),
        }
    }

    pub fn with_failure(mut self, job: &str) -> Self {
        self.failing.insert(job.to_string());
        self
    }

    pub fn with_delay(mut self, job: &str, delay: Duration) -> Self {
        self.delays.insert(job.to_string(), delay);
        self
    }

    pub fn spans(&self) -> Vec<JobSpan> {
        self.spans.lock().unwrap().clone()
    }

    pub fn span(&self, job: &str) -> Option<JobSpan> {
        self.spans().into_iter().find(|s| s.name == job)
    }
}

impl Default for ScriptedJobExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobExecutor for ScriptedJobExecutor {
    async fn execute(&self, _run_id: RunId, name: &str, job: &JobDefinition) -> JobResult {
        let started = Instant::now();

        if let Some(delay) = self.delays.get(name) {
            tokio::time::sleep(*delay).await;
        }

        let fails = self.failing.contains(name);
        let recorded = if fails { 1 } else { job.steps.len() };
        let steps: Vec<StepResult> = job
            .steps
            .iter()
            .take(recorded)
            .enumerate()
            .map(|(index, step)| {
                let failed = fails && index == recorded - 1;
                StepResult {
                    name: step.name.clone(),
                    status: if failed {
                        StepStatus::Failed
                    } else {
                        StepStatus::Success
                    },
                    exit_code: Some(if failed { 1 } else { 0 }),
                    reason: failed.then_some(FailureReason::NonzeroExit),
                    output: String::new(),
                    duration_ms: 1,
                }
            })
            .collect();

        let finished = Instant::now();
        self.spans.lock().unwrap().push(JobSpan {
            name: name.to_string(),
            started,
            finished,
        });

        JobResult {
            name: name.to_string(),
            status: if fails {
                JobStatus::Failed
            } else {
                JobStatus::Success
            },
            steps,
            reason: None,
            duration_ms: 1,
        }
    }
}

/// Reporter that records every reported run.
pub struct CollectingReporter {
    runs: Mutex<Vec<RunResult>>,
}

impl CollectingReporter {
    pub fn new() -> Self {
        Self {
            runs: Mutex::new(Vec::new()),
        }
    }

    pub fn reported(&self) -> Vec<RunResult> {
        self.runs.lock().unwrap().clone()
    }
}

impl Default for CollectingReporter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RunReporter for CollectingReporter {
    async fn report(&self, result: &RunResult) -> Result<()> {
        self.runs.lock().unwrap().push(result.clone());
        Ok(())
    }
}

/// Record every event published on the bus until the handle is aborted.
pub async fn record_events(
    bus: &InMemoryEventBus,
) -> (Arc<Mutex<Vec<Event>>>, tokio::task::JoinHandle<()>) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    let mut stream = bus.subscribe().await.expect("subscribe");

    let handle = tokio::spawn(async move {
        while let Some(event) = stream.next().await {
            sink.lock().unwrap().push(event);
        }
    });

    (events, handle)
}
