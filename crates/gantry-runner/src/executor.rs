//! Per-job step execution.
//!
//! The executor runs one job's steps in declared order inside an ephemeral
//! workspace and stops at the first failing step. All failure modes (nonzero
//! exit, timeout, unresolvable action, workspace provisioning) are folded
//! into the returned results; `execute` never fails the caller.

use crate::actions::ActionRegistry;
use crate::environments::EnvironmentFactory;
use crate::runner::{OutputLine, RunnerConfig, StepContext, StepRunner};

use async_trait::async_trait;
use chrono::Utc;
use gantry_core::events::{
    Event, JobCompletedPayload, JobStartedPayload, StepCompletedPayload, StepOutputPayload,
    StepStartedPayload,
};
use gantry_core::ids::{JobId, RunId, StepId};
use gantry_core::pipeline::{JobDefinition, StepDefinition};
use gantry_core::ports::{EventBus, JobExecutor};
use gantry_core::run::{FailureReason, JobResult, JobStatus, StepResult, StepStatus};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::Duration;
use tracing::{error, info, warn};

/// Executes jobs by running their steps through a [`StepRunner`].
pub struct StepExecutor {
    environments: EnvironmentFactory,
    runner: Arc<dyn StepRunner>,
    actions: ActionRegistry,
    event_bus: Arc<dyn EventBus>,
    config: RunnerConfig,
}

impl StepExecutor {
    pub fn new(
        workspace_root: PathBuf,
        runner: Arc<dyn StepRunner>,
        event_bus: Arc<dyn EventBus>,
    ) -> Self {
        Self {
            environments: EnvironmentFactory::new(workspace_root),
            runner,
            actions: ActionRegistry::builtin(),
            event_bus,
            config: RunnerConfig::default(),
        }
    }

    pub fn with_actions(mut self, actions: ActionRegistry) -> Self {
        self.actions = actions;
        self
    }

    /// Events are advisory; a publish failure never affects the job outcome.
    async fn publish(&self, event: Event) {
        if let Err(e) = self.event_bus.publish(event).await {
            warn!(error = %e, "Failed to publish event");
        }
    }

    /// Resolve a step into the command the runner executes.
    fn resolve_command(&self, step: &StepDefinition) -> gantry_core::Result<String> {
        match (&step.uses, &step.run) {
            (Some(uses), _) => self.actions.resolve(uses, &step.with),
            (None, Some(run)) => Ok(run.clone()),
            (None, None) => Err(gantry_core::Error::Configuration(format!(
                "step '{}' has no action or command",
                step.name
            ))),
        }
    }

    async fn run_step(
        &self,
        run_id: RunId,
        job_id: &JobId,
        job: &JobDefinition,
        step: &StepDefinition,
        workspace: &PathBuf,
    ) -> StepResult {
        let step_id = StepId::new(&step.name);

        self.publish(Event::StepStarted(StepStartedPayload {
            run_id,
            job_id: job_id.clone(),
            step_id: step_id.clone(),
            started_at: Utc::now(),
        }))
        .await;

        let command = match self.resolve_command(step) {
            Ok(command) => command,
            Err(e) => {
                error!(step = %step.name, error = %e, "Step provisioning failed");
                let result = StepResult {
                    name: step.name.clone(),
                    status: StepStatus::Failed,
                    exit_code: None,
                    reason: Some(FailureReason::Provisioning),
                    output: e.to_string(),
                    duration_ms: 0,
                };
                self.publish_step_completed(run_id, job_id, &step_id, &result)
                    .await;
                return result;
            }
        };

        let ctx = StepContext {
            workspace: workspace.clone(),
            command,
            timeout: Duration::from_secs(u64::from(job.step_timeout_minutes(step)) * 60),
        };

        // Fold streamed output lines into the captured transcript, republishing
        // each line as an event along the way.
        let (tx, mut rx) = mpsc::channel::<OutputLine>(self.config.output_capacity);
        let bus = self.event_bus.clone();
        let collector_job_id = job_id.clone();
        let collector_step_id = step_id.clone();
        let collector = tokio::spawn(async move {
            let mut transcript = String::new();
            while let Some(line) = rx.recv().await {
                transcript.push_str(&line.content);
                transcript.push('\n');
                let _ = bus
                    .publish(Event::StepOutput(StepOutputPayload {
                        run_id,
                        job_id: collector_job_id.clone(),
                        step_id: collector_step_id.clone(),
                        line_number: line.line_number,
                        content: line.content,
                        timestamp: line.timestamp,
                    }))
                    .await;
            }
            transcript
        });

        let outcome = self.runner.execute(&ctx, tx).await;
        let output = collector.await.unwrap_or_default();

        let result = match outcome {
            Ok(outcome) => StepResult {
                name: step.name.clone(),
                status: if outcome.success {
                    StepStatus::Success
                } else {
                    StepStatus::Failed
                },
                exit_code: outcome.exit_code,
                reason: outcome.reason,
                output,
                duration_ms: outcome.duration_ms,
            },
            Err(e) => {
                error!(step = %step.name, error = %e, "Step could not be started");
                StepResult {
                    name: step.name.clone(),
                    status: StepStatus::Failed,
                    exit_code: None,
                    reason: Some(FailureReason::Environment),
                    output: e.to_string(),
                    duration_ms: 0,
                }
            }
        };

        self.publish_step_completed(run_id, job_id, &step_id, &result)
            .await;
        result
    }

    async fn publish_step_completed(
        &self,
        run_id: RunId,
        job_id: &JobId,
        step_id: &StepId,
        result: &StepResult,
    ) {
        self.publish(Event::StepCompleted(StepCompletedPayload {
            run_id,
            job_id: job_id.clone(),
            step_id: step_id.clone(),
            status: result.status,
            exit_code: result.exit_code,
            duration_ms: result.duration_ms,
            completed_at: Utc::now(),
        }))
        .await;
    }
}

#[async_trait]
impl JobExecutor for StepExecutor {
    async fn execute(&self, run_id: RunId, name: &str, job: &JobDefinition) -> JobResult {
        let start = std::time::Instant::now();
        let job_id = JobId::new(name);

        info!(%run_id, job = %name, "Starting job");

        self.publish(Event::JobStarted(JobStartedPayload {
            run_id,
            job_id: job_id.clone(),
            step_count: job.steps.len() as u32,
            started_at: Utc::now(),
        }))
        .await;

        let environment = self.environments.create(run_id, name);

        if let Err(e) = environment.prepare().await {
            error!(%run_id, job = %name, error = %e, "Environment provisioning failed");
            let result = JobResult {
                name: name.to_string(),
                status: JobStatus::Failed,
                steps: Vec::new(),
                reason: Some(FailureReason::Environment),
                duration_ms: start.elapsed().as_millis() as u64,
            };
            self.publish_job_completed(run_id, &job_id, &result).await;
            return result;
        }

        let mut steps = Vec::new();
        let mut status = JobStatus::Success;

        for step in &job.steps {
            let result = self
                .run_step(run_id, &job_id, job, step, environment.working_dir())
                .await;
            let failed = result.status == StepStatus::Failed;
            steps.push(result);

            // Short-circuit: steps after the first failure never run.
            if failed {
                status = JobStatus::Failed;
                break;
            }
        }

        if let Err(e) = environment.cleanup().await {
            warn!(%run_id, job = %name, error = %e, "Workspace cleanup failed");
        }

        let result = JobResult {
            name: name.to_string(),
            status,
            steps,
            reason: None,
            duration_ms: start.elapsed().as_millis() as u64,
        };

        info!(%run_id, job = %name, status = ?result.status, "Job completed");

        self.publish_job_completed(run_id, &job_id, &result).await;
        result
    }
}

impl StepExecutor {
    async fn publish_job_completed(&self, run_id: RunId, job_id: &JobId, result: &JobResult) {
        self.publish(Event::JobCompleted(JobCompletedPayload {
            run_id,
            job_id: job_id.clone(),
            status: result.status,
            duration_ms: result.duration_ms,
            completed_at: Utc::now(),
        }))
        .await;
    }
}
