//! Run coordination.
//!
//! The coordinator is the entry point for one event: it asks the trigger
//! matcher whether a run should start, resolves the job graph into a plan,
//! dispatches each concurrency group to the job executor, and aggregates the
//! per-job outcomes into the final `RunResult`.

use crate::dag::DagBuilder;
use crate::triggers::{TriggerEvent, TriggerMatcher};

use chrono::Utc;
use gantry_core::Result;
use gantry_core::events::{Event, RunCompletedPayload, RunStartedPayload};
use gantry_core::ids::RunId;
use gantry_core::pipeline::PipelineDefinition;
use gantry_core::ports::{EventBus, JobExecutor, RunReporter};
use gantry_core::run::{FailureReason, JobResult, JobStatus, RunResult};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Orchestrates one pipeline run per accepted event.
pub struct RunCoordinator {
    executor: Arc<dyn JobExecutor>,
    event_bus: Arc<dyn EventBus>,
    reporter: Arc<dyn RunReporter>,
    trigger_matcher: TriggerMatcher,
    dag_builder: DagBuilder,
}

impl RunCoordinator {
    pub fn new(
        executor: Arc<dyn JobExecutor>,
        event_bus: Arc<dyn EventBus>,
        reporter: Arc<dyn RunReporter>,
    ) -> Self {
        Self {
            executor,
            event_bus,
            reporter,
            trigger_matcher: TriggerMatcher::new(),
            dag_builder: DagBuilder::new(),
        }
    }

    /// Handle one event against a pipeline definition.
    ///
    /// Returns `Ok(None)` when the event does not trigger the pipeline; an
    /// ignored event is not an error. Configuration and cycle errors abort
    /// before any job dispatches.
    pub async fn handle_event(
        &self,
        definition: &PipelineDefinition,
        event: &TriggerEvent,
    ) -> Result<Option<RunResult>> {
        event.validate()?;
        definition.validate()?;

        if !self.trigger_matcher.matches(definition, event) {
            debug!(pipeline = %definition.name, ?event, "Event does not trigger pipeline");
            return Ok(None);
        }

        let plan = self.dag_builder.plan(definition)?;

        let run_id = RunId::new();
        let started_at = Utc::now();
        let start = std::time::Instant::now();

        info!(
            %run_id,
            pipeline = %definition.name,
            jobs = plan.job_count(),
            groups = plan.groups.len(),
            "Starting run"
        );

        self.event_bus
            .publish(Event::RunStarted(RunStartedPayload {
                run_id,
                pipeline_name: definition.name.clone(),
                job_count: plan.job_count() as u32,
                started_at,
            }))
            .await?;

        let mut results: HashMap<String, JobResult> = HashMap::new();
        let mut failed: HashSet<String> = HashSet::new();

        for group in &plan.groups {
            let mut join_set = JoinSet::new();
            let mut dispatched: Vec<String> = Vec::new();

            for node in group {
                if node.definition.needs.iter().any(|dep| failed.contains(dep)) {
                    warn!(%run_id, job = %node.name, "Skipping job, a dependency failed");
                    failed.insert(node.name.clone());
                    results.insert(node.name.clone(), JobResult::skipped(&node.name));
                    continue;
                }

                let executor = self.executor.clone();
                let name = node.name.clone();
                let job = node.definition.clone();
                dispatched.push(node.name.clone());

                join_set.spawn(async move { executor.execute(run_id, &name, &job).await });
            }

            // Barrier: every job in the group reaches a terminal state before
            // the next group starts. A failure never cancels siblings.
            while let Some(joined) = join_set.join_next().await {
                match joined {
                    Ok(job_result) => {
                        if job_result.status != JobStatus::Success {
                            failed.insert(job_result.name.clone());
                        }
                        results.insert(job_result.name.clone(), job_result);
                    }
                    Err(e) => {
                        error!(%run_id, error = %e, "Job task failed to complete");
                    }
                }
            }

            // A job whose task died without producing a result still gets an
            // entry; the run result enumerates every job.
            for name in dispatched {
                if !results.contains_key(&name) {
                    failed.insert(name.clone());
                    results.insert(
                        name.clone(),
                        JobResult {
                            name,
                            status: JobStatus::Failed,
                            steps: Vec::new(),
                            reason: Some(FailureReason::Environment),
                            duration_ms: 0,
                        },
                    );
                }
            }
        }

        let jobs: Vec<JobResult> = definition
            .jobs
            .keys()
            .filter_map(|name| results.remove(name))
            .collect();

        let status = RunResult::aggregate_status(&jobs);
        let completed_at = Utc::now();
        let duration_ms = start.elapsed().as_millis() as u64;

        let result = RunResult {
            id: run_id,
            pipeline_name: definition.name.clone(),
            trigger: event.trigger_info(),
            status,
            jobs,
            started_at,
            completed_at,
            duration_ms,
        };

        info!(%run_id, ?status, duration_ms, "Run completed");

        self.event_bus
            .publish(Event::RunCompleted(RunCompletedPayload {
                run_id,
                pipeline_name: definition.name.clone(),
                status,
                duration_ms,
                completed_at,
            }))
            .await?;

        self.reporter.report(&result).await?;

        Ok(Some(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use gantry_core::Error;
    use gantry_core::pipeline::JobDefinition;
    use gantry_core::ports::{InMemoryEventBus, NullReporter};
    use gantry_core::run::{RunStatus, StepResult, StepStatus};
    use pretty_assertions::assert_eq;

    /// Executor stub: jobs listed in `failing` fail at their first step,
    /// everything else succeeds with one step result per declared step.
    struct StubExecutor {
        failing: Vec<String>,
    }

    impl StubExecutor {
        fn new(failing: &[&str]) -> Self {
            Self {
                failing: failing.iter().map(|s| s.to_string()).collect(),
            }
        }
    }

    #[async_trait]
    impl JobExecutor for StubExecutor {
        async fn execute(&self, _run_id: RunId, name: &str, job: &JobDefinition) -> JobResult {
            let fails = self.failing.iter().any(|f| f == name);
            let steps: Vec<StepResult> = job
                .steps
                .iter()
                .take(if fails { 1 } else { job.steps.len() })
                .map(|step| StepResult {
                    name: step.name.clone(),
                    status: if fails {
                        StepStatus::Failed
                    } else {
                        StepStatus::Success
                    },
                    exit_code: Some(if fails { 1 } else { 0 }),
                    reason: fails.then_some(FailureReason::NonzeroExit),
                    output: String::new(),
                    duration_ms: 1,
                })
                .collect();

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

    fn coordinator(executor: StubExecutor) -> RunCoordinator {
        RunCoordinator::new(
            Arc::new(executor),
            Arc::new(InMemoryEventBus::default()),
            Arc::new(NullReporter),
        )
    }

    fn two_job_pipeline() -> PipelineDefinition {
        PipelineDefinition::from_yaml(
            r#"
name: ci
triggers:
  - type: push
    refs: [master]
jobs:
  basic_install:
    steps:
      - name: run-cli
        run: piker
  testing:
    steps:
      - name: run-tests
        run: pytest tests -rs
"#,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_rejected_event_produces_no_run() {
        let coordinator = coordinator(StubExecutor::new(&[]));
        let definition = two_job_pipeline();
        let event = TriggerEvent::Push {
            git_ref: "feature-x".to_string(),
        };

        let result = coordinator.handle_event(&definition, &event).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_accepted_event_runs_all_jobs() {
        let coordinator = coordinator(StubExecutor::new(&[]));
        let definition = two_job_pipeline();
        let event = TriggerEvent::Push {
            git_ref: "master".to_string(),
        };

        let result = coordinator
            .handle_event(&definition, &event)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(result.status, RunStatus::Success);
        assert_eq!(result.jobs.len(), 2);
        // Results come back in declaration order regardless of completion order.
        assert_eq!(result.jobs[0].name, "basic_install");
        assert_eq!(result.jobs[1].name, "testing");
    }

    #[tokio::test]
    async fn test_one_failure_does_not_stop_siblings() {
        let coordinator = coordinator(StubExecutor::new(&["basic_install"]));
        let definition = two_job_pipeline();
        let event = TriggerEvent::Push {
            git_ref: "master".to_string(),
        };

        let result = coordinator
            .handle_event(&definition, &event)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(result.status, RunStatus::Failed);
        assert_eq!(result.job("basic_install").unwrap().status, JobStatus::Failed);
        assert_eq!(result.job("testing").unwrap().status, JobStatus::Success);
    }

    #[tokio::test]
    async fn test_dependent_of_failed_job_is_skipped() {
        let coordinator = coordinator(StubExecutor::new(&["build"]));
        let definition = PipelineDefinition::from_yaml(
            r#"
name: chained
triggers:
  - type: push
jobs:
  build:
    steps:
      - name: compile
        run: make
  deploy:
    needs: [build]
    steps:
      - name: ship
        run: make deploy
"#,
        )
        .unwrap();
        let event = TriggerEvent::Push {
            git_ref: "master".to_string(),
        };

        let result = coordinator
            .handle_event(&definition, &event)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(result.status, RunStatus::Failed);
        assert_eq!(result.job("deploy").unwrap().status, JobStatus::Skipped);
        assert!(result.job("deploy").unwrap().steps.is_empty());
    }

    #[tokio::test]
    async fn test_cycle_aborts_before_dispatch() {
        let coordinator = coordinator(StubExecutor::new(&[]));
        let definition = PipelineDefinition::from_yaml(
            r#"
name: cyclic
triggers:
  - type: push
jobs:
  a:
    needs: [b]
    steps:
      - name: one
        run: "true"
  b:
    needs: [a]
    steps:
      - name: two
        run: "true"
"#,
        )
        .unwrap();
        let event = TriggerEvent::Push {
            git_ref: "master".to_string(),
        };

        let err = coordinator
            .handle_event(&definition, &event)
            .await
            .unwrap_err();
        match err {
            Error::Cycle { jobs } => assert_eq!(jobs, vec!["a", "b"]),
            other => panic!("expected cycle error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_malformed_event_is_an_error() {
        let coordinator = coordinator(StubExecutor::new(&[]));
        let definition = two_job_pipeline();
        let event = TriggerEvent::Push {
            git_ref: String::new(),
        };

        let err = coordinator
            .handle_event(&definition, &event)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MalformedEvent(_)));
    }
}
