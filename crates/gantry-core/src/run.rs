//! Run and result types.
//!
//! Results are immutable once produced. A `JobResult`'s step sequence is
//! always a strict prefix of the job's declared steps: either every step ran
//! and succeeded, or exactly the steps up to and including the first failure
//! ran.

use crate::ids::RunId;
use crate::pipeline::TriggerType;
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RunResult {
    pub id: RunId,
    pub pipeline_name: String,
    pub trigger: TriggerInfo,
    pub status: RunStatus,
    /// Job results in declaration order.
    pub jobs: Vec<JobResult>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl RunResult {
    /// Look up a job's result by name.
    pub fn job(&self, name: &str) -> Option<&JobResult> {
        self.jobs.iter().find(|j| j.name == name)
    }

    /// Overall status from per-job outcomes: success iff every job succeeded.
    pub fn aggregate_status(jobs: &[JobResult]) -> RunStatus {
        if jobs.iter().all(|j| j.status == JobStatus::Success) {
            RunStatus::Success
        } else {
            RunStatus::Failed
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    Failed,
}

impl RunStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, RunStatus::Success)
    }
}

/// The event that started the run.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TriggerInfo {
    pub trigger_type: TriggerType,
    pub git_ref: Option<String>,
    pub triggered_by: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct JobResult {
    pub name: String,
    pub status: JobStatus,
    /// Results for the steps that actually ran, in declared order.
    pub steps: Vec<StepResult>,
    /// Job-level failure classification. Set when the job failed before any
    /// step could run, e.g. its environment could not be provisioned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<FailureReason>,
    pub duration_ms: u64,
}

impl JobResult {
    /// A result for a job that never started because a dependency failed.
    pub fn skipped(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: JobStatus::Skipped,
            steps: Vec::new(),
            reason: None,
            duration_ms: 0,
        }
    }

    /// The first failing step, if any.
    pub fn first_failure(&self) -> Option<&StepResult> {
        self.steps.iter().find(|s| s.status == StepStatus::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Success,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StepResult {
    pub name: String,
    pub status: StepStatus,
    /// Exit code of the step's command, when it ran to completion.
    pub exit_code: Option<i32>,
    /// Why the step failed; set iff status is failed.
    pub reason: Option<FailureReason>,
    /// Captured output, stdout and stderr interleaved in arrival order.
    pub output: String,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Success,
    Failed,
}

/// Uniform classification of step and job failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// The command completed with a nonzero exit status.
    NonzeroExit,
    /// The command did not complete within its timeout.
    Timeout,
    /// A provisioning action could not be resolved or prepared.
    Provisioning,
    /// The isolated execution environment could not be provisioned.
    Environment,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn step(name: &str, status: StepStatus) -> StepResult {
        StepResult {
            name: name.to_string(),
            status,
            exit_code: Some(if status == StepStatus::Success { 0 } else { 1 }),
            reason: (status == StepStatus::Failed).then_some(FailureReason::NonzeroExit),
            output: String::new(),
            duration_ms: 1,
        }
    }

    #[test]
    fn test_aggregate_status_all_success() {
        let jobs = vec![JobResult {
            name: "testing".to_string(),
            status: JobStatus::Success,
            steps: vec![step("checkout", StepStatus::Success)],
            reason: None,
            duration_ms: 1,
        }];
        assert_eq!(RunResult::aggregate_status(&jobs), RunStatus::Success);
    }

    #[test]
    fn test_aggregate_status_any_failure() {
        let jobs = vec![
            JobResult {
                name: "a".to_string(),
                status: JobStatus::Success,
                steps: vec![],
                reason: None,
                duration_ms: 1,
            },
            JobResult {
                name: "b".to_string(),
                status: JobStatus::Failed,
                steps: vec![step("install", StepStatus::Failed)],
                reason: None,
                duration_ms: 1,
            },
        ];
        assert_eq!(RunResult::aggregate_status(&jobs), RunStatus::Failed);
    }

    #[test]
    fn test_skipped_job_fails_the_run() {
        let jobs = vec![JobResult::skipped("deploy")];
        assert_eq!(RunResult::aggregate_status(&jobs), RunStatus::Failed);
    }

    #[test]
    fn test_first_failure() {
        let job = JobResult {
            name: "basic_install".to_string(),
            status: JobStatus::Failed,
            steps: vec![
                step("checkout", StepStatus::Success),
                step("setup", StepStatus::Success),
                step("install", StepStatus::Failed),
            ],
            reason: None,
            duration_ms: 3,
        };
        assert_eq!(job.first_failure().unwrap().name, "install");
    }
}
