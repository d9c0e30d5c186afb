//! Run, job, and step lifecycle events.
//!
//! Events are advisory observability output published while a run executes;
//! the `RunResult` remains the source of truth for outcomes.

use crate::ids::{JobId, RunId, StepId};
use crate::run::{JobStatus, RunStatus, StepStatus};
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    RunStarted(RunStartedPayload),
    RunCompleted(RunCompletedPayload),

    JobStarted(JobStartedPayload),
    JobCompleted(JobCompletedPayload),

    StepStarted(StepStartedPayload),
    StepOutput(StepOutputPayload),
    StepCompleted(StepCompletedPayload),
}

impl Event {
    /// Dotted routing subject for this event.
    pub fn subject(&self) -> String {
        match self {
            Event::RunStarted(p) => format!("run.started.{}", p.run_id),
            Event::RunCompleted(p) => format!("run.completed.{}", p.run_id),
            Event::JobStarted(p) => format!("run.{}.job.{}.started", p.run_id, p.job_id),
            Event::JobCompleted(p) => format!("run.{}.job.{}.completed", p.run_id, p.job_id),
            Event::StepStarted(p) => {
                format!("run.{}.job.{}.step.{}.started", p.run_id, p.job_id, p.step_id)
            }
            Event::StepOutput(p) => {
                format!("run.{}.job.{}.step.{}.output", p.run_id, p.job_id, p.step_id)
            }
            Event::StepCompleted(p) => {
                format!("run.{}.job.{}.step.{}.completed", p.run_id, p.job_id, p.step_id)
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RunStartedPayload {
    pub run_id: RunId,
    pub pipeline_name: String,
    pub job_count: u32,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RunCompletedPayload {
    pub run_id: RunId,
    pub pipeline_name: String,
    pub status: RunStatus,
    pub duration_ms: u64,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct JobStartedPayload {
    pub run_id: RunId,
    pub job_id: JobId,
    pub step_count: u32,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct JobCompletedPayload {
    pub run_id: RunId,
    pub job_id: JobId,
    pub status: JobStatus,
    pub duration_ms: u64,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StepStartedPayload {
    pub run_id: RunId,
    pub job_id: JobId,
    pub step_id: StepId,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StepOutputPayload {
    pub run_id: RunId,
    pub job_id: JobId,
    pub step_id: StepId,
    pub line_number: u32,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StepCompletedPayload {
    pub run_id: RunId,
    pub job_id: JobId,
    pub step_id: StepId,
    pub status: StepStatus,
    pub exit_code: Option<i32>,
    pub duration_ms: u64,
    pub completed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subject_scheme() {
        let run_id = RunId::new();
        let event = Event::JobStarted(JobStartedPayload {
            run_id,
            job_id: JobId::new("testing"),
            step_count: 4,
            started_at: Utc::now(),
        });
        assert_eq!(event.subject(), format!("run.{run_id}.job.testing.started"));
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = Event::RunCompleted(RunCompletedPayload {
            run_id: RunId::new(),
            pipeline_name: "ci".to_string(),
            status: RunStatus::Success,
            duration_ms: 12,
            completed_at: Utc::now(),
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "run_completed");
    }
}
