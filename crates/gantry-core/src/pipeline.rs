//! Pipeline definition types.
//!
//! These types represent the user-authored pipeline YAML configuration.
//! A definition is parsed once at load time and never mutated afterward.

use crate::error::{Error, Result};
use indexmap::IndexMap;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PipelineDefinition {
    #[serde(default = "default_version")]
    pub version: String,
    pub name: String,
    #[serde(default)]
    pub triggers: Vec<TriggerConfig>,
    /// Jobs in declaration order. Name uniqueness is enforced by the
    /// mapping format itself.
    pub jobs: IndexMap<String, JobDefinition>,
}

fn default_version() -> String {
    "1".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TriggerConfig {
    #[serde(rename = "type")]
    pub trigger_type: TriggerType,
    /// Accepted ref patterns. Empty matches every ref; ignored entirely for
    /// manual triggers.
    #[serde(default)]
    pub refs: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    Push,
    PullRequest,
    Manual,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct JobDefinition {
    /// Jobs that must complete before this one starts.
    #[serde(default)]
    pub needs: Vec<String>,
    pub steps: Vec<StepDefinition>,
    /// Job-level ceiling on each step's timeout.
    #[serde(default)]
    pub timeout_minutes: Option<u32>,
}

impl JobDefinition {
    /// Effective timeout for a step, clamped by the job-level limit when set.
    pub fn step_timeout_minutes(&self, step: &StepDefinition) -> u32 {
        match self.timeout_minutes {
            Some(job_limit) => step.timeout_minutes.min(job_limit),
            None => step.timeout_minutes,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct StepDefinition {
    pub name: String,
    /// Reference to a reusable provisioning action.
    #[serde(default)]
    pub uses: Option<String>,
    /// Literal command to execute.
    #[serde(default)]
    pub run: Option<String>,
    /// Named parameters for a provisioning action.
    #[serde(default)]
    pub with: HashMap<String, String>,
    #[serde(default = "default_step_timeout")]
    pub timeout_minutes: u32,
}

fn default_step_timeout() -> u32 {
    30
}

impl PipelineDefinition {
    /// Parse a definition from YAML and validate it.
    pub fn from_yaml(content: &str) -> Result<Self> {
        let definition: PipelineDefinition = serde_yaml::from_str(content)?;
        definition.validate()?;
        Ok(definition)
    }

    /// Validate structural constraints that the serde layer cannot express.
    ///
    /// Violations are configuration errors: fatal, detected before any job
    /// runs.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(Error::Configuration("pipeline name is empty".into()));
        }
        if self.jobs.is_empty() {
            return Err(Error::Configuration("pipeline declares no jobs".into()));
        }

        for (job_name, job) in &self.jobs {
            if job.steps.is_empty() {
                return Err(Error::Configuration(format!(
                    "job '{job_name}' declares no steps"
                )));
            }
            if job.timeout_minutes == Some(0) {
                return Err(Error::Configuration(format!(
                    "job '{job_name}' has a zero timeout"
                )));
            }

            let mut seen_steps = HashSet::new();
            for step in &job.steps {
                if !seen_steps.insert(step.name.as_str()) {
                    return Err(Error::Configuration(format!(
                        "job '{job_name}' declares step '{}' more than once",
                        step.name
                    )));
                }
                match (&step.uses, &step.run) {
                    (Some(_), Some(_)) => {
                        return Err(Error::Configuration(format!(
                            "step '{}' in job '{job_name}' sets both 'uses' and 'run'",
                            step.name
                        )));
                    }
                    (None, None) => {
                        return Err(Error::Configuration(format!(
                            "step '{}' in job '{job_name}' sets neither 'uses' nor 'run'",
                            step.name
                        )));
                    }
                    _ => {}
                }
                if step.timeout_minutes == 0 {
                    return Err(Error::Configuration(format!(
                        "step '{}' in job '{job_name}' has a zero timeout",
                        step.name
                    )));
                }
            }
        }

        for trigger in &self.triggers {
            if trigger.trigger_type == TriggerType::Manual && !trigger.refs.is_empty() {
                return Err(Error::Configuration(
                    "manual trigger entries carry no refs".into(),
                ));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const CI_YAML: &str = r#"
version: "1"
name: ci
triggers:
  - type: push
    refs: [master]
  - type: pull_request
    refs: [master]
jobs:
  basic_install:
    steps:
      - name: checkout
        uses: checkout
        with: { ref: master }
      - name: setup
        uses: setup-python
        with: { version: "3.9" }
      - name: install
        uses: install-deps
        with: { requirements: requirements.txt }
      - name: run-cli
        run: piker
  testing:
    steps:
      - name: checkout
        uses: checkout
        with: { ref: master }
      - name: setup
        uses: setup-python
        with: { version: "3.9" }
      - name: install
        uses: install-deps
        with: { requirements: requirements.txt }
      - name: run-tests
        run: pytest tests -rs
"#;

    #[test]
    fn test_parse_two_job_pipeline() {
        let definition = PipelineDefinition::from_yaml(CI_YAML).unwrap();
        assert_eq!(definition.name, "ci");
        assert_eq!(definition.triggers.len(), 2);
        assert_eq!(definition.jobs.len(), 2);

        // Declaration order is preserved by the mapping.
        let names: Vec<&str> = definition.jobs.keys().map(|k| k.as_str()).collect();
        assert_eq!(names, vec!["basic_install", "testing"]);

        let testing = &definition.jobs["testing"];
        assert_eq!(testing.steps.len(), 4);
        assert_eq!(testing.steps[3].run.as_deref(), Some("pytest tests -rs"));
    }

    #[test]
    fn test_step_defaults() {
        let definition = PipelineDefinition::from_yaml(CI_YAML).unwrap();
        let step = &definition.jobs["basic_install"].steps[0];
        assert_eq!(step.timeout_minutes, 30);
        assert_eq!(step.with.get("ref").map(|s| s.as_str()), Some("master"));
    }

    #[test]
    fn test_step_with_both_uses_and_run_rejected() {
        let yaml = r#"
name: bad
jobs:
  build:
    steps:
      - name: confused
        uses: checkout
        run: echo hi
"#;
        let err = PipelineDefinition::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_step_with_neither_uses_nor_run_rejected() {
        let yaml = r#"
name: bad
jobs:
  build:
    steps:
      - name: empty
"#;
        let err = PipelineDefinition::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_empty_jobs_rejected() {
        let yaml = "name: bad\njobs: {}\n";
        let err = PipelineDefinition::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_manual_trigger_with_refs_rejected() {
        let yaml = r#"
name: bad
triggers:
  - type: manual
    refs: [master]
jobs:
  build:
    steps:
      - name: hello
        run: echo hi
"#;
        let err = PipelineDefinition::from_yaml(yaml).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_job_timeout_clamps_step_timeout() {
        let job = JobDefinition {
            needs: vec![],
            steps: vec![],
            timeout_minutes: Some(10),
        };
        let step = StepDefinition {
            name: "long".to_string(),
            uses: None,
            run: Some("sleep 3600".to_string()),
            with: HashMap::new(),
            timeout_minutes: 30,
        };
        assert_eq!(job.step_timeout_minutes(&step), 10);
    }
}
