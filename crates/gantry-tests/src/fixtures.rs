//! Test fixtures for creating sample pipelines.

use gantry_core::pipeline::{JobDefinition, PipelineDefinition, StepDefinition};
use indexmap::IndexMap;
use std::collections::HashMap;

/// Factory for creating test pipelines.
pub struct PipelineFixture;

impl PipelineFixture {
    /// The two-job pipeline the system is modeled on: a CLI install check and
    /// a test suite, both provisioning their own environment and triggered by
    /// pushes and pull requests on master.
    pub fn ci() -> PipelineDefinition {
        PipelineDefinition::from_yaml(
            r#"
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
"#,
        )
        .expect("ci fixture is valid")
    }

    /// The `testing` job from [`ci`] as the pipeline's only job.
    pub fn testing_only() -> PipelineDefinition {
        let mut definition = Self::ci();
        definition.jobs.shift_remove("basic_install");
        definition
    }

    /// A build job and a deploy job that needs it.
    pub fn chained() -> PipelineDefinition {
        PipelineDefinition::from_yaml(
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
        .expect("chained fixture is valid")
    }

    /// Jobs depending on each other in a cycle.
    pub fn cyclic() -> PipelineDefinition {
        PipelineDefinition::from_yaml(
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
        .expect("cyclic fixture is valid")
    }

    /// A pipeline built from explicit jobs, triggered by any push.
    pub fn with_jobs(jobs: Vec<(&str, JobDefinition)>) -> PipelineDefinition {
        let mut map = IndexMap::new();
        for (name, job) in jobs {
            map.insert(name.to_string(), job);
        }
        let mut definition = PipelineDefinition::from_yaml(
            "name: fixture\ntriggers:\n  - type: push\njobs:\n  placeholder:\n    steps:\n      - name: noop\n        run: \"true\"\n",
        )
        .expect("base fixture is valid");
        definition.jobs = map;
        definition
    }
}

/// A step running a literal command.
pub fn run_step(name: &str, command: &str) -> StepDefinition {
    StepDefinition {
        name: name.to_string(),
        uses: None,
        run: Some(command.to_string()),
        with: HashMap::new(),
        timeout_minutes: 30,
    }
}

/// A job with no dependencies running the given steps.
pub fn job_of(steps: Vec<StepDefinition>) -> JobDefinition {
    JobDefinition {
        needs: vec![],
        steps,
        timeout_minutes: None,
    }
}
