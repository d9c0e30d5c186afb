//! Error types for Gantry CI.
//!
//! Only faults that abort a run before any job dispatches are `Err` values:
//! a malformed definition or event, a dependency cycle, or an infrastructure
//! fault. Step failures and environment-provisioning failures are contained
//! in the `StepResult`/`JobResult` they belong to and never propagate here.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    // Configuration errors: fatal, nothing executes
    #[error("Invalid pipeline definition: {0}")]
    Configuration(String),

    #[error("Malformed event: {0}")]
    MalformedEvent(String),

    #[error("Dependency cycle among jobs: {}", jobs.join(", "))]
    Cycle { jobs: Vec<String> },

    #[error("Unknown job dependency: {job} needs {dependency}")]
    UnknownDependency { job: String, dependency: String },

    // Infrastructure errors
    #[error("Environment error: {0}")]
    Environment(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    // Generic
    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        // A pipeline file that fails to parse is a configuration error,
        // detected before any job runs.
        Error::Configuration(err.to_string())
    }
}
