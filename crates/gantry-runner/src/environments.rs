//! Isolated job environments.
//!
//! Every job owns a freshly provisioned workspace for the duration of its
//! steps. Environment mutations (checked-out files, installed packages) are
//! visible to later steps of the same job and are discarded when the job
//! completes, success or not.

use gantry_core::Result;
use gantry_core::ids::RunId;
use std::path::PathBuf;
use tracing::{info, warn};

/// Trait for job execution environments.
#[async_trait::async_trait]
pub trait Environment: Send + Sync {
    /// Provision the environment before the first step runs.
    async fn prepare(&self) -> Result<()>;

    /// Get the working directory steps execute in.
    fn working_dir(&self) -> &PathBuf;

    /// Tear the environment down after the last step.
    async fn cleanup(&self) -> Result<()>;
}

/// Ephemeral per-job directory on the host.
pub struct JobWorkspace {
    workspace: PathBuf,
}

impl JobWorkspace {
    pub fn new(workspace: PathBuf) -> Self {
        Self { workspace }
    }
}

#[async_trait::async_trait]
impl Environment for JobWorkspace {
    async fn prepare(&self) -> Result<()> {
        info!(workspace = %self.workspace.display(), "Provisioning job workspace");
        tokio::fs::create_dir_all(&self.workspace)
            .await
            .map_err(|e| {
                gantry_core::Error::Environment(format!("Failed to create workspace: {}", e))
            })?;
        Ok(())
    }

    fn working_dir(&self) -> &PathBuf {
        &self.workspace
    }

    async fn cleanup(&self) -> Result<()> {
        info!(workspace = %self.workspace.display(), "Discarding job workspace");
        if self.workspace.exists()
            && let Err(e) = tokio::fs::remove_dir_all(&self.workspace).await
        {
            warn!(workspace = %self.workspace.display(), error = %e, "Failed to remove workspace");
        }
        Ok(())
    }
}

/// Factory for creating job environments.
pub struct EnvironmentFactory {
    root: PathBuf,
}

impl EnvironmentFactory {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Create the environment for one job of one run.
    ///
    /// Workspaces are keyed by run and job so concurrent jobs never share a
    /// directory.
    pub fn create(&self, run_id: RunId, job_name: &str) -> Box<dyn Environment> {
        Box::new(JobWorkspace::new(
            self.root.join(run_id.to_string()).join(job_name),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_workspace_prepare_and_cleanup() {
        let root = tempfile::tempdir().unwrap();
        let factory = EnvironmentFactory::new(root.path().to_path_buf());
        let env = factory.create(RunId::new(), "testing");

        env.prepare().await.unwrap();
        assert!(env.working_dir().exists());

        env.cleanup().await.unwrap();
        assert!(!env.working_dir().exists());
    }

    #[tokio::test]
    async fn test_jobs_get_distinct_workspaces() {
        let root = tempfile::tempdir().unwrap();
        let factory = EnvironmentFactory::new(root.path().to_path_buf());
        let run_id = RunId::new();

        let a = factory.create(run_id, "basic_install");
        let b = factory.create(run_id, "testing");
        assert_ne!(a.working_dir(), b.working_dir());
    }

    #[tokio::test]
    async fn test_cleanup_tolerates_missing_workspace() {
        let root = tempfile::tempdir().unwrap();
        let factory = EnvironmentFactory::new(root.path().to_path_buf());
        let env = factory.create(RunId::new(), "never-prepared");

        env.cleanup().await.unwrap();
    }
}
