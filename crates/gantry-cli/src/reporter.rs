//! Console run reporting.

use async_trait::async_trait;
use console::style;
use gantry_core::Result;
use gantry_core::ports::RunReporter;
use gantry_core::run::{FailureReason, JobStatus, RunResult};

/// Reporter that prints the final run summary to stdout.
pub struct ConsoleReporter;

#[async_trait]
impl RunReporter for ConsoleReporter {
    async fn report(&self, result: &RunResult) -> Result<()> {
        println!();
        if result.status.is_success() {
            println!(
                "{} Run {} completed successfully in {:.2}s",
                style("✓").green().bold(),
                result.id,
                result.duration_ms as f64 / 1000.0
            );
        } else {
            println!(
                "{} Run {} failed after {:.2}s",
                style("✗").red().bold(),
                result.id,
                result.duration_ms as f64 / 1000.0
            );
        }

        for job in &result.jobs {
            match job.status {
                JobStatus::Success => {
                    println!(
                        "  {} {} ({} steps, {:.2}s)",
                        style("✓").green(),
                        job.name,
                        job.steps.len(),
                        job.duration_ms as f64 / 1000.0
                    );
                }
                JobStatus::Skipped => {
                    println!(
                        "  {} {} (skipped, a dependency failed)",
                        style("⊘").yellow(),
                        job.name
                    );
                }
                JobStatus::Failed => {
                    if job.reason == Some(FailureReason::Environment) {
                        println!(
                            "  {} {} (environment provisioning failed)",
                            style("✗").red(),
                            job.name
                        );
                        continue;
                    }

                    println!(
                        "  {} {} ({:.2}s)",
                        style("✗").red(),
                        job.name,
                        job.duration_ms as f64 / 1000.0
                    );
                    if let Some(step) = job.first_failure() {
                        println!("      failed at step {}", style(&step.name).bold());
                        for line in step.output.lines() {
                            println!("      {}", style(line).dim());
                        }
                    }
                }
            }
        }

        Ok(())
    }
}
