//! Command handlers.

use crate::commands::EventKind;
use crate::config::CliConfig;
use crate::reporter::ConsoleReporter;

use anyhow::{Context, anyhow};
use console::style;
use futures::StreamExt;
use gantry_core::events::Event;
use gantry_core::pipeline::PipelineDefinition;
use gantry_core::ports::{EventBus, InMemoryEventBus};
use gantry_core::run::StepStatus;
use gantry_runner::{ShellRunner, StepExecutor};
use gantry_scheduler::{DagBuilder, RunCoordinator, TriggerEvent};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

/// Find the pipeline file in standard locations.
pub fn find_pipeline_file(path: Option<&str>) -> Option<PathBuf> {
    if let Some(p) = path {
        let path = PathBuf::from(p);
        if path.exists() {
            return Some(path);
        }
        return None;
    }

    let candidates = [
        ".gantry/pipeline.yaml",
        ".gantry/pipeline.yml",
        "gantry.yaml",
        "gantry.yml",
    ];

    candidates
        .iter()
        .map(PathBuf::from)
        .find(|candidate| candidate.exists())
}

/// Load and validate a pipeline file.
pub fn load_pipeline(path: &Path) -> anyhow::Result<PipelineDefinition> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    Ok(PipelineDefinition::from_yaml(&content)?)
}

fn locate(file: Option<&str>) -> anyhow::Result<PathBuf> {
    find_pipeline_file(file).ok_or_else(|| anyhow!("no pipeline file found"))
}

/// Validate a pipeline definition.
pub async fn validate(file: Option<&str>) -> anyhow::Result<ExitCode> {
    let path = locate(file)?;
    let definition = load_pipeline(&path)?;

    println!(
        "{} Pipeline \"{}\" is valid",
        style("✓").green(),
        definition.name
    );
    println!("  Triggers: {}", definition.triggers.len());
    println!("  Jobs: {}", definition.jobs.len());
    for (name, job) in &definition.jobs {
        println!("    - {} ({} steps)", name, job.steps.len());
    }

    Ok(ExitCode::SUCCESS)
}

/// Show the resolved execution plan.
pub async fn plan(file: Option<&str>) -> anyhow::Result<ExitCode> {
    let path = locate(file)?;
    let definition = load_pipeline(&path)?;
    let plan = DagBuilder::new()
        .plan(&definition)
        .map_err(gantry_core::Error::from)?;

    println!(
        "{} Execution plan for \"{}\": {} jobs in {} groups",
        style("▶").cyan(),
        definition.name,
        plan.job_count(),
        plan.groups.len()
    );
    for (index, names) in plan.group_names().iter().enumerate() {
        println!("  Group {}: {}", index + 1, names.join(", "));
    }

    Ok(ExitCode::SUCCESS)
}

/// Run the pipeline in response to one event.
pub async fn run(
    config: &CliConfig,
    event: EventKind,
    git_ref: Option<String>,
    actor: Option<String>,
    file: Option<&str>,
    workspace: Option<PathBuf>,
) -> anyhow::Result<ExitCode> {
    let path = locate(file)?;
    let definition = load_pipeline(&path)?;

    let event = match event {
        EventKind::Push => TriggerEvent::Push {
            git_ref: git_ref.ok_or_else(|| anyhow!("--ref is required for push events"))?,
        },
        EventKind::PullRequest => TriggerEvent::PullRequest {
            git_ref: git_ref.ok_or_else(|| anyhow!("--ref is required for pull_request events"))?,
        },
        EventKind::Manual => TriggerEvent::Manual { actor },
    };

    let workspace_root = workspace.unwrap_or_else(|| config.workspace_root());

    let event_bus = Arc::new(InMemoryEventBus::default());
    let executor = Arc::new(StepExecutor::new(
        workspace_root,
        Arc::new(ShellRunner::default()),
        event_bus.clone(),
    ));
    let coordinator = RunCoordinator::new(executor, event_bus.clone(), Arc::new(ConsoleReporter));

    println!(
        "\n{} Running pipeline: {}",
        style("▶").cyan().bold(),
        style(&definition.name).bold()
    );

    let printer = spawn_event_printer(event_bus.as_ref()).await?;
    let result = coordinator.handle_event(&definition, &event).await;
    printer.abort();

    match result? {
        Some(run) if run.status.is_success() => Ok(ExitCode::SUCCESS),
        Some(_) => Ok(ExitCode::from(1)),
        None => {
            println!(
                "{} Event does not trigger pipeline \"{}\"",
                style("⊘").yellow(),
                definition.name
            );
            Ok(ExitCode::from(2))
        }
    }
}

/// Print job and step lifecycle events as they arrive.
async fn spawn_event_printer(
    event_bus: &InMemoryEventBus,
) -> anyhow::Result<tokio::task::JoinHandle<()>> {
    let mut stream = event_bus.subscribe().await?;
    Ok(tokio::spawn(async move {
        while let Some(event) = stream.next().await {
            match event {
                Event::JobStarted(p) => {
                    println!(
                        "{} Job: {} ({} steps)",
                        style("━━▶").cyan(),
                        style(&p.job_id).bold(),
                        p.step_count
                    );
                }
                Event::StepStarted(p) => {
                    println!("    {} {}", style("▶").cyan(), p.step_id);
                }
                Event::StepOutput(p) => {
                    println!("      {}", style(&p.content).dim());
                }
                Event::StepCompleted(p) => match p.status {
                    StepStatus::Success => println!(
                        "      {} ({:.2}s)",
                        style("✓").green(),
                        p.duration_ms as f64 / 1000.0
                    ),
                    StepStatus::Failed => println!(
                        "      {} exit code {} ({:.2}s)",
                        style("✗").red(),
                        p.exit_code.map_or("none".to_string(), |c| c.to_string()),
                        p.duration_ms as f64 / 1000.0
                    ),
                },
                _ => {}
            }
        }
    }))
}
