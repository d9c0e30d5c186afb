//! Gantry CI CLI entrypoint.

use clap::Parser;
use console::style;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;
mod handlers;
mod reporter;

use commands::Commands;
use config::CliConfig;

#[derive(Parser)]
#[command(name = "gantry")]
#[command(author, version, about = "Gantry CI command-line interface", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let config = CliConfig::load().unwrap_or_default();

    let outcome = match cli.command {
        Commands::Validate { file } => handlers::validate(file.as_deref()).await,
        Commands::Plan { file } => handlers::plan(file.as_deref()).await,
        Commands::Run {
            event,
            git_ref,
            actor,
            file,
            workspace,
        } => handlers::run(&config, event, git_ref, actor, file.as_deref(), workspace).await,
    };

    match outcome {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {e}", style("✗").red().bold());
            ExitCode::FAILURE
        }
    }
}
