//! CLI command definitions.

use clap::{Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Subcommand)]
pub enum Commands {
    /// Validate a pipeline definition
    Validate {
        /// Path to the pipeline file
        #[arg(short, long)]
        file: Option<String>,
    },

    /// Show the resolved execution plan
    Plan {
        /// Path to the pipeline file
        #[arg(short, long)]
        file: Option<String>,
    },

    /// Run the pipeline in response to an event
    Run {
        /// Event kind
        #[arg(long, value_enum)]
        event: EventKind,

        /// Branch or tag ref carried by the event
        #[arg(long = "ref")]
        git_ref: Option<String>,

        /// Actor recorded for a manual dispatch
        #[arg(long)]
        actor: Option<String>,

        /// Path to the pipeline file
        #[arg(short, long)]
        file: Option<String>,

        /// Root directory for job workspaces
        #[arg(long)]
        workspace: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "snake_case")]
pub enum EventKind {
    Push,
    PullRequest,
    Manual,
}
