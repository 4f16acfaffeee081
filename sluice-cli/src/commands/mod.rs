//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod approval;
mod pipeline;
mod queue;

pub use approval::ApprovalCommands;
pub use pipeline::PipelineCommands;
pub use queue::QueueCommands;

use anyhow::Result;
use clap::Subcommand;
use colored::{ColoredString, Colorize};
use sluice_core::domain::status::StatusValue;

use crate::config::Config;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Pipeline runs
    Pipeline {
        #[command(subcommand)]
        command: PipelineCommands,
    },
    /// Approval gates
    Approval {
        #[command(subcommand)]
        command: ApprovalCommands,
    },
    /// Dispatch queue
    Queue {
        #[command(subcommand)]
        command: QueueCommands,
    },
}

/// Route a command to its handler module
pub async fn handle_command(command: Commands, config: &Config) -> Result<()> {
    match command {
        Commands::Pipeline { command } => pipeline::handle_pipeline_command(command, config).await,
        Commands::Approval { command } => approval::handle_approval_command(command, config).await,
        Commands::Queue { command } => queue::handle_queue_command(command, config).await,
    }
}

/// Status rendered in the colour users expect for it
pub(crate) fn paint_status(status: StatusValue) -> ColoredString {
    let label = status.as_str();
    match status {
        StatusValue::Success => label.green(),
        StatusValue::Failure | StatusValue::Error => label.red(),
        StatusValue::Killed | StatusValue::Declined => label.magenta(),
        StatusValue::Running => label.cyan(),
        StatusValue::Pending | StatusValue::Blocked => label.yellow(),
        StatusValue::Skipped | StatusValue::Created => label.dimmed(),
    }
}
