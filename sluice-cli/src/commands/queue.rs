//! Queue command handlers

use anyhow::Result;
use clap::Subcommand;
use colored::*;

use crate::config::Config;

/// Queue subcommands
#[derive(Subcommand)]
pub enum QueueCommands {
    /// Show dispatch queue statistics
    Stats,
}

pub async fn handle_queue_command(command: QueueCommands, config: &Config) -> Result<()> {
    let client = config.client();

    match command {
        QueueCommands::Stats => {
            let stats = client.queue_stats().await?;
            let running = if stats.running {
                "running".green()
            } else {
                "stopped".red()
            };

            println!("{}", "Dispatch Queue:".bold());
            println!("  State:     {}", running);
            println!("  Workers:   {}", stats.workers);
            println!("  Depth:     {}", stats.depth.to_string().cyan());
            println!("  In flight: {}", stats.in_flight.to_string().cyan());
            println!("  Enqueued:  {}", stats.enqueued.to_string().dimmed());
            println!("  Processed: {}", stats.processed.to_string().dimmed());
            Ok(())
        }
    }
}
