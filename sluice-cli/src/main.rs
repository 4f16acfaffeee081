//! Sluice CLI
//!
//! Command-line interface for triggering pipelines and deciding approval gates.

mod commands;
mod config;
mod id_resolver;
mod types;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, handle_command};
use config::Config;

#[derive(Parser)]
#[command(name = "sluice")]
#[command(about = "Sluice pipeline CLI", long_about = None)]
struct Cli {
    /// Orchestrator URL
    #[arg(
        long,
        env = "SLUICE_ORCHESTRATOR_URL",
        default_value = "http://localhost:8080"
    )]
    orchestrator_url: String,

    /// Identity sent with cancel and decision requests
    #[arg(long, env = "SLUICE_USER")]
    user: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config {
        orchestrator_url: cli.orchestrator_url,
        user: cli.user,
    };

    handle_command(cli.command, &config).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_approve_with_comment() {
        let cli = Cli::try_parse_from([
            "sluice",
            "--user",
            "alice",
            "approval",
            "approve",
            "6f1c7c1e",
            "4",
            "--comment",
            "ship it",
        ])
        .unwrap();

        assert_eq!(cli.user.as_deref(), Some("alice"));
        assert!(matches!(cli.command, Commands::Approval { .. }));
    }

    #[test]
    fn test_trigger_rejects_unknown_event() {
        let result = Cli::try_parse_from([
            "sluice",
            "pipeline",
            "trigger",
            "--repo",
            "acme/api",
            "--branch",
            "main",
            "--commit",
            "abc123",
            "--event",
            "nightly",
            "--file",
            "pipeline.json",
        ]);

        assert!(result.is_err());
    }
}
