//! Pipeline command handlers
//!
//! Triggering, listing, inspecting and cancelling pipeline runs.

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::*;
use sluice_client::OrchestratorClient;
use sluice_core::domain::definition::PipelineDefinition;
use sluice_core::domain::pipeline::Pipeline;
use sluice_core::domain::status::TriggerEvent;
use sluice_core::dto::pipeline::{PipelineSummary, TriggerPipeline};
use std::path::Path;

use super::paint_status;
use crate::config::Config;
use crate::id_resolver::resolve_pipeline_id;

/// Pipeline subcommands
#[derive(Subcommand)]
pub enum PipelineCommands {
    /// Trigger a pipeline from a JSON definition
    Trigger {
        /// Repository, e.g. acme/api
        #[arg(long)]
        repo: String,

        #[arg(long)]
        branch: String,

        #[arg(long)]
        commit: String,

        /// Author recorded on the run (defaults to --user)
        #[arg(long)]
        author: Option<String>,

        /// push, pull_request, tag, manual or cron
        #[arg(long, default_value = "manual")]
        event: TriggerEvent,

        /// Path to the pipeline definition (JSON)
        #[arg(short, long)]
        file: String,
    },
    /// List pipeline runs, newest first
    List {
        /// Only show runs of this repository
        #[arg(long)]
        repo: Option<String>,
    },
    /// Show a pipeline run with its workflows and steps
    Show {
        /// Pipeline ID or unambiguous prefix
        id: String,
    },
    /// Cancel a running pipeline
    Cancel {
        /// Pipeline ID or unambiguous prefix
        id: String,
    },
}

pub async fn handle_pipeline_command(command: PipelineCommands, config: &Config) -> Result<()> {
    let client = config.client();

    match command {
        PipelineCommands::Trigger {
            repo,
            branch,
            commit,
            author,
            event,
            file,
        } => {
            let author = author
                .or_else(|| config.user.clone())
                .unwrap_or_else(|| "anonymous".to_string());
            let req = TriggerPipeline {
                repo,
                branch,
                commit,
                event,
                author,
                definition: read_definition(Path::new(&file))?,
            };
            trigger_pipeline(&client, &req).await
        }
        PipelineCommands::List { repo } => list_pipelines(&client, repo.as_deref()).await,
        PipelineCommands::Show { id } => show_pipeline(&client, &id).await,
        PipelineCommands::Cancel { id } => cancel_pipeline(&client, &id).await,
    }
}

/// Load and parse a pipeline definition file
fn read_definition(path: &Path) -> Result<PipelineDefinition> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read definition file: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse pipeline definition: {}", path.display()))
}

async fn trigger_pipeline(client: &OrchestratorClient, req: &TriggerPipeline) -> Result<()> {
    let pipeline = client.trigger_pipeline(req).await?;

    println!("{}", "✓ Pipeline triggered!".green().bold());
    println!("  ID:        {}", pipeline.id.to_string().cyan());
    println!("  Run:       {} #{}", pipeline.repo.bold(), pipeline.number);
    println!("  Status:    {}", paint_status(pipeline.status));
    println!(
        "  Workflows: {}",
        pipeline
            .workflows
            .iter()
            .map(|w| w.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
            .dimmed()
    );

    Ok(())
}

async fn list_pipelines(client: &OrchestratorClient, repo: Option<&str>) -> Result<()> {
    let pipelines = client.list_pipelines(repo).await?;

    if pipelines.is_empty() {
        println!("{}", "No pipelines found.".yellow());
        return Ok(());
    }

    println!(
        "{}",
        format!("Found {} pipeline(s):", pipelines.len()).bold()
    );
    println!();
    for pipeline in &pipelines {
        print_pipeline_summary(pipeline);
    }

    Ok(())
}

async fn show_pipeline(client: &OrchestratorClient, id: &str) -> Result<()> {
    let uuid = resolve_pipeline_id(client, id).await?;
    let pipeline = client.get_pipeline(uuid).await?;

    print_pipeline_details(&pipeline);
    Ok(())
}

async fn cancel_pipeline(client: &OrchestratorClient, id: &str) -> Result<()> {
    let uuid = resolve_pipeline_id(client, id).await?;
    let pipeline = client.cancel_pipeline(uuid).await?;

    println!(
        "{}",
        format!("✓ Pipeline {} #{} cancelled", pipeline.repo, pipeline.number)
            .green()
            .bold()
    );
    println!("  Status: {}", paint_status(pipeline.status));

    Ok(())
}

fn print_pipeline_summary(pipeline: &PipelineSummary) {
    println!(
        "  {} {} #{} {}",
        "▸".cyan(),
        pipeline.repo.bold(),
        pipeline.number,
        paint_status(pipeline.status)
    );
    println!("    ID:      {}", pipeline.id.to_string().dimmed());
    println!(
        "    Ref:     {} @ {} ({})",
        pipeline.branch,
        short_commit(&pipeline.commit).dimmed(),
        pipeline.event
    );
    println!(
        "    Created: {}",
        pipeline
            .created
            .format("%Y-%m-%d %H:%M:%S")
            .to_string()
            .dimmed()
    );
    println!();
}

fn print_pipeline_details(pipeline: &Pipeline) {
    println!("{}", "Pipeline Details:".bold());
    println!("  ID:       {}", pipeline.id.to_string().cyan());
    println!("  Run:      {} #{}", pipeline.repo.bold(), pipeline.number);
    println!("  Status:   {}", paint_status(pipeline.status));
    println!(
        "  Ref:      {} @ {} ({})",
        pipeline.branch,
        short_commit(&pipeline.commit),
        pipeline.event
    );
    println!("  Author:   {}", pipeline.author);
    println!(
        "  Created:  {}",
        pipeline.created.format("%Y-%m-%d %H:%M:%S")
    );
    if let Some(finished) = pipeline.finished {
        println!("  Finished: {}", finished.format("%Y-%m-%d %H:%M:%S"));
    }

    for workflow in &pipeline.workflows {
        println!();
        println!(
            "  {} {} {}",
            "▸".cyan(),
            workflow.name.bold(),
            paint_status(workflow.state)
        );
        if let Some(error) = &workflow.error {
            println!("    {}", error.red());
        }
        for step in &workflow.steps {
            let detail = match (step.exit_code, &step.error) {
                (_, Some(error)) => error.red().to_string(),
                (Some(code), None) if code != 0 => format!("exit {}", code).red().to_string(),
                _ => String::new(),
            };
            println!(
                "    {:>3} {:<24} {} {}",
                step.pid.to_string().dimmed(),
                step.name,
                paint_status(step.state),
                detail
            );
        }
    }
}

fn short_commit(commit: &str) -> &str {
    commit.get(..8).unwrap_or(commit)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_commit() {
        assert_eq!(short_commit("0123456789abcdef"), "01234567");
        assert_eq!(short_commit("abc"), "abc");
    }

    #[test]
    fn test_read_definition_missing_file() {
        let err = read_definition(Path::new("/nonexistent/sluice-pipeline.json")).unwrap_err();
        assert!(err.to_string().contains("Failed to read definition file"));
    }

    #[test]
    fn test_read_definition_rejects_malformed_json() {
        let path = std::env::temp_dir().join(format!("sluice-cli-{}.json", uuid::Uuid::new_v4()));
        std::fs::write(&path, "{ not json").unwrap();

        let err = read_definition(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse pipeline definition"));

        std::fs::remove_file(&path).unwrap();
    }
}
