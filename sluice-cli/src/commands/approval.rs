//! Approval command handlers

use anyhow::Result;
use clap::Subcommand;
use colored::*;
use sluice_client::OrchestratorClient;
use sluice_core::domain::status::{ApprovalState, DecisionAction};
use sluice_core::dto::approval::ApprovalView;

use crate::config::Config;
use crate::id_resolver::resolve_pipeline_id;

/// Approval subcommands
#[derive(Subcommand)]
pub enum ApprovalCommands {
    /// Show an approval gate
    Show {
        /// Pipeline ID or unambiguous prefix
        id: String,
        /// Step pid of the gate
        pid: u32,
    },
    /// Approve a gate
    Approve {
        /// Pipeline ID or unambiguous prefix
        id: String,
        /// Step pid of the gate
        pid: u32,
        #[arg(short, long)]
        comment: Option<String>,
    },
    /// Reject a gate
    Reject {
        /// Pipeline ID or unambiguous prefix
        id: String,
        /// Step pid of the gate
        pid: u32,
        #[arg(short, long)]
        comment: Option<String>,
    },
}

pub async fn handle_approval_command(command: ApprovalCommands, config: &Config) -> Result<()> {
    let client = config.client();

    match command {
        ApprovalCommands::Show { id, pid } => show_approval(&client, &id, pid).await,
        ApprovalCommands::Approve { id, pid, comment } => {
            decide(&client, &id, pid, DecisionAction::Approve, comment).await
        }
        ApprovalCommands::Reject { id, pid, comment } => {
            decide(&client, &id, pid, DecisionAction::Reject, comment).await
        }
    }
}

async fn show_approval(client: &OrchestratorClient, id: &str, pid: u32) -> Result<()> {
    let uuid = resolve_pipeline_id(client, id).await?;
    let view = client.get_approval(uuid, pid).await?;

    print_approval(&view);
    Ok(())
}

async fn decide(
    client: &OrchestratorClient,
    id: &str,
    pid: u32,
    action: DecisionAction,
    comment: Option<String>,
) -> Result<()> {
    let uuid = resolve_pipeline_id(client, id).await?;
    let view = client.submit_decision(uuid, pid, action, comment).await?;

    println!(
        "{}",
        format!("✓ Decision recorded: {}", action).green().bold()
    );
    print_approval(&view);
    Ok(())
}

fn paint_gate(state: ApprovalState) -> ColoredString {
    let label = state.as_str();
    match state {
        ApprovalState::Approved => label.green(),
        ApprovalState::Rejected => label.red(),
        ApprovalState::Expired => label.magenta(),
        ApprovalState::Pending => label.yellow(),
    }
}

fn print_approval(view: &ApprovalView) {
    let gate = &view.gate;
    println!("{}", "Approval Gate:".bold());
    println!("  Message:   {}", gate.message);
    println!("  State:     {}", paint_gate(gate.state));
    println!("  Strategy:  {}", gate.strategy);
    println!(
        "  Requested: {} by {}",
        gate.requested_at.format("%Y-%m-%d %H:%M:%S"),
        gate.requested_by
    );
    if let Some(expires) = gate.expires_at {
        println!("  Expires:   {}", expires.format("%Y-%m-%d %H:%M:%S"));
    }
    if gate.approvers.is_empty() {
        println!("  Approvers: {}", "anyone".dimmed());
    } else {
        println!("  Approvers: {}", gate.approvers.join(", "));
    }
    if !view.pending_approvers.is_empty() {
        println!("  Waiting:   {}", view.pending_approvers.join(", ").yellow());
    }

    for decision in &gate.decisions {
        let action = match decision.action {
            DecisionAction::Approve => decision.action.as_str().green(),
            DecisionAction::Reject => decision.action.as_str().red(),
        };
        println!(
            "    {} {} {} {}",
            "▸".cyan(),
            decision.user.bold(),
            action,
            decision.comment.as_deref().unwrap_or_default().dimmed()
        );
    }

    if let Some(by) = &gate.finalized_by {
        println!("  Finalized: {}", by.dimmed());
    } else if view.can_approve || view.can_reject {
        println!("  {}", "You can decide this gate.".cyan());
    }
}
