//! Step backend collaborator
//!
//! Runs the non-approval steps of a workflow. The orchestrator only sees the
//! outcome; logs and workspace handling belong to the backend.

mod shell;

pub use shell::ShellBackend;

use async_trait::async_trait;
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Everything a backend needs to run one step
#[derive(Debug, Clone)]
pub struct StepRequest {
    pub pipeline_id: Uuid,
    pub repo: String,
    pub workflow: String,
    pub step: String,
    pub image: Option<String>,
    pub commands: Vec<String>,
    pub env: HashMap<String, String>,
}

/// How a step ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepExit {
    Exited(i32),
    TimedOut,
    Cancelled,
}

#[async_trait]
pub trait Backend: Send + Sync + 'static {
    /// Runs one step to completion.
    ///
    /// Must return promptly with [`StepExit::Cancelled`] once `cancel` fires.
    async fn run_step(
        &self,
        cancel: &CancellationToken,
        request: StepRequest,
    ) -> anyhow::Result<StepExit>;

    /// Drops whatever the backend kept for a pipeline that has finished.
    async fn release(&self, _pipeline_id: Uuid) -> anyhow::Result<()> {
        Ok(())
    }
}
