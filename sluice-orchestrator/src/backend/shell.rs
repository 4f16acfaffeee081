//! Local shell backend
//!
//! Each command of a step runs through `sh -c` in a per-pipeline workspace
//! directory. The first non-zero exit stops the step. The workspace is
//! removed when the pipeline finishes.

use std::io::ErrorKind;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use tokio::process::Command;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use super::{Backend, StepExit, StepRequest};

pub struct ShellBackend {
    workspace: PathBuf,
    timeout: Duration,
}

impl ShellBackend {
    pub fn new(workspace: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            workspace: workspace.into(),
            timeout,
        }
    }

    fn pipeline_dir(&self, pipeline_id: Uuid) -> PathBuf {
        self.workspace.join(pipeline_id.to_string())
    }
}

#[async_trait]
impl Backend for ShellBackend {
    async fn run_step(
        &self,
        cancel: &CancellationToken,
        request: StepRequest,
    ) -> anyhow::Result<StepExit> {
        let dir = self.pipeline_dir(request.pipeline_id);
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("failed to create workspace {}", dir.display()))?;

        if let Some(image) = &request.image {
            debug!(step = %request.step, %image, "shell backend ignores step image");
        }

        let deadline = Instant::now() + self.timeout;

        for command in &request.commands {
            info!(
                pipeline_id = %request.pipeline_id,
                workflow = %request.workflow,
                step = %request.step,
                %command,
                "running command"
            );

            let child = Command::new("sh")
                .arg("-c")
                .arg(command)
                .current_dir(&dir)
                .envs(&request.env)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true)
                .spawn()
                .with_context(|| format!("failed to spawn `{command}`"))?;

            // Dropping the output future drops the child, which kills it.
            let output = tokio::select! {
                _ = cancel.cancelled() => return Ok(StepExit::Cancelled),
                result = tokio::time::timeout_at(deadline, child.wait_with_output()) => match result {
                    Ok(output) => output.context("failed to wait for command")?,
                    Err(_) => return Ok(StepExit::TimedOut),
                },
            };

            for line in String::from_utf8_lossy(&output.stdout).lines() {
                debug!(step = %request.step, "{line}");
            }
            for line in String::from_utf8_lossy(&output.stderr).lines() {
                debug!(step = %request.step, stream = "stderr", "{line}");
            }

            // Killed by a signal when there is no code
            let code = output.status.code().unwrap_or(-1);
            if code != 0 {
                return Ok(StepExit::Exited(code));
            }
        }

        Ok(StepExit::Exited(0))
    }

    async fn release(&self, pipeline_id: Uuid) -> anyhow::Result<()> {
        let dir = self.pipeline_dir(pipeline_id);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => {
                debug!(%pipeline_id, dir = %dir.display(), "workspace removed");
                Ok(())
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => {
                Err(err).with_context(|| format!("failed to remove workspace {}", dir.display()))
            }
        }
    }
}
