//! Workflow executor
//!
//! The queue's [`Executor`]: takes one dispatched workflow, walks its steps
//! in order and reports every transition back through the orchestrator.
//!
//! An approval step parks the workflow: the gate is opened, the worker is
//! released, and the task is dispatched again once the gate is approved.

use async_trait::async_trait;
use sluice_core::domain::approval::StepApproval;
use sluice_core::domain::definition::StepSettings;
use sluice_core::domain::status::{FailurePolicy, StatusValue};
use sluice_core::domain::step::Step;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use uuid::Uuid;

use super::{Orchestrator, OrchestratorError, OrchestratorResult};
use crate::backend::{StepExit, StepRequest};
use crate::queue::{Executor, WorkItem};

/// One dispatched workflow
#[derive(Debug, Clone)]
pub struct WorkUnit {
    pub pipeline_id: Uuid,
    pub task_id: Uuid,
    /// Fired when the pipeline is cancelled
    pub cancel: CancellationToken,
}

impl WorkItem for WorkUnit {
    fn key(&self) -> String {
        self.task_id.to_string()
    }
}

/// Read-only view of the workflow being executed
struct WorkflowContext {
    repo: String,
    branch: String,
    commit: String,
    author: String,
    number: u64,
    workflow: String,
    steps: Vec<Step>,
}

impl WorkflowContext {
    fn environment(&self, step: &Step) -> HashMap<String, String> {
        HashMap::from([
            ("SLUICE_REPO".to_string(), self.repo.clone()),
            ("SLUICE_BRANCH".to_string(), self.branch.clone()),
            ("SLUICE_COMMIT".to_string(), self.commit.clone()),
            ("SLUICE_AUTHOR".to_string(), self.author.clone()),
            ("SLUICE_PIPELINE_NUMBER".to_string(), self.number.to_string()),
            ("SLUICE_WORKFLOW".to_string(), self.workflow.clone()),
            ("SLUICE_STEP".to_string(), step.name.clone()),
        ])
    }
}

pub struct WorkflowExecutor {
    orchestrator: Arc<Orchestrator>,
}

impl WorkflowExecutor {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self { orchestrator }
    }

    /// Runs the steps that have not finished yet.
    async fn run(&self, cancel: &CancellationToken, unit: &WorkUnit) -> OrchestratorResult<Walk> {
        let context = self.begin(unit).await?;

        for step in &context.steps {
            if cancel.is_cancelled() {
                return Ok(Walk::Finished(StatusValue::Killed));
            }

            let state = if step.state.is_terminal() {
                step.state
            } else if step.is_approval() {
                return Ok(if self.open_gate(cancel, unit, &context, step).await? {
                    Walk::Parked
                } else {
                    Walk::Finished(StatusValue::Killed)
                });
            } else {
                self.run_step(cancel, unit, &context, step).await?
            };

            if cancel.is_cancelled() {
                return Ok(Walk::Finished(StatusValue::Killed));
            }

            let halted = if step.is_approval() {
                state != StatusValue::Success
            } else {
                state.is_failing() && step.failure == FailurePolicy::Fail
            };
            if halted {
                debug!(
                    pipeline_id = %unit.pipeline_id,
                    step = %step.name,
                    %state,
                    "Skipping remaining steps"
                );
                break;
            }
        }

        Ok(Walk::Finished(StatusValue::Skipped))
    }

    /// Marks the workflow running and snapshots it.
    async fn begin(&self, unit: &WorkUnit) -> OrchestratorResult<WorkflowContext> {
        self.orchestrator
            .mutate(unit.pipeline_id, |run, now| {
                let pid = run
                    .task(unit.task_id)
                    .ok_or(OrchestratorError::TaskNotFound(unit.task_id))?
                    .workflow_pid;

                let pipeline = &mut run.pipeline;
                if pipeline.started.is_none() {
                    pipeline.started = Some(now);
                }
                let (repo, branch, commit, author, number) = (
                    pipeline.repo.clone(),
                    pipeline.branch.clone(),
                    pipeline.commit.clone(),
                    pipeline.author.clone(),
                    pipeline.number,
                );

                let workflow = pipeline
                    .workflow_mut(pid)
                    .ok_or(OrchestratorError::TaskNotFound(unit.task_id))?;
                workflow.state = StatusValue::Running;
                if workflow.started.is_none() {
                    workflow.started = Some(now);
                }
                let context = WorkflowContext {
                    repo,
                    branch,
                    commit,
                    author,
                    number,
                    workflow: workflow.name.clone(),
                    steps: workflow.steps.clone(),
                };

                run.refresh_activity();
                Ok(context)
            })
            .await
    }

    async fn run_step(
        &self,
        cancel: &CancellationToken,
        unit: &WorkUnit,
        context: &WorkflowContext,
        step: &Step,
    ) -> OrchestratorResult<StatusValue> {
        let orchestrator = &self.orchestrator;
        orchestrator
            .mutate(unit.pipeline_id, |run, now| {
                run.pipeline
                    .step_mut(step.pid)
                    .ok_or(OrchestratorError::StepNotFound(step.pid))?
                    .start(now);
                Ok(())
            })
            .await?;

        let (state, exit_code, error) =
            match orchestrator.secrets.resolve(&context.repo, &step.name).await {
                Err(err) => (
                    StatusValue::Error,
                    None,
                    Some(format!("failed to resolve secrets: {err:#}")),
                ),
                Ok(secrets) => {
                    let mut env = secrets;
                    env.extend(context.environment(step));
                    let request = StepRequest {
                        pipeline_id: unit.pipeline_id,
                        repo: context.repo.clone(),
                        workflow: context.workflow.clone(),
                        step: step.name.clone(),
                        image: step.image.clone(),
                        commands: step.commands.clone(),
                        env,
                    };
                    match orchestrator.backend.run_step(cancel, request).await {
                        Ok(StepExit::Exited(0)) => (StatusValue::Success, Some(0), None),
                        Ok(StepExit::Exited(code)) => (StatusValue::Failure, Some(code), None),
                        Ok(StepExit::TimedOut) => {
                            (StatusValue::Killed, None, Some("step timed out".to_string()))
                        }
                        Ok(StepExit::Cancelled) => (StatusValue::Killed, None, None),
                        Err(_) if cancel.is_cancelled() => (StatusValue::Killed, None, None),
                        Err(err) => (StatusValue::Error, None, Some(format!("{err:#}"))),
                    }
                }
            };

        orchestrator
            .mutate(unit.pipeline_id, |run, now| {
                let target = run
                    .pipeline
                    .step_mut(step.pid)
                    .ok_or(OrchestratorError::StepNotFound(step.pid))?;
                target.finish(state, exit_code, now);
                target.error = error;
                Ok(())
            })
            .await?;

        info!(
            pipeline_id = %unit.pipeline_id,
            workflow = %context.workflow,
            step = %step.name,
            %state,
            exit_code,
            "Step finished"
        );
        Ok(state)
    }

    /// Opens the gate and hands the workflow back to the orchestrator.
    ///
    /// Returns false without opening anything if the unit was cancelled
    /// first. Once open, a decision or the deadline releases the gate.
    async fn open_gate(
        &self,
        cancel: &CancellationToken,
        unit: &WorkUnit,
        context: &WorkflowContext,
        step: &Step,
    ) -> OrchestratorResult<bool> {
        let StepSettings::Approval(settings) = &step.settings else {
            return Err(OrchestratorError::InvalidState(format!(
                "approval step {} has no approval settings",
                step.name
            )));
        };

        let orchestrator = &self.orchestrator;
        let pipeline_id = unit.pipeline_id;
        let requested_by = context.author.clone();

        // Under the pipeline lock a concurrent cancel either sees the open
        // gate or has already fired the unit token.
        let opened = orchestrator
            .mutate(pipeline_id, |run, now| {
                if cancel.is_cancelled() || unit.cancel.is_cancelled() {
                    return Ok(None);
                }
                let target = run
                    .pipeline
                    .step_mut(step.pid)
                    .ok_or(OrchestratorError::StepNotFound(step.pid))?;
                target.start(now);
                target.state = StatusValue::Blocked;
                let gate = StepApproval::open(settings, requested_by, now);
                let deadline = gate.expires_at;
                target.approval = Some(gate);
                run.refresh_activity();
                orchestrator.forget_unit(unit.task_id);
                Ok(Some(deadline))
            })
            .await?;

        let Some(deadline) = opened else {
            return Ok(false);
        };
        if let Some(at) = deadline {
            orchestrator.watch_deadline(pipeline_id, step.pid, at);
        }

        info!(
            %pipeline_id,
            workflow = %context.workflow,
            step = %step.name,
            expires_at = ?deadline,
            "Waiting for approval"
        );
        Ok(true)
    }
}

/// How a walk over the steps ended
enum Walk {
    /// Every step ran or was halted; the rest take this state
    Finished(StatusValue),
    /// Waiting on an approval gate outside the queue
    Parked,
}

/// A token that fires when either input does.
fn linked(
    queue: &CancellationToken,
    unit: &CancellationToken,
) -> (CancellationToken, tokio::task::JoinHandle<()>) {
    let token = queue.child_token();
    let (target, unit) = (token.clone(), unit.clone());
    let link = tokio::spawn(async move {
        tokio::select! {
            _ = unit.cancelled() => target.cancel(),
            _ = target.cancelled() => {}
        }
    });
    (token, link)
}

#[async_trait]
impl Executor<WorkUnit> for WorkflowExecutor {
    async fn execute(&self, cancel: CancellationToken, unit: WorkUnit) -> anyhow::Result<()> {
        let (cancel, link) = linked(&cancel, &unit.cancel);
        let walk = self.run(&cancel, &unit).await;
        link.abort();

        let (remaining, failure) = match walk {
            Ok(Walk::Parked) => {
                debug!(
                    pipeline_id = %unit.pipeline_id,
                    task_id = %unit.task_id,
                    "Workflow parked on approval"
                );
                return Ok(());
            }
            Ok(Walk::Finished(remaining)) => (remaining, None),
            Err(err) => {
                error!(
                    pipeline_id = %unit.pipeline_id,
                    task_id = %unit.task_id,
                    error = %err,
                    "Workflow execution failed"
                );
                (StatusValue::Error, Some(err.to_string()))
            }
        };

        self.orchestrator
            .complete_unit(&unit, remaining, failure)
            .await?;
        Ok(())
    }
}
