//! Pipeline run record
//!
//! A [`PipelineRun`] is the canonical record the orchestrator owns for one
//! pipeline: the pipeline tree plus one task per workflow. All scheduling
//! bookkeeping (admission, dependency propagation, settlement) happens here
//! as plain data manipulation; the caller provides locking and persistence.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;
use uuid::Uuid;

use crate::domain::definition::DefinitionError;
use crate::domain::pipeline::Pipeline;
use crate::domain::status::{ApprovalState, StatusValue};
use crate::domain::step::Step;
use crate::domain::task::{Task, TaskPhase};
use crate::domain::workflow::Workflow;
use crate::dto::pipeline::TriggerPipeline;
use crate::rollup;

/// What happened to a workflow when its decided gate was released
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateRelease {
    /// The gate passed and the workflow has steps left; redispatch the task
    Resume(Uuid),
    /// The gate ended the workflow with this status
    Finished(Uuid, StatusValue),
}

/// A pipeline together with its schedulable tasks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineRun {
    pub pipeline: Pipeline,
    pub tasks: Vec<Task>,
}

impl PipelineRun {
    /// Expands a trigger request into a pending pipeline run.
    ///
    /// Workflows get pids `1..=n`; steps continue numbering after them and
    /// point at their workflow through `ppid`.
    pub fn materialize(
        req: &TriggerPipeline,
        number: u64,
        now: DateTime<Utc>,
    ) -> Result<Self, DefinitionError> {
        req.definition.validate()?;

        let pipeline_id = Uuid::new_v4();
        let workflow_defs = &req.definition.workflows;

        let task_ids: HashMap<&str, Uuid> = workflow_defs
            .iter()
            .map(|w| (w.name.as_str(), Uuid::new_v4()))
            .collect();

        let mut next_step_pid = workflow_defs.len() as u32 + 1;
        let mut workflows = Vec::with_capacity(workflow_defs.len());
        let mut tasks = Vec::with_capacity(workflow_defs.len());

        for (idx, def) in workflow_defs.iter().enumerate() {
            let pid = idx as u32 + 1;

            let steps = def
                .steps
                .iter()
                .map(|step| {
                    let step_pid = next_step_pid;
                    next_step_pid += 1;
                    Step {
                        pid: step_pid,
                        ppid: pid,
                        name: step.name.clone(),
                        kind: step.kind,
                        state: StatusValue::Pending,
                        failure: step.failure,
                        exit_code: None,
                        started: None,
                        finished: None,
                        image: step.image.clone(),
                        commands: step.commands.clone(),
                        settings: step.settings.clone(),
                        approval: None,
                        error: None,
                    }
                })
                .collect();

            workflows.push(Workflow {
                pid,
                name: def.name.clone(),
                state: StatusValue::Pending,
                started: None,
                finished: None,
                steps,
                error: None,
            });

            tasks.push(Task {
                id: task_ids[def.name.as_str()],
                pipeline_id,
                workflow_pid: pid,
                name: def.name.clone(),
                dependencies: def
                    .depends_on
                    .iter()
                    .map(|dep| task_ids[dep.as_str()])
                    .collect(),
                run_on: def.run_on.clone(),
                dep_status: HashMap::new(),
                phase: TaskPhase::Waiting,
            });
        }

        Ok(Self {
            pipeline: Pipeline {
                id: pipeline_id,
                repo: req.repo.clone(),
                number,
                status: StatusValue::Pending,
                branch: req.branch.clone(),
                commit: req.commit.clone(),
                event: req.event,
                author: req.author.clone(),
                created: now,
                started: None,
                finished: None,
                workflows,
            },
            tasks,
        })
    }

    pub fn id(&self) -> Uuid {
        self.pipeline.id
    }

    pub fn task(&self, id: Uuid) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn task_mut(&mut self, id: Uuid) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|t| t.id == id)
    }

    /// Runs admission until nothing changes.
    ///
    /// Returns the tasks newly admitted for dispatch. Tasks whose check fails
    /// are skipped together with their steps, and the skip is propagated to
    /// their dependents, which may in turn become decidable.
    pub fn admit(&mut self, now: DateTime<Utc>) -> Vec<Uuid> {
        let mut admitted = Vec::new();

        loop {
            let decidable: Vec<(Uuid, u32, bool)> = self
                .tasks
                .iter()
                .filter(|t| t.phase == TaskPhase::Waiting && t.dependencies_resolved())
                .map(|t| (t.id, t.workflow_pid, t.should_run()))
                .collect();

            if decidable.is_empty() {
                break;
            }

            for (task_id, workflow_pid, run) in decidable {
                if run {
                    debug!(pipeline_id = %self.id(), %task_id, "task admitted");
                    if let Some(task) = self.task_mut(task_id) {
                        task.phase = TaskPhase::Dispatched;
                    }
                    admitted.push(task_id);
                } else {
                    debug!(pipeline_id = %self.id(), %task_id, "task skipped by admission");
                    if let Some(workflow) = self.pipeline.workflow_mut(workflow_pid) {
                        workflow.abandon(StatusValue::Skipped, now);
                    }
                    self.resolve(task_id, StatusValue::Skipped);
                }
            }
        }

        admitted
    }

    /// Marks a task done and records its outcome on every dependent.
    pub fn resolve(&mut self, task_id: Uuid, status: StatusValue) {
        for task in self.tasks.iter_mut() {
            if task.id == task_id {
                task.phase = TaskPhase::Done;
            } else if task.depends_on(task_id) {
                task.dep_status.insert(task_id, status);
            }
        }
    }

    /// Rolls a workflow up from its steps, stamps it finished and resolves its task.
    ///
    /// A rejected gate settles the workflow as `declined`; the plain roll-up
    /// only looks at failing steps.
    pub fn finish_workflow(&mut self, task_id: Uuid, now: DateTime<Utc>) -> Option<StatusValue> {
        let workflow_pid = self.task(task_id)?.workflow_pid;
        let workflow = self.pipeline.workflow_mut(workflow_pid)?;

        let mut status = rollup::workflow_status(&workflow.steps);
        if status == StatusValue::Success
            && workflow
                .steps
                .iter()
                .any(|s| s.state == StatusValue::Declined)
        {
            status = StatusValue::Declined;
        }

        workflow.state = status;
        workflow.finished = Some(now);
        self.resolve(task_id, status);
        Some(status)
    }

    /// Closes out a blocked approval step whose gate is no longer pending.
    ///
    /// An approved gate leaves the rest of the workflow to run; any other
    /// outcome finishes the workflow, with unfinished steps taking `remaining`.
    /// Returns `None` if the step is not parked on a decided gate.
    pub fn release_gate(
        &mut self,
        pid: u32,
        remaining: StatusValue,
        now: DateTime<Utc>,
    ) -> Option<GateRelease> {
        let pipeline_id = self.pipeline.id;
        let step = self.pipeline.step_mut(pid)?;
        if step.state != StatusValue::Blocked {
            return None;
        }
        let status = match step.approval.as_ref()?.state {
            ApprovalState::Pending => return None,
            ApprovalState::Approved => StatusValue::Success,
            ApprovalState::Rejected => StatusValue::Declined,
            ApprovalState::Expired => StatusValue::Killed,
        };
        step.finish(status, None, now);
        let workflow_pid = step.ppid;

        let task_id = self
            .tasks
            .iter()
            .find(|t| t.workflow_pid == workflow_pid)?
            .id;
        let workflow = self.pipeline.workflow_mut(workflow_pid)?;
        let mut unfinished = workflow
            .steps
            .iter_mut()
            .filter(|s| !s.state.is_terminal())
            .peekable();

        if status == StatusValue::Success && unfinished.peek().is_some() {
            debug!(%pipeline_id, %task_id, pid, "gate passed, resuming workflow");
            return Some(GateRelease::Resume(task_id));
        }
        for step in unfinished {
            step.skip(remaining, now);
        }

        let status = self.finish_workflow(task_id, now)?;
        Some(GateRelease::Finished(task_id, status))
    }

    /// Kills every task that has not been dispatched yet.
    ///
    /// Returns the dispatched tasks still in flight; their executors observe
    /// cancellation themselves.
    pub fn kill_waiting(&mut self, now: DateTime<Utc>) -> Vec<Uuid> {
        let waiting: Vec<(Uuid, u32)> = self
            .tasks
            .iter()
            .filter(|t| t.phase == TaskPhase::Waiting)
            .map(|t| (t.id, t.workflow_pid))
            .collect();

        for (task_id, workflow_pid) in waiting {
            if let Some(workflow) = self.pipeline.workflow_mut(workflow_pid) {
                workflow.abandon(StatusValue::Killed, now);
            }
            self.resolve(task_id, StatusValue::Killed);
        }

        self.tasks
            .iter()
            .filter(|t| t.phase == TaskPhase::Dispatched)
            .map(|t| t.id)
            .collect()
    }

    /// `blocked` while a gate is pending, `running` otherwise.
    pub fn refresh_activity(&mut self) {
        if self.is_settled() {
            return;
        }
        let gated = self
            .pipeline
            .workflows
            .iter()
            .flat_map(|w| w.steps.iter())
            .filter_map(|s| s.approval.as_ref())
            .any(|g| g.state == ApprovalState::Pending);

        self.pipeline.status = if gated {
            StatusValue::Blocked
        } else {
            StatusValue::Running
        };
    }

    /// Derives the final pipeline status once no workflow is active.
    ///
    /// Returns true if this call settled the pipeline.
    pub fn settle(&mut self, now: DateTime<Utc>) -> bool {
        if self.is_settled() || rollup::any_running(&self.pipeline.workflows) {
            return false;
        }

        let mut status = rollup::pipeline_status(&self.pipeline.workflows);
        if status == StatusValue::Success
            && self
                .pipeline
                .workflows
                .iter()
                .any(|w| w.state == StatusValue::Declined)
        {
            status = StatusValue::Declined;
        }

        self.pipeline.status = status;
        self.pipeline.finished = Some(now);
        true
    }

    /// The pipeline has a final status.
    pub fn is_settled(&self) -> bool {
        self.pipeline.finished.is_some()
    }
}
