//! Orchestration Service
//!
//! Owns the canonical pipeline run records and everything that mutates them:
//! triggering, admission, dispatch to the queue, approval decisions and
//! cancellation. Every mutation of a run goes through [`Orchestrator::mutate`],
//! which holds the pipeline's lock and writes back with a version check.

mod executor;
mod locks;


pub use executor::{WorkUnit, WorkflowExecutor};
pub use locks::LockCache;

use chrono::{DateTime, Utc};
use sluice_core::approval::{self, ApprovalError};
use sluice_core::domain::approval::StepApproval;
use sluice_core::domain::definition::DefinitionError;
use sluice_core::domain::pipeline::Pipeline;
use sluice_core::domain::run::{GateRelease, PipelineRun};
use sluice_core::domain::status::{DecisionAction, StatusValue};
use sluice_core::dto::approval::ApprovalView;
use sluice_core::dto::pipeline::{PipelineSummary, TriggerPipeline};
use sluice_core::dto::queue::QueueStats;
use sluice_core::error::ParseError;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::backend::Backend;
use crate::queue::{DispatchQueue, QueueError};
use crate::secrets::SecretProvider;
use crate::store::{Store, StoreError};

/// Orchestration error type
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("pipeline {0} not found")]
    PipelineNotFound(Uuid),

    #[error("step {0} not found")]
    StepNotFound(u32),

    #[error("task {0} not found")]
    TaskNotFound(Uuid),

    #[error("{0}")]
    InvalidState(String),

    #[error("invalid pipeline definition: {0}")]
    Definition(#[from] DefinitionError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Approval(#[from] ApprovalError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

/// Attempts at recording a finished workflow before giving up
const COMPLETE_ATTEMPTS: u32 = 3;
const COMPLETE_BACKOFF: Duration = Duration::from_millis(100);

pub struct Orchestrator {
    store: Arc<dyn Store>,
    backend: Arc<dyn Backend>,
    secrets: Arc<dyn SecretProvider>,
    queue: DispatchQueue<WorkUnit>,
    locks: LockCache,
    /// Cancellation handles of dispatched tasks, by task id
    units: Mutex<HashMap<Uuid, CancellationToken>>,
    shutdown: CancellationToken,
    background: TaskTracker,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn Store>,
        backend: Arc<dyn Backend>,
        secrets: Arc<dyn SecretProvider>,
        queue_capacity: usize,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            backend,
            secrets,
            queue: DispatchQueue::new(queue_capacity),
            locks: LockCache::new(),
            units: Mutex::new(HashMap::new()),
            shutdown: CancellationToken::new(),
            background: TaskTracker::new(),
        })
    }

    /// Starts the dispatch queue with `workers` workflow executors.
    pub fn start(self: &Arc<Self>, workers: usize) -> OrchestratorResult<()> {
        let executor = Arc::new(WorkflowExecutor::new(self.clone()));
        self.queue.start(self.shutdown.clone(), workers, executor)?;
        info!(workers, "Orchestrator started");
        Ok(())
    }

    /// Cancels in-flight work and waits for the queue to drain.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.queue.shutdown().await;
        self.background.close();
        self.background.wait().await;
        info!("Orchestrator stopped");
    }

    // ========================================================================
    // Pipelines
    // ========================================================================

    /// Materializes a new run and dispatches the workflows that can start.
    pub async fn trigger(&self, req: TriggerPipeline) -> OrchestratorResult<Pipeline> {
        if req.repo.trim().is_empty() {
            return Err(OrchestratorError::InvalidArgument(
                "repo cannot be empty".to_string(),
            ));
        }
        req.definition.validate()?;

        let number = self.store.next_number(&req.repo).await?;
        let now = Utc::now();
        let mut run = PipelineRun::materialize(&req, number, now)?;
        let admitted = run.admit(now);
        run.settle(now);
        self.store.create(&run).await?;

        info!(
            pipeline_id = %run.id(),
            repo = %req.repo,
            number,
            workflows = run.pipeline.workflows.len(),
            "Pipeline triggered"
        );

        self.dispatch(run.id(), admitted).await;
        Ok(run.pipeline)
    }

    pub async fn get_pipeline(&self, id: Uuid) -> OrchestratorResult<Pipeline> {
        Ok(self.load(id).await?.pipeline)
    }

    /// Pipelines newest first, optionally for one repository.
    pub async fn list_pipelines(
        &self,
        repo: Option<&str>,
    ) -> OrchestratorResult<Vec<PipelineSummary>> {
        let pipelines = self.store.list(repo).await?;
        Ok(pipelines.iter().map(PipelineSummary::from).collect())
    }

    /// Kills everything still waiting, cancels in-flight workflows and
    /// expires open gates.
    pub async fn cancel_pipeline(&self, id: Uuid, by: &str) -> OrchestratorResult<Pipeline> {
        let (pipeline, in_flight) = self
            .mutate(id, |run, now| {
                if run.is_settled() || !run.pipeline.workflows.iter().any(|w| w.is_running()) {
                    return Err(OrchestratorError::InvalidState(format!(
                        "pipeline {id} is not running"
                    )));
                }

                let in_flight = run.kill_waiting(now);
                let mut expired = Vec::new();
                for step in run
                    .pipeline
                    .workflows
                    .iter_mut()
                    .flat_map(|w| w.steps.iter_mut())
                {
                    if let Some(gate) = step.approval.as_mut()
                        && gate.expire(now)
                    {
                        expired.push(step.pid);
                    }
                }
                for pid in expired {
                    run.release_gate(pid, StatusValue::Killed, now);
                }

                // Parked workflows have no unit to cancel
                for task_id in &in_flight {
                    self.cancel_unit(*task_id);
                }
                run.refresh_activity();
                run.settle(now);
                Ok((run.pipeline.clone(), in_flight.len()))
            })
            .await?;

        info!(pipeline_id = %id, by, in_flight, "Pipeline cancelled");
        Ok(pipeline)
    }

    // ========================================================================
    // Approvals
    // ========================================================================

    /// Gate snapshot with the permissions of `viewer`.
    pub async fn approval(
        &self,
        pipeline_id: Uuid,
        pid: u32,
        viewer: Option<&str>,
    ) -> OrchestratorResult<ApprovalView> {
        let gate = self.gate(pipeline_id, pid).await?;
        Ok(gate.view(viewer, Utc::now()))
    }

    /// Records `user`'s decision on a gate and releases the workflow once
    /// the gate is final.
    pub async fn decide(
        &self,
        pipeline_id: Uuid,
        pid: u32,
        user: &str,
        action: DecisionAction,
        comment: Option<String>,
    ) -> OrchestratorResult<ApprovalView> {
        if user.trim().is_empty() {
            return Err(OrchestratorError::InvalidArgument(
                "user cannot be empty".to_string(),
            ));
        }

        // A late decision expires the gate, which releases it too
        let (outcome, view, ready) = self
            .mutate(pipeline_id, |run, now| {
                let step = run
                    .pipeline
                    .step_mut(pid)
                    .ok_or(OrchestratorError::StepNotFound(pid))?;
                let outcome = approval::decide_step(step, user, action, comment, now);
                let view = step.approval.as_ref().map(|g| g.view(Some(user), now));
                let ready = Self::release_gate(run, pid, StatusValue::Skipped, now);
                Ok((outcome, view, ready))
            })
            .await?;

        self.dispatch(pipeline_id, ready).await;

        let state = outcome?;
        info!(%pipeline_id, pid, user, %action, %state, "Approval decision recorded");
        view.ok_or(OrchestratorError::Approval(ApprovalError::NotFound))
    }

    pub fn queue_stats(&self) -> QueueStats {
        self.queue.stats()
    }

    // ========================================================================
    // Internals shared with the workflow executor
    // ========================================================================

    async fn load(&self, id: Uuid) -> OrchestratorResult<PipelineRun> {
        self.store
            .get(id)
            .await?
            .map(|v| v.value)
            .ok_or(OrchestratorError::PipelineNotFound(id))
    }

    async fn gate(&self, pipeline_id: Uuid, pid: u32) -> OrchestratorResult<StepApproval> {
        let run = self.load(pipeline_id).await?;
        let step = run
            .pipeline
            .step(pid)
            .ok_or(OrchestratorError::StepNotFound(pid))?;
        step.approval
            .clone()
            .ok_or(OrchestratorError::Approval(ApprovalError::NotFound))
    }

    /// Releases a decided gate and returns the tasks that can now be dispatched.
    fn release_gate(
        run: &mut PipelineRun,
        pid: u32,
        remaining: StatusValue,
        now: DateTime<Utc>,
    ) -> Vec<Uuid> {
        let ready = match run.release_gate(pid, remaining, now) {
            Some(GateRelease::Resume(task_id)) => vec![task_id],
            Some(GateRelease::Finished(task_id, status)) => {
                debug!(pipeline_id = %run.id(), %task_id, %status, "Gate finished workflow");
                run.admit(now)
            }
            None => Vec::new(),
        };
        run.refresh_activity();
        run.settle(now);
        ready
    }

    /// Expires the gate at `deadline` unless it is decided first.
    fn watch_deadline(self: &Arc<Self>, pipeline_id: Uuid, pid: u32, deadline: DateTime<Utc>) {
        let this = self.clone();
        self.background.spawn(async move {
            loop {
                let wait = (deadline - Utc::now()).to_std().unwrap_or_default();
                tokio::select! {
                    _ = this.shutdown.cancelled() => return,
                    _ = tokio::time::sleep(wait) => {}
                }
                match this.expire_gate(pipeline_id, pid).await {
                    Ok(true) => continue,
                    Ok(false) => return,
                    Err(err) => {
                        warn!(%pipeline_id, pid, error = %err, "Failed to expire approval gate");
                        return;
                    }
                }
            }
        });
    }

    /// Expires an overdue gate and releases its workflow.
    ///
    /// Returns true while the gate is still pending and not yet due.
    async fn expire_gate(&self, pipeline_id: Uuid, pid: u32) -> OrchestratorResult<bool> {
        let (pending, ready) = self
            .mutate(pipeline_id, |run, now| {
                let gate = run
                    .pipeline
                    .step_mut(pid)
                    .ok_or(OrchestratorError::StepNotFound(pid))?
                    .approval
                    .as_mut()
                    .ok_or(OrchestratorError::Approval(ApprovalError::NotFound))?;
                if gate.is_pending() && !gate.is_expired(now) {
                    return Ok((true, Vec::new()));
                }
                if gate.expire(now) {
                    info!(%pipeline_id, pid, "Approval deadline reached");
                }
                Ok((false, Self::release_gate(run, pid, StatusValue::Skipped, now)))
            })
            .await?;

        self.dispatch(pipeline_id, ready).await;
        Ok(pending)
    }

    /// Loads a run, applies `apply` and writes it back if it changed.
    ///
    /// Runs inside the pipeline's critical section. An error from `apply`
    /// leaves the stored record untouched.
    pub(crate) async fn mutate<R, F>(&self, pipeline_id: Uuid, apply: F) -> OrchestratorResult<R>
    where
        F: FnOnce(&mut PipelineRun, DateTime<Utc>) -> OrchestratorResult<R> + Send,
        R: Send,
    {
        let _guard = self.locks.acquire(pipeline_id).await;

        let current = self
            .store
            .get(pipeline_id)
            .await?
            .ok_or(OrchestratorError::PipelineNotFound(pipeline_id))?;
        let mut run = current.value.clone();
        let result = apply(&mut run, Utc::now())?;

        if run != current.value {
            self.store.update(&run, current.version).await?;
        }

        if run.is_settled() {
            if !current.value.is_settled() {
                info!(
                    %pipeline_id,
                    status = %run.pipeline.status,
                    "Pipeline finished"
                );
                if let Err(err) = self.backend.release(pipeline_id).await {
                    warn!(%pipeline_id, error = %err, "Failed to release pipeline workspace");
                }
            }
            self.locks.invalidate(pipeline_id);
        }

        Ok(result)
    }

    /// Enqueues admitted tasks; tasks the queue refuses end in `error`.
    async fn dispatch(&self, pipeline_id: Uuid, mut tasks: Vec<Uuid>) {
        while !tasks.is_empty() {
            let mut refused = Vec::new();

            for task_id in tasks.drain(..) {
                let unit = WorkUnit {
                    pipeline_id,
                    task_id,
                    cancel: self.register_unit(task_id),
                };
                debug!(%pipeline_id, %task_id, "Dispatching task");
                if let Err(err) = self.queue.enqueue(&self.shutdown, unit).await {
                    warn!(%pipeline_id, %task_id, error = %err, "Task could not be dispatched");
                    self.forget_unit(task_id);
                    refused.push((task_id, err.to_string()));
                }
            }

            if refused.is_empty() {
                break;
            }

            let result = self
                .mutate(pipeline_id, |run, now| {
                    for (task_id, reason) in refused {
                        let pid = run
                            .task(task_id)
                            .ok_or(OrchestratorError::TaskNotFound(task_id))?
                            .workflow_pid;
                        if let Some(workflow) = run.pipeline.workflow_mut(pid) {
                            workflow.abandon(StatusValue::Error, now);
                            workflow.error = Some(reason);
                        }
                        run.resolve(task_id, StatusValue::Error);
                    }
                    let admitted = run.admit(now);
                    run.settle(now);
                    Ok(admitted)
                })
                .await;

            tasks = match result {
                Ok(admitted) => admitted,
                Err(err) => {
                    error!(%pipeline_id, error = %err, "Failed to record refused tasks");
                    break;
                }
            };
        }
    }

    /// Dispatches from a worker without blocking it on queue capacity.
    fn spawn_dispatch(self: &Arc<Self>, pipeline_id: Uuid, tasks: Vec<Uuid>) {
        if tasks.is_empty() {
            return;
        }
        let this = self.clone();
        self.background.spawn(async move {
            this.dispatch(pipeline_id, tasks).await;
        });
    }

    fn register_unit(&self, task_id: Uuid) -> CancellationToken {
        let token = self.shutdown.child_token();
        let mut units = self.units.lock().unwrap_or_else(|p| p.into_inner());
        units.insert(task_id, token.clone());
        token
    }

    fn forget_unit(&self, task_id: Uuid) {
        let mut units = self.units.lock().unwrap_or_else(|p| p.into_inner());
        units.remove(&task_id);
    }

    fn cancel_unit(&self, task_id: Uuid) {
        let units = self.units.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(token) = units.get(&task_id) {
            token.cancel();
        }
    }

    /// Settles the workflow behind `unit` and admits whatever it unblocks.
    ///
    /// Steps that never reached a final state take `remaining`. A `failure`
    /// reason marks the whole workflow `error`. Store errors are retried up to
    /// [`COMPLETE_ATTEMPTS`] times.
    async fn complete_unit(
        self: &Arc<Self>,
        unit: &WorkUnit,
        remaining: StatusValue,
        failure: Option<String>,
    ) -> OrchestratorResult<()> {
        self.forget_unit(unit.task_id);

        let mut attempt = 0;
        let (admitted, status) = loop {
            attempt += 1;
            let failure = failure.clone();
            let result = self
                .mutate(unit.pipeline_id, |run, now| {
                    Self::finish_unit(run, unit, remaining, failure, now)
                })
                .await;

            match result {
                Ok(done) => break done,
                Err(err @ OrchestratorError::Store(_)) if attempt < COMPLETE_ATTEMPTS => {
                    warn!(
                        pipeline_id = %unit.pipeline_id,
                        task_id = %unit.task_id,
                        attempt,
                        error = %err,
                        "Retrying workflow completion"
                    );
                    tokio::time::sleep(COMPLETE_BACKOFF * attempt).await;
                }
                Err(err) => {
                    error!(
                        pipeline_id = %unit.pipeline_id,
                        task_id = %unit.task_id,
                        attempt,
                        error = %err,
                        "Failed to record workflow completion"
                    );
                    return Err(err);
                }
            }
        };

        info!(
            pipeline_id = %unit.pipeline_id,
            task_id = %unit.task_id,
            %status,
            admitted = admitted.len(),
            "Workflow finished"
        );

        self.spawn_dispatch(unit.pipeline_id, admitted);
        Ok(())
    }

    fn finish_unit(
        run: &mut PipelineRun,
        unit: &WorkUnit,
        remaining: StatusValue,
        failure: Option<String>,
        now: DateTime<Utc>,
    ) -> OrchestratorResult<(Vec<Uuid>, StatusValue)> {
        let pid = run
            .task(unit.task_id)
            .ok_or(OrchestratorError::TaskNotFound(unit.task_id))?
            .workflow_pid;

        let status = match failure {
            Some(reason) => {
                if let Some(workflow) = run.pipeline.workflow_mut(pid) {
                    workflow.abandon(StatusValue::Error, now);
                    workflow.error = Some(reason);
                }
                run.resolve(unit.task_id, StatusValue::Error);
                StatusValue::Error
            }
            None => {
                if let Some(workflow) = run.pipeline.workflow_mut(pid) {
                    for step in workflow.steps.iter_mut().filter(|s| !s.state.is_terminal()) {
                        step.skip(remaining, now);
                    }
                }
                run.finish_workflow(unit.task_id, now)
                    .ok_or(OrchestratorError::TaskNotFound(unit.task_id))?
            }
        };

        let admitted = run.admit(now);
        run.refresh_activity();
        run.settle(now);
        Ok((admitted, status))
    }
}
