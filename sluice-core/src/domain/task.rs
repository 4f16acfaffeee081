//! Task domain types
//!
//! A task is the schedulable form of one workflow: it carries the
//! dependency snapshot the admission check reads.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::admission;
use crate::domain::status::{RunOn, StatusValue};

/// Where a task is in its scheduling lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPhase {
    /// Waiting for dependencies to resolve
    Waiting,
    /// Admitted and handed to the dispatch queue
    Dispatched,
    /// Settled, skipped or killed
    Done,
}

/// One workflow's worth of pending work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub pipeline_id: Uuid,
    pub workflow_pid: u32,
    pub name: String,
    /// Other tasks of the same pipeline
    pub dependencies: Vec<Uuid>,
    pub run_on: Vec<RunOn>,
    /// Last resolved status of each dependency
    pub dep_status: HashMap<Uuid, StatusValue>,
    pub phase: TaskPhase,
}

impl Task {
    /// Every dependency has reported a resolved status.
    pub fn dependencies_resolved(&self) -> bool {
        self.dependencies
            .iter()
            .all(|dep| self.dep_status.contains_key(dep))
    }

    pub fn depends_on(&self, task: Uuid) -> bool {
        self.dependencies.contains(&task)
    }

    /// Admission decision for the current dependency snapshot.
    pub fn should_run(&self) -> bool {
        admission::should_run(&self.run_on, &self.dep_status)
    }
}
