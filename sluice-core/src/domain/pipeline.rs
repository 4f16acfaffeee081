//! Pipeline domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::status::{StatusValue, TriggerEvent};
use crate::domain::step::Step;
use crate::domain::workflow::Workflow;

/// One build run of a repository
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pipeline {
    pub id: Uuid,
    pub repo: String,
    /// Monotonic per repository
    pub number: u64,
    pub status: StatusValue,
    pub branch: String,
    pub commit: String,
    pub event: TriggerEvent,
    pub author: String,
    pub created: DateTime<Utc>,
    pub started: Option<DateTime<Utc>>,
    pub finished: Option<DateTime<Utc>>,
    pub workflows: Vec<Workflow>,
}

impl Pipeline {
    /// True while any workflow is still `pending` or `running`.
    pub fn is_running(&self) -> bool {
        self.workflows.iter().any(Workflow::is_running)
    }

    pub fn workflow(&self, pid: u32) -> Option<&Workflow> {
        self.workflows.iter().find(|w| w.pid == pid)
    }

    pub fn workflow_mut(&mut self, pid: u32) -> Option<&mut Workflow> {
        self.workflows.iter_mut().find(|w| w.pid == pid)
    }

    /// Finds a step by pid across all workflows.
    pub fn step(&self, pid: u32) -> Option<&Step> {
        self.workflows.iter().find_map(|w| w.step(pid))
    }

    pub fn step_mut(&mut self, pid: u32) -> Option<&mut Step> {
        self.workflows.iter_mut().find_map(|w| w.step_mut(pid))
    }
}
