//! Workflow domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::status::StatusValue;
use crate::domain::step::Step;

/// One parallel execution stage of a pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    /// Unique within the pipeline
    pub pid: u32,
    pub name: String,
    pub state: StatusValue,
    pub started: Option<DateTime<Utc>>,
    pub finished: Option<DateTime<Utc>>,
    pub steps: Vec<Step>,
    pub error: Option<String>,
}

impl Workflow {
    pub fn is_running(&self) -> bool {
        self.state.is_running()
    }

    /// Any failing state counts here; there is no failure marker at this level.
    pub fn is_failing(&self) -> bool {
        self.state.is_failing()
    }

    pub fn step(&self, pid: u32) -> Option<&Step> {
        self.steps.iter().find(|s| s.pid == pid)
    }

    pub fn step_mut(&mut self, pid: u32) -> Option<&mut Step> {
        self.steps.iter_mut().find(|s| s.pid == pid)
    }

    /// Marks the workflow and every unfinished step with `state`.
    pub fn abandon(&mut self, state: StatusValue, now: DateTime<Utc>) {
        for step in self.steps.iter_mut().filter(|s| !s.state.is_terminal()) {
            step.skip(state, now);
        }
        self.state = state;
        self.finished = Some(now);
    }
}
