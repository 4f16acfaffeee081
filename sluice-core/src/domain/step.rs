//! Step domain types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::approval::StepApproval;
use crate::domain::definition::StepSettings;
use crate::domain::status::{FailurePolicy, StatusValue, StepKind};

/// A leaf execution unit inside a workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// Unique within the pipeline
    pub pid: u32,
    /// Pid of the owning workflow
    pub ppid: u32,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: StepKind,
    pub state: StatusValue,
    pub failure: FailurePolicy,
    pub exit_code: Option<i32>,
    pub started: Option<DateTime<Utc>>,
    pub finished: Option<DateTime<Utc>>,
    pub image: Option<String>,
    pub commands: Vec<String>,
    pub settings: StepSettings,
    /// Present once an approval step has been reached
    pub approval: Option<StepApproval>,
    pub error: Option<String>,
}

impl Step {
    /// A failing state only counts when the step is marked `fail`.
    pub fn is_failing(&self) -> bool {
        self.state.is_failing() && self.failure == FailurePolicy::Fail
    }

    pub fn is_approval(&self) -> bool {
        self.kind == StepKind::Approval
    }

    /// Moves the step into `running`.
    pub fn start(&mut self, now: DateTime<Utc>) {
        self.state = StatusValue::Running;
        self.started = Some(now);
    }

    /// Records a terminal state.
    pub fn finish(&mut self, state: StatusValue, exit_code: Option<i32>, now: DateTime<Utc>) {
        self.state = state;
        self.exit_code = exit_code;
        if self.started.is_none() {
            self.started = Some(now);
        }
        self.finished = Some(now);
    }

    /// Marks a step that never ran.
    pub fn skip(&mut self, state: StatusValue, now: DateTime<Utc>) {
        self.state = state;
        self.finished = Some(now);
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn step(pid: u32, state: StatusValue, failure: FailurePolicy) -> Step {
        Step {
            pid,
            ppid: 1,
            name: format!("step-{pid}"),
            kind: StepKind::Commands,
            state,
            failure,
            exit_code: None,
            started: None,
            finished: None,
            image: None,
            commands: vec!["true".to_string()],
            settings: StepSettings::None,
            approval: None,
            error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::step;
    use super::*;

    #[test]
    fn test_ignored_failure_is_not_failing() {
        assert!(!step(2, StatusValue::Failure, FailurePolicy::Ignore).is_failing());
        assert!(step(2, StatusValue::Failure, FailurePolicy::Fail).is_failing());
        assert!(step(2, StatusValue::Killed, FailurePolicy::Fail).is_failing());
        assert!(!step(2, StatusValue::Declined, FailurePolicy::Fail).is_failing());
    }

    #[test]
    fn test_finish_stamps_start_when_missing() {
        let now = Utc::now();
        let mut s = step(2, StatusValue::Pending, FailurePolicy::Fail);
        s.finish(StatusValue::Error, None, now);
        assert_eq!(s.started, Some(now));
        assert_eq!(s.finished, Some(now));
    }
}
