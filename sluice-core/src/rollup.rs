//! Status roll-up
//!
//! Derives a parent's effective status from its children. Always recomputed
//! from the children; nothing here is cached.
//!
//! The two directions scan differently: a workflow takes the state of its
//! *first* failing step, a pipeline the state of its *last* failing
//! workflow. Kept as-is for compatibility, see DESIGN.md.

use crate::domain::status::StatusValue;
use crate::domain::step::Step;
use crate::domain::workflow::Workflow;

/// Workflow status from its steps: the first failing step wins.
pub fn workflow_status(steps: &[Step]) -> StatusValue {
    steps
        .iter()
        .find(|step| step.is_failing())
        .map(|step| step.state)
        .unwrap_or(StatusValue::Success)
}

/// Pipeline status from its workflows: the last failing workflow wins.
pub fn pipeline_status(workflows: &[Workflow]) -> StatusValue {
    let mut status = StatusValue::Success;
    for workflow in workflows {
        if workflow.is_failing() {
            status = workflow.state;
        }
    }
    status
}

/// True while any workflow is `pending` or `running`.
pub fn any_running(workflows: &[Workflow]) -> bool {
    workflows.iter().any(Workflow::is_running)
}
