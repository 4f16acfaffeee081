//! Approval DTOs

use serde::{Deserialize, Serialize};

use crate::domain::approval::StepApproval;
use crate::domain::status::DecisionAction;

/// A gate as seen by one viewer
///
/// The permission fields are derived per request and never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalView {
    #[serde(flatten)]
    pub gate: StepApproval,
    pub can_approve: bool,
    pub can_reject: bool,
    pub pending_approvers: Vec<String>,
}

/// Body of a decision submission; the deciding user comes from the caller's identity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitDecision {
    pub action: DecisionAction,
    #[serde(default)]
    pub comment: Option<String>,
}
