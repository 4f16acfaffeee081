//! Approval gate domain types
//!
//! The state machine that drives these records lives in
//! [`crate::approval`]; this module only holds the persisted shape.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::status::{ApprovalState, ApprovalStrategy, DecisionAction};

/// Identity recorded as `finalized_by` when a gate expires
pub const SYSTEM_FINALIZER: &str = "system";

/// The gate attached to an approval step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepApproval {
    pub message: String,
    /// Empty means any authenticated participant may decide
    pub approvers: Vec<String>,
    pub strategy: ApprovalStrategy,
    /// Seconds from the request; zero means no deadline
    pub timeout: u64,
    pub requested_by: String,
    pub requested_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub state: ApprovalState,
    /// Append-only
    pub decisions: Vec<ApprovalDecision>,
    pub finalized_by: Option<String>,
    pub finalized_at: Option<DateTime<Utc>>,
}

/// One recorded decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalDecision {
    pub user: String,
    pub action: DecisionAction,
    pub comment: Option<String>,
    pub timestamp: DateTime<Utc>,
}
