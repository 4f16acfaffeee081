//! Approval gate state machine
//!
//! `pending -> approved | rejected | expired`, all terminal. Every method
//! takes `now` explicitly; callers serialize access to a gate (one gate is
//! one critical section).

use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;
use thiserror::Error;

use crate::domain::approval::{ApprovalDecision, SYSTEM_FINALIZER, StepApproval};
use crate::domain::definition::ApprovalSettings;
use crate::domain::status::{ApprovalState, ApprovalStrategy, DecisionAction};
use crate::domain::step::Step;
use crate::dto::approval::ApprovalView;

/// Reasons a decision is refused
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApprovalError {
    #[error("step has no approval gate")]
    NotFound,

    #[error("approval gate is already {0}")]
    InvalidState(ApprovalState),

    #[error("approval gate has expired")]
    Expired,

    #[error("{0} is not an approver for this gate")]
    Forbidden(String),

    #[error("{0} has already decided on this gate")]
    AlreadyDecided(String),
}

impl StepApproval {
    /// Opens a pending gate from step settings.
    pub fn open(
        settings: &ApprovalSettings,
        requested_by: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        let expires_at = match settings.timeout_seconds {
            0 => None,
            secs => Some(
                i64::try_from(secs)
                    .ok()
                    .and_then(Duration::try_seconds)
                    .and_then(|timeout| now.checked_add_signed(timeout))
                    .unwrap_or(DateTime::<Utc>::MAX_UTC),
            ),
        };

        let mut approvers: Vec<String> = Vec::with_capacity(settings.approvers.len());
        for approver in &settings.approvers {
            if !approvers.contains(approver) {
                approvers.push(approver.clone());
            }
        }

        Self {
            message: settings.message.clone(),
            approvers,
            strategy: settings.strategy,
            timeout: settings.timeout_seconds,
            requested_by: requested_by.into(),
            requested_at: now,
            expires_at,
            state: ApprovalState::Pending,
            decisions: Vec::new(),
            finalized_by: None,
            finalized_at: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.state == ApprovalState::Pending
    }

    /// The deadline has passed, whatever the recorded state.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|deadline| now >= deadline)
    }

    /// `user` is allowed to decide on this gate at all.
    pub fn is_permitted(&self, user: &str) -> bool {
        self.approvers.is_empty() || self.approvers.iter().any(|a| a == user)
    }

    pub fn has_decided(&self, user: &str) -> bool {
        self.decisions.iter().any(|d| d.user == user)
    }

    /// Whether `viewer` could submit a decision right now.
    pub fn can_decide(&self, viewer: &str, now: DateTime<Utc>) -> bool {
        self.is_pending()
            && !self.is_expired(now)
            && self.is_permitted(viewer)
            && !self.has_decided(viewer)
    }

    /// Designated approvers that have not approved yet.
    pub fn pending_approvers(&self) -> Vec<String> {
        let approved: HashSet<&str> = self
            .decisions
            .iter()
            .filter(|d| d.action == DecisionAction::Approve)
            .map(|d| d.user.as_str())
            .collect();

        self.approvers
            .iter()
            .filter(|a| !approved.contains(a.as_str()))
            .cloned()
            .collect()
    }

    /// Moves a pending gate to `expired`. Returns false if it was not pending.
    pub fn expire(&mut self, now: DateTime<Utc>) -> bool {
        if !self.is_pending() {
            return false;
        }
        self.finalize(ApprovalState::Expired, SYSTEM_FINALIZER, now);
        true
    }

    /// Records a decision and finalizes the gate when quorum is reached.
    ///
    /// A late decision expires the gate before returning
    /// [`ApprovalError::Expired`]; no other error mutates the gate.
    pub fn decide(
        &mut self,
        user: &str,
        action: DecisionAction,
        comment: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<ApprovalState, ApprovalError> {
        if !self.is_pending() {
            return Err(ApprovalError::InvalidState(self.state));
        }
        if self.is_expired(now) {
            self.expire(now);
            return Err(ApprovalError::Expired);
        }
        if !self.is_permitted(user) {
            return Err(ApprovalError::Forbidden(user.to_string()));
        }
        if self.has_decided(user) {
            return Err(ApprovalError::AlreadyDecided(user.to_string()));
        }

        self.decisions.push(ApprovalDecision {
            user: user.to_string(),
            action,
            comment,
            timestamp: now,
        });

        match (action, self.strategy) {
            (DecisionAction::Reject, _) => {
                self.finalize(ApprovalState::Rejected, user, now);
            }
            (DecisionAction::Approve, ApprovalStrategy::Any) => {
                self.finalize(ApprovalState::Approved, user, now);
            }
            (DecisionAction::Approve, ApprovalStrategy::All) => {
                if self.pending_approvers().is_empty() {
                    self.finalize(ApprovalState::Approved, user, now);
                }
            }
        }

        Ok(self.state)
    }

    /// Snapshot with the permissions of `viewer` filled in.
    pub fn view(&self, viewer: Option<&str>, now: DateTime<Utc>) -> ApprovalView {
        let can_decide = viewer.is_some_and(|v| self.can_decide(v, now));
        ApprovalView {
            gate: self.clone(),
            can_approve: can_decide,
            can_reject: can_decide,
            pending_approvers: self.pending_approvers(),
        }
    }

    fn finalize(&mut self, state: ApprovalState, by: &str, now: DateTime<Utc>) {
        self.state = state;
        self.finalized_by = Some(by.to_string());
        self.finalized_at = Some(now);
    }
}

/// Decides on the gate attached to `step`.
pub fn decide_step(
    step: &mut Step,
    user: &str,
    action: DecisionAction,
    comment: Option<String>,
    now: DateTime<Utc>,
) -> Result<ApprovalState, ApprovalError> {
    step.approval
        .as_mut()
        .ok_or(ApprovalError::NotFound)?
        .decide(user, action, comment, now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::status::{FailurePolicy, StatusValue};
    use crate::domain::step::fixtures::step;

    fn settings(approvers: &[&str], strategy: ApprovalStrategy, timeout: u64) -> ApprovalSettings {
        ApprovalSettings {
            message: "deploy to production?".to_string(),
            approvers: approvers.iter().map(|a| a.to_string()).collect(),
            strategy,
            timeout_seconds: timeout,
        }
    }

    fn gate(approvers: &[&str], strategy: ApprovalStrategy) -> (StepApproval, DateTime<Utc>) {
        let now = Utc::now();
        (
            StepApproval::open(&settings(approvers, strategy, 3600), "ci", now),
            now,
        )
    }

    fn assert_finalization_invariant(g: &StepApproval) {
        assert_eq!(g.finalized_at.is_some(), !g.is_pending());
        assert_eq!(g.finalized_by.is_some(), !g.is_pending());
    }

    #[test]
    fn test_open_sets_deadline() {
        let now = Utc::now();
        let g = StepApproval::open(&settings(&[], ApprovalStrategy::Any, 90), "ci", now);
        assert_eq!(g.expires_at, Some(now + Duration::seconds(90)));
        assert_eq!(g.state, ApprovalState::Pending);
        assert_finalization_invariant(&g);

        let g = StepApproval::open(&settings(&[], ApprovalStrategy::Any, 0), "ci", now);
        assert_eq!(g.expires_at, None);
        assert!(!g.is_expired(now + Duration::days(365)));
    }

    #[test]
    fn test_oversized_timeout_keeps_a_deadline() {
        let now = Utc::now();
        let g = StepApproval::open(&settings(&[], ApprovalStrategy::Any, u64::MAX), "ci", now);
        assert_eq!(g.expires_at, Some(DateTime::<Utc>::MAX_UTC));
        assert!(!g.is_expired(now + Duration::days(365)));
    }

    #[test]
    fn test_duplicate_decision_is_refused() {
        let (mut g, now) = gate(&["alice", "bob"], ApprovalStrategy::All);

        assert_eq!(
            g.decide("alice", DecisionAction::Approve, None, now),
            Ok(ApprovalState::Pending)
        );
        assert_eq!(
            g.decide("alice", DecisionAction::Approve, None, now),
            Err(ApprovalError::AlreadyDecided("alice".to_string()))
        );
        assert_eq!(g.decisions.iter().filter(|d| d.user == "alice").count(), 1);
    }

    #[test]
    fn test_all_strategy_waits_for_every_approver() {
        let (mut g, now) = gate(&["alice", "bob"], ApprovalStrategy::All);

        g.decide("alice", DecisionAction::Approve, None, now).unwrap();
        assert_eq!(g.state, ApprovalState::Pending);
        assert_eq!(g.pending_approvers(), vec!["bob".to_string()]);
        assert_finalization_invariant(&g);

        g.decide("bob", DecisionAction::Approve, Some("lgtm".into()), now)
            .unwrap();
        assert_eq!(g.state, ApprovalState::Approved);
        assert_eq!(g.finalized_by.as_deref(), Some("bob"));
        assert!(g.pending_approvers().is_empty());
        assert_finalization_invariant(&g);
    }

    #[test]
    fn test_any_strategy_finalizes_on_first_approval() {
        let (mut g, now) = gate(&["alice", "bob"], ApprovalStrategy::Any);

        assert_eq!(
            g.decide("alice", DecisionAction::Approve, None, now),
            Ok(ApprovalState::Approved)
        );
        assert_eq!(
            g.decide("bob", DecisionAction::Approve, None, now),
            Err(ApprovalError::InvalidState(ApprovalState::Approved))
        );
        assert_eq!(g.decisions.len(), 1);
    }

    #[test]
    fn test_rejection_finalizes_under_all_strategy() {
        let (mut g, now) = gate(&["alice", "bob", "carol"], ApprovalStrategy::All);

        g.decide("alice", DecisionAction::Approve, None, now).unwrap();
        assert_eq!(
            g.decide("bob", DecisionAction::Reject, Some("not today".into()), now),
            Ok(ApprovalState::Rejected)
        );
        assert_eq!(g.finalized_by.as_deref(), Some("bob"));
        // rejections leave the user in the pending list
        assert_eq!(g.pending_approvers(), vec!["bob".to_string(), "carol".to_string()]);
        assert_eq!(
            g.decide("carol", DecisionAction::Approve, None, now),
            Err(ApprovalError::InvalidState(ApprovalState::Rejected))
        );
    }

    #[test]
    fn test_late_decision_expires_gate() {
        let (mut g, now) = gate(&["alice"], ApprovalStrategy::Any);
        let late = now + Duration::seconds(3600);

        assert_eq!(
            g.decide("alice", DecisionAction::Approve, None, late),
            Err(ApprovalError::Expired)
        );
        assert_eq!(g.state, ApprovalState::Expired);
        assert_eq!(g.finalized_at, Some(late));
        assert_eq!(g.finalized_by.as_deref(), Some(SYSTEM_FINALIZER));
        assert!(g.decisions.is_empty());

        assert_eq!(
            g.decide("alice", DecisionAction::Approve, None, late),
            Err(ApprovalError::InvalidState(ApprovalState::Expired))
        );
    }

    #[test]
    fn test_forbidden_user_leaves_gate_untouched() {
        let (mut g, now) = gate(&["alice"], ApprovalStrategy::Any);
        let before = g.clone();

        assert_eq!(
            g.decide("mallory", DecisionAction::Approve, None, now),
            Err(ApprovalError::Forbidden("mallory".to_string()))
        );
        assert_eq!(g, before);
    }

    #[test]
    fn test_open_gate_accepts_anyone() {
        let (mut g, now) = gate(&[], ApprovalStrategy::All);
        assert!(g.can_decide("anyone", now));
        assert_eq!(
            g.decide("anyone", DecisionAction::Approve, None, now),
            Ok(ApprovalState::Approved)
        );
    }

    #[test]
    fn test_view_derives_permissions_per_viewer() {
        let (mut g, now) = gate(&["alice", "bob"], ApprovalStrategy::All);
        g.decide("alice", DecisionAction::Approve, None, now).unwrap();

        let alice = g.view(Some("alice"), now);
        assert!(!alice.can_approve && !alice.can_reject);

        let bob = g.view(Some("bob"), now);
        assert!(bob.can_approve && bob.can_reject);
        assert_eq!(bob.pending_approvers, vec!["bob".to_string()]);

        assert!(!g.view(Some("mallory"), now).can_approve);
        assert!(!g.view(None, now).can_approve);
        assert!(!g.view(Some("bob"), now + Duration::hours(2)).can_approve);
    }

    #[test]
    fn test_expire_only_from_pending() {
        let (mut g, now) = gate(&[], ApprovalStrategy::Any);
        g.decide("alice", DecisionAction::Reject, None, now).unwrap();
        assert!(!g.expire(now));
        assert_eq!(g.state, ApprovalState::Rejected);
    }

    #[test]
    fn test_decide_step_without_gate() {
        let mut s = step(3, StatusValue::Running, FailurePolicy::Fail);
        assert_eq!(
            decide_step(&mut s, "alice", DecisionAction::Approve, None, Utc::now()),
            Err(ApprovalError::NotFound)
        );
    }
}
