//! Lifecycle vocabulary
//!
//! Closed enumerations shared by every layer. Each one parses from and prints
//! to the lowercase token used on the wire; anything outside the set is
//! rejected with [`ParseError::InvalidArgument`] at the parsing boundary.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ParseError;

macro_rules! vocabulary {
    ($(#[$meta:meta])* $name:ident, $kind:literal, { $($variant:ident => $token:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            /// Every member, in declaration order
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $token),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = ParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($token => Ok($name::$variant),)+
                    other => Err(ParseError::invalid($kind, other)),
                }
            }
        }
    };
}

vocabulary!(
    /// Status of a step, workflow, pipeline or dependency
    StatusValue, "status", {
        Skipped => "skipped",
        Pending => "pending",
        Running => "running",
        Success => "success",
        Failure => "failure",
        Killed => "killed",
        Error => "error",
        Blocked => "blocked",
        Declined => "declined",
        Created => "created",
    }
);

impl StatusValue {
    /// `pending` or `running`: the unit is still active.
    pub fn is_running(self) -> bool {
        matches!(self, StatusValue::Pending | StatusValue::Running)
    }

    /// `error`, `killed` or `failure`.
    pub fn is_failing(self) -> bool {
        matches!(
            self,
            StatusValue::Error | StatusValue::Killed | StatusValue::Failure
        )
    }

    /// The unit will not change state again.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            StatusValue::Skipped
                | StatusValue::Success
                | StatusValue::Failure
                | StatusValue::Killed
                | StatusValue::Error
                | StatusValue::Declined
        )
    }
}

vocabulary!(
    /// Aggregate dependency outcome a task is eligible to run on
    RunOn, "run_on", {
        Success => "success",
        Failure => "failure",
    }
);

vocabulary!(
    /// What a step does when executed
    StepKind, "step type", {
        Clone => "clone",
        Service => "service",
        Plugin => "plugin",
        Commands => "commands",
        Cache => "cache",
        Approval => "approval",
    }
);

vocabulary!(
    /// Whether a failing step counts toward its parent failing
    FailurePolicy, "failure policy", {
        Ignore => "ignore",
        Fail => "fail",
    }
);

impl Default for FailurePolicy {
    fn default() -> Self {
        FailurePolicy::Fail
    }
}

vocabulary!(
    /// Quorum required to approve a gate
    ApprovalStrategy, "approval strategy", {
        Any => "any",
        All => "all",
    }
);

impl Default for ApprovalStrategy {
    fn default() -> Self {
        ApprovalStrategy::Any
    }
}

vocabulary!(
    /// State of an approval gate
    ApprovalState, "approval state", {
        Pending => "pending",
        Approved => "approved",
        Rejected => "rejected",
        Expired => "expired",
    }
);

vocabulary!(
    /// What caused a pipeline run
    TriggerEvent, "event", {
        Push => "push",
        PullRequest => "pull_request",
        Tag => "tag",
        Manual => "manual",
        Cron => "cron",
    }
);

vocabulary!(
    /// A decision submitted against an approval gate
    DecisionAction, "decision action", {
        Approve => "approve",
        Reject => "reject",
    }
);
