//! Core domain types
//!
//! The structures in this module describe one pipeline run. The orchestrator
//! owns the canonical copy of every record; other components only ever see
//! snapshots or go through its update methods.

pub mod approval;
pub mod definition;
pub mod pipeline;
pub mod run;
pub mod status;
pub mod step;
pub mod task;
pub mod workflow;

pub use status::{
    ApprovalState, ApprovalStrategy, DecisionAction, FailurePolicy, RunOn, StatusValue, StepKind,
    TriggerEvent,
};
