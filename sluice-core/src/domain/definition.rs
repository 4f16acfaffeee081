//! Pipeline definition types
//!
//! The shape a parsed pipeline document takes once it reaches the
//! orchestrator. Parsing the document itself happens elsewhere; these types
//! are what a trigger request carries and what a new run is materialized from.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use thiserror::Error;

use crate::domain::status::{ApprovalStrategy, FailurePolicy, RunOn, StepKind};

/// A parsed pipeline document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineDefinition {
    pub workflows: Vec<WorkflowDefinition>,
}

/// One workflow of a pipeline document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    pub name: String,
    #[serde(default)]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub run_on: Vec<RunOn>,
    pub steps: Vec<StepDefinition>,
}

/// One step of a workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: StepKind,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub commands: Vec<String>,
    #[serde(default)]
    pub failure: FailurePolicy,
    #[serde(default)]
    pub settings: StepSettings,
}

/// Settings attached to a step, one variant per known shape
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepSettings {
    #[default]
    None,
    Approval(ApprovalSettings),
    Plugin(PluginSettings),
}

/// Gate configuration for an approval step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalSettings {
    #[serde(default)]
    pub message: String,
    /// Empty means any authenticated participant may decide
    #[serde(default)]
    pub approvers: Vec<String>,
    #[serde(default)]
    pub strategy: ApprovalStrategy,
    /// Zero means no deadline; at most [`MAX_APPROVAL_TIMEOUT_SECONDS`]
    #[serde(default)]
    pub timeout_seconds: u64,
}

/// Longest deadline an approval gate may ask for (one year)
pub const MAX_APPROVAL_TIMEOUT_SECONDS: u64 = 366 * 24 * 60 * 60;

/// Free-form plugin options
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PluginSettings {
    #[serde(default)]
    pub options: BTreeMap<String, String>,
}

/// Reasons a definition cannot be materialized into a run
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DefinitionError {
    #[error("pipeline defines no workflows")]
    NoWorkflows,

    #[error("workflow name cannot be empty")]
    EmptyName,

    #[error("workflow {0:?} is defined more than once")]
    DuplicateWorkflow(String),

    #[error("workflow {0:?} has no steps")]
    NoSteps(String),

    #[error("workflow {workflow:?} depends on unknown workflow {dependency:?}")]
    UnknownDependency { workflow: String, dependency: String },

    #[error("workflow {0:?} depends on itself")]
    SelfDependency(String),

    #[error("dependency cycle through workflow {0:?}")]
    Cycle(String),

    #[error("step {0:?} must carry approval settings exactly when its type is approval")]
    ApprovalMismatch(String),

    #[error("approval step {0:?} cannot ignore failures")]
    IgnoredApproval(String),

    #[error("approval step {step:?} timeout of {seconds}s exceeds the maximum of {max}s")]
    ApprovalTimeout { step: String, seconds: u64, max: u64 },
}

impl PipelineDefinition {
    /// Checks the structural rules a run relies on.
    pub fn validate(&self) -> Result<(), DefinitionError> {
        if self.workflows.is_empty() {
            return Err(DefinitionError::NoWorkflows);
        }

        let mut names = HashSet::new();
        for workflow in &self.workflows {
            if workflow.name.trim().is_empty() {
                return Err(DefinitionError::EmptyName);
            }
            if !names.insert(workflow.name.as_str()) {
                return Err(DefinitionError::DuplicateWorkflow(workflow.name.clone()));
            }
            if workflow.steps.is_empty() {
                return Err(DefinitionError::NoSteps(workflow.name.clone()));
            }
            for step in &workflow.steps {
                let has_gate = matches!(step.settings, StepSettings::Approval(_));
                if has_gate != (step.kind == StepKind::Approval) {
                    return Err(DefinitionError::ApprovalMismatch(step.name.clone()));
                }
                if has_gate && step.failure == FailurePolicy::Ignore {
                    return Err(DefinitionError::IgnoredApproval(step.name.clone()));
                }
                if let StepSettings::Approval(settings) = &step.settings {
                    if settings.timeout_seconds > MAX_APPROVAL_TIMEOUT_SECONDS {
                        return Err(DefinitionError::ApprovalTimeout {
                            step: step.name.clone(),
                            seconds: settings.timeout_seconds,
                            max: MAX_APPROVAL_TIMEOUT_SECONDS,
                        });
                    }
                }
            }
        }

        for workflow in &self.workflows {
            for dependency in &workflow.depends_on {
                if dependency == &workflow.name {
                    return Err(DefinitionError::SelfDependency(workflow.name.clone()));
                }
                if !names.contains(dependency.as_str()) {
                    return Err(DefinitionError::UnknownDependency {
                        workflow: workflow.name.clone(),
                        dependency: dependency.clone(),
                    });
                }
            }
        }

        self.check_acyclic()
    }

    fn check_acyclic(&self) -> Result<(), DefinitionError> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            Visiting,
            Done,
        }

        let edges: HashMap<&str, &[String]> = self
            .workflows
            .iter()
            .map(|w| (w.name.as_str(), w.depends_on.as_slice()))
            .collect();
        let mut marks: HashMap<&str, Mark> = HashMap::new();

        for start in self.workflows.iter().map(|w| w.name.as_str()) {
            if marks.contains_key(start) {
                continue;
            }
            // (node, next dependency index)
            let mut stack = vec![(start, 0usize)];
            marks.insert(start, Mark::Visiting);

            while let Some((node, idx)) = stack.pop() {
                let deps = edges.get(node).copied().unwrap_or(&[]);
                if let Some(next) = deps.get(idx) {
                    stack.push((node, idx + 1));
                    match marks.get(next.as_str()) {
                        Some(Mark::Visiting) => return Err(DefinitionError::Cycle(next.clone())),
                        Some(Mark::Done) => {}
                        None => {
                            marks.insert(next.as_str(), Mark::Visiting);
                            stack.push((next.as_str(), 0));
                        }
                    }
                } else {
                    marks.insert(node, Mark::Done);
                }
            }
        }

        Ok(())
    }
}
