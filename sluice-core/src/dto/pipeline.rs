//! Pipeline DTOs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::definition::PipelineDefinition;
use crate::domain::pipeline::Pipeline;
use crate::domain::status::{StatusValue, TriggerEvent};

/// Request to start a new pipeline run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerPipeline {
    pub repo: String,
    pub branch: String,
    pub commit: String,
    #[serde(default = "default_event")]
    pub event: TriggerEvent,
    pub author: String,
    pub definition: PipelineDefinition,
}

fn default_event() -> TriggerEvent {
    TriggerEvent::Manual
}

/// Lightweight pipeline summary for listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineSummary {
    pub id: Uuid,
    pub repo: String,
    pub number: u64,
    pub status: StatusValue,
    pub branch: String,
    pub commit: String,
    pub event: TriggerEvent,
    pub created: DateTime<Utc>,
    pub finished: Option<DateTime<Utc>>,
    pub workflows: usize,
}

impl From<&Pipeline> for PipelineSummary {
    fn from(pipeline: &Pipeline) -> Self {
        Self {
            id: pipeline.id,
            repo: pipeline.repo.clone(),
            number: pipeline.number,
            status: pipeline.status,
            branch: pipeline.branch.clone(),
            commit: pipeline.commit.clone(),
            event: pipeline.event,
            created: pipeline.created,
            finished: pipeline.finished,
            workflows: pipeline.workflows.len(),
        }
    }
}
