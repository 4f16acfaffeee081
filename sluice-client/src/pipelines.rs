//! Pipeline-related API endpoints

use crate::OrchestratorClient;
use crate::error::Result;
use sluice_core::domain::pipeline::Pipeline;
use sluice_core::dto::pipeline::{PipelineSummary, TriggerPipeline};
use uuid::Uuid;

impl OrchestratorClient {
    // =============================================================================
    // Pipeline Management
    // =============================================================================

    /// Trigger a new pipeline run
    ///
    /// # Returns
    /// The pipeline as materialized by the orchestrator
    pub async fn trigger_pipeline(&self, req: &TriggerPipeline) -> Result<Pipeline> {
        let url = self.url("/pipeline/trigger");
        let response = self
            .identified(self.client.post(&url))
            .json(req)
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// List pipelines, newest first
    ///
    /// # Arguments
    /// * `repo` - Only list pipelines of this repository
    pub async fn list_pipelines(&self, repo: Option<&str>) -> Result<Vec<PipelineSummary>> {
        let url = self.url("/pipeline/list");
        let mut request = self.identified(self.client.get(&url));
        if let Some(repo) = repo {
            request = request.query(&[("repo", repo)]);
        }
        let response = request.send().await?;

        self.handle_response(response).await
    }

    /// Get a pipeline with its workflows and steps
    pub async fn get_pipeline(&self, pipeline_id: Uuid) -> Result<Pipeline> {
        let url = self.url(&format!("/pipeline/{}", pipeline_id));
        let response = self.identified(self.client.get(&url)).send().await?;

        self.handle_response(response).await
    }

    /// Cancel a running pipeline on behalf of the configured user
    pub async fn cancel_pipeline(&self, pipeline_id: Uuid) -> Result<Pipeline> {
        self.require_user()?;
        let url = self.url(&format!("/pipeline/{}/cancel", pipeline_id));
        let response = self.identified(self.client.post(&url)).send().await?;

        self.handle_response(response).await
    }
}
