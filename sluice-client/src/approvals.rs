//! Approval gate endpoints

use crate::OrchestratorClient;
use crate::error::Result;
use sluice_core::domain::status::DecisionAction;
use sluice_core::dto::approval::{ApprovalView, SubmitDecision};
use uuid::Uuid;

impl OrchestratorClient {
    /// Get an approval gate as seen by the configured user
    pub async fn get_approval(&self, pipeline_id: Uuid, step_pid: u32) -> Result<ApprovalView> {
        let url = self.url(&format!(
            "/pipeline/{}/step/{}/approval",
            pipeline_id, step_pid
        ));
        let response = self.identified(self.client.get(&url)).send().await?;

        self.handle_response(response).await
    }

    /// Approve or reject a gate as the configured user
    pub async fn submit_decision(
        &self,
        pipeline_id: Uuid,
        step_pid: u32,
        action: DecisionAction,
        comment: Option<String>,
    ) -> Result<ApprovalView> {
        self.require_user()?;
        let url = self.url(&format!(
            "/pipeline/{}/step/{}/approval",
            pipeline_id, step_pid
        ));
        let body = SubmitDecision { action, comment };
        let response = self
            .identified(self.client.post(&url))
            .json(&body)
            .send()
            .await?;

        self.handle_response(response).await
    }
}
