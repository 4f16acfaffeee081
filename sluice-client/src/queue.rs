//! Queue endpoints

use crate::OrchestratorClient;
use crate::error::Result;
use sluice_core::dto::queue::QueueStats;

impl OrchestratorClient {
    /// Snapshot of the dispatch queue
    pub async fn queue_stats(&self) -> Result<QueueStats> {
        let url = self.url("/queue/stats");
        let response = self.identified(self.client.get(&url)).send().await?;

        self.handle_response(response).await
    }
}
