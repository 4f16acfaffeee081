//! In-memory store

use async_trait::async_trait;
use sluice_core::domain::pipeline::Pipeline;
use sluice_core::domain::run::PipelineRun;
use std::collections::HashMap;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use super::{Store, StoreError, StoreResult, Versioned};

/// Process-local store, used when no database is configured and in tests
#[derive(Default)]
pub struct MemoryStore {
    runs: RwLock<HashMap<Uuid, Versioned<PipelineRun>>>,
    numbers: Mutex<HashMap<String, u64>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn next_number(&self, repo: &str) -> StoreResult<u64> {
        let mut numbers = self.numbers.lock().await;
        let number = numbers.entry(repo.to_string()).or_insert(0);
        *number += 1;
        Ok(*number)
    }

    async fn create(&self, run: &PipelineRun) -> StoreResult<u64> {
        let mut runs = self.runs.write().await;
        runs.insert(
            run.id(),
            Versioned {
                value: run.clone(),
                version: 1,
            },
        );
        Ok(1)
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<Versioned<PipelineRun>>> {
        Ok(self.runs.read().await.get(&id).cloned())
    }

    async fn list(&self, repo: Option<&str>) -> StoreResult<Vec<Pipeline>> {
        let runs = self.runs.read().await;
        let mut pipelines: Vec<Pipeline> = runs
            .values()
            .map(|r| &r.value.pipeline)
            .filter(|p| repo.is_none_or(|repo| p.repo == repo))
            .cloned()
            .collect();
        pipelines.sort_by(|a, b| b.created.cmp(&a.created).then(b.number.cmp(&a.number)));
        Ok(pipelines)
    }

    async fn update(&self, run: &PipelineRun, expected_version: u64) -> StoreResult<u64> {
        let mut runs = self.runs.write().await;
        let current = runs
            .get_mut(&run.id())
            .ok_or(StoreError::NotFound(run.id()))?;

        if current.version != expected_version {
            return Err(StoreError::Conflict {
                id: run.id(),
                expected: expected_version,
            });
        }

        current.value = run.clone();
        current.version += 1;
        Ok(current.version)
    }
}
