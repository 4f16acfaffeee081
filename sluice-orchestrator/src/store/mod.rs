//! Store collaborator
//!
//! Durable home of pipeline run records. The orchestrator treats it as a
//! row store with read, create and compare-and-swap update; every write
//! carries the version it was based on and fails with
//! [`StoreError::Conflict`] if someone else wrote in between.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use sluice_core::domain::pipeline::Pipeline;
use sluice_core::domain::run::PipelineRun;
use thiserror::Error;
use uuid::Uuid;

/// Store error type
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("pipeline {0} not found")]
    NotFound(Uuid),

    #[error("pipeline {id} was modified concurrently (expected version {expected})")]
    Conflict { id: Uuid, expected: u64 },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("record serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// A record together with the version it was read at
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned<T> {
    pub value: T,
    pub version: u64,
}

#[async_trait]
pub trait Store: Send + Sync + 'static {
    /// Next pipeline number for `repo`, starting at 1.
    async fn next_number(&self, repo: &str) -> StoreResult<u64>;

    /// Inserts a new run at version 1.
    async fn create(&self, run: &PipelineRun) -> StoreResult<u64>;

    async fn get(&self, id: Uuid) -> StoreResult<Option<Versioned<PipelineRun>>>;

    /// Pipelines, newest first, optionally limited to one repository.
    async fn list(&self, repo: Option<&str>) -> StoreResult<Vec<Pipeline>>;

    /// Replaces the run if it is still at `expected_version`; returns the new version.
    async fn update(&self, run: &PipelineRun, expected_version: u64) -> StoreResult<u64>;
}
