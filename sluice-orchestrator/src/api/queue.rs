//! Queue API Handlers

use axum::{Json, extract::State};
use sluice_core::dto::queue::QueueStats;
use std::sync::Arc;

use crate::service::Orchestrator;

/// GET /queue/stats
pub async fn queue_stats(State(orchestrator): State<Arc<Orchestrator>>) -> Json<QueueStats> {
    Json(orchestrator.queue_stats())
}
