//! Pipeline API Handlers
//!
//! HTTP endpoints for triggering, inspecting and cancelling pipelines.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::HeaderMap,
};
use serde::Deserialize;
use sluice_core::domain::pipeline::Pipeline;
use sluice_core::dto::pipeline::{PipelineSummary, TriggerPipeline};
use std::sync::Arc;
use uuid::Uuid;

use crate::api::error::ApiResult;
use crate::api::identity;
use crate::service::Orchestrator;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub repo: Option<String>,
}

/// POST /pipeline/trigger
pub async fn trigger_pipeline(
    State(orchestrator): State<Arc<Orchestrator>>,
    Json(req): Json<TriggerPipeline>,
) -> ApiResult<Json<Pipeline>> {
    tracing::info!("Triggering pipeline for {} @ {}", req.repo, req.commit);

    let pipeline = orchestrator.trigger(req).await?;
    Ok(Json(pipeline))
}

/// GET /pipeline/list?repo=
pub async fn list_pipelines(
    State(orchestrator): State<Arc<Orchestrator>>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Vec<PipelineSummary>>> {
    tracing::debug!("Listing pipelines (repo: {:?})", query.repo);

    let pipelines = orchestrator.list_pipelines(query.repo.as_deref()).await?;
    Ok(Json(pipelines))
}

/// GET /pipeline/{id}
pub async fn get_pipeline(
    State(orchestrator): State<Arc<Orchestrator>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Pipeline>> {
    tracing::debug!("Getting pipeline: {}", id);

    let pipeline = orchestrator.get_pipeline(id).await?;
    Ok(Json(pipeline))
}

/// POST /pipeline/{id}/cancel
pub async fn cancel_pipeline(
    State(orchestrator): State<Arc<Orchestrator>>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> ApiResult<Json<Pipeline>> {
    let user = identity::caller(&headers)?;
    tracing::info!("Cancelling pipeline {} on behalf of {}", id, user);

    let pipeline = orchestrator.cancel_pipeline(id, &user).await?;
    Ok(Json(pipeline))
}
