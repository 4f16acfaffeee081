//! Approval API Handlers

use axum::{
    Json,
    extract::{Path, State},
    http::HeaderMap,
};
use sluice_core::dto::approval::{ApprovalView, SubmitDecision};
use std::sync::Arc;
use uuid::Uuid;

use crate::api::error::ApiResult;
use crate::api::identity;
use crate::service::Orchestrator;

/// GET /pipeline/{id}/step/{pid}/approval
pub async fn get_approval(
    State(orchestrator): State<Arc<Orchestrator>>,
    Path((id, pid)): Path<(Uuid, u32)>,
    headers: HeaderMap,
) -> ApiResult<Json<ApprovalView>> {
    let viewer = identity::viewer(&headers);
    let view = orchestrator.approval(id, pid, viewer.as_deref()).await?;
    Ok(Json(view))
}

/// POST /pipeline/{id}/step/{pid}/approval
pub async fn submit_decision(
    State(orchestrator): State<Arc<Orchestrator>>,
    Path((id, pid)): Path<(Uuid, u32)>,
    headers: HeaderMap,
    Json(req): Json<SubmitDecision>,
) -> ApiResult<Json<ApprovalView>> {
    let user = identity::caller(&headers)?;
    tracing::info!("{} submits {} on pipeline {} step {}", user, req.action, id, pid);

    let view = orchestrator
        .decide(id, pid, &user, req.action, req.comment)
        .await?;
    Ok(Json(view))
}
