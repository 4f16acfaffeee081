//! API Module
//!
//! HTTP API layer for the orchestrator.
//! Each submodule handles endpoints for a specific domain.

pub mod approval;
pub mod error;
pub mod health;
pub mod identity;
pub mod pipeline;
pub mod queue;

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::service::Orchestrator;

/// Create the main API router with all endpoints
pub fn create_router(orchestrator: Arc<Orchestrator>) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Pipeline endpoints
        .route("/pipeline/trigger", post(pipeline::trigger_pipeline))
        .route("/pipeline/list", get(pipeline::list_pipelines))
        .route("/pipeline/{id}", get(pipeline::get_pipeline))
        .route("/pipeline/{id}/cancel", post(pipeline::cancel_pipeline))
        // Approval endpoints
        .route(
            "/pipeline/{id}/step/{pid}/approval",
            get(approval::get_approval).post(approval::submit_decision),
        )
        // Queue endpoints
        .route("/queue/stats", get(queue::queue_stats))
        // Add state and middleware
        .with_state(orchestrator)
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{Backend, StepExit, StepRequest};
    use crate::secrets::EnvSecretProvider;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::{Value, json};
    use sluice_core::dto::queue::QueueStats;
    use tokio_util::sync::CancellationToken;
    use tower::ServiceExt;

    struct InstantBackend;

    #[async_trait]
    impl Backend for InstantBackend {
        async fn run_step(
            &self,
            _cancel: &CancellationToken,
            _request: StepRequest,
        ) -> anyhow::Result<StepExit> {
            Ok(StepExit::Exited(0))
        }
    }

    fn test_router() -> (Router, Arc<Orchestrator>) {
        let orchestrator = Orchestrator::new(
            Arc::new(MemoryStore::new()),
            Arc::new(InstantBackend),
            Arc::new(EnvSecretProvider::default()),
            4,
        );
        orchestrator.start(1).unwrap();
        (create_router(orchestrator.clone()), orchestrator)
    }

    fn definition(gated: bool) -> Value {
        let mut steps = vec![json!({ "name": "compile", "type": "commands", "commands": ["make"] })];
        if gated {
            steps.push(json!({
                "name": "gate",
                "type": "approval",
                "settings": { "kind": "approval", "approvers": ["bob"] }
            }));
        }
        json!({ "workflows": [{ "name": "build", "steps": steps }] })
    }

    async fn send(
        app: &Router,
        method: &str,
        uri: &str,
        user: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(user) = user {
            builder = builder.header(identity::USER_HEADER, user);
        }
        let body = match body {
            Some(body) => {
                builder = builder.header("content-type", "application/json");
                Body::from(body.to_string())
            }
            None => Body::empty(),
        };

        let resp = app
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    async fn trigger(app: &Router, gated: bool) -> Value {
        let (status, pipeline) = send(
            app,
            "POST",
            "/pipeline/trigger",
            None,
            Some(json!({
                "repo": "acme/app",
                "branch": "main",
                "commit": "abc123",
                "author": "alice",
                "definition": definition(gated),
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        pipeline
    }

    async fn wait_status(app: &Router, id: &str, expected: &str) -> Value {
        for _ in 0..500 {
            let (_, pipeline) = send(app, "GET", &format!("/pipeline/{id}"), None, None).await;
            if pipeline["status"] == expected {
                return pipeline;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        panic!("pipeline {id} never became {expected}");
    }

    #[tokio::test]
    async fn test_health() {
        let (app, orchestrator) = test_router();
        let resp = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        orchestrator.shutdown().await;
    }

    #[tokio::test]
    async fn test_trigger_get_and_list() {
        let (app, orchestrator) = test_router();
        let pipeline = trigger(&app, false).await;
        assert_eq!(pipeline["number"], 1);
        assert_eq!(pipeline["event"], "manual");
        let id = pipeline["id"].as_str().unwrap().to_string();

        let pipeline = wait_status(&app, &id, "success").await;
        assert_eq!(pipeline["workflows"][0]["steps"][0]["state"], "success");

        let (status, list) = send(&app, "GET", "/pipeline/list?repo=acme/app", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(list.as_array().unwrap().len(), 1);
        assert_eq!(list[0]["workflows"], 1);

        let (status, _) = send(&app, "GET", "/pipeline/list?repo=other", None, None).await;
        assert_eq!(status, StatusCode::OK);

        orchestrator.shutdown().await;
    }

    #[tokio::test]
    async fn test_error_statuses() {
        let (app, orchestrator) = test_router();

        let (status, body) = send(
            &app,
            "GET",
            &format!("/pipeline/{}", uuid::Uuid::new_v4()),
            None,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].as_str().unwrap().contains("not found"));

        let (status, _) = send(&app, "GET", "/pipeline/not-a-uuid", None, None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = send(
            &app,
            "POST",
            "/pipeline/trigger",
            None,
            Some(json!({
                "repo": "acme/app",
                "branch": "main",
                "commit": "abc",
                "author": "alice",
                "definition": { "workflows": [] },
            })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("no workflows"));

        let pipeline = trigger(&app, false).await;
        let id = pipeline["id"].as_str().unwrap().to_string();
        wait_status(&app, &id, "success").await;

        let (status, _) = send(&app, "POST", &format!("/pipeline/{id}/cancel"), None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = send(
            &app,
            "POST",
            &format!("/pipeline/{id}/cancel"),
            Some("alice"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let step_pid = pipeline["workflows"][0]["steps"][0]["pid"].as_u64().unwrap();
        let (status, _) = send(
            &app,
            "GET",
            &format!("/pipeline/{id}/step/{step_pid}/approval"),
            None,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        orchestrator.shutdown().await;
    }

    #[tokio::test]
    async fn test_approval_round_trip() {
        let (app, orchestrator) = test_router();
        let pipeline = trigger(&app, true).await;
        let id = pipeline["id"].as_str().unwrap().to_string();
        let gate_pid = pipeline["workflows"][0]["steps"][1]["pid"].as_u64().unwrap();
        let uri = format!("/pipeline/{id}/step/{gate_pid}/approval");

        wait_status(&app, &id, "blocked").await;

        let (status, view) = send(&app, "GET", &uri, Some("bob"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(view["state"], "pending");
        assert_eq!(view["can_approve"], true);

        let decision = json!({ "action": "approve", "comment": "ship it" });
        let (status, _) = send(&app, "POST", &uri, None, Some(decision.clone())).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = send(&app, "POST", &uri, Some("eve"), Some(decision.clone())).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, view) = send(&app, "POST", &uri, Some("bob"), Some(decision.clone())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(view["state"], "approved");
        assert_eq!(view["decisions"][0]["comment"], "ship it");

        let (status, _) = send(&app, "POST", &uri, Some("bob"), Some(decision)).await;
        assert_eq!(status, StatusCode::CONFLICT);

        wait_status(&app, &id, "success").await;

        let (status, stats) = send(&app, "GET", "/queue/stats", None, None).await;
        assert_eq!(status, StatusCode::OK);
        let stats: QueueStats = serde_json::from_value(stats).unwrap();
        assert_eq!(stats.workers, 1);
        assert_eq!(stats.enqueued, 1);

        orchestrator.shutdown().await;
    }
}
