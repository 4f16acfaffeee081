//! API Error Handling
//!
//! Unified error types and conversion for API responses.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use sluice_core::approval::ApprovalError;

use crate::service::OrchestratorError;
use crate::store::StoreError;

/// API error type
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Unauthorized(String),
    Forbidden(String),
    NotFound(String),
    Conflict(String),
    Gone(String),
    InternalError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::Gone(msg) => (StatusCode::GONE, msg),
            ApiError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

impl From<OrchestratorError> for ApiError {
    fn from(err: OrchestratorError) -> Self {
        let message = err.to_string();
        match err {
            OrchestratorError::InvalidArgument(_)
            | OrchestratorError::Definition(_)
            | OrchestratorError::Parse(_) => ApiError::BadRequest(message),
            OrchestratorError::PipelineNotFound(_)
            | OrchestratorError::StepNotFound(_)
            | OrchestratorError::Store(StoreError::NotFound(_)) => ApiError::NotFound(message),
            OrchestratorError::InvalidState(_)
            | OrchestratorError::Store(StoreError::Conflict { .. }) => ApiError::Conflict(message),
            OrchestratorError::Approval(approval) => match approval {
                ApprovalError::NotFound => ApiError::NotFound(message),
                ApprovalError::Forbidden(_) => ApiError::Forbidden(message),
                ApprovalError::InvalidState(_) | ApprovalError::AlreadyDecided(_) => {
                    ApiError::Conflict(message)
                }
                ApprovalError::Expired => ApiError::Gone(message),
            },
            OrchestratorError::TaskNotFound(_)
            | OrchestratorError::Queue(_)
            | OrchestratorError::Store(_) => ApiError::InternalError(message),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use sluice_core::domain::status::ApprovalState;
    use uuid::Uuid;

    fn status_of(err: OrchestratorError) -> StatusCode {
        ApiError::from(err).into_response().status()
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            status_of(OrchestratorError::InvalidArgument("x".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(OrchestratorError::PipelineNotFound(Uuid::new_v4())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(ApprovalError::Forbidden("eve".into()).into()),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            status_of(ApprovalError::InvalidState(ApprovalState::Approved).into()),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(ApprovalError::AlreadyDecided("bob".into()).into()),
            StatusCode::CONFLICT
        );
        assert_eq!(status_of(ApprovalError::Expired.into()), StatusCode::GONE);
        assert_eq!(
            status_of(
                StoreError::Conflict {
                    id: Uuid::new_v4(),
                    expected: 1
                }
                .into()
            ),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(OrchestratorError::TaskNotFound(Uuid::new_v4())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
