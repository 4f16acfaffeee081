//! Caller identity
//!
//! Authentication happens in front of the orchestrator; the authenticated
//! user arrives in the `X-Sluice-User` header.

use axum::http::HeaderMap;

use crate::api::error::{ApiError, ApiResult};

pub const USER_HEADER: &str = "x-sluice-user";

/// The calling user, if the header carries a non-empty value.
pub fn viewer(headers: &HeaderMap) -> Option<String> {
    headers
        .get(USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// The calling user, required.
pub fn caller(headers: &HeaderMap) -> ApiResult<String> {
    viewer(headers).ok_or_else(|| {
        ApiError::Unauthorized(format!("missing {USER_HEADER} header"))
    })
}
