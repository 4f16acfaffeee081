//! Sluice HTTP Client
//!
//! A type-safe HTTP client for the Sluice orchestrator API, shared by the
//! command line and anything else that drives pipelines remotely.
//!
//! # Example
//!
//! ```no_run
//! use sluice_client::OrchestratorClient;
//! use sluice_core::domain::status::DecisionAction;
//! use uuid::Uuid;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = OrchestratorClient::new("http://localhost:8080").with_user("alice");
//!
//!     let pipeline_id: Uuid = "6f1c7c1e-8a3d-4b8e-9a51-1b0c2f1e7a10".parse()?;
//!     let view = client
//!         .submit_decision(pipeline_id, 4, DecisionAction::Approve, None)
//!         .await?;
//!
//!     println!("Gate is now {}", view.gate.state);
//!     Ok(())
//! }
//! ```

mod approvals;
pub mod error;
mod pipelines;
mod queue;

pub use error::{ClientError, Result};

use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;

/// Header carrying the caller's identity
pub const USER_HEADER: &str = "X-Sluice-User";

/// HTTP client for the Sluice orchestrator API
///
/// Methods are grouped by resource:
/// - Pipelines (trigger, list, show, cancel)
/// - Approval gates (show, decide)
/// - Queue statistics
#[derive(Debug, Clone)]
pub struct OrchestratorClient {
    /// Base URL of the orchestrator (e.g., "http://localhost:8080")
    base_url: String,
    /// Identity sent with every request, if any
    user: Option<String>,
    /// HTTP client instance
    client: Client,
}

impl OrchestratorClient {
    /// Create a new orchestrator client
    ///
    /// # Example
    /// ```
    /// use sluice_client::OrchestratorClient;
    ///
    /// let client = OrchestratorClient::new("http://localhost:8080");
    /// ```
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, Client::new())
    }

    /// Create a new orchestrator client with a custom HTTP client
    ///
    /// This allows you to configure timeouts, proxies, TLS settings, etc.
    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            user: None,
            client,
        }
    }

    /// Act as `user` on every request
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        let user = user.into();
        self.user = (!user.trim().is_empty()).then_some(user);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    /// Check that the orchestrator is reachable
    pub async fn health(&self) -> Result<()> {
        let url = self.url("/health");
        let response = self.client.get(&url).send().await?;

        self.handle_empty_response(response).await
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Attach the identity header when a user is configured
    fn identified(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.user {
            Some(user) => request.header(USER_HEADER, user),
            None => request,
        }
    }

    /// Identity for endpoints that require one
    fn require_user(&self) -> Result<&str> {
        self.user.as_deref().ok_or_else(|| {
            ClientError::InvalidRequest("this operation requires a user identity".to_string())
        })
    }

    /// Decode a successful JSON body
    async fn handle_response<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        Self::ensure_success(response)
            .await?
            .json()
            .await
            .map_err(|e| ClientError::ParseError(format!("unexpected response body: {}", e)))
    }

    /// Succeed on any 2xx, ignoring the body
    async fn handle_empty_response(&self, response: reqwest::Response) -> Result<()> {
        Self::ensure_success(response).await.map(drop)
    }

    /// Turn a non-2xx response into [`ClientError::ApiError`]
    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        tracing::debug!(%status, %body, "orchestrator rejected request");
        Err(ClientError::api_error(status.as_u16(), body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = OrchestratorClient::new("http://localhost:8080");
        assert_eq!(client.base_url(), "http://localhost:8080");
        assert!(client.user().is_none());
    }

    #[test]
    fn test_client_trims_trailing_slash() {
        let client = OrchestratorClient::new("http://localhost:8080/");
        assert_eq!(client.url("/health"), "http://localhost:8080/health");
    }

    #[test]
    fn test_user_identity() {
        let client = OrchestratorClient::new("http://localhost:8080").with_user("  ");
        assert!(client.user().is_none());
        assert!(matches!(
            client.require_user(),
            Err(ClientError::InvalidRequest(_))
        ));

        let client = client.with_user("alice");
        assert_eq!(client.require_user().unwrap(), "alice");
    }
}
