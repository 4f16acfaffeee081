//! Configuration module
//!
//! Handles CLI configuration including orchestrator URL and caller identity.

use sluice_client::OrchestratorClient;

/// CLI configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// URL of the orchestrator service
    pub orchestrator_url: String,
    /// Who is issuing cancel and decision requests
    pub user: Option<String>,
}

impl Config {
    /// Build a client carrying the configured identity
    pub fn client(&self) -> OrchestratorClient {
        let client = OrchestratorClient::new(&self.orchestrator_url);
        match &self.user {
            Some(user) => client.with_user(user),
            None => client,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_carries_user() {
        let config = Config {
            orchestrator_url: "http://ci.internal:8080/".to_string(),
            user: Some("alice".to_string()),
        };

        let client = config.client();
        assert_eq!(client.base_url(), "http://ci.internal:8080");
        assert_eq!(client.user(), Some("alice"));
    }

    #[test]
    fn test_client_without_user() {
        let config = Config {
            orchestrator_url: "http://localhost:8080".to_string(),
            user: None,
        };

        assert_eq!(config.client().user(), None);
    }
}
