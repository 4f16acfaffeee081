//! Secret provider collaborator
//!
//! Supplies the environment injected into step commands. The orchestrator
//! passes the values straight to the backend and never logs them.

use async_trait::async_trait;
use std::collections::HashMap;

/// Environment variable prefix for secrets
pub const SECRET_PREFIX: &str = "SLUICE_SECRET_";

#[async_trait]
pub trait SecretProvider: Send + Sync + 'static {
    /// Secrets visible to `step` of a pipeline in `repo`.
    async fn resolve(&self, repo: &str, step: &str) -> anyhow::Result<HashMap<String, String>>;
}

/// Secrets taken from `SLUICE_SECRET_<NAME>` variables, shared by every repository
#[derive(Debug, Default, Clone)]
pub struct EnvSecretProvider {
    secrets: HashMap<String, String>,
}

impl EnvSecretProvider {
    pub fn from_env() -> Self {
        Self::from_vars(std::env::vars())
    }

    pub fn from_vars(vars: impl IntoIterator<Item = (String, String)>) -> Self {
        let secrets = vars
            .into_iter()
            .filter_map(|(key, value)| {
                key.strip_prefix(SECRET_PREFIX)
                    .filter(|name| !name.is_empty())
                    .map(|name| (name.to_string(), value))
            })
            .collect();
        Self { secrets }
    }

    pub fn len(&self) -> usize {
        self.secrets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.secrets.is_empty()
    }
}

#[async_trait]
impl SecretProvider for EnvSecretProvider {
    async fn resolve(&self, _repo: &str, _step: &str) -> anyhow::Result<HashMap<String, String>> {
        Ok(self.secrets.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_only_prefixed_variables_are_secrets() {
        let provider = EnvSecretProvider::from_vars([
            ("SLUICE_SECRET_TOKEN".to_string(), "s3cr3t".to_string()),
            ("SLUICE_SECRET_".to_string(), "nameless".to_string()),
            ("HOME".to_string(), "/root".to_string()),
        ]);

        assert_eq!(provider.len(), 1);
        let secrets = provider.resolve("acme/app", "deploy").await.unwrap();
        assert_eq!(secrets.get("TOKEN").map(String::as_str), Some("s3cr3t"));
        assert!(!secrets.contains_key("HOME"));
    }
}
