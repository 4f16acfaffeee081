//! Orchestrator configuration
//!
//! Read once from the environment at start-up.

use std::path::PathBuf;
use std::time::Duration;

/// Orchestrator configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the HTTP API listens on
    pub bind_addr: String,

    /// Postgres connection string; the in-memory store is used when absent
    pub database_url: Option<String>,

    /// Dispatch queue buffer size
    pub queue_capacity: usize,

    /// Number of concurrent workflow executors
    pub workers: usize,

    /// Root directory for per-pipeline workspaces
    pub workspace: PathBuf,

    /// Maximum time a single step may run
    pub step_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            database_url: None,
            queue_capacity: 64,
            workers: 4,
            workspace: std::env::temp_dir().join("sluice"),
            step_timeout: Duration::from_secs(3600),
        }
    }
}

impl Config {
    /// Creates configuration from environment variables
    ///
    /// Recognized variables:
    /// - SLUICE_BIND_ADDR (default: 0.0.0.0:8080)
    /// - DATABASE_URL (optional)
    /// - SLUICE_QUEUE_CAPACITY (default: 64)
    /// - SLUICE_WORKERS (default: 4)
    /// - SLUICE_WORKSPACE (default: <tmp>/sluice)
    /// - SLUICE_STEP_TIMEOUT (seconds, default: 3600)
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let defaults = Self::default();

        let number = |key: &str, default: u64| -> anyhow::Result<u64> {
            match lookup(key) {
                Some(raw) => raw
                    .trim()
                    .parse::<u64>()
                    .map_err(|_| anyhow::anyhow!("{key} must be a non-negative integer, got {raw:?}")),
                None => Ok(default),
            }
        };

        Ok(Self {
            bind_addr: lookup("SLUICE_BIND_ADDR").unwrap_or(defaults.bind_addr),
            database_url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
            queue_capacity: number("SLUICE_QUEUE_CAPACITY", defaults.queue_capacity as u64)?
                as usize,
            workers: number("SLUICE_WORKERS", defaults.workers as u64)? as usize,
            workspace: lookup("SLUICE_WORKSPACE")
                .map(PathBuf::from)
                .unwrap_or(defaults.workspace),
            step_timeout: Duration::from_secs(number(
                "SLUICE_STEP_TIMEOUT",
                defaults.step_timeout.as_secs(),
            )?),
        })
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.bind_addr.trim().is_empty() {
            anyhow::bail!("bind_addr cannot be empty");
        }

        if self.queue_capacity == 0 {
            anyhow::bail!("queue_capacity must be greater than 0");
        }

        if self.workers == 0 {
            anyhow::bail!("workers must be greater than 0");
        }

        if self.step_timeout.is_zero() {
            anyhow::bail!("step_timeout must be greater than 0");
        }

        if let Some(url) = &self.database_url
            && !url.starts_with("postgres://")
            && !url.starts_with("postgresql://")
        {
            anyhow::bail!("DATABASE_URL must be a postgres:// connection string");
        }

        Ok(())
    }
}
