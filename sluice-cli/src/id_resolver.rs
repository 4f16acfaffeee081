//! ID resolver module
//!
//! Resolves pipeline UUID prefixes to full UUIDs by listing pipelines, so
//! users can type a short unambiguous prefix instead of the whole id.

use anyhow::{Context, Result, anyhow};
use sluice_client::OrchestratorClient;
use sluice_core::dto::pipeline::PipelineSummary;
use uuid::Uuid;

use crate::types::IdOrPrefix;

/// Resolve a pipeline ID or prefix to a full UUID
///
/// A full UUID is returned as-is without contacting the orchestrator.
///
/// # Errors
/// Returns an error if no pipeline or more than one pipeline matches the
/// prefix, or if listing pipelines fails.
pub async fn resolve_pipeline_id(client: &OrchestratorClient, input: &str) -> Result<Uuid> {
    let id_or_prefix = IdOrPrefix::parse(input);
    if let Some(uuid) = id_or_prefix.as_uuid() {
        return Ok(uuid);
    }

    let pipelines = client
        .list_pipelines(None)
        .await
        .context("Failed to fetch pipelines for ID resolution")?;

    pick_match(&pipelines, &id_or_prefix)
}

fn pick_match(pipelines: &[PipelineSummary], id_or_prefix: &IdOrPrefix) -> Result<Uuid> {
    let matches: Vec<Uuid> = pipelines
        .iter()
        .map(|p| p.id)
        .filter(|id| id_or_prefix.matches(*id))
        .collect();

    match matches.as_slice() {
        [] => Err(anyhow!(
            "No pipeline found with ID starting with '{}'",
            id_or_prefix
        )),
        [id] => Ok(*id),
        _ => {
            let ids: Vec<String> = matches.iter().map(Uuid::to_string).collect();
            Err(anyhow!(
                "Ambiguous prefix '{}' matches multiple pipelines: {}",
                id_or_prefix,
                ids.join(", ")
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sluice_core::domain::status::{StatusValue, TriggerEvent};

    fn summary(id: &str) -> PipelineSummary {
        PipelineSummary {
            id: Uuid::parse_str(id).unwrap(),
            repo: "acme/api".to_string(),
            number: 1,
            status: StatusValue::Running,
            branch: "main".to_string(),
            commit: "abc123".to_string(),
            event: TriggerEvent::Push,
            created: Utc::now(),
            finished: None,
            workflows: 1,
        }
    }

    #[test]
    fn test_unique_prefix_resolves() {
        let pipelines = vec![
            summary("6f1c7c1e-8a3d-4b8e-9a51-1b0c2f1e7a10"),
            summary("7a000000-0000-4000-8000-000000000000"),
        ];

        let id = pick_match(&pipelines, &IdOrPrefix::parse("6f")).unwrap();
        assert_eq!(id, pipelines[0].id);
    }

    #[test]
    fn test_ambiguous_prefix_is_rejected() {
        let pipelines = vec![
            summary("6f1c7c1e-8a3d-4b8e-9a51-1b0c2f1e7a10"),
            summary("6f200000-0000-4000-8000-000000000000"),
        ];

        let err = pick_match(&pipelines, &IdOrPrefix::parse("6f")).unwrap_err();
        assert!(err.to_string().contains("Ambiguous prefix"));
    }

    #[test]
    fn test_unknown_prefix_is_rejected() {
        let pipelines = vec![summary("6f1c7c1e-8a3d-4b8e-9a51-1b0c2f1e7a10")];

        let err = pick_match(&pipelines, &IdOrPrefix::parse("ff")).unwrap_err();
        assert!(err.to_string().contains("No pipeline found"));
    }
}
