//! Postgres store
//!
//! Each run is stored as a JSONB document next to a `version` column; an
//! update only lands if the version it read is still current.

use async_trait::async_trait;
use sluice_core::domain::pipeline::Pipeline;
use sluice_core::domain::run::PipelineRun;
use sqlx::PgPool;
use sqlx::types::Json;
use uuid::Uuid;

use super::{Store, StoreError, StoreResult, Versioned};

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn next_number(&self, repo: &str) -> StoreResult<u64> {
        let number: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO repo_counters (repo, last_number)
            VALUES ($1, 1)
            ON CONFLICT (repo) DO UPDATE SET last_number = repo_counters.last_number + 1
            RETURNING last_number
            "#,
        )
        .bind(repo)
        .fetch_one(&self.pool)
        .await?;

        Ok(from_db_int(number))
    }

    async fn create(&self, run: &PipelineRun) -> StoreResult<u64> {
        let pipeline = &run.pipeline;
        sqlx::query(
            r#"
            INSERT INTO pipeline_runs (id, repo, number, status, created_at, version, document)
            VALUES ($1, $2, $3, $4, $5, 1, $6)
            "#,
        )
        .bind(pipeline.id)
        .bind(&pipeline.repo)
        .bind(to_db_int(pipeline.number))
        .bind(pipeline.status.as_str())
        .bind(pipeline.created)
        .bind(Json(run))
        .execute(&self.pool)
        .await?;

        Ok(1)
    }

    async fn get(&self, id: Uuid) -> StoreResult<Option<Versioned<PipelineRun>>> {
        let row = sqlx::query_as::<_, RunRow>(
            "SELECT version, document FROM pipeline_runs WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    async fn list(&self, repo: Option<&str>) -> StoreResult<Vec<Pipeline>> {
        let rows = sqlx::query_as::<_, RunRow>(
            r#"
            SELECT version, document
            FROM pipeline_runs
            WHERE $1::TEXT IS NULL OR repo = $1
            ORDER BY created_at DESC, number DESC
            "#,
        )
        .bind(repo)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.document.0.pipeline).collect())
    }

    async fn update(&self, run: &PipelineRun, expected_version: u64) -> StoreResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE pipeline_runs
            SET status = $2, document = $3, version = version + 1
            WHERE id = $1 AND version = $4
            "#,
        )
        .bind(run.id())
        .bind(run.pipeline.status.as_str())
        .bind(Json(run))
        .bind(to_db_int(expected_version))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(expected_version + 1);
        }

        let exists: Option<i64> =
            sqlx::query_scalar("SELECT version FROM pipeline_runs WHERE id = $1")
                .bind(run.id())
                .fetch_optional(&self.pool)
                .await?;

        Err(conflict_or_missing(run.id(), expected_version, exists))
    }
}

// ============================================================================
// Row mapping
// ============================================================================

#[derive(sqlx::FromRow)]
struct RunRow {
    version: i64,
    document: Json<PipelineRun>,
}

impl From<RunRow> for Versioned<PipelineRun> {
    fn from(row: RunRow) -> Self {
        Versioned {
            value: row.document.0,
            version: from_db_int(row.version),
        }
    }
}

fn to_db_int(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn from_db_int(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

/// Error for an update that touched no row.
fn conflict_or_missing(id: Uuid, expected: u64, current: Option<i64>) -> StoreError {
    match current {
        Some(_) => StoreError::Conflict { id, expected },
        None => StoreError::NotFound(id),
    }
}
