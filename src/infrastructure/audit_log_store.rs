//! Postgres-backed audit log
//!
//! Rows live in `children_api_logging`. String columns have fixed widths, so
//! values are clipped to fit rather than failing the write.

use crate::pipeline::audit_store::{ArrivalRecord, AuditLogStore, CompletionRecord};
use crate::pipeline::types::{PipelineError, PipelineResult};
use async_trait::async_trait;
use sqlx::PgPool;
use tracing::debug;

pub const LOG_TABLE: &str = "children_api_logging";

/// Column widths of the logging table, in characters
pub mod widths {
    pub const USER_NAME: usize = 15;
    pub const ENDPOINT: usize = 120;
    pub const METHOD: usize = 6;
    pub const BODY: usize = 1000;
    pub const QUERY: usize = 200;
}

const CREATE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS children_api_logging (
    request_id UUID PRIMARY KEY,
    user_name VARCHAR(15),
    endpoint VARCHAR(120),
    method VARCHAR(6),
    body VARCHAR(1000),
    query VARCHAR(200),
    request_timestamp TIMESTAMP,
    status_code INTEGER,
    response_timestamp TIMESTAMP
)
"#;

const INSERT_ARRIVAL: &str = r#"
INSERT INTO children_api_logging
    (request_id, user_name, endpoint, method, body, query, request_timestamp)
VALUES ($1, $2, $3, $4, $5, $6, $7)
ON CONFLICT (request_id) DO NOTHING
"#;

const UPDATE_COMPLETION: &str = r#"
UPDATE children_api_logging
SET status_code = $2, response_timestamp = $3
WHERE request_id = $1
"#;

/// Cut `value` to at most `max_chars` characters
fn clip(value: &str, max_chars: usize) -> String {
    value.chars().take(max_chars).collect()
}

pub struct PostgresAuditLogStore {
    pool: PgPool,
}

impl PostgresAuditLogStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the logging table if it does not exist yet
    pub async fn ensure_schema(&self) -> PipelineResult<()> {
        sqlx::query(CREATE_TABLE)
            .execute(&self.pool)
            .await
            .map_err(|e| PipelineError::AuditStore(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl AuditLogStore for PostgresAuditLogStore {
    async fn insert(&self, record: &ArrivalRecord) -> PipelineResult<()> {
        let result = sqlx::query(INSERT_ARRIVAL)
            .bind(*record.request_id.as_uuid())
            .bind(
                record
                    .user_name
                    .as_ref()
                    .map(|name| clip(name.as_ref(), widths::USER_NAME)),
            )
            .bind(clip(&record.endpoint, widths::ENDPOINT))
            .bind(clip(&record.method, widths::METHOD))
            .bind(record.body.as_deref().map(|body| clip(body, widths::BODY)))
            .bind(clip(&record.query, widths::QUERY))
            .bind(record.request_timestamp.naive_utc())
            .execute(&self.pool)
            .await
            .map_err(|e| PipelineError::AuditStore(e.to_string()))?;

        debug!(
            request_id = %record.request_id,
            rows = result.rows_affected(),
            "Inserted arrival audit row"
        );
        Ok(())
    }

    async fn update(&self, record: &CompletionRecord) -> PipelineResult<()> {
        let result = sqlx::query(UPDATE_COMPLETION)
            .bind(*record.request_id.as_uuid())
            .bind(i32::from(record.status_code))
            .bind(record.response_timestamp.naive_utc())
            .execute(&self.pool)
            .await
            .map_err(|e| PipelineError::AuditStore(e.to_string()))?;

        debug!(
            request_id = %record.request_id,
            rows = result.rows_affected(),
            "Updated completion audit row"
        );
        Ok(())
    }
}
