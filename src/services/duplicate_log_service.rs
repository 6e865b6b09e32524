use async_trait::async_trait;
use sqlx::PgPool;

use crate::error::Result;
use crate::models::duplicate_log::{DuplicateLog, NewDuplicateLog};

/// Insert-only audit trail of rejected generation attempts.
#[async_trait]
pub trait DuplicateLogStore: Send + Sync {
    async fn record(&self, entry: NewDuplicateLog) -> Result<DuplicateLog>;
    async fn recent(&self, limit: i64) -> Result<Vec<DuplicateLog>>;
}

#[derive(Clone)]
pub struct PgDuplicateLogStore {
    pool: PgPool,
}

impl PgDuplicateLogStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DuplicateLogStore for PgDuplicateLogStore {
    async fn record(&self, entry: NewDuplicateLog) -> Result<DuplicateLog> {
        let row = sqlx::query_as::<_, DuplicateLog>(
            r#"
            INSERT INTO duplicate_logs (question_hash, question_text, method, similarity, matched_question_id, topic)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, question_hash, question_text, method, similarity, matched_question_id, topic, created_at
            "#,
        )
        .bind(entry.question_hash)
        .bind(entry.question_text)
        .bind(entry.method.as_str())
        .bind(entry.similarity)
        .bind(entry.matched_question_id)
        .bind(entry.topic)
        .fetch_one(&self.pool)
        .await?;
        Ok(row)
    }

    async fn recent(&self, limit: i64) -> Result<Vec<DuplicateLog>> {
        let rows = sqlx::query_as::<_, DuplicateLog>(
            r#"
            SELECT id, question_hash, question_text, method, similarity, matched_question_id, topic, created_at
            FROM duplicate_logs
            ORDER BY created_at DESC
            LIMIT $1
            "#,
        )
        .bind(limit.clamp(1, 500))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
