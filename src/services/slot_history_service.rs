use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::Result;
use crate::models::slot::{GenerationSlot, SlotHistoryEntry};

/// Timestamped record of sampled slots, used to steer sampling away from recent repeats.
#[async_trait]
pub trait SlotHistoryStore: Send + Sync {
    /// Appends an entry with no question attached yet.
    async fn record(&self, slot: &GenerationSlot) -> Result<i64>;
    /// Slots recorded at or after `since`, newest first, at most `limit`.
    async fn recent_slots(&self, since: DateTime<Utc>, limit: i64) -> Result<Vec<GenerationSlot>>;
    /// Attaches `question_id` to the newest unlinked entry for `slot`.
    async fn link_question(&self, slot: &GenerationSlot, question_id: Uuid) -> Result<bool>;
    async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64>;
}

#[derive(Clone)]
pub struct PgSlotHistoryStore {
    pool: PgPool,
}

impl PgSlotHistoryStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SlotHistoryStore for PgSlotHistoryStore {
    async fn record(&self, slot: &GenerationSlot) -> Result<i64> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO slot_history (domain, skill_type, difficulty, granularity)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(&slot.domain)
        .bind(&slot.skill_type)
        .bind(&slot.difficulty)
        .bind(&slot.granularity)
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    async fn recent_slots(&self, since: DateTime<Utc>, limit: i64) -> Result<Vec<GenerationSlot>> {
        let rows = sqlx::query_as::<_, SlotHistoryEntry>(
            r#"
            SELECT id, domain, skill_type, difficulty, granularity, question_id, created_at
            FROM slot_history
            WHERE created_at >= $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2
            "#,
        )
        .bind(since)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(SlotHistoryEntry::slot).collect())
    }

    async fn link_question(&self, slot: &GenerationSlot, question_id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE slot_history SET question_id = $5
            WHERE id = (
                SELECT id FROM slot_history
                WHERE domain = $1 AND skill_type = $2 AND difficulty = $3 AND granularity = $4
                  AND question_id IS NULL
                ORDER BY created_at DESC, id DESC
                LIMIT 1
            )
            "#,
        )
        .bind(&slot.domain)
        .bind(&slot.skill_type)
        .bind(&slot.difficulty)
        .bind(&slot.granularity)
        .bind(question_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM slot_history WHERE created_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
