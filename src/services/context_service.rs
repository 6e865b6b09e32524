use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::Result;
use crate::models::context_item::ContextItem;

/// Read side of the feed-article table; fetching feeds happens elsewhere.
#[async_trait]
pub trait ContextSource: Send + Sync {
    async fn recent_unused(&self, limit: i64) -> Result<Vec<ContextItem>>;
    async fn mark_used(&self, ids: &[Uuid]) -> Result<()>;
}

#[derive(Clone)]
pub struct PgContextSource {
    pool: PgPool,
}

impl PgContextSource {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ContextSource for PgContextSource {
    async fn recent_unused(&self, limit: i64) -> Result<Vec<ContextItem>> {
        let rows = sqlx::query_as::<_, ContextItem>(
            r#"
            SELECT id, title, summary, link, tags, used_at, published_at
            FROM feed_articles
            WHERE used_at IS NULL
            ORDER BY published_at DESC NULLS LAST
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn mark_used(&self, ids: &[Uuid]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        sqlx::query("UPDATE feed_articles SET used_at = NOW() WHERE id = ANY($1)")
            .bind(ids)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
