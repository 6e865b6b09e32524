use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// An article pulled in by the feed fetcher, used to ground a generation prompt.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ContextItem {
    pub id: Uuid,
    pub title: String,
    pub summary: String,
    pub link: Option<String>,
    pub tags: Vec<String>,
    pub used_at: Option<DateTime<Utc>>,
    pub published_at: Option<DateTime<Utc>>,
}
