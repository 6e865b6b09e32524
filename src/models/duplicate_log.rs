use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMethod {
    Hash,
    Embedding,
}

impl DetectionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectionMethod::Hash => "hash",
            DetectionMethod::Embedding => "embedding",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DuplicateLog {
    pub id: Uuid,
    pub question_hash: String,
    pub question_text: String,
    pub method: String,
    pub similarity: Option<f64>,
    pub matched_question_id: Option<Uuid>,
    pub topic: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewDuplicateLog {
    pub question_hash: String,
    pub question_text: String,
    pub method: DetectionMethod,
    pub similarity: Option<f64>,
    pub matched_question_id: Option<Uuid>,
    pub topic: String,
}
