use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{postgres::PgRow, FromRow, Row};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::models::slot::GenerationSlot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionStatus {
    ToReview,
    Accepted,
    Rejected,
}

impl QuestionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestionStatus::ToReview => "to_review",
            QuestionStatus::Accepted => "accepted",
            QuestionStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for QuestionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QuestionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "to_review" => Ok(QuestionStatus::ToReview),
            "accepted" => Ok(QuestionStatus::Accepted),
            "rejected" => Ok(QuestionStatus::Rejected),
            other => Err(format!("unknown question status '{}'", other)),
        }
    }
}

/// Slot dimensions a question was generated under, when structured sampling was used.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationMetadata {
    pub domain: String,
    pub skill_type: String,
    pub difficulty: String,
    pub granularity: String,
}

impl From<&GenerationSlot> for GenerationMetadata {
    fn from(slot: &GenerationSlot) -> Self {
        Self {
            domain: slot.domain.clone(),
            skill_type: slot.skill_type.clone(),
            difficulty: slot.difficulty.clone(),
            granularity: slot.granularity.clone(),
        }
    }
}

/// Advisory near-duplicate surfaced to reviewers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarQuestion {
    pub id: Uuid,
    pub similarity: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub id: Uuid,
    pub question_text: String,
    pub question_hash: String,
    pub options: Vec<String>,
    pub correct_answer: String,
    pub explanation: String,
    pub difficulty: f64,
    pub category: String,
    pub tags: Vec<String>,
    pub status: QuestionStatus,
    pub is_rejected: bool,
    pub is_deleted: bool,
    pub generation: Option<GenerationMetadata>,
    pub potential_duplicates: Vec<SimilarQuestion>,
    pub source_context_ids: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Everything needed to insert a question row; id and timestamps come from the store.
#[derive(Debug, Clone)]
pub struct NewQuestion {
    pub question_text: String,
    pub question_hash: String,
    pub options: Vec<String>,
    pub correct_answer: String,
    pub explanation: String,
    pub difficulty: f64,
    pub category: String,
    pub tags: Vec<String>,
    pub status: QuestionStatus,
    pub generation: Option<GenerationMetadata>,
    pub potential_duplicates: Vec<SimilarQuestion>,
    pub source_context_ids: Vec<Uuid>,
}

impl NewQuestion {
    pub fn into_question(self, id: Uuid, now: DateTime<Utc>) -> Question {
        Question {
            id,
            is_rejected: self.status == QuestionStatus::Rejected,
            question_text: self.question_text,
            question_hash: self.question_hash,
            options: self.options,
            correct_answer: self.correct_answer,
            explanation: self.explanation,
            difficulty: self.difficulty,
            category: self.category,
            tags: self.tags,
            status: self.status,
            is_deleted: false,
            generation: self.generation,
            potential_duplicates: self.potential_duplicates,
            source_context_ids: self.source_context_ids,
            created_at: now,
            updated_at: now,
        }
    }
}

impl<'r> FromRow<'r, PgRow> for Question {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        let status_raw: String = row.try_get("status")?;
        let status = status_raw.parse::<QuestionStatus>().map_err(|e| {
            sqlx::Error::ColumnDecode {
                index: "status".to_string(),
                source: e.into(),
            }
        })?;

        let generation = match (
            row.try_get::<Option<String>, _>("generation_domain")?,
            row.try_get::<Option<String>, _>("generation_skill_type")?,
            row.try_get::<Option<String>, _>("generation_difficulty")?,
            row.try_get::<Option<String>, _>("generation_granularity")?,
        ) {
            (Some(domain), Some(skill_type), Some(difficulty), Some(granularity)) => {
                Some(GenerationMetadata {
                    domain,
                    skill_type,
                    difficulty,
                    granularity,
                })
            }
            _ => None,
        };

        let potential_duplicates = row
            .try_get::<Option<sqlx::types::Json<Vec<SimilarQuestion>>>, _>("potential_duplicates")?
            .map(|json| json.0)
            .unwrap_or_default();

        Ok(Self {
            id: row.try_get("id")?,
            question_text: row.try_get("question_text")?,
            question_hash: row.try_get("question_hash")?,
            options: row.try_get("options")?,
            correct_answer: row.try_get("correct_answer")?,
            explanation: row.try_get("explanation")?,
            difficulty: row.try_get("difficulty")?,
            category: row.try_get("category")?,
            tags: row.try_get("tags")?,
            status,
            is_rejected: row.try_get("is_rejected")?,
            is_deleted: row.try_get("is_deleted")?,
            generation,
            potential_duplicates,
            source_context_ids: row.try_get("source_context_ids")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}
