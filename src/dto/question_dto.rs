use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::error::{Error, Result};
use crate::models::duplicate_log::DuplicateLog;
use crate::models::question::{
    GenerationMetadata, NewQuestion, Question, QuestionStatus, SimilarQuestion,
};
use crate::services::question_service::{QuestionFilter, QuestionList};
use crate::utils::crypto::question_hash;

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct QuestionListQuery {
    pub status: Option<String>,
    #[validate(range(min = 1))]
    pub page: Option<i64>,
    #[validate(range(min = 1, max = 100))]
    pub per_page: Option<i64>,
}

impl QuestionListQuery {
    pub fn into_filter(self) -> Result<QuestionFilter> {
        let status = self
            .status
            .as_deref()
            .map(str::parse::<QuestionStatus>)
            .transpose()
            .map_err(Error::BadRequest)?;
        Ok(QuestionFilter {
            status,
            page: self.page.unwrap_or(1),
            per_page: self.per_page.unwrap_or(20),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateQuestionPayload {
    #[validate(length(min = 5, max = 500))]
    pub question_text: String,
    #[validate(length(equal = 2))]
    pub options: Vec<String>,
    #[validate(length(min = 1))]
    pub correct_answer: String,
    #[serde(default)]
    pub explanation: String,
    #[validate(range(min = 0.0, max = 1.0))]
    pub difficulty: Option<f64>,
    pub category: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl CreateQuestionPayload {
    /// Manually entered questions skip review.
    pub fn into_new_question(self) -> Result<NewQuestion> {
        let options: Vec<String> = self.options.iter().map(|o| o.trim().to_string()).collect();
        if options.len() != 2
            || options.iter().any(String::is_empty)
            || options[0].eq_ignore_ascii_case(&options[1])
        {
            return Err(Error::BadRequest("options must be two distinct non-empty answers".into()));
        }
        let correct_answer = self.correct_answer.trim().to_string();
        if !options.contains(&correct_answer) {
            return Err(Error::BadRequest("correct_answer must match one of the options".into()));
        }

        let question_text = self.question_text.trim().to_string();
        Ok(NewQuestion {
            question_hash: question_hash(&question_text),
            question_text,
            options,
            correct_answer,
            explanation: self.explanation.trim().to_string(),
            difficulty: self.difficulty.unwrap_or(0.5),
            category: self
                .category
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty())
                .unwrap_or_else(|| "General".to_string()),
            tags: self.tags.into_iter().map(|t| t.trim().to_lowercase()).filter(|t| !t.is_empty()).collect(),
            status: QuestionStatus::Accepted,
            generation: None,
            potential_duplicates: vec![],
            source_context_ids: vec![],
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ReviewPayload {
    #[validate(length(min = 1))]
    pub status: String,
}

impl ReviewPayload {
    /// Reviews move a question to `accepted` or `rejected`, never back to `to_review`.
    pub fn decision(&self) -> Result<QuestionStatus> {
        match self.status.parse::<QuestionStatus>().map_err(Error::BadRequest)? {
            QuestionStatus::ToReview => Err(Error::BadRequest(
                "review status must be 'accepted' or 'rejected'".into(),
            )),
            status => Ok(status),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionResponse {
    pub id: Uuid,
    pub question_text: String,
    pub options: Vec<String>,
    pub correct_answer: String,
    pub explanation: String,
    pub difficulty: f64,
    pub category: String,
    pub tags: Vec<String>,
    pub status: QuestionStatus,
    pub is_rejected: bool,
    pub generation: Option<GenerationMetadata>,
    pub potential_duplicates: Vec<SimilarQuestion>,
    pub source_context_ids: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Question> for QuestionResponse {
    fn from(q: Question) -> Self {
        Self {
            id: q.id,
            question_text: q.question_text,
            options: q.options,
            correct_answer: q.correct_answer,
            explanation: q.explanation,
            difficulty: q.difficulty,
            category: q.category,
            tags: q.tags,
            status: q.status,
            is_rejected: q.is_rejected,
            generation: q.generation,
            potential_duplicates: q.potential_duplicates,
            source_context_ids: q.source_context_ids,
            created_at: q.created_at,
            updated_at: q.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionListResponse {
    pub items: Vec<QuestionResponse>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
    pub total_pages: i64,
}

impl From<QuestionList> for QuestionListResponse {
    fn from(list: QuestionList) -> Self {
        Self {
            items: list.items.into_iter().map(QuestionResponse::from).collect(),
            total: list.total,
            page: list.page,
            per_page: list.per_page,
            total_pages: list.total_pages,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct DuplicateListQuery {
    #[validate(range(min = 1, max = 200))]
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuplicateListResponse {
    pub items: Vec<DuplicateLog>,
}
