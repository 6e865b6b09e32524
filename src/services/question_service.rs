use async_trait::async_trait;
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::question::{NewQuestion, Question, QuestionStatus};

const QUESTION_COLUMNS: &str = r#"
    id, question_text, question_hash, options, correct_answer, explanation, difficulty,
    category, tags, status, is_rejected, is_deleted,
    generation_domain, generation_skill_type, generation_difficulty, generation_granularity,
    potential_duplicates, source_context_ids, created_at, updated_at
"#;

#[derive(Debug, Clone, Default)]
pub struct QuestionFilter {
    pub status: Option<QuestionStatus>,
    pub page: i64,
    pub per_page: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct QuestionList {
    pub items: Vec<Question>,
    pub total: i64,
    pub page: i64,
    pub per_page: i64,
    pub total_pages: i64,
}

/// Relational persistence for questions.
#[async_trait]
pub trait QuestionStore: Send + Sync {
    /// Non-deleted question with this normalized-text hash, if any.
    async fn find_by_hash(&self, hash: &str) -> Result<Option<Question>>;
    /// Live count of non-deleted questions in `status`.
    async fn count_by_status(&self, status: QuestionStatus) -> Result<i64>;
    async fn insert(&self, question: NewQuestion) -> Result<Question>;
    async fn get(&self, id: Uuid) -> Result<Question>;
    async fn list(&self, filter: QuestionFilter) -> Result<QuestionList>;
    /// Keeps `is_rejected` in step with the new status.
    async fn set_status(&self, id: Uuid, status: QuestionStatus) -> Result<Question>;
    async fn soft_delete(&self, id: Uuid) -> Result<()>;
}

#[derive(Clone)]
pub struct PgQuestionStore {
    pool: PgPool,
}

impl PgQuestionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl QuestionStore for PgQuestionStore {
    async fn find_by_hash(&self, hash: &str) -> Result<Option<Question>> {
        let sql = format!(
            "SELECT {} FROM questions WHERE question_hash = $1 AND is_deleted = FALSE ORDER BY created_at ASC LIMIT 1",
            QUESTION_COLUMNS
        );
        let row = sqlx::query_as::<_, Question>(&sql)
            .bind(hash)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    async fn count_by_status(&self, status: QuestionStatus) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM questions WHERE status = $1 AND is_deleted = FALSE",
        )
        .bind(status.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(count)
    }

    async fn insert(&self, question: NewQuestion) -> Result<Question> {
        if !question.options.contains(&question.correct_answer) {
            return Err(Error::BadRequest(
                "correct answer must be one of the options".to_string(),
            ));
        }

        let generation = question.generation.as_ref();
        let sql = format!(
            r#"
            INSERT INTO questions (
                question_text, question_hash, options, correct_answer, explanation, difficulty,
                category, tags, status, is_rejected,
                generation_domain, generation_skill_type, generation_difficulty, generation_granularity,
                potential_duplicates, source_context_ids
            ) VALUES (
                $1, $2, $3, $4, $5, $6,
                $7, $8, $9, $10,
                $11, $12, $13, $14,
                $15, $16
            )
            RETURNING {}
            "#,
            QUESTION_COLUMNS
        );
        let row = sqlx::query_as::<_, Question>(&sql)
            .bind(&question.question_text)
            .bind(&question.question_hash)
            .bind(&question.options)
            .bind(&question.correct_answer)
            .bind(&question.explanation)
            .bind(question.difficulty.clamp(0.0, 1.0))
            .bind(&question.category)
            .bind(&question.tags)
            .bind(question.status.as_str())
            .bind(question.status == QuestionStatus::Rejected)
            .bind(generation.map(|g| g.domain.clone()))
            .bind(generation.map(|g| g.skill_type.clone()))
            .bind(generation.map(|g| g.difficulty.clone()))
            .bind(generation.map(|g| g.granularity.clone()))
            .bind(if question.potential_duplicates.is_empty() {
                None
            } else {
                Some(sqlx::types::Json(&question.potential_duplicates))
            })
            .bind(&question.source_context_ids)
            .fetch_one(&self.pool)
            .await?;
        Ok(row)
    }

    async fn get(&self, id: Uuid) -> Result<Question> {
        let sql = format!("SELECT {} FROM questions WHERE id = $1", QUESTION_COLUMNS);
        let row = sqlx::query_as::<_, Question>(&sql)
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(row)
    }

    async fn list(&self, filter: QuestionFilter) -> Result<QuestionList> {
        let page = filter.page.max(1);
        let per_page = filter.per_page.clamp(1, 100);
        let offset = (page - 1) * per_page;
        let status = filter.status.map(|s| s.as_str());

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM questions WHERE is_deleted = FALSE AND ($1::TEXT IS NULL OR status = $1)",
        )
        .bind(status)
        .fetch_one(&self.pool)
        .await?;

        let sql = format!(
            r#"
            SELECT {} FROM questions
            WHERE is_deleted = FALSE AND ($1::TEXT IS NULL OR status = $1)
            ORDER BY created_at DESC
            LIMIT $2 OFFSET $3
            "#,
            QUESTION_COLUMNS
        );
        let items = sqlx::query_as::<_, Question>(&sql)
            .bind(status)
            .bind(per_page)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        let total_pages = if total == 0 { 0 } else { (total + per_page - 1) / per_page };
        Ok(QuestionList {
            items,
            total,
            page,
            per_page,
            total_pages,
        })
    }

    async fn set_status(&self, id: Uuid, status: QuestionStatus) -> Result<Question> {
        let sql = format!(
            r#"
            UPDATE questions
            SET status = $2, is_rejected = $3, updated_at = NOW()
            WHERE id = $1 AND is_deleted = FALSE
            RETURNING {}
            "#,
            QUESTION_COLUMNS
        );
        let row = sqlx::query_as::<_, Question>(&sql)
            .bind(id)
            .bind(status.as_str())
            .bind(status == QuestionStatus::Rejected)
            .fetch_one(&self.pool)
            .await?;
        Ok(row)
    }

    async fn soft_delete(&self, id: Uuid) -> Result<()> {
        let result = sqlx::query(
            "UPDATE questions SET is_deleted = TRUE, updated_at = NOW() WHERE id = $1 AND is_deleted = FALSE",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("Question {} not found", id)));
        }
        Ok(())
    }
}
