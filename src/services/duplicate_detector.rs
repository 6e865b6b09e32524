use std::sync::Arc;

use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::duplicate_log::{DetectionMethod, NewDuplicateLog};
use crate::models::question::SimilarQuestion;
use crate::services::duplicate_log_service::DuplicateLogStore;
use crate::services::question_service::QuestionStore;
use crate::services::vector_index::VectorIndex;
use crate::utils::crypto::question_hash;

/// Upper bound on advisory neighbours attached to a question.
pub const MAX_SIMILAR: usize = 10;
/// Neighbours inspected for a strict match, so stale index points can be skipped.
const STRICT_CANDIDATES: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DuplicateThresholds {
    /// Similarity above which a candidate is rejected outright.
    pub strict: f64,
    /// Lower edge of the advisory band shown to reviewers.
    pub display: f64,
}

impl Default for DuplicateThresholds {
    fn default() -> Self {
        Self {
            strict: 0.97,
            display: 0.75,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DuplicateVerdict {
    Unique,
    Duplicate {
        method: DetectionMethod,
        matched_question_id: Option<Uuid>,
        similarity: Option<f64>,
    },
}

impl DuplicateVerdict {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, DuplicateVerdict::Duplicate { .. })
    }
}

#[derive(Clone)]
pub struct DuplicateDetector {
    questions: Arc<dyn QuestionStore>,
    index: Arc<dyn VectorIndex>,
    logs: Arc<dyn DuplicateLogStore>,
    thresholds: DuplicateThresholds,
}

impl DuplicateDetector {
    pub fn new(
        questions: Arc<dyn QuestionStore>,
        index: Arc<dyn VectorIndex>,
        logs: Arc<dyn DuplicateLogStore>,
        thresholds: DuplicateThresholds,
    ) -> Self {
        Self {
            questions,
            index,
            logs,
            thresholds,
        }
    }

    /// Exact hash first, nearest-neighbour similarity second. Duplicates are logged.
    pub async fn check(&self, text: &str, embedding: &[f32], topic: &str) -> Result<DuplicateVerdict> {
        let hash = question_hash(text);

        if let Some(existing) = self.questions.find_by_hash(&hash).await? {
            let verdict = DuplicateVerdict::Duplicate {
                method: DetectionMethod::Hash,
                matched_question_id: Some(existing.id),
                similarity: Some(1.0),
            };
            self.log(&hash, text, topic, &verdict).await;
            return Ok(verdict);
        }

        let nearest = self.index.search(embedding, STRICT_CANDIDATES).await?;
        for hit in nearest.iter().take_while(|h| h.score > self.thresholds.strict) {
            if !self.is_live(hit.id).await? {
                tracing::debug!(point_id = %hit.id, "Skipping index point without a live question");
                continue;
            }
            let verdict = DuplicateVerdict::Duplicate {
                method: DetectionMethod::Embedding,
                matched_question_id: Some(hit.id),
                similarity: Some(hit.score),
            };
            self.log(&hash, text, topic, &verdict).await;
            return Ok(verdict);
        }

        Ok(DuplicateVerdict::Unique)
    }

    /// Index points can outlive their rows (soft delete, database reset).
    async fn is_live(&self, id: Uuid) -> Result<bool> {
        match self.questions.get(id).await {
            Ok(question) => Ok(!question.is_deleted),
            Err(Error::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub async fn is_duplicate(&self, text: &str, embedding: &[f32], topic: &str) -> Result<bool> {
        Ok(self.check(text, embedding, topic).await?.is_duplicate())
    }

    /// Neighbours similar enough to flag for review but below the rejection threshold.
    pub async fn find_similar(&self, embedding: &[f32]) -> Result<Vec<SimilarQuestion>> {
        let hits = self.index.search(embedding, MAX_SIMILAR).await?;
        let mut similar: Vec<SimilarQuestion> = hits
            .into_iter()
            .filter(|h| h.score > self.thresholds.display && h.score < self.thresholds.strict)
            .map(|h| SimilarQuestion {
                id: h.id,
                similarity: h.score,
            })
            .collect();
        similar.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        similar.truncate(MAX_SIMILAR);
        Ok(similar)
    }

    async fn log(&self, hash: &str, text: &str, topic: &str, verdict: &DuplicateVerdict) {
        let DuplicateVerdict::Duplicate {
            method,
            matched_question_id,
            similarity,
        } = verdict
        else {
            return;
        };

        tracing::info!(
            method = method.as_str(),
            matched = ?matched_question_id,
            similarity = ?similarity,
            topic,
            "Duplicate candidate rejected"
        );

        let entry = NewDuplicateLog {
            question_hash: hash.to_string(),
            question_text: text.to_string(),
            method: *method,
            similarity: *similarity,
            matched_question_id: *matched_question_id,
            topic: topic.to_string(),
        };
        if let Err(e) = self.logs.record(entry).await {
            tracing::warn!(error = %e, "Failed to write duplicate log entry");
        }
    }
}
