use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::GenerationError;
use crate::models::question::{GenerationMetadata, NewQuestion, Question, QuestionStatus};
use crate::services::ai_service::{CandidateQuestion, ContentGenerator, GenerationPrompt};
use crate::services::buffer_service::QuestionProducer;
use crate::services::context_service::ContextSource;
use crate::services::duplicate_detector::{DuplicateDetector, DuplicateVerdict};
use crate::services::question_service::QuestionStore;
use crate::services::slot_history_service::SlotHistoryStore;
use crate::services::slot_sampler::{SelectedSlot, SlotSampler};
use crate::services::vector_index::{VectorIndex, VectorPayload, VectorPoint};
use crate::utils::crypto::question_hash;

/// Attempts per `generate_one` call, shared by duplicates and transient failures.
pub const MAX_RETRIES: u32 = 3;
/// Context items offered to the generator per prompt.
pub const CONTEXT_ITEMS_PER_PROMPT: i64 = 3;
/// Longest pause between transient retries.
const MAX_BACKOFF: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy)]
pub struct WorkerOptions {
    /// Upper bound for a single generate or embed call.
    pub call_timeout: Duration,
    /// Base delay before retrying a transient failure, doubled per attempt.
    pub retry_backoff: Duration,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(90),
            retry_backoff: Duration::from_millis(500),
        }
    }
}

/// Why a single attempt did not produce a question.
#[derive(Debug)]
enum AttemptError {
    Duplicate { similarity: Option<f64> },
    Transient(GenerationError),
    Fatal(GenerationError),
}

impl From<GenerationError> for AttemptError {
    fn from(err: GenerationError) -> Self {
        if err.is_transient() {
            AttemptError::Transient(err)
        } else {
            AttemptError::Fatal(err)
        }
    }
}

/// Produces one reviewed-ready question end to end: sample, prompt, generate,
/// dedupe, persist, index.
#[derive(Clone)]
pub struct GenerationWorker {
    sampler: SlotSampler,
    generator: Arc<dyn ContentGenerator>,
    detector: DuplicateDetector,
    questions: Arc<dyn QuestionStore>,
    index: Arc<dyn VectorIndex>,
    history: Arc<dyn SlotHistoryStore>,
    context: Arc<dyn ContextSource>,
    options: WorkerOptions,
}

impl GenerationWorker {
    pub fn new(
        sampler: SlotSampler,
        generator: Arc<dyn ContentGenerator>,
        detector: DuplicateDetector,
        questions: Arc<dyn QuestionStore>,
        index: Arc<dyn VectorIndex>,
        history: Arc<dyn SlotHistoryStore>,
        context: Arc<dyn ContextSource>,
    ) -> Self {
        Self {
            sampler,
            generator,
            detector,
            questions,
            index,
            history,
            context,
            options: WorkerOptions::default(),
        }
    }

    pub fn with_options(mut self, options: WorkerOptions) -> Self {
        self.options = options;
        self
    }

    pub async fn generate_one(&self) -> Result<Question, GenerationError> {
        let mut last_failure = None;

        for attempt in 0..MAX_RETRIES {
            match self.attempt(attempt).await {
                Ok(question) => return Ok(question),
                Err(AttemptError::Fatal(err)) => {
                    tracing::error!(attempt, error = %err, "Question generation aborted");
                    return Err(err);
                }
                Err(AttemptError::Duplicate { similarity }) => {
                    tracing::info!(attempt, similarity = ?similarity, "Generated duplicate, retrying with a new slot");
                    last_failure = Some(AttemptError::Duplicate { similarity });
                }
                Err(AttemptError::Transient(err)) => {
                    tracing::warn!(attempt, error = %err, "Transient generation failure");
                    last_failure = Some(AttemptError::Transient(err));
                    if attempt + 1 < MAX_RETRIES {
                        let delay = backoff_delay(self.options.retry_backoff, attempt);
                        if !delay.is_zero() {
                            tokio::time::sleep(delay).await;
                        }
                    }
                }
            }
        }

        Err(match last_failure {
            Some(AttemptError::Duplicate { similarity }) => GenerationError::DuplicateExhausted {
                attempts: MAX_RETRIES,
                last_similarity: similarity,
            },
            Some(AttemptError::Transient(err)) | Some(AttemptError::Fatal(err)) => err,
            None => GenerationError::Transient("no generation attempts were made".to_string()),
        })
    }

    async fn attempt(&self, attempt: u32) -> Result<Question, AttemptError> {
        let selected = self.sampler.select_slot().await?;
        let context = self.load_context().await;

        let prompt = GenerationPrompt {
            slot: selected.slot.clone(),
            structured: selected.structured,
            context,
            attempt,
        };

        let candidate = self.bounded("generate", self.generator.generate(&prompt)).await?;
        let embedding = self
            .bounded("embed", self.generator.embed(&candidate.question_text))
            .await?;

        let verdict = self
            .detector
            .check(&candidate.question_text, &embedding, &selected.slot.domain)
            .await
            .map_err(|e| AttemptError::Transient(GenerationError::Transient(e.to_string())))?;
        if let DuplicateVerdict::Duplicate { similarity, .. } = verdict {
            return Err(AttemptError::Duplicate { similarity });
        }

        let similar = match self.detector.find_similar(&embedding).await {
            Ok(similar) => similar,
            Err(e) => {
                tracing::warn!(error = %e, "Similar-question lookup failed; storing without advisory list");
                Vec::new()
            }
        };

        let new_question = build_question(candidate, &selected, &prompt, similar);
        let question = self
            .questions
            .insert(new_question)
            .await
            .map_err(|e| AttemptError::Fatal(GenerationError::Persistence(e.to_string())))?;

        let point = VectorPoint {
            id: question.id,
            vector: embedding,
            payload: VectorPayload::from(&question),
        };
        if let Err(e) = self.index.upsert(point).await {
            tracing::warn!(question_id = %question.id, error = %e, "Vector upsert failed; question stored without embedding");
        }

        if selected.structured {
            match self.history.link_question(&selected.slot, question.id).await {
                Ok(true) => {}
                Ok(false) => tracing::debug!(slot = %selected.slot, "No unlinked history entry for slot"),
                Err(e) => tracing::warn!(error = %e, "Failed to link slot history"),
            }
        }

        if !question.source_context_ids.is_empty() {
            if let Err(e) = self.context.mark_used(&question.source_context_ids).await {
                tracing::warn!(error = %e, "Failed to mark context items as used");
            }
        }

        tracing::info!(
            question_id = %question.id,
            slot = %selected.slot,
            advisory = question.potential_duplicates.len(),
            "Generated question"
        );
        Ok(question)
    }

    async fn load_context(&self) -> Vec<crate::models::context_item::ContextItem> {
        match self.context.recent_unused(CONTEXT_ITEMS_PER_PROMPT).await {
            Ok(items) => items,
            Err(e) => {
                tracing::warn!(error = %e, "Context lookup failed; generating without context");
                Vec::new()
            }
        }
    }

    async fn bounded<T, F>(&self, what: &str, call: F) -> Result<T, AttemptError>
    where
        F: Future<Output = Result<T, GenerationError>>,
    {
        match tokio::time::timeout(self.options.call_timeout, call).await {
            Ok(result) => result.map_err(AttemptError::from),
            Err(_) => Err(AttemptError::Transient(GenerationError::Transient(format!(
                "{} call timed out after {:?}",
                what, self.options.call_timeout
            )))),
        }
    }
}

/// `base * 2^attempt`, capped so an oversized base cannot overflow.
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.checked_mul(2u32.saturating_pow(attempt))
        .unwrap_or(MAX_BACKOFF)
        .min(MAX_BACKOFF)
}

fn build_question(
    candidate: CandidateQuestion,
    selected: &SelectedSlot,
    prompt: &GenerationPrompt,
    similar: Vec<crate::models::question::SimilarQuestion>,
) -> NewQuestion {
    let mut tags = candidate.tags;
    for tag in prompt.context.iter().flat_map(|c| c.tags.iter()) {
        let tag = tag.trim().to_lowercase();
        if !tag.is_empty() && !tags.contains(&tag) {
            tags.push(tag);
        }
    }

    let category = candidate
        .category
        .unwrap_or_else(|| selected.slot.domain.clone());
    let difficulty = candidate
        .difficulty
        .unwrap_or_else(|| selected.slot.numeric_difficulty());

    NewQuestion {
        question_hash: question_hash(&candidate.question_text),
        question_text: candidate.question_text,
        options: candidate.options,
        correct_answer: candidate.correct_answer,
        explanation: candidate.explanation,
        difficulty,
        category,
        tags,
        status: QuestionStatus::ToReview,
        generation: selected
            .structured
            .then(|| GenerationMetadata::from(&selected.slot)),
        potential_duplicates: similar,
        source_context_ids: prompt.context.iter().map(|c| c.id).collect(),
    }
}

#[async_trait]
impl QuestionProducer for GenerationWorker {
    async fn produce(&self) -> Result<Question, GenerationError> {
        self.generate_one().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    use uuid::Uuid;

    use crate::models::context_item::ContextItem;
    use crate::models::settings::GenerationSettings;
    use crate::services::ai_service::MockContentGenerator;
    use crate::services::duplicate_detector::DuplicateThresholds;
    use crate::services::testing::{
        new_question, MemoryContext, MemoryDuplicateLogs, MemoryQuestionStore, MemorySettings,
        MemorySlotHistory,
    };
    use crate::services::vector_index::{MemoryVectorIndex, MockVectorIndex, ScoredPoint};

    struct Harness {
        questions: Arc<MemoryQuestionStore>,
        history: Arc<MemorySlotHistory>,
        logs: Arc<MemoryDuplicateLogs>,
        context: Arc<MemoryContext>,
    }

    impl Harness {
        fn new(settings: GenerationSettings) -> (Self, Arc<MemorySettings>) {
            let harness = Self {
                questions: Arc::new(MemoryQuestionStore::default()),
                history: Arc::new(MemorySlotHistory::default()),
                logs: Arc::new(MemoryDuplicateLogs::default()),
                context: Arc::new(MemoryContext::default()),
            };
            (harness, Arc::new(MemorySettings::new(settings)))
        }

        fn worker(
            &self,
            settings: Arc<MemorySettings>,
            generator: impl ContentGenerator + 'static,
            index: Arc<dyn VectorIndex>,
        ) -> GenerationWorker {
            let sampler = SlotSampler::new(settings, self.history.clone(), chrono::Duration::hours(24));
            let detector = DuplicateDetector::new(
                self.questions.clone(),
                index.clone(),
                self.logs.clone(),
                DuplicateThresholds::default(),
            );
            GenerationWorker::new(
                sampler,
                Arc::new(generator),
                detector,
                self.questions.clone(),
                index,
                self.history.clone(),
                self.context.clone(),
            )
            .with_options(WorkerOptions {
                call_timeout: Duration::from_secs(5),
                retry_backoff: Duration::ZERO,
            })
        }
    }

    fn candidate(text: &str) -> CandidateQuestion {
        CandidateQuestion {
            question_text: text.to_string(),
            options: vec!["Enable MFA".into(), "Reuse passwords".into()],
            correct_answer: "Enable MFA".into(),
            explanation: "MFA blocks credential stuffing.".into(),
            difficulty: Some(0.4),
            category: None,
            tags: vec!["mfa".into()],
        }
    }

    #[tokio::test]
    async fn duplicate_text_exhausts_the_retry_budget() {
        let (h, settings) = Harness::new(GenerationSettings::with_defaults(5));
        h.questions
            .push(new_question("Which control stops credential stuffing?", QuestionStatus::Accepted));

        let mut generator = MockContentGenerator::new();
        generator
            .expect_generate()
            .times(MAX_RETRIES as usize)
            .returning(|_| Ok(candidate("which control STOPS credential stuffing")));
        generator
            .expect_embed()
            .times(MAX_RETRIES as usize)
            .returning(|_| Ok(vec![1.0, 0.0]));

        let worker = h.worker(settings, generator, Arc::new(MemoryVectorIndex::new()));
        let err = worker.generate_one().await.unwrap_err();

        assert_eq!(
            err,
            GenerationError::DuplicateExhausted {
                attempts: MAX_RETRIES,
                last_similarity: Some(1.0),
            }
        );
        assert_eq!(h.logs.entries().len(), MAX_RETRIES as usize);
        assert_eq!(h.questions.all().len(), 1);
        // Every attempt sampled its own slot, none of them linked.
        let history = h.history.entries();
        assert_eq!(history.len(), MAX_RETRIES as usize);
        assert!(history.iter().all(|e| e.question_id.is_none()));
    }

    #[tokio::test]
    async fn advisory_neighbour_is_attached_and_question_persisted() {
        let (mut h, settings) = Harness::new(GenerationSettings::with_defaults(5));
        let article = ContextItem {
            id: Uuid::new_v4(),
            title: "Credential stuffing wave".into(),
            summary: "Attackers replayed leaked passwords.".into(),
            link: None,
            tags: vec!["Breach".into(), "mfa".into()],
            used_at: None,
            published_at: None,
        };
        h.context = Arc::new(MemoryContext::with_items(vec![article.clone()]));

        let neighbour = Uuid::new_v4();
        let mut index = MockVectorIndex::new();
        index
            .expect_search()
            .times(2)
            .returning(move |_, _| Ok(vec![ScoredPoint { id: neighbour, score: 0.80 }]));
        index.expect_upsert().times(1).returning(|_| Ok(()));

        let mut generator = MockContentGenerator::new();
        generator
            .expect_generate()
            .withf(|p| p.structured && p.attempt == 0 && p.context.len() == 1)
            .times(1)
            .returning(|_| Ok(candidate("Which control stops credential stuffing?")));
        generator.expect_embed().times(1).returning(|_| Ok(vec![0.3, 0.7]));

        let worker = h.worker(settings, generator, Arc::new(index));
        let q = worker.generate_one().await.unwrap();

        assert_eq!(q.status, QuestionStatus::ToReview);
        assert_eq!(q.potential_duplicates.len(), 1);
        assert_eq!(q.potential_duplicates[0].id, neighbour);
        assert!((q.potential_duplicates[0].similarity - 0.80).abs() < f64::EPSILON);
        assert_eq!(q.tags, vec!["mfa".to_string(), "breach".to_string()]);
        assert_eq!(q.source_context_ids, vec![article.id]);
        assert!(q.generation.is_some());
        assert_eq!(q.question_hash, question_hash("Which control stops credential stuffing?"));

        let history = h.history.entries();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].question_id, Some(q.id));
        assert!(h.context.items.lock().unwrap()[0].used_at.is_some());
        assert!(h.logs.entries().is_empty());
    }

    #[tokio::test]
    async fn duplicate_then_unique_links_only_the_newest_slot() {
        let (h, settings) = Harness::new(GenerationSettings::with_defaults(5));
        h.questions
            .push(new_question("Which port does SSH listen on?", QuestionStatus::Accepted));

        let mut generator = MockContentGenerator::new();
        generator
            .expect_generate()
            .withf(|p| p.attempt == 0)
            .times(1)
            .returning(|_| Ok(candidate("which port does ssh listen on")));
        generator
            .expect_generate()
            .withf(|p| p.attempt == 1)
            .times(1)
            .returning(|_| Ok(candidate("Which port does RDP listen on?")));
        generator.expect_embed().times(2).returning(|_| Ok(vec![0.2, 0.9]));

        let worker = h.worker(settings, generator, Arc::new(MemoryVectorIndex::new()));
        let q = worker.generate_one().await.unwrap();
        assert_eq!(q.question_text, "Which port does RDP listen on?");

        let logs = h.logs.entries();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].method, "hash");

        let history = h.history.entries();
        assert_eq!(history.len(), 2);
        assert_ne!(history[0].slot(), history[1].slot());
        assert_eq!(history[0].question_id, None);
        assert_eq!(history[1].question_id, Some(q.id));
    }

    #[tokio::test]
    async fn soft_deleted_question_can_be_generated_again() {
        let (h, settings) = Harness::new(GenerationSettings::with_defaults(5));
        let text = "What does HSTS enforce?";
        let old = h.questions.push(new_question(text, QuestionStatus::Accepted));
        let index = Arc::new(MemoryVectorIndex::new());
        index
            .upsert(VectorPoint {
                id: old.id,
                vector: vec![1.0, 0.0],
                payload: VectorPayload::from(&old),
            })
            .await
            .unwrap();
        h.questions.soft_delete(old.id).await.unwrap();

        let mut generator = MockContentGenerator::new();
        generator
            .expect_generate()
            .times(1)
            .returning(move |_| Ok(candidate(text)));
        generator.expect_embed().times(1).returning(|_| Ok(vec![1.0, 0.0]));

        let worker = h.worker(settings, generator, index.clone());
        let q = worker.generate_one().await.unwrap();

        assert_ne!(q.id, old.id);
        assert!(h.logs.entries().is_empty());
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn backoff_doubles_and_is_capped() {
        let base = Duration::from_millis(500);
        assert_eq!(backoff_delay(base, 0), base);
        assert_eq!(backoff_delay(base, 2), Duration::from_secs(2));
        assert_eq!(backoff_delay(Duration::MAX, 2), MAX_BACKOFF);
        assert_eq!(backoff_delay(Duration::from_secs(3600), 0), MAX_BACKOFF);
    }

    #[tokio::test]
    async fn configuration_error_aborts_without_calling_the_generator() {
        let mut s = GenerationSettings::with_defaults(5);
        s.dimensions.granularities.clear();
        let (h, settings) = Harness::new(s);

        let mut generator = MockContentGenerator::new();
        generator.expect_generate().times(0);
        generator.expect_embed().times(0);

        let worker = h.worker(settings, generator, Arc::new(MemoryVectorIndex::new()));
        let err = worker.generate_one().await.unwrap_err();
        assert!(matches!(err, GenerationError::Configuration(_)));
    }

    #[tokio::test]
    async fn transient_failure_is_retried_within_budget() {
        let (h, settings) = Harness::new(GenerationSettings::with_defaults(5));
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let mut generator = MockContentGenerator::new();
        generator.expect_generate().times(2).returning(move |_| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(GenerationError::Transient("provider returned 503".into()))
            } else {
                Ok(candidate("What does a WAF inspect?"))
            }
        });
        generator.expect_embed().times(1).returning(|_| Ok(vec![0.0, 1.0]));

        let worker = h.worker(settings, generator, Arc::new(MemoryVectorIndex::new()));
        let q = worker.generate_one().await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(q.question_text, "What does a WAF inspect?");
        assert_eq!(h.history.entries().len(), 2);
    }

    #[tokio::test]
    async fn persistence_failure_is_not_retried() {
        let (h, settings) = Harness::new(GenerationSettings::with_defaults(5));
        let mut broken = candidate("Is TLS 1.0 still acceptable?");
        broken.correct_answer = "Maybe".into();

        let mut generator = MockContentGenerator::new();
        generator
            .expect_generate()
            .times(1)
            .returning(move |_| Ok(broken.clone()));
        generator.expect_embed().times(1).returning(|_| Ok(vec![1.0]));

        let worker = h.worker(settings, generator, Arc::new(MemoryVectorIndex::new()));
        let err = worker.generate_one().await.unwrap_err();
        assert!(matches!(err, GenerationError::Persistence(_)));
    }

    #[tokio::test]
    async fn unstructured_generation_skips_slot_history() {
        let mut s = GenerationSettings::with_defaults(5);
        s.structured_generation_enabled = false;
        let (h, settings) = Harness::new(s);

        let mut generator = MockContentGenerator::new();
        generator
            .expect_generate()
            .withf(|p| !p.structured)
            .returning(|_| Ok(candidate("What is a honeypot?")));
        generator.expect_embed().returning(|_| Ok(vec![1.0, 1.0]));

        let worker = h.worker(settings, generator, Arc::new(MemoryVectorIndex::new()));
        let q = worker.generate_one().await.unwrap();

        assert!(q.generation.is_none());
        assert_eq!(q.category, "General");
        assert!(h.history.entries().is_empty());
    }

    struct StalledGenerator;

    #[async_trait]
    impl ContentGenerator for StalledGenerator {
        async fn generate(&self, _prompt: &GenerationPrompt) -> Result<CandidateQuestion, GenerationError> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(candidate("never"))
        }

        async fn embed(&self, _text: &str) -> Result<Vec<f32>, GenerationError> {
            Ok(vec![1.0])
        }
    }

    #[tokio::test]
    async fn hung_generator_call_times_out_as_transient() {
        let (h, settings) = Harness::new(GenerationSettings::with_defaults(5));
        let worker = h
            .worker(settings, StalledGenerator, Arc::new(MemoryVectorIndex::new()))
            .with_options(WorkerOptions {
                call_timeout: Duration::from_millis(20),
                retry_backoff: Duration::ZERO,
            });

        let err = worker.generate_one().await.unwrap_err();
        assert!(err.is_transient());
        assert!(err.to_string().contains("timed out"));
        assert!(h.questions.all().is_empty());
    }
}
