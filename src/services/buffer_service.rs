//! Keeps the review pool topped up to the configured buffer size.
//!
//! Callers fire [`BufferService::ensure_filled`] from anywhere (startup, review
//! actions, settings changes, the periodic ticker). It queues only the
//! outstanding shortfall and a single background drain runs the jobs one after
//! another, re-checking the live pool size before each pop.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{broadcast, Notify};
use uuid::Uuid;

use crate::error::{GenerationError, Result};
use crate::models::question::{Question, QuestionStatus};
use crate::models::settings::GenerationSettings;
use crate::services::question_service::QuestionStore;
use crate::services::settings_service::SettingsStore;
use crate::utils::time::now;

const EVENT_CAPACITY: usize = 64;

/// One unit of work for the drain loop: produce a single question.
#[async_trait]
pub trait QuestionProducer: Send + Sync {
    async fn produce(&self) -> std::result::Result<Question, GenerationError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobOrigin {
    /// Queued to cover a shortfall; dropped once the pool is full.
    Refill,
    /// Queued by an admin; runs even if the pool is already full.
    Manual,
}

#[derive(Debug, Clone)]
pub struct GenerationJob {
    pub id: Uuid,
    pub origin: JobOrigin,
    pub enqueued_at: DateTime<Utc>,
}

impl GenerationJob {
    fn new(origin: JobOrigin) -> Self {
        Self {
            id: Uuid::new_v4(),
            origin,
            enqueued_at: now(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LastRun {
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BufferStatus {
    pub current_size: i64,
    pub target_size: i64,
    pub queued_jobs: usize,
    pub is_generating: bool,
    pub missing: i64,
    pub auto_refill_enabled: bool,
    pub last_run: LastRun,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub last_error_at: Option<DateTime<Utc>>,
    pub generated_total: u64,
    pub failed_total: u64,
}

#[derive(Default)]
struct BufferState {
    queue: VecDeque<GenerationJob>,
    is_generating: bool,
    in_flight: usize,
    last_run: LastRun,
    last_success_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
    last_error_at: Option<DateTime<Utc>>,
    generated_total: u64,
    failed_total: u64,
    // Last successfully observed pool figures, served when the stores are unreachable.
    known_size: i64,
    known_target: i64,
    known_auto_refill: bool,
}

impl BufferState {
    fn record_error(&mut self, message: String) {
        self.last_error = Some(message);
        self.last_error_at = Some(now());
    }

    fn observe(&mut self, settings: &GenerationSettings, current: i64) {
        self.known_size = current;
        self.known_target = settings.target_size();
        self.known_auto_refill = settings.auto_refill_enabled;
    }
}

struct BufferInner {
    producer: Arc<dyn QuestionProducer>,
    questions: Arc<dyn QuestionStore>,
    settings: Arc<dyn SettingsStore>,
    state: Mutex<BufferState>,
    idle: Notify,
    events: broadcast::Sender<Question>,
}

#[derive(Clone)]
pub struct BufferService {
    inner: Arc<BufferInner>,
}

impl BufferService {
    pub fn new(
        producer: Arc<dyn QuestionProducer>,
        questions: Arc<dyn QuestionStore>,
        settings: Arc<dyn SettingsStore>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(BufferInner {
                producer,
                questions,
                settings,
                state: Mutex::new(BufferState::default()),
                idle: Notify::new(),
                events,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, BufferState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Queues refill jobs for the current shortfall and starts draining.
    /// Returns how many jobs were added.
    pub async fn ensure_filled(&self) -> usize {
        match self.queue_shortfall().await {
            Ok(added) => {
                self.start_drain();
                added
            }
            Err(e) => {
                tracing::warn!(error = %e, "Could not evaluate buffer shortfall");
                self.state().record_error(e.to_string());
                0
            }
        }
    }

    async fn queue_shortfall(&self) -> Result<usize> {
        let (settings, current) = self.observe().await?;
        if !settings.auto_refill_enabled {
            tracing::debug!("Auto-refill disabled, not queueing generation jobs");
            return Ok(0);
        }

        let missing = usize::try_from((settings.target_size() - current).max(0)).unwrap_or(0);
        let mut state = self.state();
        let outstanding = state.queue.len() + state.in_flight;
        let to_add = missing.saturating_sub(outstanding);
        state
            .queue
            .extend((0..to_add).map(|_| GenerationJob::new(JobOrigin::Refill)));

        if to_add > 0 {
            tracing::info!(
                current,
                target = settings.target_size(),
                outstanding,
                queued = to_add,
                "Queued refill jobs"
            );
        }
        Ok(to_add)
    }

    /// Admin trigger: refills the shortfall, or forces a single job when auto-refill is off.
    pub async fn trigger(&self) -> usize {
        let auto_refill = match self.inner.settings.load().await {
            Ok(settings) => settings.auto_refill_enabled,
            Err(e) => {
                tracing::warn!(error = %e, "Settings unavailable for manual trigger");
                self.state().record_error(e.to_string());
                return 0;
            }
        };

        if auto_refill {
            return self.ensure_filled().await;
        }

        let job = GenerationJob::new(JobOrigin::Manual);
        tracing::info!(job_id = %job.id, "Queued manual generation job");
        self.state().queue.push_back(job);
        self.start_drain();
        1
    }

    pub async fn status(&self) -> BufferStatus {
        let observed = self.observe().await;
        if let Err(e) = &observed {
            tracing::warn!(error = %e, "Serving cached buffer status");
            self.state().record_error(e.to_string());
        }

        let state = self.state();
        let current_size = state.known_size;
        let target_size = state.known_target;
        BufferStatus {
            current_size,
            target_size,
            queued_jobs: state.queue.len(),
            is_generating: state.is_generating,
            missing: (target_size - current_size).max(0),
            auto_refill_enabled: state.known_auto_refill,
            last_run: state.last_run.clone(),
            last_success_at: state.last_success_at,
            last_error: state.last_error.clone(),
            last_error_at: state.last_error_at,
            generated_total: state.generated_total,
            failed_total: state.failed_total,
        }
    }

    pub fn queued_jobs(&self) -> usize {
        self.state().queue.len()
    }

    pub fn is_generating(&self) -> bool {
        self.state().is_generating
    }

    /// Fires once per question the drain loop adds to the pool.
    pub fn subscribe(&self) -> broadcast::Receiver<Question> {
        self.inner.events.subscribe()
    }

    /// Resolves once no drain is running.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            if !self.state().is_generating {
                return;
            }
            notified.await;
        }
    }

    async fn observe(&self) -> Result<(GenerationSettings, i64)> {
        let settings = self.inner.settings.load().await?;
        let current = self
            .inner
            .questions
            .count_by_status(QuestionStatus::ToReview)
            .await?;
        self.state().observe(&settings, current);
        Ok((settings, current))
    }

    fn start_drain(&self) {
        {
            let mut state = self.state();
            if state.is_generating || state.queue.is_empty() {
                return;
            }
            state.is_generating = true;
        }

        let this = self.clone();
        tokio::spawn(async move {
            this.drain().await;
        });
    }

    async fn drain(&self) {
        tracing::debug!("Generation drain started");
        loop {
            // Refill jobs are dropped once the pool is full or refilling was switched off.
            let drop_refills = match self.observe().await {
                Ok((settings, current)) => {
                    !settings.auto_refill_enabled || current >= settings.target_size()
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Pool size check failed, continuing with queued jobs");
                    self.state().record_error(e.to_string());
                    false
                }
            };

            let job = {
                let mut state = self.state();
                if drop_refills {
                    let before = state.queue.len();
                    state.queue.retain(|job| job.origin == JobOrigin::Manual);
                    let dropped = before - state.queue.len();
                    if dropped > 0 {
                        tracing::info!(dropped, "Pool is full, discarded queued refill jobs");
                    }
                }
                match state.queue.pop_front() {
                    Some(job) => {
                        state.in_flight += 1;
                        state.last_run = LastRun {
                            started_at: Some(now()),
                            finished_at: None,
                        };
                        job
                    }
                    None => {
                        // Cleared under the same lock enqueuers use, so no job is stranded.
                        state.is_generating = false;
                        break;
                    }
                }
            };

            tracing::debug!(
                job_id = %job.id,
                origin = ?job.origin,
                waited_ms = (now() - job.enqueued_at).num_milliseconds(),
                "Running generation job"
            );
            let result = self.run_job().await;

            {
                let mut state = self.state();
                state.in_flight = state.in_flight.saturating_sub(1);
                state.last_run.finished_at = Some(now());
                match &result {
                    Ok(_) => {
                        state.generated_total += 1;
                        state.last_success_at = Some(now());
                    }
                    Err(e) => {
                        state.failed_total += 1;
                        state.record_error(e.to_string());
                    }
                }
            }

            match result {
                Ok(question) => {
                    tracing::info!(job_id = %job.id, question_id = %question.id, "Generation job finished");
                    // No subscribers is fine.
                    let _ = self.inner.events.send(question);
                }
                Err(e) => {
                    tracing::error!(job_id = %job.id, error = %e, "Generation job failed");
                }
            }
        }

        self.inner.idle.notify_waiters();
        tracing::debug!("Generation drain finished");
    }

    /// A panicking producer only fails its own job.
    async fn run_job(&self) -> std::result::Result<Question, GenerationError> {
        let producer = self.inner.producer.clone();
        match tokio::spawn(async move { producer.produce().await }).await {
            Ok(result) => result,
            Err(e) => Err(GenerationError::Transient(format!("generation job aborted: {}", e))),
        }
    }
}
