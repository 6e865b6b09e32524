pub mod config;
pub mod database;
pub mod dto;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod telemetry;
pub mod utils;

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use sqlx::PgPool;

use crate::models::settings::GenerationSettings;
use crate::services::{
    ai_service::{AIService, ContentGenerator, OpenAiGenerator},
    buffer_service::BufferService,
    context_service::{ContextSource, PgContextSource},
    duplicate_detector::{DuplicateDetector, DuplicateThresholds},
    duplicate_log_service::{DuplicateLogStore, PgDuplicateLogStore},
    embed_service::EmbedService,
    question_generator::{GenerationWorker, WorkerOptions},
    question_service::{PgQuestionStore, QuestionStore},
    settings_service::{PgSettingsStore, SettingsStore},
    slot_history_service::{PgSlotHistoryStore, SlotHistoryStore},
    slot_sampler::SlotSampler,
    vector_index::VectorIndex,
};

/// Persistence collaborators of the pipeline.
#[derive(Clone)]
pub struct Stores {
    pub questions: Arc<dyn QuestionStore>,
    pub duplicate_logs: Arc<dyn DuplicateLogStore>,
    pub settings: Arc<dyn SettingsStore>,
    pub slot_history: Arc<dyn SlotHistoryStore>,
    pub context: Arc<dyn ContextSource>,
}

impl Stores {
    pub fn postgres(pool: PgPool, defaults: GenerationSettings) -> Self {
        Self {
            questions: Arc::new(PgQuestionStore::new(pool.clone())),
            duplicate_logs: Arc::new(PgDuplicateLogStore::new(pool.clone())),
            settings: Arc::new(PgSettingsStore::new(pool.clone(), defaults)),
            slot_history: Arc::new(PgSlotHistoryStore::new(pool.clone())),
            context: Arc::new(PgContextSource::new(pool)),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PipelineOptions {
    pub thresholds: DuplicateThresholds,
    pub slot_window: chrono::Duration,
    pub worker: WorkerOptions,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            thresholds: DuplicateThresholds::default(),
            slot_window: chrono::Duration::hours(24),
            worker: WorkerOptions::default(),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub questions: Arc<dyn QuestionStore>,
    pub duplicate_logs: Arc<dyn DuplicateLogStore>,
    pub settings: Arc<dyn SettingsStore>,
    pub index: Arc<dyn VectorIndex>,
    pub generator: Arc<dyn ContentGenerator>,
    pub buffer: BufferService,
}

impl AppState {
    /// Production wiring from the global config.
    pub fn new(pool: PgPool, http_client: Client, index: Arc<dyn VectorIndex>) -> Self {
        let config = crate::config::get_config();

        let chat = AIService::new(
            config.openai_api_key.clone(),
            config.openai_base_url.clone(),
            config.chat_model.clone(),
            http_client.clone(),
        );
        let embeddings = EmbedService::new(
            config.openai_api_key.clone(),
            config.openai_base_url.clone(),
            config.embedding_model.clone(),
            http_client,
        )
        .with_dimensions(config.embedding_dimensions);
        let generator: Arc<dyn ContentGenerator> = Arc::new(OpenAiGenerator::new(chat, embeddings));

        let stores = Stores::postgres(pool, GenerationSettings::with_defaults(config.default_buffer_size));
        let options = PipelineOptions {
            thresholds: DuplicateThresholds {
                strict: config.duplicate_threshold,
                display: config.similarity_display_threshold,
            },
            slot_window: chrono::Duration::hours(config.slot_window_hours),
            worker: WorkerOptions {
                call_timeout: Duration::from_secs(config.llm_timeout_secs),
                retry_backoff: Duration::from_millis(config.retry_backoff_ms),
            },
        };

        Self::assemble(stores, index, generator, options)
    }

    pub fn assemble(
        stores: Stores,
        index: Arc<dyn VectorIndex>,
        generator: Arc<dyn ContentGenerator>,
        options: PipelineOptions,
    ) -> Self {
        let sampler = SlotSampler::new(
            stores.settings.clone(),
            stores.slot_history.clone(),
            options.slot_window,
        );
        let detector = DuplicateDetector::new(
            stores.questions.clone(),
            index.clone(),
            stores.duplicate_logs.clone(),
            options.thresholds,
        );
        let worker = GenerationWorker::new(
            sampler,
            generator.clone(),
            detector,
            stores.questions.clone(),
            index.clone(),
            stores.slot_history,
            stores.context,
        )
        .with_options(options.worker);
        let buffer = BufferService::new(
            Arc::new(worker),
            stores.questions.clone(),
            stores.settings.clone(),
        );

        Self {
            questions: stores.questions,
            duplicate_logs: stores.duplicate_logs,
            settings: stores.settings,
            index,
            generator,
            buffer,
        }
    }
}
