use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, PgPool, Row};

use crate::error::Result;
use crate::models::settings::{DimensionSets, GenerationSettings, SettingsUpdate};

/// Process-wide generation settings, re-read at the start of every maintenance cycle.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn load(&self) -> Result<GenerationSettings>;
    async fn update(&self, update: SettingsUpdate) -> Result<GenerationSettings>;
}

#[derive(Clone)]
pub struct PgSettingsStore {
    pool: PgPool,
    defaults: GenerationSettings,
}

impl PgSettingsStore {
    pub fn new(pool: PgPool, defaults: GenerationSettings) -> Self {
        Self { pool, defaults }
    }
}

fn settings_from_row(row: &PgRow) -> Result<GenerationSettings> {
    Ok(GenerationSettings {
        buffer_size: row.try_get("buffer_size")?,
        auto_refill_enabled: row.try_get("auto_refill_enabled")?,
        structured_generation_enabled: row.try_get("structured_generation_enabled")?,
        dimensions: DimensionSets {
            domains: row.try_get("enabled_domains")?,
            skill_types: row.try_get("enabled_skill_types")?,
            difficulties: row.try_get("enabled_difficulties")?,
            granularities: row.try_get("enabled_granularities")?,
        },
        updated_at: row.try_get::<Option<DateTime<Utc>>, _>("updated_at")?,
    })
}

#[async_trait]
impl SettingsStore for PgSettingsStore {
    async fn load(&self) -> Result<GenerationSettings> {
        let row = sqlx::query(
            r#"
            SELECT buffer_size, auto_refill_enabled, structured_generation_enabled,
                   enabled_domains, enabled_skill_types, enabled_difficulties, enabled_granularities,
                   updated_at
            FROM generation_settings WHERE id = 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => settings_from_row(&row),
            None => Ok(self.defaults.clone()),
        }
    }

    async fn update(&self, update: SettingsUpdate) -> Result<GenerationSettings> {
        let mut settings = self.load().await?;
        settings.apply(update);

        let row = sqlx::query(
            r#"
            INSERT INTO generation_settings (
                id, buffer_size, auto_refill_enabled, structured_generation_enabled,
                enabled_domains, enabled_skill_types, enabled_difficulties, enabled_granularities,
                updated_at
            ) VALUES (1, $1, $2, $3, $4, $5, $6, $7, NOW())
            ON CONFLICT (id) DO UPDATE SET
                buffer_size = EXCLUDED.buffer_size,
                auto_refill_enabled = EXCLUDED.auto_refill_enabled,
                structured_generation_enabled = EXCLUDED.structured_generation_enabled,
                enabled_domains = EXCLUDED.enabled_domains,
                enabled_skill_types = EXCLUDED.enabled_skill_types,
                enabled_difficulties = EXCLUDED.enabled_difficulties,
                enabled_granularities = EXCLUDED.enabled_granularities,
                updated_at = NOW()
            RETURNING buffer_size, auto_refill_enabled, structured_generation_enabled,
                      enabled_domains, enabled_skill_types, enabled_difficulties, enabled_granularities,
                      updated_at
            "#,
        )
        .bind(settings.buffer_size)
        .bind(settings.auto_refill_enabled)
        .bind(settings.structured_generation_enabled)
        .bind(&settings.dimensions.domains)
        .bind(&settings.dimensions.skill_types)
        .bind(&settings.dimensions.difficulties)
        .bind(&settings.dimensions.granularities)
        .fetch_one(&self.pool)
        .await?;

        let stored = settings_from_row(&row)?;
        tracing::info!(
            buffer_size = stored.buffer_size,
            auto_refill = stored.auto_refill_enabled,
            structured = stored.structured_generation_enabled,
            combinations = stored.dimensions.combinations(),
            "Generation settings updated"
        );
        Ok(stored)
    }
}
