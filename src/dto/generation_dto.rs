use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::settings::{GenerationSettings, SettingsUpdate};
use crate::services::buffer_service::BufferStatus;

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSettingsPayload {
    #[validate(range(min = 0, max = 500))]
    pub buffer_size: Option<i32>,
    pub auto_refill_enabled: Option<bool>,
    pub structured_generation_enabled: Option<bool>,
    #[validate(length(max = 50))]
    pub enabled_domains: Option<Vec<String>>,
    #[validate(length(max = 50))]
    pub enabled_skill_types: Option<Vec<String>>,
    #[validate(length(max = 50))]
    pub enabled_difficulties: Option<Vec<String>>,
    #[validate(length(max = 50))]
    pub enabled_granularities: Option<Vec<String>>,
}

impl From<UpdateSettingsPayload> for SettingsUpdate {
    fn from(p: UpdateSettingsPayload) -> Self {
        Self {
            buffer_size: p.buffer_size,
            auto_refill_enabled: p.auto_refill_enabled,
            structured_generation_enabled: p.structured_generation_enabled,
            domains: p.enabled_domains,
            skill_types: p.enabled_skill_types,
            difficulties: p.enabled_difficulties,
            granularities: p.enabled_granularities,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsResponse {
    pub buffer_size: i32,
    pub auto_refill_enabled: bool,
    pub structured_generation_enabled: bool,
    pub enabled_domains: Vec<String>,
    pub enabled_skill_types: Vec<String>,
    pub enabled_difficulties: Vec<String>,
    pub enabled_granularities: Vec<String>,
    pub combinations: usize,
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<GenerationSettings> for SettingsResponse {
    fn from(s: GenerationSettings) -> Self {
        Self {
            combinations: s.dimensions.combinations(),
            buffer_size: s.buffer_size,
            auto_refill_enabled: s.auto_refill_enabled,
            structured_generation_enabled: s.structured_generation_enabled,
            enabled_domains: s.dimensions.domains,
            enabled_skill_types: s.dimensions.skill_types,
            enabled_difficulties: s.dimensions.difficulties,
            enabled_granularities: s.dimensions.granularities,
            updated_at: s.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerResponse {
    pub queued: usize,
    pub status: BufferStatus,
}
