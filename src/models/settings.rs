use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::GenerationError;

/// Enabled values for each of the four slot dimensions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct DimensionSets {
    pub domains: Vec<String>,
    pub skill_types: Vec<String>,
    pub difficulties: Vec<String>,
    pub granularities: Vec<String>,
}

impl DimensionSets {
    /// Every dimension must have at least one enabled value before sampling.
    pub fn validate(&self) -> Result<(), GenerationError> {
        let empty: Vec<&str> = [
            ("domains", &self.domains),
            ("skill types", &self.skill_types),
            ("difficulties", &self.difficulties),
            ("granularities", &self.granularities),
        ]
        .iter()
        .filter(|(_, values)| values.is_empty())
        .map(|(name, _)| *name)
        .collect();

        if empty.is_empty() {
            Ok(())
        } else {
            Err(GenerationError::Configuration(format!(
                "no enabled values for: {}",
                empty.join(", ")
            )))
        }
    }

    pub fn combinations(&self) -> usize {
        self.domains.len() * self.skill_types.len() * self.difficulties.len() * self.granularities.len()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationSettings {
    pub buffer_size: i32,
    pub auto_refill_enabled: bool,
    pub structured_generation_enabled: bool,
    pub dimensions: DimensionSets,
    pub updated_at: Option<DateTime<Utc>>,
}

impl GenerationSettings {
    pub fn with_defaults(buffer_size: i32) -> Self {
        Self {
            buffer_size,
            auto_refill_enabled: true,
            structured_generation_enabled: true,
            dimensions: DimensionSets {
                domains: vec![
                    "Network Security".into(),
                    "Application Security".into(),
                    "Cryptography".into(),
                    "Identity & Access".into(),
                    "Social Engineering".into(),
                ],
                skill_types: vec![
                    "Knowledge".into(),
                    "Analysis".into(),
                    "Scenario".into(),
                ],
                difficulties: vec!["Easy".into(), "Medium".into(), "Hard".into()],
                granularities: vec!["Concept".into(), "Tool".into(), "Incident".into()],
            },
            updated_at: None,
        }
    }

    pub fn target_size(&self) -> i64 {
        i64::from(self.buffer_size.max(0))
    }
}

/// Partial update; `None` leaves the stored value untouched.
#[derive(Debug, Clone, Default)]
pub struct SettingsUpdate {
    pub buffer_size: Option<i32>,
    pub auto_refill_enabled: Option<bool>,
    pub structured_generation_enabled: Option<bool>,
    pub domains: Option<Vec<String>>,
    pub skill_types: Option<Vec<String>>,
    pub difficulties: Option<Vec<String>>,
    pub granularities: Option<Vec<String>>,
}

impl GenerationSettings {
    pub fn apply(&mut self, update: SettingsUpdate) {
        if let Some(v) = update.buffer_size {
            self.buffer_size = v;
        }
        if let Some(v) = update.auto_refill_enabled {
            self.auto_refill_enabled = v;
        }
        if let Some(v) = update.structured_generation_enabled {
            self.structured_generation_enabled = v;
        }
        if let Some(v) = update.domains {
            self.dimensions.domains = dedup(v);
        }
        if let Some(v) = update.skill_types {
            self.dimensions.skill_types = dedup(v);
        }
        if let Some(v) = update.difficulties {
            self.dimensions.difficulties = dedup(v);
        }
        if let Some(v) = update.granularities {
            self.dimensions.granularities = dedup(v);
        }
    }
}

fn dedup(values: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(values.len());
    for v in values {
        let v = v.trim().to_string();
        if !v.is_empty() && !out.contains(&v) {
            out.push(v);
        }
    }
    out
}
