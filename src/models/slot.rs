use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use uuid::Uuid;

/// One combination of the four generation dimensions. Equality is the slot signature.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GenerationSlot {
    pub domain: String,
    pub skill_type: String,
    pub difficulty: String,
    pub granularity: String,
}

impl GenerationSlot {
    pub fn new(
        domain: impl Into<String>,
        skill_type: impl Into<String>,
        difficulty: impl Into<String>,
        granularity: impl Into<String>,
    ) -> Self {
        Self {
            domain: domain.into(),
            skill_type: skill_type.into(),
            difficulty: difficulty.into(),
            granularity: granularity.into(),
        }
    }

    /// Used when structured generation is switched off.
    pub fn fallback() -> Self {
        Self::new("General", "Knowledge", "Medium", "Concept")
    }

    /// Approximate numeric difficulty for a categorical label.
    pub fn numeric_difficulty(&self) -> f64 {
        match self.difficulty.to_lowercase().as_str() {
            "easy" | "beginner" => 0.25,
            "hard" | "advanced" => 0.8,
            "expert" => 0.95,
            _ => 0.5,
        }
    }
}

impl fmt::Display for GenerationSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}|{}|{}|{}",
            self.domain, self.skill_type, self.difficulty, self.granularity
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SlotHistoryEntry {
    pub id: i64,
    pub domain: String,
    pub skill_type: String,
    pub difficulty: String,
    pub granularity: String,
    pub question_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

impl SlotHistoryEntry {
    pub fn slot(&self) -> GenerationSlot {
        GenerationSlot::new(
            self.domain.clone(),
            self.skill_type.clone(),
            self.difficulty.clone(),
            self.granularity.clone(),
        )
    }
}
