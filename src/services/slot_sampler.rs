use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Duration;
use rand::seq::SliceRandom;

use crate::error::GenerationError;
use crate::models::settings::DimensionSets;
use crate::models::slot::GenerationSlot;
use crate::services::settings_service::SettingsStore;
use crate::services::slot_history_service::SlotHistoryStore;
use crate::utils::time::window_start;

/// Most recent history rows considered when excluding recently used slots.
pub const RECENT_SLOT_LIMIT: i64 = 200;
/// History cleanup piggybacks on every Nth selection.
const CLEANUP_EVERY: u64 = 20;

#[derive(Debug, Clone, PartialEq)]
pub struct SelectedSlot {
    pub slot: GenerationSlot,
    /// False when structured generation is off and the fallback slot was used.
    pub structured: bool,
}

#[derive(Clone)]
pub struct SlotSampler {
    settings: Arc<dyn SettingsStore>,
    history: Arc<dyn SlotHistoryStore>,
    window: Duration,
    selections: Arc<AtomicU64>,
}

impl SlotSampler {
    pub fn new(
        settings: Arc<dyn SettingsStore>,
        history: Arc<dyn SlotHistoryStore>,
        window: Duration,
    ) -> Self {
        Self {
            settings,
            history,
            window,
            selections: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Picks the next slot, preferring combinations not used inside the window,
    /// and records it in history before generation starts.
    pub async fn select_slot(&self) -> Result<SelectedSlot, GenerationError> {
        let settings = self.settings.load().await.map_err(transient)?;
        if !settings.structured_generation_enabled {
            return Ok(SelectedSlot {
                slot: GenerationSlot::fallback(),
                structured: false,
            });
        }

        settings.dimensions.validate()?;
        let all = cartesian_product(&settings.dimensions);

        let since = window_start(self.window);
        let recent: HashSet<GenerationSlot> = self
            .history
            .recent_slots(since, RECENT_SLOT_LIMIT)
            .await
            .map_err(transient)?
            .into_iter()
            .collect();

        let (slot, fresh_count) = pick_slot(&all, &recent);
        if fresh_count == 0 {
            tracing::debug!(
                combinations = all.len(),
                "All slot combinations used within the window; sampling from the full space"
            );
        }

        self.history.record(&slot).await.map_err(transient)?;
        tracing::debug!(%slot, fresh = fresh_count, total = all.len(), "Selected generation slot");

        if self.selections.fetch_add(1, Ordering::Relaxed) % CLEANUP_EVERY == 0 {
            let cutoff = window_start(self.window * 2);
            match self.history.purge_older_than(cutoff).await {
                Ok(0) => {}
                Ok(purged) => tracing::debug!(purged, "Purged stale slot history"),
                Err(e) => tracing::warn!(error = %e, "Slot history cleanup failed"),
            }
        }

        Ok(SelectedSlot {
            slot,
            structured: true,
        })
    }
}

fn transient(err: crate::error::Error) -> GenerationError {
    GenerationError::Transient(err.to_string())
}

pub fn cartesian_product(dims: &DimensionSets) -> Vec<GenerationSlot> {
    let mut out = Vec::with_capacity(dims.combinations());
    for domain in &dims.domains {
        for skill_type in &dims.skill_types {
            for difficulty in &dims.difficulties {
                for granularity in &dims.granularities {
                    out.push(GenerationSlot::new(
                        domain.clone(),
                        skill_type.clone(),
                        difficulty.clone(),
                        granularity.clone(),
                    ));
                }
            }
        }
    }
    out
}

/// Uniform pick among slots absent from `recent`, or among all slots if none are.
/// `all` must be non-empty.
fn pick_slot(all: &[GenerationSlot], recent: &HashSet<GenerationSlot>) -> (GenerationSlot, usize) {
    let fresh: Vec<&GenerationSlot> = all.iter().filter(|s| !recent.contains(*s)).collect();
    let fresh_count = fresh.len();
    let pool: Vec<&GenerationSlot> = if fresh.is_empty() {
        all.iter().collect()
    } else {
        fresh
    };
    let mut rng = rand::thread_rng();
    let chosen = pool
        .choose(&mut rng)
        .map(|s| (*s).clone())
        .unwrap_or_else(GenerationSlot::fallback);
    (chosen, fresh_count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::settings::GenerationSettings;
    use crate::services::testing::{MemorySettings, MemorySlotHistory};
    use crate::utils::time::now;

    fn small_settings() -> GenerationSettings {
        let mut s = GenerationSettings::with_defaults(5);
        s.dimensions = DimensionSets {
            domains: vec!["Network".into(), "Crypto".into()],
            skill_types: vec!["Knowledge".into(), "Scenario".into()],
            difficulties: vec!["Easy".into(), "Hard".into()],
            granularities: vec!["Concept".into(), "Tool".into()],
        };
        s
    }

    fn sampler(settings: GenerationSettings) -> (SlotSampler, Arc<MemorySlotHistory>) {
        let history = Arc::new(MemorySlotHistory::default());
        let sampler = SlotSampler::new(
            Arc::new(MemorySettings::new(settings)),
            history.clone(),
            Duration::hours(24),
        );
        (sampler, history)
    }

    #[tokio::test]
    async fn covers_every_combination_before_repeating() {
        let settings = small_settings();
        let total = settings.dimensions.combinations();
        assert_eq!(total, 16);
        let (sampler, history) = sampler(settings);

        let mut seen = HashSet::new();
        for _ in 0..total {
            let selected = sampler.select_slot().await.unwrap();
            assert!(selected.structured);
            assert!(seen.insert(selected.slot), "slot repeated before space exhausted");
        }
        assert_eq!(seen.len(), total);

        // Space exhausted: sampling resets to the full product instead of stalling.
        let next = sampler.select_slot().await.unwrap();
        assert!(seen.contains(&next.slot));
        assert_eq!(history.entries().len(), total + 1);
    }

    #[tokio::test]
    async fn history_outside_window_does_not_block_a_slot() {
        let mut settings = small_settings();
        settings.dimensions.domains.truncate(1);
        settings.dimensions.skill_types.truncate(1);
        settings.dimensions.difficulties.truncate(1);
        settings.dimensions.granularities = vec!["Concept".into(), "Tool".into()];
        let (sampler, history) = sampler(settings);

        let concept = GenerationSlot::new("Network", "Knowledge", "Easy", "Concept");
        let tool = GenerationSlot::new("Network", "Knowledge", "Easy", "Tool");
        history.seed(&concept, now() - Duration::hours(1));
        history.seed(&tool, now() - Duration::hours(30));

        let selected = sampler.select_slot().await.unwrap();
        assert_eq!(selected.slot, tool);
    }

    #[tokio::test]
    async fn records_slot_optimistically_without_question() {
        let (sampler, history) = sampler(small_settings());
        let selected = sampler.select_slot().await.unwrap();

        let entries = history.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].slot(), selected.slot);
        assert!(entries[0].question_id.is_none());
    }

    #[tokio::test]
    async fn disabled_structured_generation_always_returns_fallback() {
        let mut settings = small_settings();
        settings.structured_generation_enabled = false;
        let (sampler, history) = sampler(settings);

        for _ in 0..5 {
            let selected = sampler.select_slot().await.unwrap();
            assert_eq!(selected.slot, GenerationSlot::fallback());
            assert!(!selected.structured);
        }
        assert!(history.entries().is_empty());
    }

    #[tokio::test]
    async fn empty_dimension_aborts_with_configuration_error() {
        let mut settings = small_settings();
        settings.dimensions.skill_types.clear();
        let (sampler, history) = sampler(settings);

        let err = sampler.select_slot().await.unwrap_err();
        assert!(matches!(err, GenerationError::Configuration(_)));
        assert!(history.entries().is_empty());
    }

    #[tokio::test]
    async fn cleanup_runs_on_first_selection_with_double_window() {
        let (sampler, history) = sampler(small_settings());
        let stale = GenerationSlot::new("Network", "Knowledge", "Easy", "Concept");
        history.seed(&stale, now() - Duration::hours(72));

        sampler.select_slot().await.unwrap();

        let purges = history.purges.lock().unwrap().clone();
        assert_eq!(purges.len(), 1);
        let expected = now() - Duration::hours(48);
        assert!((purges[0] - expected).num_seconds().abs() < 5);
        assert!(history.entries().iter().all(|e| e.created_at > purges[0]));
    }

    #[test]
    fn cartesian_product_has_all_combinations() {
        let dims = small_settings().dimensions;
        let all = cartesian_product(&dims);
        assert_eq!(all.len(), 16);
        assert_eq!(all.iter().collect::<HashSet<_>>().len(), 16);
    }
}
