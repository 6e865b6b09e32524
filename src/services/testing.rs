//! In-memory collaborators for unit tests.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::context_item::ContextItem;
use crate::models::duplicate_log::{DuplicateLog, NewDuplicateLog};
use crate::models::question::{NewQuestion, Question, QuestionStatus};
use crate::models::settings::{GenerationSettings, SettingsUpdate};
use crate::models::slot::{GenerationSlot, SlotHistoryEntry};
use crate::services::context_service::ContextSource;
use crate::services::duplicate_log_service::DuplicateLogStore;
use crate::services::question_service::{QuestionFilter, QuestionList, QuestionStore};
use crate::services::settings_service::SettingsStore;
use crate::services::slot_history_service::SlotHistoryStore;
use crate::utils::crypto::question_hash;

pub fn new_question(text: &str, status: QuestionStatus) -> NewQuestion {
    NewQuestion {
        question_text: text.to_string(),
        question_hash: question_hash(text),
        options: vec!["Yes".into(), "No".into()],
        correct_answer: "Yes".into(),
        explanation: "Because.".into(),
        difficulty: 0.5,
        category: "General".into(),
        tags: vec![],
        status,
        generation: None,
        potential_duplicates: vec![],
        source_context_ids: vec![],
    }
}

#[derive(Default)]
pub struct MemoryQuestionStore {
    pub rows: Mutex<Vec<Question>>,
}

impl MemoryQuestionStore {
    pub fn all(&self) -> Vec<Question> {
        self.rows.lock().unwrap().clone()
    }

    pub fn push(&self, new: NewQuestion) -> Question {
        let q = new.into_question(Uuid::new_v4(), Utc::now());
        self.rows.lock().unwrap().push(q.clone());
        q
    }
}

#[async_trait]
impl QuestionStore for MemoryQuestionStore {
    async fn find_by_hash(&self, hash: &str) -> Result<Option<Question>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .find(|q| q.question_hash == hash && !q.is_deleted)
            .cloned())
    }

    async fn count_by_status(&self, status: QuestionStatus) -> Result<i64> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|q| q.status == status && !q.is_deleted)
            .count() as i64)
    }

    async fn insert(&self, question: NewQuestion) -> Result<Question> {
        if !question.options.contains(&question.correct_answer) {
            return Err(Error::BadRequest("correct answer must be one of the options".into()));
        }
        Ok(self.push(question))
    }

    async fn get(&self, id: Uuid) -> Result<Question> {
        self.rows
            .lock()
            .unwrap()
            .iter()
            .find(|q| q.id == id)
            .cloned()
            .ok_or_else(|| Error::NotFound("Resource not found".into()))
    }

    async fn list(&self, filter: QuestionFilter) -> Result<QuestionList> {
        let items: Vec<Question> = self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|q| !q.is_deleted && filter.status.map_or(true, |s| q.status == s))
            .cloned()
            .collect();
        let total = items.len() as i64;
        Ok(QuestionList {
            items,
            total,
            page: 1,
            per_page: total.max(1),
            total_pages: if total == 0 { 0 } else { 1 },
        })
    }

    async fn set_status(&self, id: Uuid, status: QuestionStatus) -> Result<Question> {
        let mut rows = self.rows.lock().unwrap();
        let q = rows
            .iter_mut()
            .find(|q| q.id == id && !q.is_deleted)
            .ok_or_else(|| Error::NotFound("Resource not found".into()))?;
        q.status = status;
        q.is_rejected = status == QuestionStatus::Rejected;
        q.updated_at = Utc::now();
        Ok(q.clone())
    }

    async fn soft_delete(&self, id: Uuid) -> Result<()> {
        let mut rows = self.rows.lock().unwrap();
        let q = rows
            .iter_mut()
            .find(|q| q.id == id && !q.is_deleted)
            .ok_or_else(|| Error::NotFound(format!("Question {} not found", id)))?;
        q.is_deleted = true;
        Ok(())
    }
}

#[derive(Default)]
pub struct MemorySlotHistory {
    pub entries: Mutex<Vec<SlotHistoryEntry>>,
    pub purges: Mutex<Vec<DateTime<Utc>>>,
}

impl MemorySlotHistory {
    pub fn entries(&self) -> Vec<SlotHistoryEntry> {
        self.entries.lock().unwrap().clone()
    }

    pub fn seed(&self, slot: &GenerationSlot, created_at: DateTime<Utc>) {
        let mut entries = self.entries.lock().unwrap();
        let id = entries.len() as i64 + 1;
        entries.push(SlotHistoryEntry {
            id,
            domain: slot.domain.clone(),
            skill_type: slot.skill_type.clone(),
            difficulty: slot.difficulty.clone(),
            granularity: slot.granularity.clone(),
            question_id: None,
            created_at,
        });
    }
}

#[async_trait]
impl SlotHistoryStore for MemorySlotHistory {
    async fn record(&self, slot: &GenerationSlot) -> Result<i64> {
        self.seed(slot, Utc::now());
        Ok(self.entries.lock().unwrap().len() as i64)
    }

    async fn recent_slots(&self, since: DateTime<Utc>, limit: i64) -> Result<Vec<GenerationSlot>> {
        Ok(self
            .entries
            .lock()
            .unwrap()
            .iter()
            .rev()
            .filter(|e| e.created_at >= since)
            .take(limit as usize)
            .map(SlotHistoryEntry::slot)
            .collect())
    }

    async fn link_question(&self, slot: &GenerationSlot, question_id: Uuid) -> Result<bool> {
        let mut entries = self.entries.lock().unwrap();
        match entries
            .iter_mut()
            .rev()
            .find(|e| e.question_id.is_none() && &e.slot() == slot)
        {
            Some(entry) => {
                entry.question_id = Some(question_id);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        self.purges.lock().unwrap().push(cutoff);
        let mut entries = self.entries.lock().unwrap();
        let before = entries.len();
        entries.retain(|e| e.created_at >= cutoff);
        Ok((before - entries.len()) as u64)
    }
}

#[derive(Default)]
pub struct MemoryDuplicateLogs {
    pub entries: Mutex<Vec<DuplicateLog>>,
}

impl MemoryDuplicateLogs {
    pub fn entries(&self) -> Vec<DuplicateLog> {
        self.entries.lock().unwrap().clone()
    }
}

#[async_trait]
impl DuplicateLogStore for MemoryDuplicateLogs {
    async fn record(&self, entry: NewDuplicateLog) -> Result<DuplicateLog> {
        let log = DuplicateLog {
            id: Uuid::new_v4(),
            question_hash: entry.question_hash,
            question_text: entry.question_text,
            method: entry.method.as_str().to_string(),
            similarity: entry.similarity,
            matched_question_id: entry.matched_question_id,
            topic: entry.topic,
            created_at: Utc::now(),
        };
        self.entries.lock().unwrap().push(log.clone());
        Ok(log)
    }

    async fn recent(&self, limit: i64) -> Result<Vec<DuplicateLog>> {
        Ok(self
            .entries
            .lock()
            .unwrap()
            .iter()
            .rev()
            .take(limit as usize)
            .cloned()
            .collect())
    }
}

pub struct MemorySettings {
    pub settings: Mutex<GenerationSettings>,
}

impl MemorySettings {
    pub fn new(settings: GenerationSettings) -> Self {
        Self {
            settings: Mutex::new(settings),
        }
    }
}

#[async_trait]
impl SettingsStore for MemorySettings {
    async fn load(&self) -> Result<GenerationSettings> {
        Ok(self.settings.lock().unwrap().clone())
    }

    async fn update(&self, update: SettingsUpdate) -> Result<GenerationSettings> {
        let mut settings = self.settings.lock().unwrap();
        settings.apply(update);
        settings.updated_at = Some(Utc::now());
        Ok(settings.clone())
    }
}

#[derive(Default)]
pub struct MemoryContext {
    pub items: Mutex<Vec<ContextItem>>,
}

impl MemoryContext {
    pub fn with_items(items: Vec<ContextItem>) -> Self {
        Self {
            items: Mutex::new(items),
        }
    }
}

#[async_trait]
impl ContextSource for MemoryContext {
    async fn recent_unused(&self, limit: i64) -> Result<Vec<ContextItem>> {
        Ok(self
            .items
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.used_at.is_none())
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn mark_used(&self, ids: &[Uuid]) -> Result<()> {
        let now = Utc::now();
        for item in self.items.lock().unwrap().iter_mut() {
            if ids.contains(&item.id) {
                item.used_at = Some(now);
            }
        }
        Ok(())
    }
}
