use crate::error::{Error, GenerationError, Result};
use crate::models::context_item::ContextItem;
use crate::models::slot::GenerationSlot;
use crate::services::embed_service::EmbedService;
use async_trait::async_trait;
use rand::seq::SliceRandom;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::time::Duration;

const SYSTEM_PROMPT: &str = r#"You are a senior cybersecurity trainer writing questions for a two-choice security awareness quiz.
The output must be a single valid JSON object.

Rules:
1. Write exactly ONE question with exactly TWO answer options.
2. Exactly one option is correct; "correct_answer" must repeat that option's text verbatim.
3. The question must be answerable without the source material and must not mention "the article".
4. Keep the question under 250 characters and each option under 80 characters.
5. The explanation states in one or two sentences why the correct option is right.
6. "difficulty" is a number between 0.0 (trivial) and 1.0 (expert).
7. "tags" are 1-5 short lowercase topic keywords.
"#;

/// Everything the content generator needs for one attempt.
#[derive(Debug, Clone)]
pub struct GenerationPrompt {
    pub slot: GenerationSlot,
    pub structured: bool,
    pub context: Vec<ContextItem>,
    /// Zero-based attempt number within the worker's retry budget.
    pub attempt: u32,
}

impl GenerationPrompt {
    pub fn user_message(&self) -> JsonValue {
        let mut request = if self.structured {
            serde_json::json!({
                "constraints": {
                    "domain": self.slot.domain,
                    "skill_type": self.slot.skill_type,
                    "difficulty": self.slot.difficulty,
                    "granularity": self.slot.granularity,
                }
            })
        } else {
            serde_json::json!({
                "topic": self.slot.domain,
                "difficulty": self.slot.difficulty,
            })
        };

        if !self.context.is_empty() {
            let articles: Vec<JsonValue> = self
                .context
                .iter()
                .map(|c| {
                    serde_json::json!({
                        "title": c.title,
                        "summary": c.summary,
                    })
                })
                .collect();
            request["recent_news"] = JsonValue::Array(articles);
            request["news_usage"] = JsonValue::String(
                "Ground the question in one of these recent items where it fits the constraints."
                    .to_string(),
            );
        }

        if self.attempt > 0 {
            request["variation"] = JsonValue::String(format!(
                "Attempt {}: previous drafts duplicated existing questions. Pick a clearly different angle, scenario or concept.",
                self.attempt + 1
            ));
        }

        request["schema_example"] = serde_json::json!({
            "question": "Which of these is the stronger defence against credential stuffing?",
            "options": ["Multi-factor authentication", "Longer password expiry"],
            "correct_answer": "Multi-factor authentication",
            "explanation": "MFA stops reused passwords from being enough on their own.",
            "difficulty": 0.4,
            "category": "Identity & Access",
            "tags": ["mfa", "passwords"]
        });

        request
    }
}

/// A generated question before duplicate checks and persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateQuestion {
    pub question_text: String,
    pub options: Vec<String>,
    pub correct_answer: String,
    pub explanation: String,
    pub difficulty: Option<f64>,
    pub category: Option<String>,
    pub tags: Vec<String>,
}

/// Black-box text + embedding generation.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ContentGenerator: Send + Sync {
    async fn generate(&self, prompt: &GenerationPrompt) -> std::result::Result<CandidateQuestion, GenerationError>;
    async fn embed(&self, text: &str) -> std::result::Result<Vec<f32>, GenerationError>;
}

#[derive(Clone)]
pub struct AIService {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl AIService {
    pub fn new(api_key: String, base_url: String, model: String, client: Client) -> Self {
        Self {
            client,
            api_key,
            base_url,
            model,
        }
    }

    pub async fn generate_question(&self, prompt: &GenerationPrompt) -> Result<CandidateQuestion> {
        let temperature = if prompt.attempt > 0 { 1.0 } else { 0.8 };
        let payload = serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": serde_json::to_string(&prompt.user_message())?}
            ],
            "response_format": { "type": "json_object" },
            "temperature": temperature
        });

        tracing::debug!(slot = %prompt.slot, attempt = prompt.attempt, "Requesting question from LLM");
        let response_json = self.chat_openai(payload).await?;
        let mut rng = rand::thread_rng();
        coerce_candidate(&response_json, &mut rng).map_err(Error::from)
    }

    async fn chat_openai(&self, payload: JsonValue) -> Result<JsonValue> {
        let res = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&payload)
            .timeout(Duration::from_secs(120))
            .send()
            .await?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("LLM API Error {}: {}", status, text).into());
        }

        let body: JsonValue = res.json().await?;

        body.get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
            .and_then(|s| serde_json::from_str(strip_code_fence(s)).ok())
            .ok_or_else(|| anyhow::anyhow!("Invalid LLM response format").into())
    }
}

fn strip_code_fence(s: &str) -> &str {
    let trimmed = s.trim();
    trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .map(str::trim)
        .unwrap_or(trimmed)
}

/// Validates and normalizes raw generator JSON into a two-option candidate.
pub fn coerce_candidate(
    v: &JsonValue,
    rng: &mut impl rand::Rng,
) -> std::result::Result<CandidateQuestion, GenerationError> {
    let malformed = |msg: &str| GenerationError::Transient(format!("malformed generator output: {}", msg));

    let question_text = v
        .get("question")
        .and_then(|s| s.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| malformed("missing question"))?;

    let mut options: Vec<String> = v
        .get("options")
        .and_then(|o| o.as_array())
        .map(|a| {
            a.iter()
                .filter_map(|x| x.as_str())
                .map(|x| x.trim().to_string())
                .filter(|x| !x.is_empty())
                .collect()
        })
        .unwrap_or_default();
    if options.len() != 2 {
        return Err(malformed(&format!("expected 2 options, got {}", options.len())));
    }
    if options[0].eq_ignore_ascii_case(&options[1]) {
        return Err(malformed("options are identical"));
    }

    let correct_answer = match v.get("correct_answer") {
        Some(JsonValue::String(s)) => options
            .iter()
            .find(|o| o.trim().eq_ignore_ascii_case(s.trim()))
            .cloned(),
        Some(JsonValue::Number(n)) => n
            .as_u64()
            .and_then(|i| options.get(i as usize))
            .cloned(),
        _ => None,
    }
    .ok_or_else(|| malformed("correct_answer does not match an option"))?;

    options.shuffle(rng);

    let explanation = v
        .get("explanation")
        .and_then(|s| s.as_str())
        .map(|s| s.trim().to_string())
        .unwrap_or_default();
    let difficulty = v
        .get("difficulty")
        .and_then(|d| d.as_f64())
        .filter(|d| d.is_finite())
        .map(|d| d.clamp(0.0, 1.0));
    let category = v
        .get("category")
        .and_then(|s| s.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());

    let mut tags: Vec<String> = Vec::new();
    if let Some(arr) = v.get("tags").and_then(|a| a.as_array()) {
        for tag in arr.iter().filter_map(|t| t.as_str()) {
            let tag = tag.trim().to_lowercase();
            if !tag.is_empty() && !tags.contains(&tag) {
                tags.push(tag);
            }
        }
    }

    Ok(CandidateQuestion {
        question_text,
        options,
        correct_answer,
        explanation,
        difficulty,
        category,
        tags,
    })
}

/// OpenAI-compatible chat + embeddings endpoints (hosted or local).
#[derive(Clone)]
pub struct OpenAiGenerator {
    chat: AIService,
    embeddings: EmbedService,
}

impl OpenAiGenerator {
    pub fn new(chat: AIService, embeddings: EmbedService) -> Self {
        Self { chat, embeddings }
    }
}

fn as_transient(err: Error) -> GenerationError {
    match err {
        Error::Generation(g) => g,
        other => GenerationError::Transient(other.to_string()),
    }
}

#[async_trait]
impl ContentGenerator for OpenAiGenerator {
    async fn generate(&self, prompt: &GenerationPrompt) -> std::result::Result<CandidateQuestion, GenerationError> {
        self.chat.generate_question(prompt).await.map_err(as_transient)
    }

    async fn embed(&self, text: &str) -> std::result::Result<Vec<f32>, GenerationError> {
        self.embeddings.embed_one(text).await.map_err(as_transient)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    #[test]
    fn coerce_accepts_text_answer_and_keeps_it_among_options() {
        let raw = serde_json::json!({
            "question": "  Which protocol encrypts web traffic? ",
            "options": ["HTTP", "HTTPS"],
            "correct_answer": "https",
            "explanation": "TLS.",
            "difficulty": 1.7,
            "tags": ["TLS", "web", "tls"]
        });
        let c = coerce_candidate(&raw, &mut rng()).unwrap();
        assert_eq!(c.question_text, "Which protocol encrypts web traffic?");
        assert_eq!(c.correct_answer, "HTTPS");
        assert!(c.options.contains(&c.correct_answer));
        assert_eq!(c.options.len(), 2);
        assert_eq!(c.difficulty, Some(1.0));
        assert_eq!(c.tags, vec!["tls".to_string(), "web".to_string()]);
        assert_eq!(c.category, None);
    }

    #[test]
    fn coerce_maps_index_answers() {
        let raw = serde_json::json!({
            "question": "Q?",
            "options": ["A", "B"],
            "correct_answer": 1
        });
        let c = coerce_candidate(&raw, &mut rng()).unwrap();
        assert_eq!(c.correct_answer, "B");
    }

    #[test]
    fn coerce_rejects_malformed_output_as_transient() {
        let cases = [
            serde_json::json!({}),
            serde_json::json!({"question": "Q?", "options": ["A"], "correct_answer": "A"}),
            serde_json::json!({"question": "Q?", "options": ["A", "B", "C"], "correct_answer": "A"}),
            serde_json::json!({"question": "Q?", "options": ["A", "B"], "correct_answer": "C"}),
            serde_json::json!({"question": "Q?", "options": ["A", "a"], "correct_answer": "A"}),
        ];
        for raw in cases {
            let err = coerce_candidate(&raw, &mut rng()).unwrap_err();
            assert!(err.is_transient(), "{:?} should be transient", raw);
        }
    }

    #[test]
    fn prompt_carries_constraints_context_and_retry_note() {
        let prompt = GenerationPrompt {
            slot: GenerationSlot::new("Cryptography", "Scenario", "Hard", "Tool"),
            structured: true,
            context: vec![ContextItem {
                id: uuid::Uuid::new_v4(),
                title: "New TLS downgrade attack".into(),
                summary: "Researchers showed...".into(),
                link: None,
                tags: vec!["tls".into()],
                used_at: None,
                published_at: None,
            }],
            attempt: 1,
        };
        let msg = prompt.user_message();
        assert_eq!(msg["constraints"]["domain"], "Cryptography");
        assert_eq!(msg["recent_news"][0]["title"], "New TLS downgrade attack");
        assert!(msg["variation"].as_str().unwrap().contains("Attempt 2"));
    }

    #[test]
    fn unstructured_first_attempt_uses_topic_without_variation() {
        let prompt = GenerationPrompt {
            slot: GenerationSlot::fallback(),
            structured: false,
            context: vec![],
            attempt: 0,
        };
        let msg = prompt.user_message();
        assert_eq!(msg["topic"], "General");
        assert!(msg.get("constraints").is_none());
        assert!(msg.get("variation").is_none());
        assert!(msg.get("recent_news").is_none());
    }

    #[test]
    fn code_fences_are_stripped() {
        assert_eq!(strip_code_fence("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fence(" {\"a\":1} "), "{\"a\":1}");
    }
}
