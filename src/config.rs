use crate::error::{Error, Result};
use dotenvy::dotenv;
use std::env;
use std::sync::OnceLock;

#[derive(Debug, Clone)]
pub struct Config {
    pub server_address: String,
    pub database_url: String,
    pub openai_api_key: String,
    pub openai_base_url: String,
    pub chat_model: String,
    pub embedding_model: String,
    pub embedding_dimensions: usize,
    pub qdrant_url: Option<String>,
    pub qdrant_collection: String,
    pub duplicate_threshold: f64,
    pub similarity_display_threshold: f64,
    pub llm_timeout_secs: u64,
    pub retry_backoff_ms: u64,
    pub slot_window_hours: i64,
    pub default_buffer_size: i32,
    pub admin_rps: u32,
    pub refill_interval_secs: u64,
}

pub static CONFIG: OnceLock<Config> = OnceLock::new();

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let config = Self {
            server_address: get_env("SERVER_ADDRESS")?,
            database_url: get_env("DATABASE_URL")?,
            openai_api_key: get_env("OPENAI_API_KEY")?,
            openai_base_url: get_env_or("OPENAI_BASE_URL", "https://api.openai.com/v1")
                .trim_end_matches('/')
                .to_string(),
            chat_model: get_env_or("CHAT_MODEL", "gpt-4o-mini"),
            embedding_model: get_env_or("EMBEDDING_MODEL", "text-embedding-3-small"),
            embedding_dimensions: get_env_parse_or("EMBEDDING_DIMENSIONS", 1536)?,
            qdrant_url: env::var("QDRANT_URL").ok().filter(|s| !s.trim().is_empty()),
            qdrant_collection: get_env_or("QDRANT_COLLECTION", "questions"),
            duplicate_threshold: get_env_parse_or("DUPLICATE_THRESHOLD", 0.97)?,
            similarity_display_threshold: get_env_parse_or("SIMILARITY_DISPLAY_THRESHOLD", 0.75)?,
            llm_timeout_secs: get_env_parse_or("LLM_TIMEOUT_SECS", 90)?,
            retry_backoff_ms: get_env_parse_or("RETRY_BACKOFF_MS", 500)?,
            slot_window_hours: get_env_parse_or("SLOT_WINDOW_HOURS", 24)?,
            default_buffer_size: get_env_parse_or("DEFAULT_BUFFER_SIZE", 10)?,
            admin_rps: get_env_parse_or("ADMIN_RPS", 20)?,
            refill_interval_secs: get_env_parse_or("REFILL_INTERVAL_SECS", 300)?,
        };

        if config.similarity_display_threshold >= config.duplicate_threshold {
            return Err(Error::Config(format!(
                "SIMILARITY_DISPLAY_THRESHOLD ({}) must be below DUPLICATE_THRESHOLD ({})",
                config.similarity_display_threshold, config.duplicate_threshold
            )));
        }

        Ok(config)
    }
}

fn get_env(name: &str) -> Result<String> {
    env::var(name).map_err(|_| Error::Config(format!("Missing environment variable: {}", name)))
}

fn get_env_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn get_env_parse_or<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| Error::Config(format!("Invalid value for {}: {}", name, e))),
        Err(_) => Ok(default),
    }
}

pub fn init_config() -> Result<()> {
    let config = Config::from_env()?;
    CONFIG
        .set(config)
        .map_err(|_| Error::Config("Configuration has already been initialized".to_string()))?;
    Ok(())
}

pub fn get_config() -> &'static Config {
    CONFIG
        .get()
        .expect("Configuration has not been initialized")
}
