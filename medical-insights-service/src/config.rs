use anyhow::{Context as _, Result, anyhow};
use std::str::FromStr;
use std::time::Duration;

/// Process-wide settings, read once from the environment at startup.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub openrouter_api_key: String,
    pub openrouter_base_url: String,
    pub text_model: String,
    pub vision_model: String,
    pub temperature: f64,
    pub max_tokens: u32,
    pub generation_timeout: Option<Duration>,
    pub database_url: Option<String>,
    pub queue_capacity: usize,
    pub port: u16,
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup so tests need not touch the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let openrouter_api_key = get("OPENROUTER_API_KEY")
            .ok_or_else(|| anyhow!("OPENROUTER_API_KEY environment variable is required"))?;

        let timeout_secs: u64 = parse_or(&get, "GENERATION_TIMEOUT_SECS", 120)?;

        Ok(Self {
            openrouter_api_key,
            openrouter_base_url: get("OPENROUTER_BASE_URL")
                .unwrap_or_else(|| "https://openrouter.ai/api/v1".to_string()),
            text_model: get("TEXT_MODEL").unwrap_or_else(|| "openai/gpt-4.1-mini".to_string()),
            vision_model: get("VISION_MODEL")
                .unwrap_or_else(|| "openai/gpt-4.1-mini".to_string()),
            temperature: parse_or(&get, "GENERATION_TEMPERATURE", 0.2)?,
            max_tokens: parse_or(&get, "GENERATION_MAX_TOKENS", 2000)?,
            generation_timeout: (timeout_secs > 0).then(|| Duration::from_secs(timeout_secs)),
            database_url: get("DATABASE_URL"),
            queue_capacity: parse_or(&get, "PIPELINE_QUEUE_CAPACITY", 64)?,
            port: parse_or(&get, "PORT", 3000)?,
        })
    }
}

fn parse_or<T>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("invalid value for {}: {:?}", key, raw)),
        None => Ok(default),
    }
}
