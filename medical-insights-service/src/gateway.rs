//! Generation Gateway: binds a stage prompt, calls the generation service and
//! recovers JSON from whatever comes back.

use anyhow::anyhow;
use async_trait::async_trait;
use reqwest::Client;
use rig::{client::CompletionClient, completion::Prompt, providers::openrouter};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::ServiceConfig;
use crate::extract::extract_json;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("prompt template references unbound variable `{0}`")]
    MissingVariable(String),

    #[error("generation service call failed: {0}")]
    Service(anyhow::Error),

    #[error("generation service did not answer within {0:?}")]
    Timeout(Duration),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: MessageContent,
}

impl ChatMessage {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn user_parts(parts: Vec<ContentPart>) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Parts(parts),
        }
    }

    pub fn text(&self) -> Option<&str> {
        match &self.content {
            MessageContent::Text(text) => Some(text),
            MessageContent::Parts(_) => None,
        }
    }
}

/// One chat-completion exchange. The model is chosen by the service from `vision`.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub messages: Vec<ChatMessage>,
    pub temperature: f64,
    pub max_tokens: u32,
    pub vision: bool,
}

impl GenerationRequest {
    pub fn system_prompt(&self) -> Option<&str> {
        self.messages
            .iter()
            .find(|m| m.role == Role::System)
            .and_then(ChatMessage::text)
    }

    pub fn user_text(&self) -> Option<&str> {
        self.messages
            .iter()
            .find(|m| m.role == Role::User)
            .and_then(|m| match &m.content {
                MessageContent::Text(text) => Some(text.as_str()),
                MessageContent::Parts(parts) => parts.iter().find_map(|p| match p {
                    ContentPart::Text { text } => Some(text.as_str()),
                    ContentPart::ImageUrl { .. } => None,
                }),
            })
    }

    pub fn image_urls(&self) -> Vec<&str> {
        self.messages
            .iter()
            .filter_map(|m| match &m.content {
                MessageContent::Parts(parts) => Some(parts),
                MessageContent::Text(_) => None,
            })
            .flatten()
            .filter_map(|p| match p {
                ContentPart::ImageUrl { image_url } => Some(image_url.url.as_str()),
                ContentPart::Text { .. } => None,
            })
            .collect()
    }
}

/// The external text/vision generation service.
#[async_trait]
pub trait GenerationService: Send + Sync {
    /// Return the raw textual completion for `request`.
    async fn complete(&self, request: GenerationRequest) -> anyhow::Result<String>;
}

/// OpenRouter-backed generation service.
///
/// Plain system + user exchanges go through a rig agent; multi-part (image)
/// messages are posted to the chat-completions endpoint directly. Both use
/// the configured base URL.
pub struct OpenRouterService {
    api_key: String,
    base_url: String,
    text_model: String,
    vision_model: String,
    agents: openrouter::Client,
    http: Client,
}

impl OpenRouterService {
    pub fn new(config: &ServiceConfig) -> anyhow::Result<Self> {
        let base_url = config.openrouter_base_url.trim_end_matches('/').to_string();
        let agents = openrouter::Client::builder(&config.openrouter_api_key)
            .base_url(&base_url)
            .build()
            .map_err(|e| anyhow!("could not build OpenRouter client: {}", e))?;

        Ok(Self {
            api_key: config.openrouter_api_key.clone(),
            base_url,
            text_model: config.text_model.clone(),
            vision_model: config.vision_model.clone(),
            agents,
            http: Client::new(),
        })
    }

    async fn complete_with_agent(
        &self,
        system: &str,
        user: &str,
        request: &GenerationRequest,
    ) -> anyhow::Result<String> {
        let agent = self
            .agents
            .agent(&self.text_model)
            .preamble(system)
            .temperature(request.temperature)
            .max_tokens(u64::from(request.max_tokens))
            .build();

        let response = agent.prompt(user).await?;
        Ok(response)
    }

    async fn complete_over_http(
        &self,
        model: &str,
        request: &GenerationRequest,
    ) -> anyhow::Result<String> {
        let payload = json!({
            "model": model,
            "messages": request.messages,
            "temperature": request.temperature,
            "max_tokens": request.max_tokens
        });

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(anyhow!("LLM API request failed: {}", response.status()));
        }

        let response_json: Value = response.json().await?;

        let content = response_json["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| anyhow!("Invalid response format from LLM"))?;

        Ok(content.to_string())
    }
}

#[async_trait]
impl GenerationService for OpenRouterService {
    async fn complete(&self, request: GenerationRequest) -> anyhow::Result<String> {
        if !request.vision {
            if let [system, user] = request.messages.as_slice() {
                if let (Role::System, Some(system), Some(user)) =
                    (system.role, system.text(), user.text())
                {
                    return self.complete_with_agent(system, user, &request).await;
                }
            }
        }

        let model = if request.vision {
            &self.vision_model
        } else {
            &self.text_model
        };
        self.complete_over_http(model, &request).await
    }
}

/// Sampling and time limits applied to every gateway call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationSettings {
    pub temperature: f64,
    pub max_tokens: u32,
    /// `None` lets a call run for as long as the service takes.
    pub timeout: Option<Duration>,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            max_tokens: 2000,
            timeout: Some(Duration::from_secs(120)),
        }
    }
}

impl From<&ServiceConfig> for GenerationSettings {
    fn from(config: &ServiceConfig) -> Self {
        Self {
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            timeout: config.generation_timeout,
        }
    }
}

#[derive(Clone)]
pub struct GenerationGateway {
    service: Arc<dyn GenerationService>,
    settings: GenerationSettings,
}

impl GenerationGateway {
    pub fn new(service: Arc<dyn GenerationService>, settings: GenerationSettings) -> Self {
        Self { service, settings }
    }

    /// Bind `template`, send it with `user_payload` and extract JSON from the reply.
    ///
    /// `Ok(None)` means the service answered but no JSON could be recovered;
    /// whether that is fatal is up to the calling stage.
    pub async fn invoke(
        &self,
        template: &str,
        variables: &[(&str, &str)],
        user_payload: &str,
    ) -> Result<Option<Value>, GatewayError> {
        let system_prompt = bind_template(template, variables)?;
        let request = GenerationRequest {
            messages: vec![
                ChatMessage::system(system_prompt),
                ChatMessage::user(user_payload),
            ],
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
            vision: false,
        };

        let raw = self.complete(request).await?;
        Ok(self.extract(&raw))
    }

    /// Vision variant: `prompt` and an image reference in one multi-part user message.
    pub async fn invoke_vision(
        &self,
        prompt: &str,
        image_url: &str,
    ) -> Result<Option<Value>, GatewayError> {
        let raw = self.describe_images(prompt, &[image_url.to_string()]).await?;
        Ok(self.extract(&raw))
    }

    /// Vision call returning the raw text, for callers that want prose back.
    pub async fn describe_images(
        &self,
        prompt: &str,
        image_urls: &[String],
    ) -> Result<String, GatewayError> {
        let mut parts = vec![ContentPart::Text {
            text: prompt.to_string(),
        }];
        parts.extend(image_urls.iter().map(|url| ContentPart::ImageUrl {
            image_url: ImageUrl { url: url.clone() },
        }));

        let request = GenerationRequest {
            messages: vec![ChatMessage::user_parts(parts)],
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
            vision: true,
        };

        self.complete(request).await
    }

    async fn complete(&self, request: GenerationRequest) -> Result<String, GatewayError> {
        let call = self.service.complete(request);
        let raw = match self.settings.timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .map_err(|_| GatewayError::Timeout(limit))?,
            None => call.await,
        }
        .map_err(GatewayError::Service)?;

        debug!(response_len = raw.len(), "generation service responded");
        Ok(raw)
    }

    fn extract(&self, raw: &str) -> Option<Value> {
        let value = extract_json(raw);
        if value.is_none() {
            warn!("generation response contained no recoverable JSON");
        } else {
            info!("structured response recovered");
        }
        value
    }
}

/// Substitute `{name}` placeholders. `{{` and `}}` produce literal braces and any
/// other brace is copied as-is. A placeholder without a binding is an error.
pub fn bind_template(template: &str, variables: &[(&str, &str)]) -> Result<String, GatewayError> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(pos) = rest.find(['{', '}']) {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];

        if tail.starts_with("{{") {
            out.push('{');
            rest = &tail[2..];
        } else if tail.starts_with("}}") {
            out.push('}');
            rest = &tail[2..];
        } else if let Some(name) = placeholder_name(tail) {
            let value = variables
                .iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| *value)
                .ok_or_else(|| GatewayError::MissingVariable(name.to_string()))?;
            out.push_str(value);
            rest = &tail[name.len() + 2..];
        } else {
            out.push_str(&tail[..1]);
            rest = &tail[1..];
        }
    }

    out.push_str(rest);
    Ok(out)
}

/// The identifier in a leading `{identifier}`, if `text` starts with one.
fn placeholder_name(text: &str) -> Option<&str> {
    let inner = text.strip_prefix('{')?;
    let end = inner.find('}')?;
    let name = &inner[..end];
    let mut chars = name.chars();
    let first = chars.next()?;
    if (first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        Some(name)
    } else {
        None
    }
}
