// AI Provider Service
// OpenAI-compatible chat completion and moderation calls behind the
// Generator / Moderator capabilities

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, warn};

use super::capabilities::{Completion, CompletionRequest, Generator, Moderator};
use super::config_store::{AppConfig, ConfigStore};
use super::errors::{GuardError, GuardResult};
use crate::models::ModerationVerdict;

const CHAT_DEFAULT_URL: &str = "https://api.openai.com/v1/chat/completions";
const MODERATION_DEFAULT_URL: &str = "https://api.openai.com/v1/moderations";
pub const CHAT_DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const MODERATION_DEFAULT_MODEL: &str = "omni-moderation-latest";
const REQUEST_TIMEOUT_SECS: u64 = 80;
const CHAT_MAX_TOKENS: i32 = 512;

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),
    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },
    #[error("Missing content in response")]
    MissingContent,
    #[error("JSON parse error: {0}")]
    JsonError(String),
    #[error("API key not configured")]
    MissingApiKey,
}

impl From<ProviderError> for GuardError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::JsonError(msg) => GuardError::MalformedResponse(msg),
            other => GuardError::Service(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Clone, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: i32,
    temperature: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Clone, Serialize)]
struct ResponseFormat {
    r#type: String,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatResponse {
    choices: Option<Vec<ChatChoice>>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatChoice {
    message: Option<ChatMessageResponse>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatMessageResponse {
    content: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
struct ModerationRequest {
    model: String,
    input: String,
}

#[derive(Debug, Clone, Deserialize)]
struct ModerationResponse {
    #[serde(default)]
    results: Vec<ModerationResult>,
}

#[derive(Debug, Clone, Deserialize)]
struct ModerationResult {
    flagged: bool,
    #[serde(default)]
    categories: BTreeMap<String, Option<bool>>,
    #[serde(default)]
    category_scores: BTreeMap<String, Option<f64>>,
}

impl From<ModerationResult> for ModerationVerdict {
    fn from(r: ModerationResult) -> Self {
        ModerationVerdict {
            flagged: r.flagged,
            categories: r
                .categories
                .into_iter()
                .map(|(k, v)| (k, v.unwrap_or(false)))
                .collect(),
            category_scores: r
                .category_scores
                .into_iter()
                .filter_map(|(k, v)| v.map(|s| (k, s)))
                .collect(),
        }
    }
}

pub struct ProviderClient {
    client: Client,
    api_key: Option<String>,
    chat_url: String,
    chat_model: String,
    moderation_url: String,
    moderation_model: String,
}

impl Default for ProviderClient {
    fn default() -> Self {
        Self::new()
    }
}

impl ProviderClient {
    pub fn new() -> Self {
        Self::from_config(&AppConfig::default())
            .unwrap_or_else(|_| Self::with_client(Client::new(), &AppConfig::default()))
    }

    /// Build from config. Environment variables win over config values,
    /// config values win over built-in defaults.
    pub fn from_config(config: &AppConfig) -> Result<Self, ProviderError> {
        let mut builder =
            Client::builder().timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS));
        if let Some(proxy_url) = config.proxy.as_ref().and_then(|p| p.active_url()) {
            builder = builder.proxy(reqwest::Proxy::all(proxy_url)?);
        }
        Ok(Self::with_client(builder.build()?, config))
    }

    fn with_client(client: Client, config: &AppConfig) -> Self {
        let pick = |var: &str, configured: &Option<String>, default: &str| {
            env::var(var)
                .ok()
                .filter(|v| !v.trim().is_empty())
                .or_else(|| configured.clone())
                .unwrap_or_else(|| default.to_string())
        };

        Self {
            client,
            api_key: get_api_key("openai", config),
            chat_url: pick("TOXIGUARD_CHAT_URL", &config.chat.base_url, CHAT_DEFAULT_URL),
            chat_model: pick("TOXIGUARD_CHAT_MODEL", &config.chat.model, CHAT_DEFAULT_MODEL),
            moderation_url: pick(
                "TOXIGUARD_MODERATION_URL",
                &config.moderation.base_url,
                MODERATION_DEFAULT_URL,
            ),
            moderation_model: pick(
                "TOXIGUARD_MODERATION_MODEL",
                &config.moderation.model,
                MODERATION_DEFAULT_MODEL,
            ),
        }
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    fn api_key(&self) -> Result<&str, ProviderError> {
        self.api_key.as_deref().ok_or(ProviderError::MissingApiKey)
    }

    pub async fn call_chat_api(
        &self,
        system: &str,
        user: &str,
        temperature: f64,
        use_json_format: bool,
    ) -> Result<String, ProviderError> {
        let api_key = self.api_key()?;
        let request = ChatRequest {
            model: self.chat_model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: system.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: user.to_string(),
                },
            ],
            max_tokens: CHAT_MAX_TOKENS,
            temperature,
            response_format: use_json_format.then(|| ResponseFormat {
                r#type: "json_object".to_string(),
            }),
        };

        let start = Instant::now();

        let response = self
            .client
            .post(&self.chat_url)
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        let latency_ms = start.elapsed().as_millis();
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::ApiError {
                status: status.as_u16(),
                message: body,
            });
        }

        let data: ChatResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::JsonError(e.to_string()))?;

        let content = data
            .choices
            .as_ref()
            .and_then(|c| c.first())
            .and_then(|c| c.message.as_ref())
            .and_then(|m| m.content.clone())
            .ok_or(ProviderError::MissingContent)?;

        debug!(
            "[PROVIDER] chat ok model={} temperature={} json={} latency_ms={}",
            self.chat_model, temperature, use_json_format, latency_ms
        );

        Ok(content)
    }

    pub async fn call_moderation_api(&self, input: &str) -> Result<ModerationVerdict, ProviderError> {
        let api_key = self.api_key()?;
        let request = ModerationRequest {
            model: self.moderation_model.clone(),
            input: input.to_string(),
        };

        let start = Instant::now();

        let response = self
            .client
            .post(&self.moderation_url)
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::ApiError {
                status: status.as_u16(),
                message: body,
            });
        }

        let body = response.text().await?;
        let verdict = parse_moderation_response(&body)?;
        debug!(
            "[PROVIDER] moderation ok model={} flagged={} latency_ms={}",
            self.moderation_model,
            verdict.flagged,
            start.elapsed().as_millis()
        );
        Ok(verdict)
    }
}

fn parse_moderation_response(body: &str) -> Result<ModerationVerdict, ProviderError> {
    let data: ModerationResponse =
        serde_json::from_str(body).map_err(|e| ProviderError::JsonError(e.to_string()))?;
    data.results
        .into_iter()
        .next()
        .map(ModerationVerdict::from)
        .ok_or_else(|| ProviderError::JsonError("moderation response has no results".to_string()))
}

/// Extract the outermost JSON object from model output that may carry prose or code fences.
pub fn extract_json(content: &str) -> Result<&str, ProviderError> {
    let content = content.trim();
    if content.starts_with('{') && content.ends_with('}') {
        return Ok(content);
    }
    match (content.find('{'), content.rfind('}')) {
        (Some(start), Some(end)) if start < end => Ok(&content[start..=end]),
        _ => Err(ProviderError::JsonError("No JSON object in response".to_string())),
    }
}

pub fn parse_json_payload(content: &str) -> GuardResult<serde_json::Value> {
    let json_str = extract_json(content)?;
    serde_json::from_str(json_str)
        .map_err(|e| GuardError::malformed(format!("JSON parse error: {}", e)))
}

#[async_trait]
impl Generator for ProviderClient {
    async fn complete(&self, request: &CompletionRequest) -> GuardResult<Completion> {
        let content = self
            .call_chat_api(
                &request.system,
                &request.user,
                request.temperature,
                request.expect_json,
            )
            .await
            .map_err(|e| {
                warn!("[PROVIDER] chat call failed: {}", e);
                GuardError::from(e)
            })?;

        if request.expect_json {
            parse_json_payload(&content).map(Completion::Structured)
        } else {
            Ok(Completion::Text(content))
        }
    }
}

#[async_trait]
impl Moderator for ProviderClient {
    async fn moderate(&self, text: &str) -> GuardResult<ModerationVerdict> {
        self.call_moderation_api(text).await.map_err(|e| {
            warn!("[PROVIDER] moderation call failed: {}", e);
            GuardError::from(e)
        })
    }
}

/// Get API key from environment or config
pub fn get_api_key(provider: &str, config: &AppConfig) -> Option<String> {
    let env_keys: &[&str] = match provider {
        "openai" => &["OPENAI_API_KEY", "TOXIGUARD_OPENAI_API_KEY"],
        _ => &[],
    };

    for key in env_keys {
        if let Ok(val) = env::var(key) {
            let v = val.trim();
            if !v.is_empty() {
                return Some(v.to_string());
            }
        }
    }

    if let Some(key) = config.api_keys.get(provider).filter(|k| !k.trim().is_empty()) {
        return Some(key.trim().to_string());
    }

    let store = ConfigStore::default_config_dir().map(ConfigStore::new)?;
    store.get_api_key(provider).ok().flatten()
}
