// AI Provider Service
// Text-generation seam used by the grading pipeline, plus the HTTP client behind it

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::info;

use super::config_store::AppConfig;

const OPENAI_DEFAULT_URL: &str = "https://api.openai.com/v1/chat/completions";
const DEEPSEEK_DEFAULT_URL: &str = "https://api.deepseek.com/chat/completions";
const GLM_DEFAULT_URL: &str = "https://open.bigmodel.cn/api/paas/v4/chat/completions";
const GEMINI_DEFAULT_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

pub const DEFAULT_PROVIDER: &str = "gemini";
const MAX_OUTPUT_TOKENS: i32 = 4096;
const TEMPERATURE: f64 = 0.1;

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
    #[error("API key not configured for provider '{0}'")]
    MissingApiKey(String),
    #[error("Unsupported provider '{0}'")]
    UnsupportedProvider(String),
}

impl ProviderError {
    /// Configuration problems will not fix themselves on retry
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            ProviderError::MissingApiKey(_) | ProviderError::UnsupportedProvider(_)
        )
    }
}

/// External text-generation service
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn invoke(
        &self,
        system_instruction: &str,
        user_prompt: &str,
        timeout_secs: u64,
    ) -> Result<String, ProviderError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSpec {
    pub name: String,
    pub model: String,
}

pub fn parse_provider(spec: &str) -> ProviderSpec {
    let parts: Vec<&str> = spec.splitn(2, ':').collect();
    if parts.len() == 2 {
        ProviderSpec {
            name: parts[0].to_string(),
            model: parts[1].to_string(),
        }
    } else {
        ProviderSpec {
            name: spec.to_string(),
            model: String::new(),
        }
    }
}

pub fn default_model(provider: &str) -> &'static str {
    match provider {
        "openai" => "gpt-4o-mini",
        "deepseek" => "deepseek-chat",
        "glm" => "glm-4-flash",
        _ => "gemini-2.0-flash",
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

pub struct ProviderClient {
    client: Client,
    spec: ProviderSpec,
    api_key: Option<String>,
    base_url: String,
}

impl ProviderClient {
    /// `provider` is `name` or `name:model`
    pub fn new(provider: &str, api_key: Option<String>, base_url: Option<String>) -> Self {
        let mut spec = parse_provider(provider.trim());
        if spec.model.trim().is_empty() {
            spec.model = default_model(&spec.name).to_string();
        }
        let base_url = base_url.unwrap_or_else(|| default_url(&spec.name));
        let client = Client::builder()
            .timeout(Duration::from_secs(180))
            .build()
            .unwrap_or_default();

        Self {
            client,
            spec,
            api_key,
            base_url,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        let provider = config
            .default_provider
            .clone()
            .unwrap_or_else(|| DEFAULT_PROVIDER.to_string());
        let spec = parse_provider(&provider);
        let provider_config = config.providers.get(&spec.name);

        let provider = match provider_config.and_then(|p| p.model.clone()) {
            Some(model) if spec.model.is_empty() => format!("{}:{}", spec.name, model),
            _ => provider,
        };
        let base_url = provider_config
            .and_then(|p| p.base_url.clone())
            .or_else(|| env_url(&spec.name));
        let api_key = get_api_key(&spec.name)
            .or_else(|| config.api_keys.get(&spec.name).cloned());

        Self::new(&provider, api_key, base_url)
    }

    pub fn provider_name(&self) -> &str {
        &self.spec.name
    }

    pub fn model(&self) -> &str {
        &self.spec.model
    }

    async fn call_chat_api(
        &self,
        api_key: &str,
        system: &str,
        user: &str,
        timeout: Duration,
    ) -> Result<String, ProviderError> {
        let request = ChatRequest {
            model: self.spec.model.clone(),
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
            max_tokens: MAX_OUTPUT_TOKENS,
            temperature: TEMPERATURE,
        };

        let response = self
            .client
            .post(&self.base_url)
            .timeout(timeout)
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

        let data: ChatResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::JsonError(e.to_string()))?;

        data.choices
            .as_ref()
            .and_then(|c| c.first())
            .and_then(|c| c.message.as_ref())
            .and_then(|m| m.content.clone())
            .ok_or(ProviderError::MissingContent)
    }

    async fn call_gemini_api(
        &self,
        api_key: &str,
        system: &str,
        user: &str,
        timeout: Duration,
    ) -> Result<String, ProviderError> {
        let url = format!(
            "{}/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            self.spec.model
        );
        let request = serde_json::json!({
            "systemInstruction": { "parts": [{ "text": system }] },
            "contents": [{ "role": "user", "parts": [{ "text": user }] }],
            "generationConfig": {
                "temperature": TEMPERATURE,
                "maxOutputTokens": MAX_OUTPUT_TOKENS
            }
        });

        let response = self
            .client
            .post(&url)
            .timeout(timeout)
            .header("x-goog-api-key", api_key)
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

        // {"candidates":[{"content":{"parts":[{"text":"..."}]}}]}
        let data: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ProviderError::JsonError(e.to_string()))?;

        data["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .map(|s| s.to_string())
            .ok_or(ProviderError::MissingContent)
    }
}

#[async_trait]
impl TextGenerator for ProviderClient {
    async fn invoke(
        &self,
        system_instruction: &str,
        user_prompt: &str,
        timeout_secs: u64,
    ) -> Result<String, ProviderError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ProviderError::MissingApiKey(self.spec.name.clone()))?;
        let timeout = Duration::from_secs(timeout_secs.max(1));
        let start = Instant::now();

        let content = match self.spec.name.as_str() {
            "gemini" => {
                self.call_gemini_api(api_key, system_instruction, user_prompt, timeout)
                    .await?
            }
            "openai" | "deepseek" | "glm" => {
                self.call_chat_api(api_key, system_instruction, user_prompt, timeout)
                    .await?
            }
            other => return Err(ProviderError::UnsupportedProvider(other.to_string())),
        };

        info!(
            "[PROVIDER] {}:{} ok latency_ms={} chars={}",
            self.spec.name,
            self.spec.model,
            start.elapsed().as_millis(),
            content.chars().count()
        );
        Ok(content)
    }
}

fn default_url(provider: &str) -> String {
    env_url(provider).unwrap_or_else(|| {
        match provider {
            "openai" => OPENAI_DEFAULT_URL,
            "deepseek" => DEEPSEEK_DEFAULT_URL,
            "glm" => GLM_DEFAULT_URL,
            _ => GEMINI_DEFAULT_URL,
        }
        .to_string()
    })
}

fn env_url(provider: &str) -> Option<String> {
    let var = match provider {
        "openai" => "OPENAI_API_URL",
        "deepseek" => "DEEPSEEK_API_URL",
        "glm" => "GLM_API_URL",
        "gemini" => "GEMINI_API_URL",
        _ => return None,
    };
    env::var(var).ok().filter(|v| !v.trim().is_empty())
}

/// Get API key from environment or config file
pub fn get_api_key(provider: &str) -> Option<String> {
    let env_keys = match provider {
        "openai" => vec!["OPENAI_API_KEY", "GRADESHIELD_OPENAI_API_KEY"],
        "gemini" => vec!["GEMINI_API_KEY", "GOOGLE_API_KEY", "GRADESHIELD_GEMINI_API_KEY"],
        "deepseek" => vec!["DEEPSEEK_API_KEY", "GRADESHIELD_DEEPSEEK_API_KEY"],
        "glm" => vec!["GLM_API_KEY", "GRADESHIELD_GLM_API_KEY"],
        "serper" => vec!["SERPER_API_KEY", "GRADESHIELD_SERPER_API_KEY"],
        _ => vec![],
    };

    for key in env_keys {
        if let Ok(val) = env::var(key) {
            let v = val.trim();
            if !v.is_empty() {
                return Some(v.to_string());
            }
        }
    }

    if let Some(config_dir) = super::ConfigStore::default_config_dir() {
        let store = super::ConfigStore::new(config_dir);
        if let Ok(Some(key)) = store.get_api_key(provider) {
            return Some(key);
        }
    }

    None
}
