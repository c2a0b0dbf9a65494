use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::sleep;
use tracing::warn;

use crate::config::{env_string, env_u64};

const DEFAULT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_API_ENDPOINT: &str = "https://api.openai.com/v1";
const DEFAULT_TIMEOUT_MS: u64 = 60_000;
const BASE_BACKOFF_MS: u64 = 200;

#[derive(Debug, Clone)]
pub struct LLMConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub api_endpoint: String,
    pub timeout: Duration,
    /// Extra attempts after the first; zero means a single call.
    pub max_retries: usize,
}

impl LLMConfig {
    pub fn from_env() -> Self {
        Self {
            api_key: env_string("LLM_API_KEY"),
            model: env_string("LLM_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            api_endpoint: normalize_endpoint(
                env_string("LLM_API_ENDPOINT")
                    .or_else(|| env_string("LLM_BASE_URL"))
                    .unwrap_or_else(|| DEFAULT_API_ENDPOINT.to_string()),
            ),
            timeout: Duration::from_millis(env_u64("LLM_TIMEOUT").unwrap_or(DEFAULT_TIMEOUT_MS)),
            max_retries: env_u64("LLM_MAX_RETRIES").unwrap_or(0).min(5) as usize,
        }
    }

    /// A provider with no key: every call fails with `NotConfigured`.
    pub fn disabled() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            api_endpoint: DEFAULT_API_ENDPOINT.to_string(),
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            max_retries: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".into(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponse {
    pub model: Option<String>,
    pub choices: Vec<ChatChoice>,
}

impl ChatResponse {
    pub fn first_content(&self) -> Option<&str> {
        self.choices.first().map(|c| c.message.content.as_str())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatChoice {
    pub message: ChatMessage,
}

#[derive(Debug, Error)]
pub enum LLMError {
    #[error("LLM not configured: {0}")]
    NotConfigured(&'static str),
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("HTTP {status}: {body}")]
    HttpStatus {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("JSON decode failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("empty response")]
    EmptyChoices,
    #[error("response did not contain a JSON payload")]
    MissingPayload,
}

#[derive(Clone)]
pub struct LLMProvider {
    config: LLMConfig,
    client: reqwest::Client,
}

impl LLMProvider {
    pub fn new(config: LLMConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { config, client }
    }

    pub fn from_env() -> Self {
        Self::new(LLMConfig::from_env())
    }

    pub fn is_available(&self) -> bool {
        self.config.api_key.as_deref().is_some_and(|v| !v.trim().is_empty())
            && !self.config.model.trim().is_empty()
            && !self.config.api_endpoint.trim().is_empty()
    }

    pub async fn chat(&self, messages: &[ChatMessage]) -> Result<ChatResponse, LLMError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .filter(|v| !v.trim().is_empty())
            .ok_or(LLMError::NotConfigured("LLM_API_KEY"))?;

        let url = format!("{}/chat/completions", self.config.api_endpoint.trim_end_matches('/'));
        let payload = serde_json::json!({
            "model": self.config.model,
            "messages": messages,
            "stream": false
        });

        self.post_with_retry(&url, api_key, &payload).await
    }

    pub async fn complete_with_system(&self, system: &str, user: &str) -> Result<String, LLMError> {
        let messages = [ChatMessage::system(system), ChatMessage::user(user)];
        let response = self.chat(&messages).await?;
        response
            .first_content()
            .map(|s| s.to_string())
            .ok_or(LLMError::EmptyChoices)
    }

    /// Sends the prompt pair and decodes the JSON object in the reply.
    pub async fn complete_json(
        &self,
        system: &str,
        user: &str,
    ) -> Result<serde_json::Value, LLMError> {
        let raw = self.complete_with_system(system, user).await?;
        let payload = extract_json_payload(&raw).ok_or(LLMError::MissingPayload)?;
        Ok(serde_json::from_str(payload)?)
    }

    async fn post_with_retry(
        &self,
        url: &str,
        api_key: &str,
        payload: &serde_json::Value,
    ) -> Result<ChatResponse, LLMError> {
        let max_retries = self.config.max_retries;
        let mut retry = 0;

        loop {
            let err = match self.client.post(url).bearer_auth(api_key).json(payload).send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        let bytes = resp.bytes().await?;
                        return serde_json::from_slice(&bytes).map_err(|e| {
                            tracing::error!(error = %e, "failed to parse LLM response JSON");
                            LLMError::Json(e)
                        });
                    }
                    let body = resp.text().await.unwrap_or_default();
                    let err = LLMError::HttpStatus { status, body };
                    if !is_retryable(status) {
                        return Err(err);
                    }
                    err
                }
                Err(e) => LLMError::Request(e),
            };

            if retry >= max_retries {
                return Err(err);
            }
            warn!(retry, error = %err, "LLM request failed, retrying");
            sleep(Duration::from_millis(BASE_BACKOFF_MS * (1 << retry))).await;
            retry += 1;
        }
    }
}

/// Slices the JSON object or array out of a model reply, skipping code
/// fences and any prose around them.
pub fn extract_json_payload(raw: &str) -> Option<&str> {
    let text = raw.trim();
    let text = match text.find("```") {
        Some(start) => {
            let after = &text[start + 3..];
            let body_start = after.find('\n').map(|i| i + 1).unwrap_or(0);
            let body = &after[body_start..];
            match body.find("```") {
                Some(end) => &body[..end],
                None => body,
            }
        }
        None => text,
    };

    let open = text.find(['{', '['])?;
    let close_char = if text[open..].starts_with('{') { '}' } else { ']' };
    let close = text.rfind(close_char)?;
    (close > open).then(|| text[open..=close].trim())
}

fn normalize_endpoint(endpoint: String) -> String {
    let trimmed = endpoint.trim().trim_end_matches('/');
    if trimmed.ends_with("/v1") || trimmed.contains("/v1/") {
        trimmed.to_string()
    } else {
        format!("{trimmed}/v1")
    }
}

fn is_retryable(status: reqwest::StatusCode) -> bool {
    status == reqwest::StatusCode::TOO_MANY_REQUESTS
        || status == reqwest::StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
}
