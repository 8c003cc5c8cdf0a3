//! OpenAI-compatible provider implementation.
//!
//! Works with OpenAI, OpenRouter, Ollama, vLLM and any endpoint exposing
//! `/chat/completions` in the OpenAI wire format.

use std::time::Duration;

use aenki_core::error::ProviderError;
use aenki_core::message::Message;
use aenki_core::provider::*;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// An OpenAI-compatible chat provider.
pub struct OpenAiCompatProvider {
    name: String,
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    /// Create a new OpenAI-compatible provider with the given request timeout.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "Falling back to default HTTP client");
                reqwest::Client::new()
            });

        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client,
        }
    }

    /// Create an OpenAI provider (convenience constructor).
    pub fn openai(api_key: impl Into<String>, timeout: Duration) -> Self {
        Self::new("openai", "https://api.openai.com/v1", api_key, timeout)
    }

    /// Convert our Message types to OpenAI API format.
    fn to_api_messages(messages: &[Message]) -> Vec<ApiMessage> {
        messages
            .iter()
            .map(|m| ApiMessage {
                role: m.role.as_str().into(),
                content: Some(m.content.clone()),
            })
            .collect()
    }
}

#[async_trait]
impl aenki_core::Provider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(
        &self,
        request: ProviderRequest,
    ) -> std::result::Result<ProviderResponse, ProviderError> {
        let url = format!("{}/chat/completions", self.base_url);

        let mut body = serde_json::json!({
            "model": request.model,
            "messages": Self::to_api_messages(&request.messages),
            "temperature": request.temperature,
        });

        if let Some(max_tokens) = request.max_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }

        debug!(provider = %self.name, model = %request.model, "Sending completion request");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(e.to_string())
                } else {
                    ProviderError::Network(e.to_string())
                }
            })?;

        let status = response.status().as_u16();

        if status == 429 {
            let retry_after_secs = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok())
                .unwrap_or(5);
            return Err(ProviderError::RateLimited { retry_after_secs });
        }

        if status == 401 || status == 403 {
            return Err(ProviderError::AuthenticationFailed(
                "Invalid API key or insufficient permissions".into(),
            ));
        }

        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Provider returned error");
            return Err(ProviderError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        let api_response: ApiResponse =
            response.json().await.map_err(|e| ProviderError::ApiError {
                status_code: 200,
                message: format!("Failed to parse response: {e}"),
            })?;

        let choice =
            api_response
                .choices
                .into_iter()
                .next()
                .ok_or_else(|| ProviderError::ApiError {
                    status_code: 200,
                    message: "No choices in response".into(),
                })?;

        let content = choice
            .message
            .content
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| "No response generated".into());

        let usage = api_response.usage.map(|u| Usage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        });

        Ok(ProviderResponse {
            message: Message::assistant(content),
            usage,
            model: api_response.model.unwrap_or(request.model),
            provider: self.name.clone(),
            metadata: serde_json::Map::new(),
        })
    }

    async fn health_check(&self) -> std::result::Result<bool, ProviderError> {
        let url = format!("{}/models", self.base_url);
        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        Ok(response.status().is_success())
    }
}

// ── OpenAI API types ──────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    model: Option<String>,
    choices: Vec<ApiChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}
