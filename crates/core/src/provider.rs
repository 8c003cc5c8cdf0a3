//! Provider trait — the abstraction over chat completion backends.
//!
//! A Provider knows how to send a short conversation to an LLM and get a
//! complete answer back.
//!
//! Implementations: OpenAI-compatible endpoints and a local simulation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use crate::error::ProviderError;
use crate::message::Message;

/// Configuration for a provider request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderRequest {
    /// The model to use (e.g., "gpt-3.5-turbo", "gpt-4o")
    pub model: String,

    /// The conversation messages
    pub messages: Vec<Message>,

    /// Temperature (0.0 = deterministic, 2.0 = very creative)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

fn default_temperature() -> f32 {
    0.7
}

impl ProviderRequest {
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature: default_temperature(),
            max_tokens: None,
        }
    }

    /// The last user message, if any.
    pub fn last_user_text(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == crate::message::Role::User)
            .map(|m| m.content.as_str())
    }
}

/// A complete response from a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderResponse {
    /// The generated message
    pub message: Message,

    /// Token usage statistics
    pub usage: Option<Usage>,

    /// Which model actually responded (may differ from requested)
    pub model: String,

    /// Name of the provider that produced the answer
    pub provider: String,

    /// Provider-specific metadata
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

/// Token usage information.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// The core Provider trait.
///
/// The chat handler calls `complete()` without knowing which backend
/// answers; the fallback chain decides.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this provider (e.g., "openai", "simulation").
    fn name(&self) -> &str;

    /// Send a request and get a complete response.
    async fn complete(&self, request: ProviderRequest) -> std::result::Result<ProviderResponse, ProviderError>;

    /// Health check — can we reach the provider?
    async fn health_check(&self) -> std::result::Result<bool, ProviderError> {
        Ok(true)
    }
}
