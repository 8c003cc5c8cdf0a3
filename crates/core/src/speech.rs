//! SpeechSynthesizer trait — the abstraction over text-to-speech backends.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use crate::error::SpeechError;

/// A text-to-speech request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechRequest {
    pub text: String,
    /// BCP-47 language code, e.g. "es-ES"
    pub language: String,
    /// Backend voice name, e.g. "es-ES-Wavenet-D"
    pub voice: String,
}

/// Synthesized audio.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechResponse {
    /// Base64-encoded audio bytes
    pub audio_content: String,
    /// Audio container, currently always "mp3"
    pub format: String,
    pub provider: String,
    /// Set when the audio is not real speech
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    fn name(&self) -> &str;

    async fn synthesize(&self, request: SpeechRequest) -> std::result::Result<SpeechResponse, SpeechError>;
}
