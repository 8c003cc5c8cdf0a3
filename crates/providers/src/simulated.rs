//! Offline backends used when no API key is configured or every real
//! backend failed. Their output is clearly marked as simulated.

use aenki_core::error::{ProviderError, SpeechError};
use aenki_core::message::Message;
use aenki_core::provider::{Provider, ProviderRequest, ProviderResponse};
use aenki_core::speech::{SpeechRequest, SpeechResponse, SpeechSynthesizer};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use rand::seq::IndexedRandom;

pub const SIMULATION: &str = "simulation";

const CANNED_ANSWERS: &[&str] = &[
    "Based on current longevity research, it is important to keep an integral approach that includes nutrition, exercise and stress management.",
    "Recent studies suggest that moderate caloric restriction and regular exercise can have positive effects on healthy aging.",
    "The science of longevity is evolving quickly. I always recommend consulting a health professional.",
    "Personalized medicine is changing how we understand aging and disease prevention.",
    "Biological markers of aging help us understand how to optimize long-term health.",
];

const PROMPT_EXCERPT_CHARS: usize = 50;

/// Answers with a canned sentence plus a note quoting the prompt.
#[derive(Debug, Default)]
pub struct SimulatedProvider;

impl SimulatedProvider {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Provider for SimulatedProvider {
    fn name(&self) -> &str {
        SIMULATION
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let answer = CANNED_ANSWERS
            .choose(&mut rand::rng())
            .copied()
            .unwrap_or(CANNED_ANSWERS[0]);
        let prompt = request.last_user_text().unwrap_or_default();
        let excerpt: String = prompt.chars().take(PROMPT_EXCERPT_CHARS).collect();

        let content = format!(
            "{answer}\n\n[Simulated response - configure OPENAI_API_KEY for real answers based on: \"{excerpt}...\"]"
        );

        Ok(ProviderResponse {
            message: Message::assistant(content),
            usage: None,
            model: SIMULATION.into(),
            provider: SIMULATION.into(),
            metadata: serde_json::Map::new(),
        })
    }
}

/// Produces a base64 placeholder instead of audio.
#[derive(Debug, Default)]
pub struct SimulatedSynthesizer;

impl SimulatedSynthesizer {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SpeechSynthesizer for SimulatedSynthesizer {
    fn name(&self) -> &str {
        SIMULATION
    }

    async fn synthesize(&self, request: SpeechRequest) -> Result<SpeechResponse, SpeechError> {
        let marker = format!(
            "SIMULATED_AUDIO_{}_{}",
            request.text.chars().count(),
            chrono::Utc::now().timestamp_millis()
        );
        Ok(SpeechResponse {
            audio_content: STANDARD.encode(marker),
            format: "mp3".into(),
            provider: SIMULATION.into(),
            note: Some("This is simulated audio data - configure GOOGLE_API_KEY for real TTS".into()),
        })
    }
}
