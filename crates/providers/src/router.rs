//! Builds the chat and speech chains from configuration.
//!
//! The configured real backend comes first when it has a key; the
//! simulation always closes the chain so callers get an answer.

use std::sync::Arc;
use std::time::Duration;

use aenki_config::{ChatConfig, TtsConfig};
use aenki_core::provider::Provider;
use aenki_core::speech::SpeechSynthesizer;
use tracing::{info, warn};

use crate::fallback::{FallbackProvider, FallbackSynthesizer};
use crate::google_tts::GoogleTtsSynthesizer;
use crate::openai_compat::OpenAiCompatProvider;
use crate::simulated::{SimulatedProvider, SimulatedSynthesizer};

/// Grace added on top of the HTTP client timeout before the chain gives up.
const CHAIN_GRACE: Duration = Duration::from_secs(5);

/// Build the chat chain: `[<configured provider>], simulation`.
pub fn build_chat_from_config(config: &ChatConfig) -> FallbackProvider {
    let timeout = Duration::from_secs(config.timeout_secs);
    let mut chain = FallbackProvider::new("chat");

    match config.api_key.as_deref().filter(|k| !k.is_empty()) {
        Some(api_key) => {
            let base_url = config
                .api_url
                .clone()
                .unwrap_or_else(|| default_base_url(&config.provider));
            let provider: Arc<dyn Provider> =
                Arc::new(OpenAiCompatProvider::new(&config.provider, base_url, api_key, timeout));
            info!(provider = %config.provider, model = %config.model, "Chat provider configured");
            chain = chain.add(provider, timeout + CHAIN_GRACE);
        }
        None => warn!("No chat API key configured, answers will be simulated"),
    }

    chain.add_default(Arc::new(SimulatedProvider::new()))
}

/// Build the speech chain: `[google], simulation`.
pub fn build_speech_from_config(config: &TtsConfig) -> FallbackSynthesizer {
    let timeout = Duration::from_secs(config.timeout_secs);
    let mut chain = FallbackSynthesizer::new("tts");

    match config.api_key.as_deref().filter(|k| !k.is_empty()) {
        Some(api_key) => {
            let synth: Arc<dyn SpeechSynthesizer> =
                Arc::new(GoogleTtsSynthesizer::new(&config.api_url, api_key, timeout));
            info!(voice = %config.default_voice, "Speech synthesizer configured");
            chain = chain.add(synth, timeout + CHAIN_GRACE);
        }
        None => warn!("No speech API key configured, audio will be simulated"),
    }

    chain.add_default(Arc::new(SimulatedSynthesizer::new()))
}

/// Get the default base URL for well-known OpenAI-compatible providers.
fn default_base_url(provider_name: &str) -> String {
    match provider_name {
        "openai" => "https://api.openai.com/v1".into(),
        "openrouter" => "https://openrouter.ai/api/v1".into(),
        "ollama" => "http://localhost:11434/v1".into(),
        "groq" => "https://api.groq.com/openai/v1".into(),
        "together" => "https://api.together.xyz/v1".into(),
        "vllm" => "http://localhost:8000/v1".into(),
        _ => format!("https://{provider_name}.api.example.com/v1"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_base_urls() {
        assert!(default_base_url("openai").contains("api.openai.com"));
        assert!(default_base_url("openrouter").contains("openrouter.ai"));
        assert!(default_base_url("ollama").contains("localhost:11434"));
    }

    #[test]
    fn chat_chain_without_key_is_simulation_only() {
        let chain = build_chat_from_config(&ChatConfig::default());
        assert_eq!(chain.names(), vec!["simulation"]);
    }

    #[test]
    fn chat_chain_with_key_puts_provider_first() {
        let config = ChatConfig {
            api_key: Some("sk-test".into()),
            ..ChatConfig::default()
        };
        let chain = build_chat_from_config(&config);
        assert_eq!(chain.names(), vec!["openai", "simulation"]);
    }

    #[test]
    fn empty_key_counts_as_missing() {
        let config = TtsConfig {
            api_key: Some(String::new()),
            ..TtsConfig::default()
        };
        assert_eq!(build_speech_from_config(&config).names(), vec!["simulation"]);

        let config = TtsConfig {
            api_key: Some("g-key".into()),
            ..TtsConfig::default()
        };
        assert_eq!(build_speech_from_config(&config).names(), vec!["google", "simulation"]);
    }

    #[tokio::test]
    async fn simulated_chain_answers() {
        use aenki_core::message::Message;
        use aenki_core::provider::ProviderRequest;

        let chain = build_chat_from_config(&ChatConfig::default());
        let response = chain
            .complete(ProviderRequest::new("gpt-4o-mini", vec![Message::user("hi")]))
            .await
            .unwrap();
        assert_eq!(response.model, "simulation");
    }
}
