//! Provider fallback — ordered retry chain with per-provider timeouts.
//!
//! When a backend fails (timeout, rate limit, error), the next one in the
//! chain is tried. Chat and speech each get their own chain type.

use aenki_core::error::{ProviderError, SpeechError};
use aenki_core::provider::*;
use aenki_core::speech::{SpeechRequest, SpeechResponse, SpeechSynthesizer};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// A provider that wraps an ordered list of providers and falls back on failure.
pub struct FallbackProvider {
    name: String,
    chain: Vec<FallbackEntry<dyn Provider>>,
}

/// A single entry in a fallback chain.
struct FallbackEntry<T: ?Sized> {
    backend: Arc<T>,
    timeout: Duration,
}

impl FallbackProvider {
    /// Create a new fallback provider with no entries.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            chain: Vec::new(),
        }
    }

    /// Add a provider to the fallback chain with a custom timeout.
    pub fn add(mut self, provider: Arc<dyn Provider>, timeout: Duration) -> Self {
        self.chain.push(FallbackEntry {
            backend: provider,
            timeout,
        });
        self
    }

    /// Add a provider with the default timeout (30s).
    pub fn add_default(self, provider: Arc<dyn Provider>) -> Self {
        self.add(provider, DEFAULT_TIMEOUT)
    }

    /// Number of providers in the chain.
    pub fn len(&self) -> usize {
        self.chain.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }

    /// Names of the chained providers, in order.
    pub fn names(&self) -> Vec<&str> {
        self.chain.iter().map(|e| e.backend.name()).collect()
    }
}

#[async_trait]
impl Provider for FallbackProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let mut last_error = ProviderError::NotConfigured("No providers in fallback chain".into());

        for (i, entry) in self.chain.iter().enumerate() {
            let provider_name = entry.backend.name().to_string();

            info!(
                provider = %provider_name,
                attempt = i + 1,
                total = self.chain.len(),
                "Fallback: trying provider"
            );

            match tokio::time::timeout(entry.timeout, entry.backend.complete(request.clone())).await {
                Ok(Ok(response)) => return Ok(response),
                Ok(Err(e)) => {
                    warn!(
                        provider = %provider_name,
                        error = %e,
                        "Fallback: provider failed, trying next"
                    );
                    last_error = e;
                }
                Err(_) => {
                    warn!(
                        provider = %provider_name,
                        timeout_secs = entry.timeout.as_secs(),
                        "Fallback: provider timed out, trying next"
                    );
                    last_error = ProviderError::Timeout(format!(
                        "Provider '{}' timed out after {}s",
                        provider_name,
                        entry.timeout.as_secs()
                    ));
                }
            }
        }

        Err(last_error)
    }

    async fn health_check(&self) -> Result<bool, ProviderError> {
        for entry in &self.chain {
            if let Ok(true) = entry.backend.health_check().await {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

/// Speech counterpart of [`FallbackProvider`].
pub struct FallbackSynthesizer {
    name: String,
    chain: Vec<FallbackEntry<dyn SpeechSynthesizer>>,
}

impl FallbackSynthesizer {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            chain: Vec::new(),
        }
    }

    pub fn add(mut self, synthesizer: Arc<dyn SpeechSynthesizer>, timeout: Duration) -> Self {
        self.chain.push(FallbackEntry {
            backend: synthesizer,
            timeout,
        });
        self
    }

    pub fn add_default(self, synthesizer: Arc<dyn SpeechSynthesizer>) -> Self {
        self.add(synthesizer, DEFAULT_TIMEOUT)
    }

    pub fn len(&self) -> usize {
        self.chain.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.chain.iter().map(|e| e.backend.name()).collect()
    }
}

#[async_trait]
impl SpeechSynthesizer for FallbackSynthesizer {
    fn name(&self) -> &str {
        &self.name
    }

    async fn synthesize(&self, request: SpeechRequest) -> Result<SpeechResponse, SpeechError> {
        let mut last_error = SpeechError::NotConfigured("No synthesizers in fallback chain".into());

        for entry in &self.chain {
            let synth_name = entry.backend.name().to_string();

            match tokio::time::timeout(entry.timeout, entry.backend.synthesize(request.clone())).await {
                Ok(Ok(response)) => return Ok(response),
                Ok(Err(e)) => {
                    warn!(synthesizer = %synth_name, error = %e, "Fallback: synthesizer failed, trying next");
                    last_error = e;
                }
                Err(_) => {
                    warn!(
                        synthesizer = %synth_name,
                        timeout_secs = entry.timeout.as_secs(),
                        "Fallback: synthesizer timed out, trying next"
                    );
                    last_error = SpeechError::Timeout(format!(
                        "Synthesizer '{}' timed out after {}s",
                        synth_name,
                        entry.timeout.as_secs()
                    ));
                }
            }
        }

        Err(last_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulated::{SimulatedProvider, SimulatedSynthesizer};
    use aenki_core::message::Message;
    use std::sync::atomic::{AtomicUsize, Ordering};

    enum Behavior {
        Answer(&'static str),
        Fail(ProviderError),
        Hang,
    }

    /// Chat backend that behaves as scripted and counts its calls.
    struct ScriptedBackend {
        name: &'static str,
        behavior: Behavior,
        hits: AtomicUsize,
    }

    fn backend(name: &'static str, behavior: Behavior) -> Arc<ScriptedBackend> {
        Arc::new(ScriptedBackend {
            name,
            behavior,
            hits: AtomicUsize::new(0),
        })
    }

    impl ScriptedBackend {
        fn hits(&self) -> usize {
            self.hits.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Provider for ScriptedBackend {
        fn name(&self) -> &str {
            self.name
        }

        async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
            self.hits.fetch_add(1, Ordering::SeqCst);
            match &self.behavior {
                Behavior::Answer(text) => Ok(ProviderResponse {
                    message: Message::assistant(*text),
                    usage: None,
                    model: "gpt-3.5-turbo".into(),
                    provider: self.name.into(),
                    metadata: serde_json::Map::new(),
                }),
                Behavior::Fail(e) => Err(e.clone()),
                Behavior::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Err(ProviderError::Timeout("unreachable".into()))
                }
            }
        }

        async fn health_check(&self) -> Result<bool, ProviderError> {
            Ok(matches!(self.behavior, Behavior::Answer(_)))
        }
    }

    struct BrokenSynthesizer;

    #[async_trait]
    impl SpeechSynthesizer for BrokenSynthesizer {
        fn name(&self) -> &str {
            "broken"
        }

        async fn synthesize(&self, _request: SpeechRequest) -> Result<SpeechResponse, SpeechError> {
            Err(SpeechError::ApiError {
                status_code: 403,
                message: "forbidden".into(),
            })
        }
    }

    fn chat_request() -> ProviderRequest {
        ProviderRequest::new("gpt-3.5-turbo", vec![Message::user("What helps recovery?")])
    }

    fn speech_request() -> SpeechRequest {
        SpeechRequest {
            text: "hola".into(),
            language: "es-ES".into(),
            voice: "es-ES-Wavenet-D".into(),
        }
    }

    #[tokio::test]
    async fn healthy_primary_short_circuits() {
        let openai = backend("openai", Behavior::Answer("Sleep and protein."));
        let spare = backend("spare", Behavior::Answer("unused"));
        let chain = FallbackProvider::new("chat")
            .add_default(openai.clone())
            .add_default(spare.clone());

        let response = chain.complete(chat_request()).await.unwrap();
        assert_eq!(response.message.content, "Sleep and protein.");
        assert_eq!(response.provider, "openai");
        assert_eq!((openai.hits(), spare.hits()), (1, 0));
    }

    #[tokio::test]
    async fn every_error_kind_moves_to_next_backend() {
        let errors = [
            ProviderError::ApiError {
                status_code: 500,
                message: "upstream".into(),
            },
            ProviderError::RateLimited { retry_after_secs: 60 },
            ProviderError::Network("conn refused".into()),
        ];
        for error in errors {
            let openai = backend("openai", Behavior::Fail(error));
            let spare = backend("spare", Behavior::Answer("ok"));
            let chain = FallbackProvider::new("chat")
                .add_default(openai.clone())
                .add_default(spare.clone());

            assert_eq!(chain.complete(chat_request()).await.unwrap().provider, "spare");
            assert_eq!((openai.hits(), spare.hits()), (1, 1));
        }
    }

    #[tokio::test]
    async fn unreachable_openai_lands_on_simulation() {
        let chain = FallbackProvider::new("chat")
            .add_default(backend("openai", Behavior::Fail(ProviderError::Network("dns".into()))))
            .add_default(Arc::new(SimulatedProvider::new()));

        let response = chain.complete(chat_request()).await.unwrap();
        assert_eq!(response.provider, "simulation");
        assert!(response.message.content.contains("What helps recovery?"));
    }

    #[tokio::test]
    async fn exhausted_chain_surfaces_last_error() {
        let chain = FallbackProvider::new("chat")
            .add_default(backend("openai", Behavior::Fail(ProviderError::Network("down".into()))))
            .add_default(backend(
                "azure",
                Behavior::Fail(ProviderError::AuthenticationFailed("bad key".into())),
            ));

        let err = chain.complete(chat_request()).await.unwrap_err();
        assert!(matches!(err, ProviderError::AuthenticationFailed(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn slow_backend_is_abandoned_after_its_timeout() {
        let spare = backend("spare", Behavior::Answer("ok"));
        let chain = FallbackProvider::new("chat")
            .add(backend("openai", Behavior::Hang), Duration::from_millis(50))
            .add_default(spare.clone());

        assert!(chain.complete(chat_request()).await.is_ok());
        assert_eq!(spare.hits(), 1);

        let only_slow = FallbackProvider::new("chat").add(backend("openai", Behavior::Hang), Duration::from_millis(20));
        assert!(matches!(
            only_slow.complete(chat_request()).await,
            Err(ProviderError::Timeout(_))
        ));
    }

    #[tokio::test]
    async fn empty_chain_is_not_configured() {
        let chain = FallbackProvider::new("chat");
        assert!(chain.is_empty());
        assert!(matches!(
            chain.complete(chat_request()).await,
            Err(ProviderError::NotConfigured(_))
        ));
    }

    #[tokio::test]
    async fn health_reports_any_healthy_backend() {
        let down = FallbackProvider::new("chat").add_default(backend("openai", Behavior::Fail(ProviderError::Network("x".into()))));
        assert!(!down.health_check().await.unwrap());

        let mixed = FallbackProvider::new("chat")
            .add_default(backend("openai", Behavior::Fail(ProviderError::Network("x".into()))))
            .add_default(backend("spare", Behavior::Answer("ok")));
        assert!(mixed.health_check().await.unwrap());
        assert_eq!(mixed.len(), 2);
        assert_eq!(mixed.names(), vec!["openai", "spare"]);
    }

    #[tokio::test]
    async fn speech_falls_back_to_simulation() {
        let chain = FallbackSynthesizer::new("tts")
            .add_default(Arc::new(BrokenSynthesizer))
            .add_default(Arc::new(SimulatedSynthesizer::new()));

        let response = chain.synthesize(speech_request()).await.unwrap();
        assert_eq!(response.provider, "simulation");
        assert_eq!(chain.names(), vec!["broken", "simulation"]);
    }

    #[tokio::test]
    async fn speech_chain_reports_last_error() {
        let chain = FallbackSynthesizer::new("tts").add_default(Arc::new(BrokenSynthesizer));
        assert!(matches!(
            chain.synthesize(speech_request()).await,
            Err(SpeechError::ApiError { status_code: 403, .. })
        ));
        assert!(matches!(
            FallbackSynthesizer::new("empty").synthesize(speech_request()).await,
            Err(SpeechError::NotConfigured(_))
        ));
    }
}
