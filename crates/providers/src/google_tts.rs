//! Google Cloud Text-to-Speech backend.
//!
//! POSTs to `{base}/text:synthesize?key=...` and returns the base64 MP3
//! the API hands back.

use std::time::Duration;

use aenki_core::error::SpeechError;
use aenki_core::speech::{SpeechRequest, SpeechResponse, SpeechSynthesizer};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

pub const GOOGLE_TTS_BASE_URL: &str = "https://texttospeech.googleapis.com/v1";

pub struct GoogleTtsSynthesizer {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl GoogleTtsSynthesizer {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                warn!(error = %e, "Falling back to default HTTP client");
                reqwest::Client::new()
            });

        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SynthesizeResponse {
    audio_content: String,
}

#[async_trait]
impl SpeechSynthesizer for GoogleTtsSynthesizer {
    fn name(&self) -> &str {
        "google"
    }

    async fn synthesize(&self, request: SpeechRequest) -> Result<SpeechResponse, SpeechError> {
        let url = format!("{}/text:synthesize", self.base_url);
        let body = serde_json::json!({
            "input": { "text": request.text },
            "voice": { "languageCode": request.language, "name": request.voice },
            "audioConfig": { "audioEncoding": "MP3" },
        });

        debug!(voice = %request.voice, chars = request.text.chars().count(), "Sending synthesis request");

        let response = self
            .client
            .post(&url)
            .query(&[("key", &self.api_key)])
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SpeechError::Timeout(e.to_string())
                } else {
                    SpeechError::Network(e.to_string())
                }
            })?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Speech API returned error");
            return Err(SpeechError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        let parsed: SynthesizeResponse = response.json().await.map_err(|e| SpeechError::ApiError {
            status_code: status,
            message: format!("Failed to parse response: {e}"),
        })?;

        Ok(SpeechResponse {
            audio_content: parsed.audio_content,
            format: "mp3".into(),
            provider: self.name().into(),
            note: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Json;
    use axum::extract::Query;
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::Router;
    use std::collections::HashMap;

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn request() -> SpeechRequest {
        SpeechRequest {
            text: "Hola".into(),
            language: "es-ES".into(),
            voice: "es-ES-Wavenet-D".into(),
        }
    }

    #[tokio::test]
    async fn returns_audio_content() {
        let base = serve(Router::new().route(
            "/text:synthesize",
            post(
                |Query(q): Query<HashMap<String, String>>, Json(body): Json<serde_json::Value>| async move {
                    assert_eq!(q.get("key").map(String::as_str), Some("g-key"));
                    assert_eq!(body["voice"]["name"], "es-ES-Wavenet-D");
                    assert_eq!(body["audioConfig"]["audioEncoding"], "MP3");
                    Json(serde_json::json!({ "audioContent": "SUQzAwAAAAAA" }))
                },
            ),
        ))
        .await;

        let tts = GoogleTtsSynthesizer::new(base, "g-key", Duration::from_secs(5));
        let response = tts.synthesize(request()).await.unwrap();
        assert_eq!(response.audio_content, "SUQzAwAAAAAA");
        assert_eq!(response.provider, "google");
        assert!(response.note.is_none());
    }

    #[tokio::test]
    async fn error_status_is_reported() {
        let base = serve(Router::new().route(
            "/text:synthesize",
            post(|| async { (StatusCode::FORBIDDEN, "API key not valid") }),
        ))
        .await;

        let tts = GoogleTtsSynthesizer::new(base, "bad", Duration::from_secs(5));
        match tts.synthesize(request()).await {
            Err(SpeechError::ApiError { status_code, .. }) => assert_eq!(status_code, 403),
            other => panic!("Expected ApiError, got {other:?}"),
        }
    }
}
