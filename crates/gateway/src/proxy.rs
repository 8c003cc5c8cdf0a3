//! Chat and speech proxy endpoints.
//!
//! - `POST /api/chat`               — answer a message, grounded on stored knowledge
//! - `GET  /api/chat/capabilities`  — configured model and limits
//! - `GET  /api/chat/history`       — always empty, conversations are not stored
//! - `POST /api/tts`                — synthesize speech
//! - `GET  /api/tts/voices`         — supported voices

use aenki_core::knowledge::{SearchHit, SearchQuery};
use aenki_core::message::Message;
use aenki_core::provider::{ProviderRequest, Usage};
use aenki_core::speech::SpeechRequest;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Extension, State};
use axum::response::Json;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::api::{ApiError, now_rfc3339};
use crate::{ClientContext, SharedState};

/// Stored items placed in the prompt at most.
const MAX_CONTEXT_ITEMS: usize = 5;
/// Upper bound on a caller-requested `maxTokens`.
const MAX_TOKENS_CAP: u32 = 2000;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    #[serde(default, alias = "text")]
    message: Option<String>,
    #[serde(default)]
    search_knowledge: Option<bool>,
    #[serde(default)]
    max_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    success: bool,
    message: String,
    response: String,
    model: String,
    provider: String,
    knowledge_used: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    usage: Option<Usage>,
    timestamp: String,
    client: String,
}

/// Build the system block listing the knowledge the answer may draw on.
fn knowledge_context(hits: &[SearchHit]) -> Option<String> {
    if hits.is_empty() {
        return None;
    }
    let joined = hits
        .iter()
        .take(MAX_CONTEXT_ITEMS)
        .map(|h| h.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");
    Some(format!("Relevant knowledge:\n{joined}"))
}

/// `POST /api/chat`
pub async fn chat_handler(
    State(state): State<SharedState>,
    Extension(client): Extension<ClientContext>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>, ApiError> {
    let Json(payload) = payload?;
    let chat = &state.config.chat;

    let message = payload
        .message
        .filter(|m| !m.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("Missing required field: message", "MISSING_MESSAGE"))?;
    if message.chars().count() > chat.max_message_chars {
        return Err(ApiError::bad_request(
            format!("Message too long (max {} characters)", chat.max_message_chars),
            "MESSAGE_TOO_LONG",
        ));
    }

    let knowledge = if payload.search_knowledge.unwrap_or(chat.search_knowledge) {
        let query = SearchQuery::new(message.as_str())
            .with_threshold(chat.knowledge_threshold)
            .with_limit(chat.knowledge_limit);
        state.store.search(&query).await.results
    } else {
        Vec::new()
    };
    debug!(client = %client.client_id, knowledge = knowledge.len(), "Chat knowledge lookup");

    let mut messages = vec![Message::system(&chat.persona)];
    if let Some(context) = knowledge_context(&knowledge) {
        messages.push(Message::system(context));
    }
    messages.push(Message::user(&message));

    let mut request = ProviderRequest::new(&chat.model, messages);
    request.temperature = chat.temperature;
    request.max_tokens = Some(payload.max_tokens.unwrap_or(chat.max_tokens).clamp(1, MAX_TOKENS_CAP));

    let response = state.chat.complete(request).await.map_err(|e| {
        error!(error = %e, "Chat completion failed");
        ApiError::internal("Chat processing failed", "CHAT_ERROR").with_details(e.to_string())
    })?;

    info!(
        client = %client.client_id,
        provider = %response.provider,
        knowledge_used = knowledge.len(),
        "Chat answered"
    );

    Ok(Json(ChatResponse {
        success: true,
        message,
        response: response.message.content,
        model: response.model,
        provider: response.provider,
        knowledge_used: knowledge.len(),
        usage: response.usage,
        timestamp: now_rfc3339(),
        client: client.client_id,
    }))
}

/// `GET /api/chat/capabilities`
pub async fn capabilities_handler(State(state): State<SharedState>) -> Json<serde_json::Value> {
    let chat = &state.config.chat;
    Json(serde_json::json!({
        "success": true,
        "capabilities": {
            "chatCompletion": state.config.has_chat_key(),
            "knowledgeSearch": true,
            "knowledgeItems": state.store.len().await,
        },
        "models": {
            "primary": chat.model,
            "fallback": aenki_providers::SIMULATION,
        },
        "limitations": {
            "maxMessageLength": chat.max_message_chars,
            "maxTokens": MAX_TOKENS_CAP,
            "knowledgeSearchThreshold": chat.knowledge_threshold,
        },
    }))
}

/// `GET /api/chat/history`
pub async fn history_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "success": true,
        "history": [],
        "note": "Conversation history is not stored",
    }))
}

#[derive(Debug, Deserialize)]
pub struct TtsRequest {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    voice: Option<String>,
    #[serde(default)]
    language: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TtsOptions {
    language_code: String,
    voice_name: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TtsResponse {
    success: bool,
    audio_content: String,
    format: String,
    provider: String,
    text: String,
    options: TtsOptions,
    #[serde(skip_serializing_if = "Option::is_none")]
    note: Option<String>,
    timestamp: String,
}

/// `POST /api/tts`
pub async fn tts_handler(
    State(state): State<SharedState>,
    payload: Result<Json<TtsRequest>, JsonRejection>,
) -> Result<Json<TtsResponse>, ApiError> {
    let Json(payload) = payload?;
    let tts = &state.config.tts;

    let text = payload
        .text
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("Missing required field: text", "MISSING_TEXT"))?;
    if text.chars().count() > tts.max_text_chars {
        return Err(ApiError::bad_request(
            format!("Text too long (max {} characters)", tts.max_text_chars),
            "TEXT_TOO_LONG",
        ));
    }

    let options = TtsOptions {
        language_code: payload.language.unwrap_or_else(|| tts.default_language.clone()),
        voice_name: payload.voice.unwrap_or_else(|| tts.default_voice.clone()),
    };

    let result = state
        .speech
        .synthesize(SpeechRequest {
            text: text.clone(),
            language: options.language_code.clone(),
            voice: options.voice_name.clone(),
        })
        .await
        .map_err(|e| {
            error!(error = %e, "Speech synthesis failed");
            ApiError::internal("Text-to-speech generation failed", "TTS_ERROR").with_details(e.to_string())
        })?;

    Ok(Json(TtsResponse {
        success: true,
        audio_content: result.audio_content,
        format: result.format,
        provider: result.provider,
        text,
        options,
        note: result.note,
        timestamp: now_rfc3339(),
    }))
}

/// `GET /api/tts/voices`
pub async fn voices_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "success": true,
        "voices": [
            { "name": "es-ES-Wavenet-D", "language": "es-ES", "gender": "Female" },
            { "name": "es-ES-Wavenet-B", "language": "es-ES", "gender": "Male" },
            { "name": "es-US-Wavenet-A", "language": "es-US", "gender": "Female" },
            { "name": "es-US-Wavenet-B", "language": "es-US", "gender": "Male" },
            { "name": "en-US-Wavenet-D", "language": "en-US", "gender": "Male" },
            { "name": "en-US-Wavenet-F", "language": "en-US", "gender": "Female" },
        ],
        "note": "Requires GOOGLE_API_KEY for actual voice synthesis",
    }))
}
