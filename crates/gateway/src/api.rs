//! Knowledge, health and key-issuance endpoints.
//!
//! - `GET  /api/health`              — liveness with configuration summary
//! - `GET  /healthz`                 — plain-text liveness
//! - `POST /auth/issue`              — mint an API key (admin only)
//! - `GET  /auth/introspect`         — inspect the key in the request headers
//! - `POST /auth/introspect`         — inspect a key passed in the body
//! - `POST /api/train`               — add text or allowlisted URLs
//! - `GET  /api/train/status`        — training counters and capabilities
//! - `GET  /api/search`              — keyword search via query string
//! - `POST /api/search`              — keyword search with metadata filters
//! - `GET  /api/search/suggestions`  — curated query suggestions
//! - `GET  /api/stats`               — store and feature summary
//! - `GET  /api/stats/knowledge`     — store details
//! - `GET  /api/stats/health`        — uptime and configured services

use std::time::{Duration, Instant};

use aenki_core::error::AuthError;
use aenki_core::knowledge::{Metadata, SearchFilters, SearchHit, SearchQuery};
use axum::body::Bytes;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Extension, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{ADMIN_TOKEN_HEADER, ClientContext, SharedState, presented_key};

/// Longest content excerpt returned by the search endpoints.
const RESULT_EXCERPT_CHARS: usize = 500;
const MIN_QUERY_CHARS: usize = 2;
const DEFAULT_CLIENT_ID: &str = "web";
/// Metadata keys kept in GET search results.
const SUMMARY_KEYS: &[&str] = &["source", "timestamp", "type", "title"];

pub(crate) fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

// ── Errors ────────────────────────────────────────────────────────────────

/// JSON error body: `{ "success": false, "error": ..., "code": ... }`.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    error: String,
    code: &'static str,
    details: Option<String>,
    retry_after: Option<u64>,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    success: bool,
    error: &'a str,
    code: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    retry_after: Option<u64>,
}

impl ApiError {
    pub fn new(status: StatusCode, error: impl Into<String>, code: &'static str) -> Self {
        Self {
            status,
            error: error.into(),
            code,
            details: None,
            retry_after: None,
        }
    }

    pub fn bad_request(error: impl Into<String>, code: &'static str) -> Self {
        Self::new(StatusCode::BAD_REQUEST, error, code)
    }

    pub fn unauthorized(error: impl Into<String>, code: &'static str) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, error, code)
    }

    pub fn internal(error: impl Into<String>, code: &'static str) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, error, code)
    }

    pub fn rate_limited(retry_after: Duration) -> Self {
        Self {
            retry_after: Some(retry_after.as_secs().max(1)),
            ..Self::new(
                StatusCode::TOO_MANY_REQUESTS,
                "Too many requests, please try again later",
                "RATE_LIMIT_EXCEEDED",
            )
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            success: false,
            error: &self.error,
            code: self.code,
            details: self.details.as_deref(),
            retry_after: self.retry_after,
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::MissingKey => Self::unauthorized(e.to_string(), "MISSING_API_KEY"),
            AuthError::Forbidden(_) => Self::new(StatusCode::FORBIDDEN, e.to_string(), "INVALID_ADMIN_TOKEN"),
            AuthError::IssueFailed(_) => Self::internal(e.to_string(), "ISSUE_FAILED"),
            AuthError::InvalidKey(_) | AuthError::Expired => Self::unauthorized(e.to_string(), "INVALID_TOKEN"),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request("Invalid JSON body", "INVALID_BODY").with_details(rejection.body_text())
    }
}

pub async fn not_found_handler() -> ApiError {
    ApiError::new(StatusCode::NOT_FOUND, "Endpoint not found", "NOT_FOUND")
}

// ── Health ────────────────────────────────────────────────────────────────

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    ok: bool,
    timestamp: String,
    uptime: i64,
    version: &'static str,
    host: String,
    port: u16,
    model: String,
    #[serde(rename = "hasOpenAIKey")]
    has_openai_key: bool,
    has_google_key: bool,
    auth_required: bool,
    knowledge_items: usize,
    cors_origins: Vec<String>,
}

/// `GET /api/health`
pub async fn health_handler(State(state): State<SharedState>) -> Json<HealthResponse> {
    let config = &state.config;
    Json(HealthResponse {
        ok: true,
        timestamp: now_rfc3339(),
        uptime: state.uptime_secs(),
        version: env!("CARGO_PKG_VERSION"),
        host: config.gateway.host.clone(),
        port: config.gateway.port,
        model: config.chat.model.clone(),
        has_openai_key: config.has_chat_key(),
        has_google_key: config.has_tts_key(),
        auth_required: config.auth.required,
        knowledge_items: state.store.len().await,
        cors_origins: config.gateway.cors_origins.clone(),
    })
}

/// `GET /healthz`
pub async fn healthz_handler() -> &'static str {
    "OK"
}

// ── Auth ──────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
struct IssueRequest {
    #[serde(default)]
    client_id: Option<String>,
    #[serde(default)]
    scopes: Vec<String>,
}

/// `POST /auth/issue`: requires `x-admin-token`.
pub async fn issue_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let admin = headers.get(ADMIN_TOKEN_HEADER).and_then(|v| v.to_str().ok());
    state.tokens.check_admin(admin).inspect_err(|_| {
        warn!("Rejected key issuance with invalid admin token");
    })?;

    let request: IssueRequest = if body.iter().all(u8::is_ascii_whitespace) {
        IssueRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::bad_request("Invalid JSON body", "INVALID_BODY").with_details(e.to_string()))?
    };
    let client_id = request
        .client_id
        .filter(|c| !c.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_CLIENT_ID.into());

    let issued = state.tokens.issue(&client_id, &request.scopes)?;
    info!(client_id = %issued.client_id, mode = ?issued.mode, "API key issued");

    Ok(Json(serde_json::json!({
        "success": true,
        "mode": issued.mode,
        "api_key": issued.api_key,
        "client_id": issued.client_id,
        "scopes": issued.scopes,
        "issuer": issued.issuer,
        "ttl_min": state.config.auth.ttl_minutes,
        "issued_at": now_rfc3339(),
        "expires_at": issued.expires_at,
    }))
    .into_response())
}

fn invalid_token(status: StatusCode, e: &AuthError) -> Response {
    (
        status,
        Json(serde_json::json!({
            "valid": false,
            "error": "Invalid or expired token",
            "code": "INVALID_TOKEN",
            "details": e.to_string(),
        })),
    )
        .into_response()
}

fn missing_key(status: StatusCode) -> Response {
    (
        status,
        Json(serde_json::json!({
            "valid": false,
            "error": "Missing x-aenki-key header",
            "code": "MISSING_API_KEY",
        })),
    )
        .into_response()
}

/// `GET /auth/introspect`: key from `x-aenki-key` or bearer header.
pub async fn introspect_get_handler(State(state): State<SharedState>, headers: HeaderMap) -> Response {
    let Some(key) = presented_key(&headers) else {
        return missing_key(StatusCode::UNAUTHORIZED);
    };
    match state.tokens.verify(&key) {
        Ok(info) => Json(info).into_response(),
        Err(e) => invalid_token(StatusCode::UNAUTHORIZED, &e),
    }
}

#[derive(Debug, Deserialize)]
pub struct IntrospectRequest {
    #[serde(default)]
    api_key: Option<String>,
}

/// `POST /auth/introspect`: invalid keys answer 200 with `valid: false`.
pub async fn introspect_post_handler(
    State(state): State<SharedState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let from_body = serde_json::from_slice::<IntrospectRequest>(&body)
        .ok()
        .and_then(|r| r.api_key)
        .filter(|k| !k.trim().is_empty());
    let Some(key) = from_body.or_else(|| presented_key(&headers)) else {
        return missing_key(StatusCode::BAD_REQUEST);
    };
    match state.tokens.verify(&key) {
        Ok(info) => Json(info).into_response(),
        Err(e) => invalid_token(StatusCode::OK, &e),
    }
}

// ── Training ──────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct TrainRequest {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    urls: Vec<String>,
    #[serde(default)]
    metadata: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TrainItemResult {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    total_knowledge: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    persisted: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl TrainItemResult {
    fn failed(url: Option<String>, error: String) -> Self {
        Self {
            success: false,
            id: None,
            url,
            title: None,
            total_knowledge: None,
            persisted: None,
            error: Some(error),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TrainSummary {
    total: usize,
    successful: usize,
    failed: usize,
    total_knowledge: usize,
}

#[derive(Debug, Serialize)]
pub struct TrainResponse {
    success: bool,
    results: Vec<TrainItemResult>,
    summary: TrainSummary,
    client: String,
    timestamp: String,
}

/// Flatten caller metadata to strings; `null` entries are dropped.
fn to_metadata(map: serde_json::Map<String, serde_json::Value>) -> Metadata {
    map.into_iter()
        .filter_map(|(k, v)| match v {
            serde_json::Value::Null => None,
            serde_json::Value::String(s) => Some((k, s)),
            other => Some((k, other.to_string())),
        })
        .collect()
}

async fn store_content(state: &SharedState, content: &str, metadata: Metadata, url: Option<String>) -> TrainItemResult {
    let title = metadata.get("title").cloned();
    match state.store.insert(content, metadata).await {
        Ok(outcome) => TrainItemResult {
            success: true,
            id: Some(outcome.id),
            url,
            title,
            total_knowledge: Some(outcome.total_knowledge),
            persisted: Some(outcome.persisted),
            error: outcome.persist_error,
        },
        Err(e) => TrainItemResult::failed(url, e.to_string()),
    }
}

/// `POST /api/train`
pub async fn train_handler(
    State(state): State<SharedState>,
    Extension(client): Extension<ClientContext>,
    payload: Result<Json<TrainRequest>, JsonRejection>,
) -> Result<Json<TrainResponse>, ApiError> {
    let Json(payload) = payload?;
    let content = payload.content.filter(|c| !c.trim().is_empty());
    let urls: Vec<String> = payload
        .urls
        .into_iter()
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty())
        .collect();

    if content.is_none() && urls.is_empty() {
        return Err(ApiError::bad_request(
            "Must provide either content or urls",
            "MISSING_CONTENT",
        ));
    }

    let base = to_metadata(payload.metadata);
    let mut results = Vec::with_capacity(urls.len() + 1);

    if let Some(content) = content {
        info!(client = %client.client_id, chars = content.chars().count(), "Training with direct content");
        let mut metadata = base.clone();
        metadata.insert("source".into(), "direct".into());
        metadata.insert("type".into(), "text".into());
        results.push(store_content(&state, &content, metadata, None).await);
    }

    if !urls.is_empty() {
        info!(client = %client.client_id, count = urls.len(), "Training with URLs");
    }
    for url in urls {
        match state.ingestor.ingest_url(&url).await {
            Ok(page) => {
                let mut metadata = base.clone();
                metadata.insert("source".into(), "url".into());
                metadata.insert("type".into(), "web".into());
                metadata.insert("url".into(), page.url.clone());
                metadata.insert("title".into(), page.title.clone());
                results.push(store_content(&state, &page.content, metadata, Some(url)).await);
            }
            Err(e) => {
                warn!(url = %url, error = %e, "URL ingestion failed");
                results.push(TrainItemResult::failed(Some(url), e.to_string()));
            }
        }
    }

    let successful = results.iter().filter(|r| r.success).count();
    let summary = TrainSummary {
        total: results.len(),
        successful,
        failed: results.len() - successful,
        total_knowledge: state.store.len().await,
    };

    Ok(Json(TrainResponse {
        success: successful > 0,
        results,
        summary,
        client: client.client_id,
        timestamp: now_rfc3339(),
    }))
}

/// `GET /api/train/status`
pub async fn train_status_handler(State(state): State<SharedState>) -> Json<serde_json::Value> {
    let stats = state.store.stats().await;
    let domains = state.ingestor.allowlist().domains();
    Json(serde_json::json!({
        "success": true,
        "status": "active",
        "stats": stats,
        "capabilities": {
            "urlIngestion": true,
            "textTraining": true,
            "whitelistedDomains": domains.len(),
            "allowedDomains": domains,
            "maxKnowledgeItems": state.store.max_items(),
            "maxContentChars": state.config.knowledge.max_content_chars,
        },
        "timestamp": now_rfc3339(),
    }))
}

// ── Search ────────────────────────────────────────────────────────────────

/// Query-string parameters. Numbers arrive as text so malformed values
/// fall back to defaults instead of rejecting the request.
#[derive(Debug, Default, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    query: Option<String>,
    #[serde(default)]
    threshold: Option<String>,
    #[serde(default)]
    limit: Option<String>,
}

/// Numbers may arrive as JSON numbers or strings; anything unusable
/// falls back to the default and the rest is clamped.
#[derive(Debug, Deserialize)]
pub struct SearchBody {
    #[serde(default)]
    query: Option<String>,
    #[serde(default)]
    threshold: Option<serde_json::Value>,
    #[serde(default)]
    limit: Option<serde_json::Value>,
    #[serde(default)]
    filters: SearchFilters,
}

#[derive(Debug, Serialize)]
struct SearchResultDto {
    id: String,
    content: String,
    similarity: f64,
    metadata: Metadata,
}

#[derive(Debug, Serialize)]
struct Pagination {
    found: usize,
    returned: usize,
    threshold: f64,
    limit: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchStatsDto {
    total_knowledge: usize,
    search_time_ms: u128,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    success: bool,
    query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    filters: Option<SearchFilters>,
    results: Vec<SearchResultDto>,
    pagination: Pagination,
    stats: SearchStatsDto,
    timestamp: String,
}

fn lenient_number(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Whole number of results; negatives become 0 and are clamped up later.
fn lenient_limit(raw: f64) -> Option<usize> {
    raw.is_finite().then(|| raw.max(0.0).trunc() as usize)
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

fn excerpt(content: &str) -> String {
    match content.char_indices().nth(RESULT_EXCERPT_CHARS) {
        Some((idx, _)) => content[..idx].to_string(),
        None => content.to_string(),
    }
}

fn to_dto(hit: SearchHit, keys: Option<&[&str]>) -> SearchResultDto {
    let metadata = match keys {
        Some(keys) => hit
            .metadata
            .into_iter()
            .filter(|(k, _)| keys.contains(&k.as_str()))
            .collect(),
        None => hit.metadata,
    };
    SearchResultDto {
        id: hit.id,
        content: excerpt(&hit.content),
        similarity: round2(hit.similarity),
        metadata,
    }
}

fn validate_query(query: Option<String>) -> Result<String, ApiError> {
    let query = query.map(|q| q.trim().to_string()).unwrap_or_default();
    if query.is_empty() {
        return Err(ApiError::bad_request("Missing required parameter: query", "MISSING_QUERY"));
    }
    if query.chars().count() < MIN_QUERY_CHARS {
        return Err(ApiError::bad_request(
            "Query too short (min 2 characters)",
            "QUERY_TOO_SHORT",
        ));
    }
    Ok(query)
}

async fn run_search(
    state: &SharedState,
    query: SearchQuery,
    summary_metadata: bool,
) -> SearchResponse {
    let started = Instant::now();
    let outcome = state.store.search(&query).await;
    let filters = (!query.filters.is_empty()).then(|| query.filters.clone());
    let keys = summary_metadata.then_some(SUMMARY_KEYS);

    let results: Vec<SearchResultDto> = outcome.results.into_iter().map(|h| to_dto(h, keys)).collect();

    SearchResponse {
        success: true,
        pagination: Pagination {
            found: outcome.found,
            returned: results.len(),
            threshold: query.effective_threshold(),
            limit: query.effective_limit(),
        },
        stats: SearchStatsDto {
            total_knowledge: outcome.total,
            search_time_ms: started.elapsed().as_millis(),
        },
        query: query.query,
        filters,
        results,
        timestamp: now_rfc3339(),
    }
}

/// `GET /api/search?query=&threshold=&limit=`
pub async fn search_get_handler(
    State(state): State<SharedState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>, ApiError> {
    let query = validate_query(params.query)?;
    let mut search = SearchQuery::new(query);
    search.threshold = params.threshold.and_then(|t| t.trim().parse().ok());
    search.limit = params
        .limit
        .and_then(|l| l.trim().parse::<f64>().ok())
        .and_then(lenient_limit);

    Ok(Json(run_search(&state, search, true).await))
}

/// `POST /api/search` with optional `filters`.
pub async fn search_post_handler(
    State(state): State<SharedState>,
    body: Result<Json<SearchBody>, JsonRejection>,
) -> Result<Json<SearchResponse>, ApiError> {
    let Json(body) = body?;
    let query = validate_query(body.query)?;
    let search = SearchQuery {
        query,
        threshold: body.threshold.as_ref().and_then(lenient_number),
        limit: body.limit.as_ref().and_then(lenient_number).and_then(lenient_limit),
        filters: body.filters,
    };
    Ok(Json(run_search(&state, search, false).await))
}

#[derive(Debug, Deserialize)]
pub struct SuggestParams {
    #[serde(default)]
    q: Option<String>,
}

/// `GET /api/search/suggestions?q=`
pub async fn suggestions_handler(Query(params): Query<SuggestParams>) -> Json<serde_json::Value> {
    let q = params.q.unwrap_or_default();
    let suggestions = aenki_knowledge::suggest(&q);
    Json(serde_json::json!({
        "success": true,
        "query": q,
        "suggestions": suggestions,
        "timestamp": now_rfc3339(),
    }))
}

// ── Stats ─────────────────────────────────────────────────────────────────

/// `GET /api/stats`
pub async fn stats_handler(State(state): State<SharedState>) -> Json<serde_json::Value> {
    let knowledge = state.store.stats().await;
    let config = &state.config;
    Json(serde_json::json!({
        "success": true,
        "stats": {
            "knowledge": knowledge,
            "server": {
                "uptime": state.uptime_secs(),
                "version": env!("CARGO_PKG_VERSION"),
            },
            "features": {
                "textToSpeech": { "enabled": config.has_tts_key(), "provider": "Google Cloud TTS" },
                "chatCompletion": { "enabled": config.has_chat_key(), "model": config.chat.model },
                "webScraping": {
                    "enabled": true,
                    "whitelistedDomains": state.ingestor.allowlist().domains().len(),
                },
            },
        },
        "timestamp": now_rfc3339(),
    }))
}

/// `GET /api/stats/knowledge`
pub async fn knowledge_stats_handler(State(state): State<SharedState>) -> Json<serde_json::Value> {
    let stats = state.store.stats().await;
    Json(serde_json::json!({
        "success": true,
        "knowledge": {
            "totalItems": stats.stats.total_knowledge,
            "lastUpdate": stats.stats.last_update,
            "trainingCount": stats.stats.training_count,
            "memoryUsage": stats.memory,
            "capabilities": {
                "search": true,
                "similarity": "keyword-based",
                "maxItems": stats.max_items,
            },
        },
        "timestamp": now_rfc3339(),
    }))
}

fn format_uptime(seconds: i64) -> String {
    let days = seconds / 86_400;
    let hours = (seconds % 86_400) / 3_600;
    let minutes = (seconds % 3_600) / 60;
    if days > 0 {
        format!("{days}d {hours}h {minutes}m")
    } else if hours > 0 {
        format!("{hours}h {minutes}m")
    } else {
        format!("{minutes}m")
    }
}

/// `GET /api/stats/health`
pub async fn health_stats_handler(State(state): State<SharedState>) -> Json<serde_json::Value> {
    let uptime = state.uptime_secs();
    let config = &state.config;
    Json(serde_json::json!({
        "success": true,
        "health": {
            "status": "healthy",
            "uptime": { "seconds": uptime, "formatted": format_uptime(uptime) },
            "services": {
                "openai": config.has_chat_key(),
                "googleTTS": config.has_tts_key(),
                "authMode": config.auth.mode,
                "authRequired": config.auth.required,
            },
            "store": {
                "items": state.store.len().await,
                "maxItems": state.store.max_items(),
            },
        },
        "timestamp": now_rfc3339(),
    }))
}
