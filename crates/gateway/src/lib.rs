//! HTTP API gateway for AeNKI.
//!
//! Exposes the knowledge store (train, search, stats), the chat and
//! speech proxies, and key issuance over a JSON REST API.
//!
//! Built on Axum. Layers applied to every route:
//! - HTTP trace logging
//! - CORS from the configured origins
//! - sliding-window rate limiting per client key (`/api/health` exempt)
//! - request body size limit
//!
//! Everything under `/api` except `/api/health` additionally passes the
//! API key middleware.

pub mod api;
pub mod proxy;

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use aenki_config::AppConfig;
use aenki_core::error::AuthError;
use aenki_core::provider::Provider;
use aenki_core::speech::SpeechSynthesizer;
use aenki_ingest::UrlIngestor;
use aenki_knowledge::{KnowledgeStore, StoreOptions};
use aenki_security::{DomainAllowlist, TokenAuthority};
use axum::extract::{DefaultBodyLimit, Request, State};
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use chrono::{DateTime, Utc};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{debug, error, info, warn};

use crate::api::ApiError;

/// Header carrying the client API key.
pub const API_KEY_HEADER: &str = "x-aenki-key";
/// Header carrying the admin token for key issuance.
pub const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

const DEV_CLIENT_ID: &str = "dev-mode";

/// Shared application state for the gateway.
pub struct GatewayState {
    pub config: AppConfig,
    pub store: Arc<KnowledgeStore>,
    pub chat: Arc<dyn Provider>,
    pub speech: Arc<dyn SpeechSynthesizer>,
    pub tokens: TokenAuthority,
    pub ingestor: UrlIngestor,
    pub start_time: DateTime<Utc>,
}

pub type SharedState = Arc<GatewayState>;

impl GatewayState {
    /// Open the store and build every backend from configuration.
    pub fn from_config(config: AppConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let store = KnowledgeStore::open(
            StoreOptions::new(&config.knowledge.data_dir)
                .max_items(config.knowledge.max_items)
                .max_content_chars(config.knowledge.max_content_chars),
        );
        let chat = aenki_providers::build_chat_from_config(&config.chat);
        let speech = aenki_providers::build_speech_from_config(&config.tts);
        let ingestor = UrlIngestor::new(
            DomainAllowlist::new(&config.ingest.allowed_domains),
            Duration::from_secs(config.ingest.timeout_secs),
            &config.ingest.user_agent,
            config.knowledge.max_content_chars,
        )?;

        Ok(Self {
            tokens: TokenAuthority::from_config(&config.auth),
            store: Arc::new(store),
            chat: Arc::new(chat),
            speech: Arc::new(speech),
            ingestor,
            start_time: Utc::now(),
            config,
        })
    }

    pub fn uptime_secs(&self) -> i64 {
        (Utc::now() - self.start_time).num_seconds().max(0)
    }
}

/// Who is calling, attached to every authenticated request.
#[derive(Debug, Clone)]
pub struct ClientContext {
    pub client_id: String,
    pub scopes: Vec<String>,
    pub authenticated: bool,
}

impl ClientContext {
    fn dev_mode() -> Self {
        Self {
            client_id: DEV_CLIENT_ID.into(),
            scopes: Vec::new(),
            authenticated: false,
        }
    }
}

/// Build the full router with every route and layer.
pub fn build_router(state: SharedState) -> Router {
    let gateway = &state.config.gateway;
    let rate_limiter = Arc::new(RateLimiter::new(
        gateway.rate_limit_max_requests,
        Duration::from_secs(gateway.rate_limit_window_secs),
    ));
    let cors = cors_layer(&gateway.cors_origins);
    let body_limit = gateway.body_limit_bytes;

    let protected = Router::new()
        .route("/api/train", post(api::train_handler))
        .route("/api/train/status", get(api::train_status_handler))
        .route("/api/search", get(api::search_get_handler).post(api::search_post_handler))
        .route("/api/search/suggestions", get(api::suggestions_handler))
        .route("/api/stats", get(api::stats_handler))
        .route("/api/stats/knowledge", get(api::knowledge_stats_handler))
        .route("/api/stats/health", get(api::health_stats_handler))
        .route("/api/chat", post(proxy::chat_handler))
        .route("/api/chat/capabilities", get(proxy::capabilities_handler))
        .route("/api/chat/history", get(proxy::history_handler))
        .route("/api/tts", post(proxy::tts_handler))
        .route("/api/tts/voices", get(proxy::voices_handler))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .route("/api/health", get(api::health_handler))
        .route("/healthz", get(api::healthz_handler))
        .route("/auth/issue", post(api::issue_handler))
        .route(
            "/auth/introspect",
            get(api::introspect_get_handler).post(api::introspect_post_handler),
        )
        .merge(protected)
        .fallback(api::not_found_handler)
        .with_state(state)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(middleware::from_fn(move |req, next| {
            let limiter = rate_limiter.clone();
            rate_limit_middleware(limiter, req, next)
        }))
        .layer(cors)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Start the gateway HTTP server and serve until Ctrl-C or SIGTERM.
///
/// The knowledge store is flushed once the server has drained.
pub async fn start(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);
    if !config.auth.required {
        warn!("API key authentication is not enforced (auth.required = false)");
    }

    let state = Arc::new(GatewayState::from_config(config)?);
    let app = build_router(state.clone());

    info!(addr = %addr, "Gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Gateway shutting down");
    if let Err(e) = state.store.flush().await {
        error!(error = %e, "Failed to flush knowledge store on shutdown");
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.iter().any(|o| o == "*") {
        AllowOrigin::any()
    } else {
        let parsed: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|o| match o.parse::<HeaderValue>() {
                Ok(v) => Some(v),
                Err(_) => {
                    warn!(origin = %o, "Ignoring invalid CORS origin");
                    None
                }
            })
            .collect();
        AllowOrigin::list(parsed)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            CONTENT_TYPE,
            AUTHORIZATION,
            HeaderName::from_static(API_KEY_HEADER),
            HeaderName::from_static(ADMIN_TOKEN_HEADER),
        ])
        .max_age(Duration::from_secs(3600))
}

/// API key from `x-aenki-key`, else `Authorization: Bearer`.
pub(crate) fn presented_key(headers: &HeaderMap) -> Option<String> {
    headers
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .or_else(|| {
            headers
                .get(AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.strip_prefix("Bearer "))
        })
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
}

// --- Rate Limiter ---

/// In-memory sliding-window rate limiter.
///
/// Tracks request timestamps per client key.
/// Thread-safe via `std::sync::Mutex` (non-async, held briefly).
struct RateLimiter {
    max_requests: u32,
    window: Duration,
    clients: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl RateLimiter {
    fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests: max_requests.max(1),
            window,
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Record a request. `Err` carries how long until the next slot frees up.
    fn check(&self, client_key: &str) -> Result<(), Duration> {
        let now = Instant::now();
        let mut clients = self.clients.lock().unwrap_or_else(|e| e.into_inner());

        // Periodic cleanup: if map grows too large, evict stale entries
        if clients.len() > 10_000 {
            clients.retain(|_, timestamps| {
                timestamps
                    .back()
                    .is_some_and(|t| now.duration_since(*t) < self.window)
            });
        }

        let timestamps = clients.entry(client_key.to_string()).or_default();
        while timestamps
            .front()
            .is_some_and(|t| now.duration_since(*t) >= self.window)
        {
            timestamps.pop_front();
        }

        if timestamps.len() >= self.max_requests as usize {
            let retry_after = timestamps
                .front()
                .map(|oldest| self.window.saturating_sub(now.duration_since(*oldest)))
                .unwrap_or(self.window);
            return Err(retry_after);
        }

        timestamps.push_back(now);
        Ok(())
    }
}

/// Rate limiting middleware keyed on the presented API key, else
/// "anonymous". `/api/health` is exempt so monitoring can poll it.
async fn rate_limit_middleware(limiter: Arc<RateLimiter>, req: Request, next: Next) -> Response {
    if req.uri().path() == "/api/health" {
        return next.run(req).await;
    }

    let client_key = presented_key(req.headers()).unwrap_or_else(|| "anonymous".to_string());

    if let Err(retry_after) = limiter.check(&client_key) {
        warn!(client = %client_key.chars().take(12).collect::<String>(), "Rate limit exceeded");
        return ApiError::rate_limited(retry_after).into_response();
    }

    next.run(req).await
}

/// API key middleware for `/api/*`.
///
/// With `auth.required` off, missing or invalid keys are let through as
/// the `dev-mode` client.
async fn auth_middleware(State(state): State<SharedState>, mut req: Request, next: Next) -> Response {
    let required = state.config.auth.required;

    let context = match presented_key(req.headers()) {
        None if required => {
            return ApiError::unauthorized("Missing x-aenki-key header", "MISSING_AUTH_HEADER").into_response();
        }
        None => {
            debug!(path = %req.uri().path(), "No API key presented, allowing in development mode");
            ClientContext::dev_mode()
        }
        Some(key) => match state.tokens.verify(&key) {
            Ok(info) => ClientContext {
                client_id: info.client_id,
                scopes: info.scopes,
                authenticated: true,
            },
            Err(e) if required => {
                warn!(error = %e, "Rejected API key");
                let message = match e {
                    AuthError::Expired => "API key expired",
                    _ => "Invalid API key",
                };
                return ApiError::unauthorized(message, "INVALID_API_KEY").into_response();
            }
            Err(e) => {
                warn!(error = %e, "Invalid API key, allowing in development mode");
                ClientContext::dev_mode()
            }
        },
    };

    req.extensions_mut().insert(context);
    next.run(req).await
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    pub fn test_config(dir: &std::path::Path) -> AppConfig {
        let mut config = AppConfig::default();
        config.knowledge.data_dir = dir.to_path_buf();
        config.auth.jwt_secret = "gateway-test-secret".into();
        config.auth.admin_token = Some("admin-boot".into());
        config
    }

    pub fn test_state(config: AppConfig) -> SharedState {
        Arc::new(GatewayState::from_config(config).unwrap())
    }

    /// Unshared state so tests can swap backends before wrapping it.
    pub fn raw_state(dir: &std::path::Path) -> GatewayState {
        GatewayState::from_config(test_config(dir)).unwrap()
    }

    pub async fn send(app: &Router, req: Request<Body>) -> (axum::http::StatusCode, serde_json::Value) {
        let response = app.clone().oneshot(req).await.unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    pub fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    pub fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use axum::body::Body;
    use axum::http::StatusCode;

    #[test]
    fn rate_limiter_blocks_after_max() {
        let limiter = RateLimiter::new(2, Duration::from_secs(60));
        assert!(limiter.check("a").is_ok());
        assert!(limiter.check("a").is_ok());
        let retry = limiter.check("a").unwrap_err();
        assert!(retry <= Duration::from_secs(60));
        assert!(limiter.check("b").is_ok());
    }

    #[test]
    fn rate_limiter_window_slides() {
        let limiter = RateLimiter::new(1, Duration::from_millis(20));
        assert!(limiter.check("a").is_ok());
        assert!(limiter.check("a").is_err());
        std::thread::sleep(Duration::from_millis(30));
        assert!(limiter.check("a").is_ok());
    }

    #[test]
    fn presented_key_sources() {
        let mut headers = HeaderMap::new();
        assert_eq!(presented_key(&headers), None);
        headers.insert(AUTHORIZATION, "Bearer abc".parse().unwrap());
        assert_eq!(presented_key(&headers).as_deref(), Some("abc"));
        headers.insert(API_KEY_HEADER, "xyz".parse().unwrap());
        assert_eq!(presented_key(&headers).as_deref(), Some("xyz"));
    }

    #[tokio::test]
    async fn health_is_public_even_when_auth_required() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path());
        config.auth.required = true;
        let app = build_router(test_state(config));

        let (status, json) = send(&app, get_request("/api/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["ok"], true);
    }

    #[tokio::test]
    async fn required_auth_rejects_missing_and_invalid_keys() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path());
        config.auth.required = true;
        let app = build_router(test_state(config));

        let (status, json) = send(&app, get_request("/api/stats")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(json["code"], "MISSING_AUTH_HEADER");

        let req = axum::http::Request::builder()
            .uri("/api/stats")
            .header(API_KEY_HEADER, "forged")
            .body(Body::empty())
            .unwrap();
        let (status, json) = send(&app, req).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(json["code"], "INVALID_API_KEY");
    }

    #[tokio::test]
    async fn issued_key_opens_protected_routes() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path());
        config.auth.required = true;
        let state = test_state(config);
        let key = state.tokens.issue("clinic", &[]).unwrap().api_key;
        let app = build_router(state);

        let req = axum::http::Request::builder()
            .uri("/api/stats")
            .header(AUTHORIZATION, format!("Bearer {key}"))
            .body(Body::empty())
            .unwrap();
        let (status, json) = send(&app, req).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["success"], true);
    }

    #[tokio::test]
    async fn dev_mode_lets_requests_through() {
        let dir = tempfile::tempdir().unwrap();
        let app = build_router(test_state(test_config(dir.path())));

        let (status, _) = send(&app, get_request("/api/stats")).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn rate_limit_returns_429_but_spares_health() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = test_config(dir.path());
        config.gateway.rate_limit_max_requests = 2;
        let app = build_router(test_state(config));

        assert_eq!(send(&app, get_request("/api/stats")).await.0, StatusCode::OK);
        assert_eq!(send(&app, get_request("/api/stats")).await.0, StatusCode::OK);
        let (status, json) = send(&app, get_request("/api/stats")).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(json["code"], "RATE_LIMIT_EXCEEDED");
        assert!(json["retry_after"].as_u64().is_some());

        assert_eq!(send(&app, get_request("/api/health")).await.0, StatusCode::OK);
    }

    #[tokio::test]
    async fn unknown_route_is_json_404() {
        let dir = tempfile::tempdir().unwrap();
        let app = build_router(test_state(test_config(dir.path())));

        let (status, json) = send(&app, get_request("/api/nope")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn cors_preflight_allows_configured_origin() {
        let dir = tempfile::tempdir().unwrap();
        let app = build_router(test_state(test_config(dir.path())));

        let req = axum::http::Request::builder()
            .method("OPTIONS")
            .uri("/api/search")
            .header("origin", "http://localhost:3000")
            .header("access-control-request-method", "POST")
            .header("access-control-request-headers", "x-aenki-key")
            .body(Body::empty())
            .unwrap();
        let response = tower::ServiceExt::oneshot(app, req).await.unwrap();
        assert_eq!(
            response.headers()["access-control-allow-origin"],
            "http://localhost:3000"
        );
    }
}
