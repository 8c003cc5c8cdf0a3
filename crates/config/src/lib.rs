//! Configuration loading, validation, and management for AeNKI.
//!
//! Loads configuration from `~/.aenki/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The root configuration structure.
///
/// Maps directly to `~/.aenki/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Knowledge store configuration
    #[serde(default)]
    pub knowledge: KnowledgeConfig,

    /// HTTP gateway configuration
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Token authentication configuration
    #[serde(default)]
    pub auth: AuthConfig,

    /// Chat proxy configuration
    #[serde(default)]
    pub chat: ChatConfig,

    /// Text-to-speech proxy configuration
    #[serde(default)]
    pub tts: TtsConfig,

    /// URL ingestion configuration
    #[serde(default)]
    pub ingest: IngestConfig,
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

fn default_true() -> bool {
    true
}

// ── Knowledge ──────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeConfig {
    /// Directory holding `knowledge.json` and `stats.json`
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Capacity of the store; the oldest items are evicted beyond it
    #[serde(default = "default_max_items")]
    pub max_items: usize,

    /// Per-item content cap, in characters
    #[serde(default = "default_max_content_chars")]
    pub max_content_chars: usize,
}

fn default_data_dir() -> PathBuf {
    AppConfig::config_dir().join("data")
}
fn default_max_items() -> usize {
    1000
}
fn default_max_content_chars() -> usize {
    10_000
}

impl Default for KnowledgeConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            max_items: default_max_items(),
            max_content_chars: default_max_content_chars(),
        }
    }
}

// ── Gateway ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Allowed CORS origins; `*` allows any
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,

    #[serde(default = "default_rate_limit_max_requests")]
    pub rate_limit_max_requests: u32,

    #[serde(default = "default_rate_limit_window_secs")]
    pub rate_limit_window_secs: u64,

    #[serde(default = "default_body_limit_bytes")]
    pub body_limit_bytes: usize,
}

fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_port() -> u16 {
    8000
}
fn default_cors_origins() -> Vec<String> {
    vec!["http://localhost:3000".into()]
}
fn default_rate_limit_max_requests() -> u32 {
    100
}
fn default_rate_limit_window_secs() -> u64 {
    15 * 60
}
fn default_body_limit_bytes() -> usize {
    2 * 1024 * 1024
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: default_cors_origins(),
            rate_limit_max_requests: default_rate_limit_max_requests(),
            rate_limit_window_secs: default_rate_limit_window_secs(),
            body_limit_bytes: default_body_limit_bytes(),
        }
    }
}

// ── Auth ───────────────────────────────────────────────────

/// How API keys are minted and checked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    /// Signed, expiring HS256 tokens
    #[default]
    Jwt,
    /// A single shared key
    Static,
}

impl std::str::FromStr for AuthMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "jwt" => Ok(AuthMode::Jwt),
            "static" => Ok(AuthMode::Static),
            other => Err(ConfigError::ValidationError(format!(
                "unknown auth mode '{other}' (expected 'jwt' or 'static')"
            ))),
        }
    }
}

pub const DEFAULT_JWT_SECRET: &str = "change_me_in_production";

#[derive(Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub mode: AuthMode,

    /// When false, missing or invalid keys are let through as `dev-mode`
    #[serde(default)]
    pub required: bool,

    #[serde(default = "default_jwt_secret")]
    pub jwt_secret: String,

    #[serde(default = "default_issuer")]
    pub issuer: String,

    #[serde(default = "default_ttl_minutes")]
    pub ttl_minutes: u64,

    /// Shared secret for `POST /auth/issue`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_token: Option<String>,

    /// The single key accepted in static mode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub static_key: Option<String>,
}

fn default_jwt_secret() -> String {
    DEFAULT_JWT_SECRET.into()
}
fn default_issuer() -> String {
    "aenki.local".into()
}
fn default_ttl_minutes() -> u64 {
    120
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            mode: AuthMode::default(),
            required: false,
            jwt_secret: default_jwt_secret(),
            issuer: default_issuer(),
            ttl_minutes: default_ttl_minutes(),
            admin_token: None,
            static_key: None,
        }
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("mode", &self.mode)
            .field("required", &self.required)
            .field("jwt_secret", &"[REDACTED]")
            .field("issuer", &self.issuer)
            .field("ttl_minutes", &self.ttl_minutes)
            .field("admin_token", &redact(&self.admin_token))
            .field("static_key", &redact(&self.static_key))
            .finish()
    }
}

// ── Chat ───────────────────────────────────────────────────

#[derive(Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    /// Primary provider name; the simulation is always appended as fallback
    #[serde(default = "default_chat_provider")]
    pub provider: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default = "default_chat_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_chat_timeout_secs")]
    pub timeout_secs: u64,

    /// System prompt placed first in every conversation
    #[serde(default = "default_persona")]
    pub persona: String,

    /// Whether chat requests consult the knowledge store by default
    #[serde(default = "default_true")]
    pub search_knowledge: bool,

    #[serde(default = "default_knowledge_threshold")]
    pub knowledge_threshold: f64,

    #[serde(default = "default_knowledge_limit")]
    pub knowledge_limit: usize,

    #[serde(default = "default_max_message_chars")]
    pub max_message_chars: usize,
}

fn default_chat_provider() -> String {
    "openai".into()
}
fn default_chat_model() -> String {
    "gpt-4o-mini".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    1000
}
fn default_chat_timeout_secs() -> u64 {
    30
}
fn default_persona() -> String {
    "You are AeNKI, an AI assistant specialized in health, longevity and well-being. \
     You have deep knowledge of preventive medicine, nutrition and supplementation, \
     exercise, mental health and current longevity research. \
     Answer in an informative, balanced and evidence-based way, and always recommend \
     consulting health professionals for important decisions."
        .into()
}
fn default_knowledge_threshold() -> f64 {
    0.6
}
fn default_knowledge_limit() -> usize {
    3
}
fn default_max_message_chars() -> usize {
    2000
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            provider: default_chat_provider(),
            api_key: None,
            api_url: None,
            model: default_chat_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_chat_timeout_secs(),
            persona: default_persona(),
            search_knowledge: true,
            knowledge_threshold: default_knowledge_threshold(),
            knowledge_limit: default_knowledge_limit(),
            max_message_chars: default_max_message_chars(),
        }
    }
}

impl std::fmt::Debug for ChatConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatConfig")
            .field("provider", &self.provider)
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("timeout_secs", &self.timeout_secs)
            .field("search_knowledge", &self.search_knowledge)
            .field("knowledge_threshold", &self.knowledge_threshold)
            .field("knowledge_limit", &self.knowledge_limit)
            .field("max_message_chars", &self.max_message_chars)
            .finish_non_exhaustive()
    }
}

// ── Text-to-speech ─────────────────────────────────────────

#[derive(Clone, Serialize, Deserialize)]
pub struct TtsConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default = "default_tts_api_url")]
    pub api_url: String,

    #[serde(default = "default_language")]
    pub default_language: String,

    #[serde(default = "default_voice")]
    pub default_voice: String,

    #[serde(default = "default_tts_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_max_text_chars")]
    pub max_text_chars: usize,
}

fn default_tts_api_url() -> String {
    "https://texttospeech.googleapis.com/v1".into()
}
fn default_language() -> String {
    "es-ES".into()
}
fn default_voice() -> String {
    "es-ES-Wavenet-D".into()
}
fn default_tts_timeout_secs() -> u64 {
    30
}
fn default_max_text_chars() -> usize {
    5000
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_url: default_tts_api_url(),
            default_language: default_language(),
            default_voice: default_voice(),
            timeout_secs: default_tts_timeout_secs(),
            max_text_chars: default_max_text_chars(),
        }
    }
}

impl std::fmt::Debug for TtsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TtsConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("default_language", &self.default_language)
            .field("default_voice", &self.default_voice)
            .field("timeout_secs", &self.timeout_secs)
            .field("max_text_chars", &self.max_text_chars)
            .finish()
    }
}

// ── Ingestion ──────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Domains (and their subdomains) that URL training may fetch from
    #[serde(default = "default_allowed_domains")]
    pub allowed_domains: Vec<String>,

    #[serde(default = "default_ingest_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_allowed_domains() -> Vec<String> {
    [
        "wikipedia.org",
        "ncbi.nlm.nih.gov",
        "pubmed.ncbi.nlm.nih.gov",
        "nature.com",
        "science.org",
        "harvard.edu",
        "stanford.edu",
        "mit.edu",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}
fn default_ingest_timeout_secs() -> u64 {
    15
}
fn default_user_agent() -> String {
    format!("AeNKI-Bot/{} (Educational Purpose)", env!("CARGO_PKG_VERSION"))
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            allowed_domains: default_allowed_domains(),
            timeout_secs: default_ingest_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.aenki/config.toml),
    /// then apply environment variable overrides.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with_env(&Self::config_dir().join("config.toml"))
    }

    /// Load a specific file, then apply environment variable overrides.
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::read_file(path)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path, without environment overrides.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let config = Self::read_file(path)?;
        config.validate()?;
        Ok(config)
    }

    fn read_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Apply environment overrides using `lookup` to read variables.
    ///
    /// Environment values take priority over the file. Numeric variables
    /// that fail to parse are rejected rather than silently ignored.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("MAX_KNOWLEDGE_ITEMS") {
            self.knowledge.max_items = parse_env("MAX_KNOWLEDGE_ITEMS", &v)?;
        }
        if let Some(v) = get("AENKI_DATA_DIR") {
            self.knowledge.data_dir = PathBuf::from(v);
        }

        if let Some(v) = get("HOST") {
            self.gateway.host = v;
        }
        if let Some(v) = get("PORT") {
            self.gateway.port = parse_env("PORT", &v)?;
        }
        if let Some(v) = get("CORS_ORIGIN") {
            self.gateway.cors_origins = v
                .split(',')
                .map(|o| o.trim().to_string())
                .filter(|o| !o.is_empty())
                .collect();
        }
        if let Some(v) = get("RATE_LIMIT_MAX_REQUESTS") {
            self.gateway.rate_limit_max_requests = parse_env("RATE_LIMIT_MAX_REQUESTS", &v)?;
        }
        if let Some(v) = get("RATE_LIMIT_WINDOW_MS") {
            let ms: u64 = parse_env("RATE_LIMIT_WINDOW_MS", &v)?;
            self.gateway.rate_limit_window_secs = ms.div_ceil(1000);
        }

        if let Some(v) = get("OPENAI_API_KEY") {
            self.chat.api_key = Some(v);
        }
        if let Some(v) = get("OPENAI_MODEL") {
            self.chat.model = v;
        }
        if let Some(v) = get("GOOGLE_API_KEY") {
            self.tts.api_key = Some(v);
        }

        if let Some(v) = get("AE_NKI_MODE") {
            self.auth.mode = v.parse()?;
        }
        if let Some(v) = get("AE_NKI_JWT_SECRET") {
            self.auth.jwt_secret = v;
        }
        if let Some(v) = get("AE_NKI_JWT_TTL_MIN") {
            self.auth.ttl_minutes = parse_env("AE_NKI_JWT_TTL_MIN", &v)?;
        }
        if let Some(v) = get("AE_NKI_ISSUER") {
            self.auth.issuer = v;
        }
        if let Some(v) = get("AE_NKI_ADMIN_TOKEN") {
            self.auth.admin_token = Some(v);
        }
        if let Some(v) = get("AE_NKI_STATIC_KEY") {
            self.auth.static_key = Some(v);
        }
        if let Some(v) = get("AENKI_AUTH_REQUIRED") {
            self.auth.required = matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes");
        }

        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".aenki")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.knowledge.max_items == 0 {
            return Err(ConfigError::ValidationError("knowledge.max_items must be at least 1".into()));
        }

        if self.knowledge.max_content_chars == 0 {
            return Err(ConfigError::ValidationError(
                "knowledge.max_content_chars must be at least 1".into(),
            ));
        }

        if !(0.0..=2.0).contains(&self.chat.temperature) {
            return Err(ConfigError::ValidationError(
                "chat.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if !(0.0..=1.0).contains(&self.chat.knowledge_threshold) {
            return Err(ConfigError::ValidationError(
                "chat.knowledge_threshold must be between 0.0 and 1.0".into(),
            ));
        }

        if self.gateway.rate_limit_max_requests == 0 || self.gateway.rate_limit_window_secs == 0 {
            return Err(ConfigError::ValidationError(
                "gateway rate limit requests and window must be at least 1".into(),
            ));
        }

        if self.auth.required && self.auth.mode == AuthMode::Jwt && self.auth.jwt_secret == DEFAULT_JWT_SECRET {
            return Err(ConfigError::ValidationError(
                "auth.jwt_secret must be changed from the default when auth.required is true".into(),
            ));
        }

        if self.auth.required && self.auth.mode == AuthMode::Static && self.auth.static_key.is_none() {
            return Err(ConfigError::ValidationError(
                "auth.static_key is required in static mode when auth.required is true".into(),
            ));
        }

        Ok(())
    }

    /// Check if a chat API key is available (from config or environment).
    pub fn has_chat_key(&self) -> bool {
        self.chat.api_key.is_some()
    }

    /// Check if a TTS API key is available (from config or environment).
    pub fn has_tts_key(&self) -> bool {
        self.tts.api_key.is_some()
    }

    /// Generate a default config TOML string (for `onboard` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::ValidationError(format!("{key} has an invalid value '{value}'")))
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
