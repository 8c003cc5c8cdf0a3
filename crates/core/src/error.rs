//! Error types for the AeNKI domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all AeNKI operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Chat provider errors ---
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    // --- Text-to-speech errors ---
    #[error("Speech error: {0}")]
    Speech(#[from] SpeechError),

    // --- Knowledge store errors ---
    #[error("Knowledge error: {0}")]
    Knowledge(#[from] KnowledgeError),

    // --- Ingestion errors ---
    #[error("Ingest error: {0}")]
    Ingest(#[from] IngestError),

    // --- Authentication errors ---
    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // --- Generic ---
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

#[derive(Debug, Clone, Error)]
pub enum SpeechError {
    #[error("Speech API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Speech provider not configured: {0}")]
    NotConfigured(String),

    #[error("Speech request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

#[derive(Debug, Error)]
pub enum KnowledgeError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

#[derive(Debug, Clone, Error)]
pub enum IngestError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Domain {0} not in whitelist")]
    DomainNotAllowed(String),

    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("HTTP {status}: {reason}")]
    HttpStatus { status: u16, reason: String },

    #[error("No readable content at {0}")]
    EmptyContent(String),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("Missing API key")]
    MissingKey,

    #[error("Invalid API key: {0}")]
    InvalidKey(String),

    #[error("API key expired")]
    Expired,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Token issuance failed: {0}")]
    IssueFailed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_displays_correctly() {
        let err = Error::Provider(ProviderError::ApiError {
            status_code: 429,
            message: "Too many requests".into(),
        });
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("Too many requests"));
    }

    #[test]
    fn ingest_error_names_domain() {
        let err = Error::Ingest(IngestError::DomainNotAllowed("evil.example".into()));
        assert!(err.to_string().contains("evil.example"));
        assert!(err.to_string().contains("whitelist"));
    }

    #[test]
    fn knowledge_error_converts() {
        let err: Error = KnowledgeError::InvalidInput("content must not be empty".into()).into();
        assert!(matches!(err, Error::Knowledge(_)));
    }
}
