//! Security module for AeNKI — API keys and ingestion allowlists.
//!
//! Provides:
//! - **Tokens**: Issue and verify client API keys (signed JWT or static key)
//! - **Allowlists**: Which domains URL training may fetch from

pub mod allowlist;
pub mod token;

pub use allowlist::DomainAllowlist;
pub use token::{DEFAULT_SCOPES, Introspection, IssuedKey, TokenAuthority, TokenClaims};
