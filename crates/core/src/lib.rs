//! # AeNKI Core
//!
//! Domain types, traits, and error definitions for the AeNKI knowledge
//! and AI proxy service. This crate has **zero framework dependencies** —
//! it defines the domain model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! External backends (chat completion, speech synthesis) are traits here.
//! Implementations live in their respective crates, so handlers can be
//! tested against mock backends.

pub mod error;
pub mod knowledge;
pub mod message;
pub mod provider;
pub mod speech;

// Re-export key types at crate root for ergonomics
pub use error::{Error, Result};
pub use knowledge::{
    InsertOutcome, KnowledgeItem, KnowledgeStats, MemoryUsage, Metadata, SearchFilters, SearchHit, SearchOutcome,
    SearchQuery, Stats,
};
pub use message::{Message, Role};
pub use provider::{Provider, ProviderRequest, ProviderResponse, Usage};
pub use speech::{SpeechRequest, SpeechResponse, SpeechSynthesizer};
