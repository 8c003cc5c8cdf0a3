//! Knowledge store and lexical search for AeNKI.

pub mod search;
pub mod store;

pub use search::{query_terms, rank, similarity, suggest};
pub use store::{KnowledgeStore, StoreOptions};
