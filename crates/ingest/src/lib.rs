//! Ingestion gateway for AeNKI — turns allowlisted web pages into
//! plain text ready for the knowledge store.

pub mod fetcher;
pub mod html;

pub use fetcher::{IngestedPage, UrlIngestor};
pub use html::{ExtractedPage, extract_page};
