pub mod onboard;
pub mod search;
pub mod serve;
pub mod stats;
pub mod token;
pub mod train;

use std::path::Path;

use aenki_config::AppConfig;
use aenki_knowledge::{KnowledgeStore, StoreOptions};

/// Load config from `path` if given, else the default location.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig, Box<dyn std::error::Error>> {
    let config = match path {
        Some(path) => AppConfig::load_with_env(path),
        None => AppConfig::load(),
    };
    config.map_err(|e| format!("Failed to load config: {e}").into())
}

pub fn open_store(config: &AppConfig) -> KnowledgeStore {
    KnowledgeStore::open(
        StoreOptions::new(&config.knowledge.data_dir)
            .max_items(config.knowledge.max_items)
            .max_content_chars(config.knowledge.max_content_chars),
    )
}
