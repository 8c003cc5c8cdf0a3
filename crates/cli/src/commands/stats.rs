//! `aenki stats` — Print knowledge store statistics as JSON.

use std::path::Path;

pub async fn run(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(config_path)?;
    let store = super::open_store(&config);

    let stats = store.stats().await;
    println!("{}", serde_json::to_string_pretty(&stats)?);

    Ok(())
}
