//! `aenki search` — Query the knowledge store from the terminal.

use std::path::Path;

use aenki_core::knowledge::SearchQuery;

pub async fn run(
    config_path: Option<&Path>,
    query: String,
    threshold: Option<f64>,
    limit: Option<usize>,
) -> Result<(), Box<dyn std::error::Error>> {
    if query.trim().chars().count() < 2 {
        return Err("Query must be at least 2 characters".into());
    }

    let config = super::load_config(config_path)?;
    let store = super::open_store(&config);

    let mut search = SearchQuery::new(query.trim());
    if let Some(threshold) = threshold {
        search = search.with_threshold(threshold);
    }
    if let Some(limit) = limit {
        search = search.with_limit(limit);
    }

    let outcome = store.search(&search).await;
    println!(
        "Found {} of {} items for \"{}\"\n",
        outcome.found,
        outcome.total,
        search.query
    );

    for (rank, hit) in outcome.results.iter().enumerate() {
        let source = hit.metadata.get("source").map(String::as_str).unwrap_or("unknown");
        let preview: String = hit.content.chars().take(120).collect();
        println!("{:>2}. [{:.2}] {} ({source})", rank + 1, hit.similarity, hit.id);
        println!("    {preview}");
    }

    Ok(())
}
