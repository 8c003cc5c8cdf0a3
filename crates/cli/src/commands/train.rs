//! `aenki train` — Add knowledge without going through the gateway.

use std::path::Path;
use std::time::Duration;

use aenki_core::knowledge::Metadata;
use aenki_ingest::UrlIngestor;
use aenki_security::DomainAllowlist;

pub async fn run(
    config_path: Option<&Path>,
    content: Option<String>,
    urls: Vec<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let content = content.filter(|c| !c.trim().is_empty());
    if content.is_none() && urls.is_empty() {
        return Err("Provide --content or at least one --url".into());
    }

    let config = super::load_config(config_path)?;
    let store = super::open_store(&config);
    let mut failed = 0usize;

    if let Some(content) = content {
        let metadata = Metadata::from([
            ("source".to_string(), "direct".to_string()),
            ("type".to_string(), "text".to_string()),
        ]);
        match store.insert(&content, metadata).await {
            Ok(outcome) => println!("✅ Stored {} (total: {})", outcome.id, outcome.total_knowledge),
            Err(e) => {
                failed += 1;
                eprintln!("❌ Content rejected: {e}");
            }
        }
    }

    if !urls.is_empty() {
        let ingestor = UrlIngestor::new(
            DomainAllowlist::new(&config.ingest.allowed_domains),
            Duration::from_secs(config.ingest.timeout_secs),
            &config.ingest.user_agent,
            config.knowledge.max_content_chars,
        )?;

        for url in &urls {
            let page = match ingestor.ingest_url(url).await {
                Ok(page) => page,
                Err(e) => {
                    failed += 1;
                    eprintln!("❌ {url}: {e}");
                    continue;
                }
            };
            let metadata = Metadata::from([
                ("source".to_string(), "url".to_string()),
                ("type".to_string(), "web".to_string()),
                ("url".to_string(), page.url.clone()),
                ("title".to_string(), page.title.clone()),
            ]);
            match store.insert(&page.content, metadata).await {
                Ok(outcome) => println!("✅ {url} → {} \"{}\"", outcome.id, page.title),
                Err(e) => {
                    failed += 1;
                    eprintln!("❌ {url}: {e}");
                }
            }
        }
    }

    store.flush().await?;
    println!("Knowledge items: {}", store.len().await);

    if failed > 0 {
        return Err(format!("{failed} item(s) failed").into());
    }
    Ok(())
}
