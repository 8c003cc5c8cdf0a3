//! `aenki serve` — Start the HTTP API server.

use std::path::Path;

pub async fn run(config_path: Option<&Path>, port_override: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = super::load_config(config_path)?;

    if let Some(port) = port_override {
        config.gateway.port = port;
    }

    println!("AeNKI Gateway");
    println!("   Listening: {}:{}", config.gateway.host, config.gateway.port);
    println!("   Data dir:  {}", config.knowledge.data_dir.display());
    println!("   Auth required: {}", config.auth.required);
    println!(
        "   Chat: {}",
        if config.has_chat_key() { config.chat.model.as_str() } else { "simulation" }
    );
    println!("   TTS:  {}", if config.has_tts_key() { "google" } else { "simulation" });

    aenki_gateway::start(config).await?;

    Ok(())
}
