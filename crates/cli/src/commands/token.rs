//! `aenki token issue` — Mint an API key locally.
//!
//! Runs with direct access to the config, so the admin token is not needed.

use std::path::Path;

use aenki_security::{DEFAULT_SCOPES, TokenAuthority};

pub fn issue(config_path: Option<&Path>, client: &str, scopes: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config(config_path)?;
    let authority = TokenAuthority::from_config(&config.auth);

    let scopes: Vec<String> = if scopes.is_empty() {
        DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect()
    } else {
        scopes.to_vec()
    };

    let issued = authority.issue(client, &scopes)?;
    println!("{}", serde_json::to_string_pretty(&issued)?);

    Ok(())
}
