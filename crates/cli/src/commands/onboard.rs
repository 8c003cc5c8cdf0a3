//! `aenki onboard` — First-time setup.

use std::path::Path;

use aenki_config::AppConfig;

pub fn run(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config_path = match config_path {
        Some(path) => path.to_path_buf(),
        None => AppConfig::config_dir().join("config.toml"),
    };

    println!("AeNKI — First-Time Setup");
    println!("========================\n");

    if let Some(dir) = config_path.parent().filter(|d| !d.as_os_str().is_empty())
        && !dir.exists()
    {
        std::fs::create_dir_all(dir)?;
        println!("✅ Created config directory: {}", dir.display());
    }

    if config_path.exists() {
        println!("⚠️  Config already exists at: {}", config_path.display());
        println!("   Edit it manually or delete and re-run onboard.\n");
        return Ok(());
    }

    std::fs::write(&config_path, AppConfig::default_toml())?;
    println!("✅ Created config.toml at: {}", config_path.display());
    println!("\n📝 Next steps:");
    println!("   1. Set [auth].jwt_secret and [auth].admin_token");
    println!("   2. Optionally add [chat].api_key and [tts].api_key (or OPENAI_API_KEY / GOOGLE_API_KEY)");
    println!("   3. Run: aenki serve\n");

    Ok(())
}
