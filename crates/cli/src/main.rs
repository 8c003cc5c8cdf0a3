//! AeNKI CLI — the main entry point.
//!
//! Commands:
//! - `serve`        — Start the HTTP gateway
//! - `train`        — Add text or an allowlisted URL to the knowledge store
//! - `search`       — Query the knowledge store
//! - `stats`        — Show knowledge store statistics
//! - `token issue`  — Mint an API key
//! - `onboard`      — Write a default config file

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "aenki",
    about = "AeNKI — knowledge-grounded health assistant backend",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (defaults to ~/.aenki/config.toml)
    #[arg(short, long, global = true, env = "AENKI_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP gateway server
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Add knowledge from text or URLs
    Train {
        /// Text to store
        #[arg(long)]
        content: Option<String>,

        /// Page to fetch and store (repeatable)
        #[arg(long = "url")]
        urls: Vec<String>,
    },

    /// Search stored knowledge
    Search {
        query: String,

        /// Minimum similarity (0 to 1)
        #[arg(short, long)]
        threshold: Option<f64>,

        /// Maximum results (1 to 50)
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Show knowledge store statistics
    Stats,

    /// Manage API keys
    Token {
        #[command(subcommand)]
        action: TokenAction,
    },

    /// Write a default configuration file
    Onboard,
}

#[derive(Subcommand)]
enum TokenAction {
    /// Issue an API key
    Issue {
        /// Client identifier embedded in the key
        #[arg(long, default_value = "web")]
        client: String,

        /// Scopes to grant (repeatable; defaults to all)
        #[arg(long = "scope")]
        scopes: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Serve { port } => commands::serve::run(config_path, port).await?,
        Commands::Train { content, urls } => commands::train::run(config_path, content, urls).await?,
        Commands::Search { query, threshold, limit } => {
            commands::search::run(config_path, query, threshold, limit).await?
        }
        Commands::Stats => commands::stats::run(config_path).await?,
        Commands::Token {
            action: TokenAction::Issue { client, scopes },
        } => commands::token::issue(config_path, &client, &scopes)?,
        Commands::Onboard => commands::onboard::run(config_path)?,
    }

    Ok(())
}
