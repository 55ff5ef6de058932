//! Tally CLI - Statement categorizer
//!
//! Usage:
//!   tally categorize --file CSV    Import and categorize a statement
//!   tally classify "DESCRIPTION"   Categorize one description
//!   tally rules                    Show the rule set
//!   tally cache count              Count cached remote decisions

mod cli;
mod commands;


use anyhow::Result;
use clap::Parser;
use tally_core::AIClient;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    let paths = commands::Paths {
        rules: cli.rules,
        cache: cli.cache,
        config: cli.config,
    };

    match cli.command {
        Commands::Categorize {
            file,
            output,
            account,
            no_remote,
        } => {
            let ai = remote_client(no_remote);
            commands::cmd_categorize(&paths, &file, output.as_deref(), account, ai).await
        }
        Commands::Classify {
            description,
            no_remote,
        } => {
            let ai = remote_client(no_remote);
            commands::cmd_classify(&paths, &description, ai).await
        }
        Commands::Rules => commands::cmd_rules_list(&paths.rules),
        Commands::Cache { action } => match action {
            CacheAction::Lookup { description } => {
                commands::cmd_cache_lookup(&paths.cache, &description)
            }
            CacheAction::Count => commands::cmd_cache_count(&paths.cache),
        },
    }
}

/// Remote classifier from the environment, unless disabled
fn remote_client(no_remote: bool) -> Option<AIClient> {
    if no_remote {
        return None;
    }
    let client = AIClient::from_env();
    if client.is_none() {
        println!("💡 Tip: Set OPENAI_API_KEY (or AI_BACKEND=ollama with OLLAMA_HOST) to enable the remote classifier");
    }
    client
}
