//! CLI argument definitions using clap
//!
//! This module contains all the clap structs and enums for parsing CLI arguments.
//! The actual command implementations are in the `commands` module.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Tally - Categorize bank statement exports
#[derive(Parser)]
#[command(name = "tally")]
#[command(about = "Categorize personal bank statements with keyword rules and a remote classifier", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Category rule set (YAML with a `categories` mapping)
    #[arg(long, default_value = "config.yml", global = true)]
    pub rules: PathBuf,

    /// Vendor cache file (.json snapshot, or .db/.sqlite/.sqlite3 for SQLite)
    #[arg(long, default_value = "data/vendor_cache.json", global = true)]
    pub cache: PathBuf,

    /// Classifier settings override (TOML)
    ///
    /// Defaults to ~/.local/share/tally/config/classifier.toml when present,
    /// otherwise the built-in settings.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Import a statement CSV and categorize every row
    Categorize {
        /// Statement CSV (bank export, or a table written by a previous run)
        #[arg(short, long)]
        file: PathBuf,

        /// Output CSV (defaults to <stem>_categorized.csv next to the input)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Account identifier (defaults to the second `-` segment of the file name)
        #[arg(short, long)]
        account: Option<String>,

        /// Skip the remote classifier; unmatched rows stay uncategorized
        #[arg(long)]
        no_remote: bool,
    },

    /// Categorize a single description and show which tier decided
    Classify {
        /// Raw transaction description
        description: String,

        /// Skip the remote classifier
        #[arg(long)]
        no_remote: bool,
    },

    /// List the loaded rule set in match order
    Rules,

    /// Inspect the vendor cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(Subcommand)]
pub enum CacheAction {
    /// Show the cache key and cached decision for a description
    Lookup {
        /// Raw transaction description (case-sensitive)
        description: String,
    },

    /// Count stored entries
    Count,
}
