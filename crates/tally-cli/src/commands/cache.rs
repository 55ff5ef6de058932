//! Vendor cache command implementations

use std::path::Path;

use anyhow::{Context, Result};
use tally_core::cache::{cache_key, open_store};

/// Show the key and cached decision for a description
pub fn cmd_cache_lookup(cache_path: &Path, description: &str) -> Result<()> {
    let store = open_store(cache_path)
        .with_context(|| format!("Failed to open vendor cache {}", cache_path.display()))?;

    println!("Key: {}", cache_key(description));
    match store.get(description) {
        Some(entry) => {
            println!("Category: {}", entry.category);
            println!("Vendor:   {}", entry.vendor);
        }
        None => println!("Not cached"),
    }

    Ok(())
}

/// Count stored entries
pub fn cmd_cache_count(cache_path: &Path) -> Result<()> {
    let store = open_store(cache_path)
        .with_context(|| format!("Failed to open vendor cache {}", cache_path.display()))?;
    println!("{} cached descriptions in {}", store.len(), cache_path.display());
    Ok(())
}
