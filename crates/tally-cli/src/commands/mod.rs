//! CLI command implementations
//!
//! Commands are organized by domain:
//! - `common` - Shared setup (rule set, cache store, categorizer construction)
//! - `categorize` - Statement categorization and single-description classification
//! - `rules` - Rule set listing
//! - `cache` - Vendor cache inspection

pub mod cache;
pub mod categorize;
pub mod common;
pub mod rules;

// Re-export command functions for main.rs
pub use cache::*;
pub use categorize::*;
pub use common::*;
pub use rules::*;

/// Truncate a string to a maximum length, adding "..." if truncated
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
