//! Rule set command implementations

use std::path::Path;

use anyhow::Result;

use super::{load_rules, truncate};

/// List categories and keywords in match order
pub fn cmd_rules_list(rules_path: &Path) -> Result<()> {
    let rules = load_rules(rules_path)?;

    if rules.is_empty() {
        println!("No categories defined in {}", rules_path.display());
        return Ok(());
    }

    println!(
        "Rule set ({} categories, {} keywords) from {}:\n",
        rules.len(),
        rules.keyword_count(),
        rules_path.display()
    );
    println!("{:>3}  {:<20}  KEYWORDS", "#", "CATEGORY");
    println!("{}", "-".repeat(72));

    for (i, rule) in rules.rules().iter().enumerate() {
        let keywords = if rule.keywords.is_empty() {
            "(none)".to_string()
        } else {
            rule.keywords.join(", ")
        };
        println!(
            "{:>3}  {:<20}  {}",
            i + 1,
            truncate(&rule.category, 20),
            truncate(&keywords, 46)
        );
    }

    println!();
    println!("Categories are tried top to bottom; the first match wins.");

    Ok(())
}
