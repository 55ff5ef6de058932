//! Categorization command implementations

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Local;
use tally_core::{
    ai::AIClient,
    categorize::CategorizeSummary,
    import::{account_from_filename, parse_statement, write_categorized, write_rule_misses},
};

use super::{build_categorizer, Paths};

/// Import a statement, categorize it and write the results
pub async fn cmd_categorize(
    paths: &Paths,
    file: &Path,
    output: Option<&Path>,
    account: Option<String>,
    ai: Option<AIClient>,
) -> Result<()> {
    let categorizer = build_categorizer(paths, ai).await?;

    let account = account.or_else(|| account_from_filename(file));

    println!("📥 Reading {}...", file.display());
    let csv_file =
        File::open(file).with_context(|| format!("Failed to open file: {}", file.display()))?;
    let mut transactions = parse_statement(csv_file, account.as_deref())
        .with_context(|| format!("Failed to parse statement: {}", file.display()))?;
    println!("   Found {} transactions", transactions.len());

    println!();
    println!("🏷️  Categorizing...");
    let summary = categorizer.categorize_table(&mut transactions).await?;
    print_summary(&summary);

    let output = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| default_output_path(file));
    ensure_parent(&output)?;
    let out_file = File::create(&output)
        .with_context(|| format!("Failed to create output: {}", output.display()))?;
    write_categorized(BufWriter::new(out_file), &transactions)?;

    println!();
    println!("✅ Wrote {}", output.display());

    let misses = categorizer.rule_misses(&transactions);
    if !misses.is_empty() {
        let report = rule_miss_path(&output, &Local::now().format("%Y%m%d_%H%M%S").to_string());
        let report_file = File::create(&report)
            .with_context(|| format!("Failed to create report: {}", report.display()))?;
        write_rule_misses(BufWriter::new(report_file), &misses)?;

        println!();
        println!(
            "🚨 {} rows matched no keyword rule. See {}",
            misses.len(),
            report.display()
        );
        println!(
            "   Add the missing vendors to {} to categorize them locally",
            paths.rules.display()
        );
    }

    Ok(())
}

/// Categorize one description and print the decision
pub async fn cmd_classify(paths: &Paths, description: &str, ai: Option<AIClient>) -> Result<()> {
    let categorizer = build_categorizer(paths, ai).await?;

    match categorizer.categorize(description).await? {
        Some(hit) => {
            println!("Category: {}", hit.category);
            println!("Vendor:   {}", hit.vendor);
            println!("Tier:     {}", hit.tier);
        }
        None => {
            println!("No rule matched \"{}\"", description);
            println!("Remote classifier disabled; the row would stay uncategorized");
        }
    }

    Ok(())
}

fn print_summary(summary: &CategorizeSummary) {
    if summary.skipped > 0 {
        println!("   Already categorized: {}", summary.skipped);
    }
    println!("   By exact rule: {}", summary.exact);
    println!("   By fuzzy rule: {}", summary.fuzzy);
    if summary.external() > 0 {
        println!(
            "   By remote classifier: {} ({} cached)",
            summary.external(),
            summary.cache_hits
        );
        if summary.malformed > 0 {
            println!("   - Malformed answers (fallback used): {}", summary.malformed);
        }
        if summary.oversized > 0 {
            println!("   - Too long to send (fallback used): {}", summary.oversized);
        }
    }
    if summary.uncategorized > 0 {
        println!("   Uncategorized: {}", summary.uncategorized);
    }
}

/// `<stem>_categorized.csv` next to the input
pub fn default_output_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "statement".to_string());
    input.with_file_name(format!("{}_categorized.csv", stem))
}

/// `uncategorized_<timestamp>.csv` in the output's directory
pub fn rule_miss_path(output: &Path, timestamp: &str) -> PathBuf {
    output.with_file_name(format!("uncategorized_{}.csv", timestamp))
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
    }
    Ok(())
}
