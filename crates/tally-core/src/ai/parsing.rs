//! Parsing helpers for remote classifier responses
//!
//! The model is asked for a single `Category | Vendor` line. Models sometimes
//! add a preamble or wrap the answer in quotes or markdown, so the first line
//! holding a `|` is used.

use std::sync::OnceLock;

use regex::Regex;

fn answer_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^([^|\n]+)\|([^\n]+)$").expect("valid regex"))
}

/// Split a `Category | Vendor` response into (category, raw vendor)
///
/// Returns `None` when there is no separator or either side is empty after
/// trimming. The vendor is returned as-is; callers normalize it.
pub fn parse_category_vendor(response: &str) -> Option<(String, String)> {
    let caps = answer_line().captures(response)?;
    let category = strip_decoration(&caps[1]);
    let vendor = strip_decoration(&caps[2]);

    if category.is_empty() || vendor.is_empty() {
        return None;
    }
    Some((category.to_string(), vendor.to_string()))
}

fn strip_decoration(s: &str) -> &str {
    s.trim().trim_matches(|c| matches!(c, '"' | '\'' | '`' | '*')).trim()
}
