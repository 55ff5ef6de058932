//! Vendor name normalization

use unicode_normalization::UnicodeNormalization;

/// Maximum vendor length in characters
pub const VENDOR_MAX_LEN: usize = 30;

/// First `max` characters of `s` (char-aware, never splits a code point)
pub fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

/// Vendor used when no tier produced a cleaned one: the raw description, truncated
pub fn default_vendor(description: &str) -> String {
    truncate_chars(description, VENDOR_MAX_LEN)
}

/// Normalize a vendor name returned by the remote classifier
///
/// Transliterates to ASCII via NFKD, uppercases, drops punctuation,
/// collapses whitespace and truncates to 30 characters. The result only
/// contains `A-Z`, `0-9` and single spaces.
pub fn clean_vendor(raw: &str) -> String {
    let ascii: String = raw
        .nfkd()
        .filter(|c| c.is_ascii_alphanumeric() || c.is_ascii_whitespace())
        .map(|c| c.to_ascii_uppercase())
        .collect();

    let collapsed = ascii.split_whitespace().collect::<Vec<_>>().join(" ");
    truncate_chars(&collapsed, VENDOR_MAX_LEN)
        .trim_end()
        .to_string()
}
