//! Approximate keyword matching
//!
//! Scores are integers in 0..=100. `ratio` is the indel similarity
//! `2 * LCS / (|a| + |b|)`; `partial_ratio` and `token_set_ratio` build on it
//! to tolerate extra surrounding text and reordered words.

use std::collections::BTreeSet;

use crate::rules::RuleSet;

/// Default similarity threshold for a fuzzy match
pub const DEFAULT_THRESHOLD: u8 = 60;

/// A fuzzy-tier hit: the category plus the keyword that satisfied it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FuzzyMatch<'a> {
    pub category: &'a str,
    pub keyword: &'a str,
    /// 100 for a literal substring hit
    pub score: u8,
}

/// Similarity of two strings, 0..=100 (case-sensitive)
pub fn ratio(a: &str, b: &str) -> u8 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    ratio_chars(&a, &b)
}

/// Best `ratio` of the shorter string against any same-length window of the longer
pub fn partial_ratio(a: &str, b: &str) -> u8 {
    let a: Vec<char> = a.to_uppercase().chars().collect();
    let b: Vec<char> = b.to_uppercase().chars().collect();
    let (short, long) = if a.len() <= b.len() { (a, b) } else { (b, a) };

    if short.is_empty() {
        return 0;
    }

    let mut best = 0;
    for window in long.windows(short.len()) {
        best = best.max(ratio_chars(&short, window));
        if best == 100 {
            break;
        }
    }
    best
}

/// Word-set similarity, insensitive to case, punctuation and word order
pub fn token_set_ratio(a: &str, b: &str) -> u8 {
    let ta = tokens(a);
    let tb = tokens(b);
    if ta.is_empty() || tb.is_empty() {
        return 0;
    }

    let sect = join(ta.intersection(&tb));
    let diff_ab = join(ta.difference(&tb));
    let diff_ba = join(tb.difference(&ta));

    let combined_ab = format!("{} {}", sect, diff_ab).trim().to_string();
    let combined_ba = format!("{} {}", sect, diff_ba).trim().to_string();

    ratio(&sect, &combined_ab)
        .max(ratio(&sect, &combined_ba))
        .max(ratio(&combined_ab, &combined_ba))
}

/// First category (in rule-set order) with a keyword similar enough to the description
///
/// A keyword qualifies when it is a literal substring of the description, or
/// when either `partial_ratio` or `token_set_ratio` reaches `threshold`.
pub fn match_fuzzy<'a>(
    description: &str,
    rules: &'a RuleSet,
    threshold: u8,
) -> Option<FuzzyMatch<'a>> {
    let haystack = description.to_uppercase();

    for rule in rules.rules() {
        for (keyword, pattern) in rule.keywords.iter().zip(rule.patterns()) {
            let score = if haystack.contains(pattern.as_str()) {
                100
            } else {
                partial_ratio(pattern, &haystack).max(token_set_ratio(pattern, &haystack))
            };
            if score >= threshold {
                return Some(FuzzyMatch {
                    category: &rule.category,
                    keyword,
                    score,
                });
            }
        }
    }
    None
}

fn ratio_chars(a: &[char], b: &[char]) -> u8 {
    let total = a.len() + b.len();
    if total == 0 {
        return 0;
    }
    let lcs = lcs_len(a, b);
    // Halves round to even, so x.5 ties score like the reference scorer
    (200.0 * lcs as f64 / total as f64).round_ties_even() as u8
}

/// Longest common subsequence length, two-row DP
fn lcs_len(a: &[char], b: &[char]) -> usize {
    if a.is_empty() || b.is_empty() {
        return 0;
    }
    let mut prev = vec![0usize; b.len() + 1];
    let mut curr = vec![0usize; b.len() + 1];

    for ca in a {
        for (j, cb) in b.iter().enumerate() {
            curr[j + 1] = if ca == cb {
                prev[j] + 1
            } else {
                curr[j].max(prev[j + 1])
            };
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

fn tokens(s: &str) -> BTreeSet<String> {
    let cleaned: String = s
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    cleaned.split_whitespace().map(str::to_string).collect()
}

fn join<'a>(words: impl Iterator<Item = &'a String>) -> String {
    words.map(String::as_str).collect::<Vec<_>>().join(" ")
}
