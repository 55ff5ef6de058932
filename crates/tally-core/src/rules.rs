//! Category rule set and exact keyword matching
//!
//! The rule set is an ordered list of (category, keywords) pairs loaded from
//! the `categories` mapping of a YAML file. Document order is kept: it decides
//! which category wins when more than one could match.
//!
//! ```yaml
//! categories:
//!   shopping: [AMAZON, WALMART]
//!   dining:
//!     - STARBUCKS
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde_yaml::Value;
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// One category and its keywords, in configured order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryRule {
    pub category: String,
    pub keywords: Vec<String>,
    /// Uppercased keywords, same order as `keywords`
    upper: Vec<String>,
}

impl CategoryRule {
    /// Uppercased keywords used for matching
    pub fn patterns(&self) -> &[String] {
        &self.upper
    }
}

/// Ordered, immutable category rule set
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleSet {
    rules: Vec<CategoryRule>,
}

impl RuleSet {
    /// Build a rule set from ordered (category, keywords) pairs
    ///
    /// Blank keywords are dropped. A keyword that appears (case-insensitively)
    /// under two different categories is a configuration error.
    pub fn new<I, K>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (String, K)>,
        K: IntoIterator<Item = String>,
    {
        let mut owners: HashMap<String, String> = HashMap::new();
        let mut rules = Vec::new();

        for (category, keywords) in pairs {
            let mut kept = Vec::new();
            let mut upper = Vec::new();

            for keyword in keywords {
                let trimmed = keyword.trim();
                if trimmed.is_empty() {
                    warn!(category = %category, "Dropping blank keyword");
                    continue;
                }
                let key = trimmed.to_uppercase();
                if let Some(owner) = owners.get(&key) {
                    if owner == &category {
                        debug!(category = %category, keyword = %trimmed, "Skipping repeated keyword");
                        continue;
                    }
                    return Err(Error::Config(format!(
                        "Keyword '{}' is listed under both '{}' and '{}'",
                        trimmed, owner, category
                    )));
                }
                owners.insert(key.clone(), category.clone());
                kept.push(trimmed.to_string());
                upper.push(key);
            }

            rules.push(CategoryRule {
                category,
                keywords: kept,
                upper,
            });
        }

        Ok(Self { rules })
    }

    /// Parse a YAML document with a top-level `categories` mapping
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let doc: Value = serde_yaml::from_str(content)
            .map_err(|e| Error::Config(format!("Invalid rule set YAML: {}", e)))?;

        let mapping = doc
            .get("categories")
            .and_then(Value::as_mapping)
            .ok_or_else(|| Error::Config("Rule set has no `categories` mapping".into()))?;

        let mut pairs = Vec::with_capacity(mapping.len());
        for (name, value) in mapping {
            let category = scalar_to_string(name)
                .ok_or_else(|| Error::Config(format!("Invalid category name: {:?}", name)))?;
            let keywords = match value {
                Value::Null => Vec::new(),
                Value::Sequence(items) => items
                    .iter()
                    .map(|item| {
                        scalar_to_string(item).ok_or_else(|| {
                            Error::Config(format!(
                                "Invalid keyword {:?} under '{}'",
                                item, category
                            ))
                        })
                    })
                    .collect::<Result<Vec<_>>>()?,
                other => {
                    return Err(Error::Config(format!(
                        "Keywords for '{}' must be a list, got {:?}",
                        category, other
                    )))
                }
            };
            pairs.push((category, keywords));
        }

        Self::new(pairs)
    }

    /// Load the rule set from a YAML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Failed to read rule set {}: {}", path.display(), e))
        })?;
        let rules = Self::from_yaml_str(&content)?;
        debug!(
            path = %path.display(),
            categories = rules.len(),
            keywords = rules.keyword_count(),
            "Loaded rule set"
        );
        Ok(rules)
    }

    pub fn rules(&self) -> &[CategoryRule] {
        &self.rules
    }

    /// Category names in configured order
    pub fn categories(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(|r| r.category.as_str())
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn keyword_count(&self) -> usize {
        self.rules.iter().map(|r| r.keywords.len()).sum()
    }

    /// First category with a keyword contained in the description (case-insensitive)
    pub fn match_exact(&self, description: &str) -> Option<&str> {
        let haystack = description.to_uppercase();
        self.rules
            .iter()
            .find(|rule| rule.upper.iter().any(|kw| haystack.contains(kw.as_str())))
            .map(|rule| rule.category.as_str())
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
