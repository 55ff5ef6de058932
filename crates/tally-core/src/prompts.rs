//! Classification prompt template
//!
//! The prompt is loaded with a two-layer resolution:
//! 1. Check for override in data dir (~/.local/share/tally/prompts/classify_transaction.md)
//! 2. Fall back to the embedded default (compiled into binary)
//!
//! Prompt files start with YAML frontmatter (`id`, `version`) followed by a
//! `# User` section. `{{name}}` placeholders are replaced at render time.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::{Captures, Regex};
use serde::Deserialize;

use crate::error::{Error, Result};

/// Embedded default prompt (compiled into binary)
const CLASSIFY_TRANSACTION: &str = include_str!("../../../prompts/classify_transaction.md");

/// File name of the classification prompt
pub const PROMPT_FILE: &str = "classify_transaction.md";

/// Prompt frontmatter metadata
#[derive(Debug, Clone, Deserialize)]
pub struct PromptMetadata {
    pub id: String,
    /// Version number for tracking changes
    pub version: u32,
}

/// A loaded prompt with metadata and content
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    pub metadata: PromptMetadata,
    /// Body after the frontmatter
    pub content: String,
    /// Path of the override file, if one was used
    pub override_path: Option<PathBuf>,
}

impl PromptTemplate {
    /// Load from the default override directory, or the embedded default
    pub fn load() -> Result<Self> {
        Self::load_from_dir(default_prompts_dir().as_deref())
    }

    /// Load from `dir/classify_transaction.md` if present, else the embedded default
    pub fn load_from_dir(dir: Option<&Path>) -> Result<Self> {
        if let Some(dir) = dir {
            let path = dir.join(PROMPT_FILE);
            if path.exists() {
                let content = fs::read_to_string(&path).map_err(|e| {
                    Error::Config(format!("Failed to read prompt override: {}", e))
                })?;
                let (metadata, body) = parse_prompt(&content)?;
                return Ok(Self {
                    metadata,
                    content: body,
                    override_path: Some(path),
                });
            }
        }
        Self::embedded()
    }

    /// The embedded default prompt
    pub fn embedded() -> Result<Self> {
        let (metadata, body) = parse_prompt(CLASSIFY_TRANSACTION)?;
        Ok(Self {
            metadata,
            content: body,
            override_path: None,
        })
    }

    pub fn is_override(&self) -> bool {
        self.override_path.is_some()
    }

    /// The `# User` section, or the whole body when there are no sections
    pub fn user_section(&self) -> &str {
        extract_section(&self.content, "# User").unwrap_or(&self.content)
    }

    /// Render the user section with `{{var}}` placeholders replaced
    ///
    /// Substitution is a single pass over the template: substituted values are
    /// never rescanned, and unknown placeholders are left as written.
    pub fn render(&self, vars: &HashMap<&str, &str>) -> String {
        placeholder_regex()
            .replace_all(self.user_section(), |caps: &Captures| {
                match vars.get(&caps[1]) {
                    Some(value) => value.to_string(),
                    None => caps[0].to_string(),
                }
            })
            .into_owned()
    }

    /// Render the classification prompt for one description
    ///
    /// Double quotes are removed from the description so it cannot break out
    /// of the quoted slot.
    pub fn render_classification(
        &self,
        categories: &[String],
        fallback_category: &str,
        description: &str,
    ) -> String {
        let categories = categories.join(", ");
        let description = description.replace('"', "");
        let mut vars = HashMap::new();
        vars.insert("categories", categories.as_str());
        vars.insert("fallback_category", fallback_category);
        vars.insert("description", description.as_str());
        self.render(&vars)
    }
}

fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{(\w+)\}\}").expect("valid regex"))
}

/// Default prompts override directory
pub fn default_prompts_dir() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("tally").join("prompts"))
}

/// Parse a prompt file into metadata and body
fn parse_prompt(content: &str) -> Result<(PromptMetadata, String)> {
    let content = content.trim();

    let rest = content.strip_prefix("---").ok_or_else(|| {
        Error::Config("Prompt must start with YAML frontmatter (---)".into())
    })?;

    let end = rest.find("---").ok_or_else(|| {
        Error::Config("Prompt frontmatter not closed (missing second ---)".into())
    })?;

    let frontmatter = rest[..end].trim();
    let body = rest[end + 3..].trim();

    let metadata: PromptMetadata = serde_yaml::from_str(frontmatter)
        .map_err(|e| Error::Config(format!("Invalid prompt frontmatter: {}", e)))?;

    Ok((metadata, body.to_string()))
}

/// Extract a section from the prompt content
fn extract_section<'a>(content: &'a str, header: &str) -> Option<&'a str> {
    let start = content.find(header)?;
    let after_header = &content[start + header.len()..];
    let end = after_header.find("\n# ").unwrap_or(after_header.len());
    Some(after_header[..end].trim())
}
