//! Classifier configuration
//!
//! Settings for the remote classifier, fuzzy threshold and retry policy.
//!
//! ## Configuration Resolution
//!
//! 1. An explicit path (`--config`), which must exist
//! 2. Override in data dir (~/.local/share/tally/config/classifier.toml)
//! 3. Embedded defaults (compiled into binary)
//!
//! Keys missing from an override keep their default values.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::fuzzy::DEFAULT_THRESHOLD;
use crate::retry::RetryPolicy;

/// Embedded default config (compiled into binary)
const DEFAULT_CONFIG: &str = include_str!("../../../config/classifier.toml");

/// Remote model call parameters
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSettings {
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout: Duration,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            temperature: 0.0,
            max_tokens: 8,
            timeout: Duration::from_secs(30),
        }
    }
}

/// What the remote classifier may answer and how input is guarded
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationSettings {
    /// Closed category list embedded in the prompt
    pub categories: Vec<String>,
    pub fallback_category: String,
    pub batch_size: usize,
    /// Whitespace-token limit above which the remote call is skipped
    pub max_input_tokens: usize,
}

impl Default for ClassificationSettings {
    fn default() -> Self {
        Self {
            categories: [
                "Groceries",
                "Dining",
                "Fuel",
                "Utilities",
                "Subscriptions",
                "Insurance",
                "Shopping",
                "Entertainment",
                "Medical",
                "Transportation",
                "Services",
                "Credit Card",
                "Rent",
                "Car Payment",
                "Income",
                "Refund",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            fallback_category: "Services".to_string(),
            batch_size: 50,
            max_input_tokens: 9000,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassifierConfig {
    pub model: ModelSettings,
    pub classification: ClassificationSettings,
    /// Minimum fuzzy score (0-100)
    pub fuzzy_threshold: u8,
    pub retry: RetryPolicy,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            model: ModelSettings::default(),
            classification: ClassificationSettings::default(),
            fuzzy_threshold: DEFAULT_THRESHOLD,
            retry: RetryPolicy::default(),
        }
    }
}

impl ClassifierConfig {
    /// Load from the default override location, or the embedded defaults
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load from an explicit path if given, else the default resolution
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::read_file(path);
        }
        if let Some(default_path) = default_config_path() {
            if default_path.exists() {
                return Self::read_file(&default_path);
            }
        }
        Self::embedded()
    }

    /// The embedded defaults
    pub fn embedded() -> Result<Self> {
        Self::from_toml_str(DEFAULT_CONFIG)
    }

    fn read_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            Error::Config(format!(
                "Failed to read classifier config {}: {}",
                path.display(),
                e
            ))
        })?;
        debug!(path = %path.display(), "Loading classifier config override");
        Self::from_toml_str(&content)
    }

    /// Parse TOML, layering present keys over the defaults
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let raw: RawConfig = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Invalid classifier config TOML: {}", e)))?;

        let mut config = Self::default();

        if let Some(model) = raw.model {
            if let Some(temperature) = model.temperature {
                config.model.temperature = temperature;
            }
            if let Some(max_tokens) = model.max_tokens {
                config.model.max_tokens = max_tokens;
            }
            if let Some(timeout) = model.timeout_secs {
                config.model.timeout = Duration::from_secs(timeout);
            }
        }

        if let Some(classification) = raw.classification {
            if let Some(categories) = classification.categories {
                config.classification.categories = categories;
            }
            if let Some(fallback) = classification.fallback_category {
                config.classification.fallback_category = fallback;
            }
            if let Some(batch_size) = classification.batch_size {
                config.classification.batch_size = batch_size;
            }
            if let Some(max_input_tokens) = classification.max_input_tokens {
                config.classification.max_input_tokens = max_input_tokens;
            }
        }

        if let Some(threshold) = raw.rules.and_then(|r| r.fuzzy_threshold) {
            config.fuzzy_threshold = threshold;
        }

        if let Some(retry) = raw.retry {
            if let Some(ms) = retry.initial_delay_ms {
                config.retry.initial_delay = Duration::from_millis(ms);
            }
            if let Some(multiplier) = retry.multiplier {
                config.retry.multiplier = multiplier;
            }
            if let Some(secs) = retry.max_delay_secs {
                config.retry.max_delay = Duration::from_secs(secs);
            }
            if let Some(secs) = retry.max_elapsed_secs {
                config.retry.max_elapsed = Duration::from_secs(secs);
            }
            if retry.max_attempts.is_some() {
                config.retry.max_attempts = retry.max_attempts;
            }
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let c = &self.classification;
        if c.categories.iter().all(|s| s.trim().is_empty()) {
            return Err(Error::Config("classification.categories is empty".into()));
        }
        if c.fallback_category.trim().is_empty() {
            return Err(Error::Config(
                "classification.fallback_category is empty".into(),
            ));
        }
        if !c.categories.contains(&c.fallback_category) {
            warn!(
                fallback = %c.fallback_category,
                "Fallback category is not in the allowed category list"
            );
        }
        if c.batch_size == 0 {
            return Err(Error::Config("classification.batch_size must be >= 1".into()));
        }
        if self.fuzzy_threshold > 100 {
            return Err(Error::Config(format!(
                "rules.fuzzy_threshold must be 0-100, got {}",
                self.fuzzy_threshold
            )));
        }
        if self.retry.multiplier.is_nan() || self.retry.multiplier < 1.0 {
            return Err(Error::Config(format!(
                "retry.multiplier must be >= 1.0, got {}",
                self.retry.multiplier
            )));
        }
        if self.retry.max_attempts == Some(0) {
            return Err(Error::Config("retry.max_attempts must be >= 1".into()));
        }
        Ok(())
    }
}

/// Default config override path
pub fn default_config_path() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("tally").join("config").join("classifier.toml"))
}

/// Raw config structure for TOML parsing
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    model: Option<RawModel>,
    classification: Option<RawClassification>,
    rules: Option<RawRules>,
    retry: Option<RawRetry>,
}

#[derive(Debug, Deserialize)]
struct RawModel {
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RawClassification {
    categories: Option<Vec<String>>,
    fallback_category: Option<String>,
    batch_size: Option<usize>,
    max_input_tokens: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct RawRules {
    fuzzy_threshold: Option<u8>,
}

#[derive(Debug, Deserialize)]
struct RawRetry {
    initial_delay_ms: Option<u64>,
    multiplier: Option<f64>,
    max_delay_secs: Option<u64>,
    max_elapsed_secs: Option<u64>,
    max_attempts: Option<u32>,
}
