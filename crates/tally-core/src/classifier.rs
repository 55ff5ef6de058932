//! External classifier adapter
//!
//! Resolves one description to (category, vendor) using the cache first and
//! the remote model second. Every path that reaches the model (or decides not
//! to call it) writes its answer to the cache before returning.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::ai::parsing::parse_category_vendor;
use crate::ai::{AIBackend, AIClient, GenerationParams};
use crate::cache::CacheStore;
use crate::config::ClassifierConfig;
use crate::error::Result;
use crate::prompts::PromptTemplate;
use crate::retry::RetryPolicy;
use crate::vendor::{clean_vendor, default_vendor};

/// Where an external result came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExternalSource {
    /// Prior decision found in the cache
    Cache,
    /// Well-formed model answer
    Model,
    /// Model answered without a usable `Category | Vendor` line
    MalformedResponse,
    /// Description too long to send; fallback used without a call
    OversizedInput,
}

impl ExternalSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cache => "cache",
            Self::Model => "model",
            Self::MalformedResponse => "malformed_response",
            Self::OversizedInput => "oversized_input",
        }
    }
}

impl fmt::Display for ExternalSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalResult {
    pub category: String,
    pub vendor: String,
    pub source: ExternalSource,
}

/// Cache-backed remote classifier
pub struct ExternalClassifier {
    client: AIClient,
    cache: Arc<dyn CacheStore>,
    prompt: PromptTemplate,
    categories: Vec<String>,
    fallback_category: String,
    batch_size: usize,
    max_input_tokens: usize,
    params: GenerationParams,
    retry: RetryPolicy,
}

impl ExternalClassifier {
    pub fn new(
        client: AIClient,
        cache: Arc<dyn CacheStore>,
        prompt: PromptTemplate,
        config: &ClassifierConfig,
    ) -> Self {
        Self {
            client: client.with_timeout(config.model.timeout),
            cache,
            prompt,
            categories: config.classification.categories.clone(),
            fallback_category: config.classification.fallback_category.clone(),
            batch_size: config.classification.batch_size.max(1),
            max_input_tokens: config.classification.max_input_tokens,
            params: GenerationParams {
                temperature: config.model.temperature,
                max_tokens: config.model.max_tokens,
            },
            retry: config.retry.clone(),
        }
    }

    pub fn client(&self) -> &AIClient {
        &self.client
    }

    pub fn cache(&self) -> &Arc<dyn CacheStore> {
        &self.cache
    }

    /// Classify one description
    ///
    /// Fails only when the remote call fails fatally or the retry budget is
    /// exhausted, or when the cache cannot be written.
    pub async fn classify(&self, description: &str) -> Result<ExternalResult> {
        if let Some(entry) = self.cache.get(description) {
            debug!(description = %description, category = %entry.category, "Cache hit");
            return Ok(ExternalResult {
                category: entry.category,
                vendor: entry.vendor,
                source: ExternalSource::Cache,
            });
        }

        let result = if description.split_whitespace().count() > self.max_input_tokens {
            warn!(
                limit = self.max_input_tokens,
                "Description exceeds token limit, using fallback category"
            );
            self.fallback(description, ExternalSource::OversizedInput)
        } else {
            self.ask_model(description).await?
        };

        self.cache
            .put(description, &result.category, &result.vendor)?;
        Ok(result)
    }

    /// Classify descriptions in order, one remote call per uncached item
    ///
    /// Items are grouped into batches only for progress logging. A fatal
    /// error stops the run; entries cached before it are kept.
    pub async fn batch_classify(&self, descriptions: &[String]) -> Result<Vec<ExternalResult>> {
        let total_batches = descriptions.len().div_ceil(self.batch_size);
        let mut results = Vec::with_capacity(descriptions.len());

        for (index, batch) in descriptions.chunks(self.batch_size).enumerate() {
            info!(
                batch = index + 1,
                of = total_batches,
                size = batch.len(),
                "Classifying batch"
            );
            for description in batch {
                results.push(self.classify(description).await?);
            }
        }

        Ok(results)
    }

    async fn ask_model(&self, description: &str) -> Result<ExternalResult> {
        let prompt =
            self.prompt
                .render_classification(&self.categories, &self.fallback_category, description);

        let response = self
            .retry
            .run(|| self.client.complete(&prompt, &self.params))
            .await?;

        match parse_category_vendor(&response) {
            Some((category, raw_vendor)) => {
                let cleaned = clean_vendor(&raw_vendor);
                let vendor = if cleaned.is_empty() {
                    default_vendor(description)
                } else {
                    cleaned
                };
                debug!(
                    description = %description,
                    category = %category,
                    vendor = %vendor,
                    model = %self.client.model(),
                    "Model classified"
                );
                Ok(ExternalResult {
                    category,
                    vendor,
                    source: ExternalSource::Model,
                })
            }
            None => {
                warn!(
                    description = %description,
                    response = %response,
                    "Malformed model response, using fallback category"
                );
                Ok(self.fallback(description, ExternalSource::MalformedResponse))
            }
        }
    }

    fn fallback(&self, description: &str, source: ExternalSource) -> ExternalResult {
        ExternalResult {
            category: self.fallback_category.clone(),
            vendor: default_vendor(description),
            source,
        }
    }
}
