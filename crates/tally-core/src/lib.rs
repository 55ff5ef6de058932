//! Tally Core Library
//!
//! Statement categorization for the Tally personal finance tool:
//! - CSV statement import and categorized-table export
//! - Ordered category rule set with exact and fuzzy keyword tiers
//! - Pluggable remote classifier backends (OpenAI-compatible, Ollama, mock)
//! - Bounded exponential-backoff retry policy
//! - Vendor cache stores (JSON snapshot, SQLite, in-memory)
//! - Categorization orchestrator driving the three tiers

pub mod ai;
pub mod cache;
pub mod categorize;
pub mod classifier;
pub mod config;
pub mod error;
pub mod fuzzy;
pub mod import;
pub mod models;
pub mod prompts;
pub mod retry;
pub mod rules;
pub mod vendor;

/// Test utilities including a mock OpenAI-compatible server
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use ai::{AIBackend, AIClient, GenerationParams, MockBackend, OllamaBackend, OpenAICompatibleBackend};
pub use cache::{cache_key, open_store, CacheEntry, CacheStore, JsonFileCache, MemoryCache, SqliteCache};
pub use categorize::{CategorizeSummary, Categorizer};
pub use classifier::{ExternalClassifier, ExternalResult, ExternalSource};
pub use config::ClassifierConfig;
pub use error::{Error, Result};
pub use models::{Categorization, Classification, Tier, Transaction, TransactionType, UNCATEGORIZED};
pub use prompts::PromptTemplate;
pub use retry::RetryPolicy;
pub use rules::{CategoryRule, RuleSet};
