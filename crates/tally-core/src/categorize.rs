//! Three-tier categorization: exact keyword, fuzzy keyword, external classifier
//!
//! Tiers run in order for each description and the first hit wins. Rows that
//! are already categorized are never touched, so re-running a processed table
//! only classifies what is still open.

use tracing::{debug, info, warn};

use crate::classifier::{ExternalClassifier, ExternalSource};
use crate::error::Result;
use crate::fuzzy::{match_fuzzy, DEFAULT_THRESHOLD};
use crate::models::{Categorization, Classification, Tier, Transaction};
use crate::rules::RuleSet;
use crate::vendor::default_vendor;

/// Counters for one `categorize_table` run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategorizeSummary {
    /// Rows that were uncategorized at the start
    pub considered: usize,
    /// Rows already categorized and left alone
    pub skipped: usize,
    pub exact: usize,
    pub fuzzy: usize,
    pub cache_hits: usize,
    pub model: usize,
    pub malformed: usize,
    pub oversized: usize,
    /// Rows still uncategorized after the run
    pub uncategorized: usize,
    /// Calls to `batch_classify` (0 or 1 per table)
    pub batch_submissions: usize,
}

impl CategorizeSummary {
    /// Rows resolved by the external tier, from any source
    pub fn external(&self) -> usize {
        self.cache_hits + self.model + self.malformed + self.oversized
    }

    fn record_external(&mut self, source: ExternalSource) {
        match source {
            ExternalSource::Cache => self.cache_hits += 1,
            ExternalSource::Model => self.model += 1,
            ExternalSource::MalformedResponse => self.malformed += 1,
            ExternalSource::OversizedInput => self.oversized += 1,
        }
    }
}

/// Categorization orchestrator
pub struct Categorizer {
    rules: RuleSet,
    fuzzy_threshold: u8,
    external: Option<ExternalClassifier>,
}

impl Categorizer {
    /// Create a categorizer with rule tiers only
    pub fn new(rules: RuleSet) -> Self {
        Self {
            rules,
            fuzzy_threshold: DEFAULT_THRESHOLD,
            external: None,
        }
    }

    pub fn with_fuzzy_threshold(mut self, threshold: u8) -> Self {
        self.fuzzy_threshold = threshold;
        self
    }

    /// Enable the external tier
    pub fn with_external(mut self, external: ExternalClassifier) -> Self {
        self.external = Some(external);
        self
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn fuzzy_threshold(&self) -> u8 {
        self.fuzzy_threshold
    }

    pub fn external(&self) -> Option<&ExternalClassifier> {
        self.external.as_ref()
    }

    /// Exact tier only
    pub fn match_exact(&self, description: &str) -> Option<Classification> {
        self.rules.match_exact(description).map(|category| {
            debug!(description = %description, category = %category, "Exact match");
            rule_hit(category, description, Tier::Exact)
        })
    }

    /// Fuzzy tier only
    pub fn match_fuzzy(&self, description: &str) -> Option<Classification> {
        match_fuzzy(description, &self.rules, self.fuzzy_threshold).map(|hit| {
            debug!(
                description = %description,
                category = %hit.category,
                keyword = %hit.keyword,
                score = hit.score,
                "Fuzzy match"
            );
            rule_hit(hit.category, description, Tier::Fuzzy)
        })
    }

    /// Exact then fuzzy, without the external tier
    pub fn match_rules(&self, description: &str) -> Option<Classification> {
        self.match_exact(description)
            .or_else(|| self.match_fuzzy(description))
    }

    /// Run all three tiers for one description
    ///
    /// Returns `None` only when both rule tiers miss and no external
    /// classifier is configured.
    pub async fn categorize(&self, description: &str) -> Result<Option<Classification>> {
        if let Some(hit) = self.match_rules(description) {
            return Ok(Some(hit));
        }

        let Some(external) = &self.external else {
            warn!(description = %description, "No remote classifier configured, leaving uncategorized");
            return Ok(None);
        };

        let result = external.classify(description).await?;
        Ok(Some(Classification {
            category: result.category,
            vendor: result.vendor,
            tier: Tier::External,
        }))
    }

    /// Categorize every uncategorized row in place
    ///
    /// Runs an exact pass, then a fuzzy pass, then sends the remaining rows
    /// (in row order) to the external classifier in one submission.
    pub async fn categorize_table(
        &self,
        transactions: &mut [Transaction],
    ) -> Result<CategorizeSummary> {
        let mut summary = CategorizeSummary::default();

        let mut pending: Vec<usize> = Vec::new();
        for (index, tx) in transactions.iter().enumerate() {
            if tx.categorization.is_uncategorized() {
                pending.push(index);
            } else {
                summary.skipped += 1;
            }
        }
        summary.considered = pending.len();

        pending.retain(|&index| {
            let tx = &mut transactions[index];
            match self.match_exact(&tx.description) {
                Some(hit) => {
                    tx.categorization = Categorization::Categorized(hit);
                    summary.exact += 1;
                    false
                }
                None => true,
            }
        });

        pending.retain(|&index| {
            let tx = &mut transactions[index];
            match self.match_fuzzy(&tx.description) {
                Some(hit) => {
                    tx.categorization = Categorization::Categorized(hit);
                    summary.fuzzy += 1;
                    false
                }
                None => true,
            }
        });

        if !pending.is_empty() {
            match &self.external {
                Some(external) => {
                    let descriptions: Vec<String> = pending
                        .iter()
                        .map(|&index| transactions[index].description.clone())
                        .collect();

                    summary.batch_submissions += 1;
                    let results = external.batch_classify(&descriptions).await?;

                    for (&index, result) in pending.iter().zip(results) {
                        summary.record_external(result.source);
                        transactions[index].categorization =
                            Categorization::Categorized(Classification {
                                category: result.category,
                                vendor: result.vendor,
                                tier: Tier::External,
                            });
                    }
                }
                None => {
                    warn!(
                        rows = pending.len(),
                        "No remote classifier configured, leaving rows uncategorized"
                    );
                }
            }
        }

        summary.uncategorized = transactions
            .iter()
            .filter(|tx| tx.categorization.is_uncategorized())
            .count();

        info!(
            considered = summary.considered,
            skipped = summary.skipped,
            exact = summary.exact,
            fuzzy = summary.fuzzy,
            external = summary.external(),
            uncategorized = summary.uncategorized,
            "Categorization complete"
        );

        Ok(summary)
    }

    /// Rows neither rule tier recognizes, whatever their current state
    pub fn rule_misses<'a>(&self, transactions: &'a [Transaction]) -> Vec<&'a Transaction> {
        transactions
            .iter()
            .filter(|tx| {
                self.rules.match_exact(&tx.description).is_none()
                    && match_fuzzy(&tx.description, &self.rules, self.fuzzy_threshold).is_none()
            })
            .collect()
    }
}

fn rule_hit(category: &str, description: &str, tier: Tier) -> Classification {
    Classification {
        category: category.to_string(),
        vendor: default_vendor(description),
        tier,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::{AIClient, MockBackend};
    use crate::cache::MemoryCache;
    use crate::config::ClassifierConfig;
    use crate::prompts::PromptTemplate;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use std::sync::Arc;

    fn rules() -> RuleSet {
        RuleSet::from_yaml_str(
            "categories:\n  shopping: [AMAZON, WALMART]\n  dining: [STARBUCKS]\n",
        )
        .unwrap()
    }

    fn with_mock(mock: &MockBackend) -> Categorizer {
        let external = ExternalClassifier::new(
            AIClient::Mock(mock.clone()),
            Arc::new(MemoryCache::new()),
            PromptTemplate::embedded().unwrap(),
            &ClassifierConfig::default(),
        );
        Categorizer::new(rules()).with_external(external)
    }

    fn tx(description: &str) -> Transaction {
        Transaction::new(
            NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
            description,
            Decimal::new(-1250, 2),
        )
    }

    #[tokio::test]
    async fn test_exact_tier_skips_external() {
        let mock = MockBackend::new();
        let categorizer = with_mock(&mock);

        let hit = categorizer.categorize("AMAZON.COM").await.unwrap().unwrap();
        assert_eq!(hit.category, "shopping");
        assert_eq!(hit.vendor, "AMAZON.COM");
        assert_eq!(hit.tier, Tier::Exact);
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn test_fuzzy_tier_after_exact_miss() {
        let mock = MockBackend::new();
        let categorizer = with_mock(&mock);

        assert!(categorizer.match_exact("AMAZN").is_none());
        let hit = categorizer.categorize("AMAZN").await.unwrap().unwrap();
        assert_eq!(hit.category, "shopping");
        assert_eq!(hit.tier, Tier::Fuzzy);
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn test_external_tier_for_unknown() {
        let mock = MockBackend::new().with_responses(["nonsense"]);
        let categorizer = with_mock(&mock);

        let hit = categorizer
            .categorize("XKCD-1234-5678-9012")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            (hit.category.as_str(), hit.vendor.as_str()),
            ("Services", "XKCD-1234-5678-9012")
        );
        assert_eq!(hit.tier, Tier::External);
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn test_vendor_is_first_30_chars_for_rule_tiers() {
        let categorizer = Categorizer::new(rules());
        let hit = categorizer
            .categorize("Starbucks Store #01234 Seattle WA 98101")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(hit.vendor, "Starbucks Store #01234 Seattle");
    }

    #[tokio::test]
    async fn test_no_external_leaves_uncategorized() {
        let categorizer = Categorizer::new(rules());
        assert!(categorizer
            .categorize("XKCD-1234-5678-9012")
            .await
            .unwrap()
            .is_none());

        let mut table = vec![tx("WALMART #12"), tx("XKCD-1234-5678-9012")];
        let summary = categorizer.categorize_table(&mut table).await.unwrap();
        assert_eq!(summary.exact, 1);
        assert_eq!(summary.uncategorized, 1);
        assert_eq!(summary.batch_submissions, 0);
        assert!(table[1].categorization.is_uncategorized());
    }

    #[tokio::test]
    async fn test_table_single_batch_for_leftovers() {
        let mock = MockBackend::new();
        let categorizer = with_mock(&mock);

        let mut table = vec![
            tx("AMAZON.COM*2K4LM"),
            tx("STARBUCKS 1234"),
            tx("AMAZN"),
            tx("WALMART SUPERCENTER"),
            tx("XKCD-1234-5678-9012"),
        ];
        let summary = categorizer.categorize_table(&mut table).await.unwrap();

        assert_eq!(summary.considered, 5);
        assert_eq!(summary.exact, 3);
        assert_eq!(summary.fuzzy, 1);
        assert_eq!(summary.batch_submissions, 1);
        assert_eq!(summary.external(), 1);
        assert_eq!(summary.uncategorized, 0);

        let prompts = mock.prompts();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("XKCD-1234-5678-9012"));
        assert_eq!(table[4].tier(), Some(Tier::External));
        assert_eq!(table[2].tier(), Some(Tier::Fuzzy));
    }

    #[tokio::test]
    async fn test_table_rerun_is_idempotent() {
        let mock = MockBackend::new();
        let categorizer = with_mock(&mock);

        let mut table = vec![tx("AMAZON.COM"), tx("NETFLIX.COM"), tx("LOCAL PLUMBER")];
        categorizer.categorize_table(&mut table).await.unwrap();
        let snapshot = table.clone();
        let calls = mock.call_count();

        let summary = categorizer.categorize_table(&mut table).await.unwrap();
        assert_eq!(table, snapshot);
        assert_eq!(summary.skipped, 3);
        assert_eq!(summary.considered, 0);
        assert_eq!(summary.batch_submissions, 0);
        assert_eq!(mock.call_count(), calls);
    }

    #[tokio::test]
    async fn test_table_keeps_prior_categorization() {
        let categorizer = Categorizer::new(rules());
        let mut manual = tx("AMAZON.COM");
        manual.categorization = Categorization::Categorized(Classification {
            category: "gifts".into(),
            vendor: "AMAZON".into(),
            tier: Tier::External,
        });
        let mut table = vec![manual];

        categorizer.categorize_table(&mut table).await.unwrap();
        assert_eq!(table[0].category(), "gifts");
    }

    #[test]
    fn test_rule_misses() {
        let categorizer = Categorizer::new(rules());
        let table = vec![tx("AMAZON.COM"), tx("XKCD-1234-5678-9012"), tx("AMAZN")];
        let misses = categorizer.rule_misses(&table);
        assert_eq!(misses.len(), 1);
        assert_eq!(misses[0].description, "XKCD-1234-5678-9012");
    }

    #[test]
    fn test_threshold_controls_fuzzy_tier() {
        let strict = Categorizer::new(rules()).with_fuzzy_threshold(95);
        assert!(strict.match_rules("AMAZN").is_none());
        assert_eq!(strict.fuzzy_threshold(), 95);
    }
}
