//! Integration tests for tally-core
//!
//! These tests exercise the full import → categorize → export → re-run workflow.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use rust_decimal::Decimal;

use tally_core::{
    ai::{AIClient, MockBackend},
    cache::{CacheStore, JsonFileCache},
    categorize::Categorizer,
    classifier::ExternalClassifier,
    config::ClassifierConfig,
    import::{parse_statement, write_categorized},
    models::{Categorization, Tier, Transaction},
    prompts::PromptTemplate,
    retry::RetryPolicy,
    rules::RuleSet,
    Error,
};

const RULES: &str = r#"
categories:
  shopping:
    - AMAZON
    - WALMART
  dining:
    - STARBUCKS
  fuel:
    - SHELL
"#;

/// Capital One style export: split debit/credit columns
fn capital_one_csv() -> &'static str {
    "Transaction Date,Posted Date,Card No.,Description,Category,Debit,Credit
2025-01-02,2025-01-03,8592,AMAZON.COM*2K4LM,Merchandise,29.99,
2025-01-03,2025-01-04,8592,STARBUCKS STORE 1234,Dining,4.75,
2025-01-04,2025-01-05,8592,AMAZN MKTP,Merchandise,12.00,
2025-01-05,2025-01-06,8592,WALMART SUPERCENTER,Merchandise,80.12,
2025-01-06,2025-01-07,8592,NETFLIX.COM 866-579,Entertainment,15.49,
2025-01-07,2025-01-08,8592,ACME PLUMBING CO,Services,120.00,
2025-01-08,2025-01-09,8592,NETFLIX.COM 866-579,Entertainment,15.49,
2025-01-09,2025-01-10,8592,CAPITAL ONE AUTOPAY,Payment/Credit,,250.00
"
}

fn fast_config() -> ClassifierConfig {
    let mut config = ClassifierConfig::default();
    config.retry = RetryPolicy {
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(2),
        max_elapsed: Duration::from_millis(100),
        max_attempts: Some(3),
        ..RetryPolicy::default()
    };
    config
}

fn categorizer(mock: &MockBackend, cache: Arc<dyn CacheStore>) -> Categorizer {
    let external = ExternalClassifier::new(
        AIClient::Mock(mock.clone()),
        cache,
        PromptTemplate::embedded().unwrap(),
        &fast_config(),
    );
    Categorizer::new(RuleSet::from_yaml_str(RULES).unwrap()).with_external(external)
}

/// Everything a categorized table round-trips (the bank's own category is not exported)
fn states(txs: &[Transaction]) -> Vec<(NaiveDate, String, Decimal, Categorization)> {
    txs.iter()
        .map(|t| (t.date, t.description.clone(), t.amount, t.categorization.clone()))
        .collect()
}

#[tokio::test]
async fn test_full_categorize_workflow() {
    let dir = tempfile::tempdir().unwrap();
    let cache: Arc<dyn CacheStore> = Arc::new(JsonFileCache::new(dir.path().join("vendor_cache.json")));
    let mock = MockBackend::new();
    let categorizer = categorizer(&mock, cache.clone());

    let mut txs = parse_statement(capital_one_csv().as_bytes(), Some("8592")).unwrap();
    assert_eq!(txs.len(), 8);

    let summary = categorizer.categorize_table(&mut txs).await.unwrap();
    assert_eq!(summary.considered, 8);
    assert_eq!(summary.exact, 3);
    assert_eq!(summary.fuzzy, 1);
    assert_eq!(summary.batch_submissions, 1);
    assert_eq!(summary.uncategorized, 0);

    // Duplicate NETFLIX row is answered from the cache written by the first
    assert_eq!(summary.model, 3);
    assert_eq!(summary.cache_hits, 1);
    assert_eq!(mock.call_count(), 3);

    assert_eq!(txs[0].category(), "shopping");
    assert_eq!(txs[0].tier(), Some(Tier::Exact));
    assert_eq!(txs[2].category(), "shopping");
    assert_eq!(txs[2].tier(), Some(Tier::Fuzzy));
    assert_eq!(txs[4].category(), "Subscriptions");
    assert_eq!(txs[4].vendor(), "NETFLIX");
    assert_eq!(txs[4].tier(), Some(Tier::External));
    assert_eq!(txs[6].vendor(), "NETFLIX");
    assert_eq!(cache.len(), 3);
}

#[tokio::test]
async fn test_rerun_of_exported_table_makes_no_calls() {
    let dir = tempfile::tempdir().unwrap();
    let cache_path = dir.path().join("vendor_cache.json");
    let mock = MockBackend::new();

    let mut txs = parse_statement(capital_one_csv().as_bytes(), Some("8592")).unwrap();
    categorizer(&mock, Arc::new(JsonFileCache::new(&cache_path)))
        .categorize_table(&mut txs)
        .await
        .unwrap();
    let calls = mock.call_count();

    let mut exported = Vec::new();
    write_categorized(&mut exported, &txs).unwrap();

    let mut reloaded = parse_statement(exported.as_slice(), None).unwrap();
    assert_eq!(states(&reloaded), states(&txs));
    assert_eq!(reloaded[0].account_number.as_deref(), Some("8592"));

    let second = MockBackend::new();
    let summary = categorizer(&second, Arc::new(JsonFileCache::new(&cache_path)))
        .categorize_table(&mut reloaded)
        .await
        .unwrap();

    assert_eq!(summary.skipped, 8);
    assert_eq!(summary.batch_submissions, 0);
    assert_eq!(second.call_count(), 0);
    assert_eq!(states(&reloaded), states(&txs));
    assert!(calls > 0);
}

#[tokio::test]
async fn test_cache_survives_across_runs() {
    let dir = tempfile::tempdir().unwrap();
    let cache_path = dir.path().join("data/vendor_cache.json");

    let first = MockBackend::new();
    let mut txs = parse_statement(capital_one_csv().as_bytes(), None).unwrap();
    categorizer(&first, Arc::new(JsonFileCache::new(&cache_path)))
        .categorize_table(&mut txs)
        .await
        .unwrap();
    assert!(cache_path.exists());

    // Fresh import of the same statement: everything external comes from the cache
    let second = MockBackend::new();
    let mut again = parse_statement(capital_one_csv().as_bytes(), None).unwrap();
    let summary = categorizer(&second, Arc::new(JsonFileCache::new(&cache_path)))
        .categorize_table(&mut again)
        .await
        .unwrap();

    assert_eq!(second.call_count(), 0);
    assert_eq!(summary.cache_hits, 4);
    assert_eq!(summary.model, 0);
    let categories: Vec<_> = again.iter().map(|t| t.category().to_string()).collect();
    let expected: Vec<_> = txs.iter().map(|t| t.category().to_string()).collect();
    assert_eq!(categories, expected);
}

#[tokio::test]
async fn test_exhausted_retries_halt_batch_but_keep_progress() {
    let dir = tempfile::tempdir().unwrap();
    let cache: Arc<dyn CacheStore> = Arc::new(JsonFileCache::new(dir.path().join("vendor_cache.json")));

    // First external row succeeds, then the backend rate-limits everything
    let mock = MockBackend::new().with_responses(["Subscriptions | Netflix"]);
    let categorizer = categorizer(&mock, cache.clone());
    let mut txs = parse_statement(capital_one_csv().as_bytes(), None).unwrap();

    let netflix = txs[4].description.clone();
    let external = categorizer.external().unwrap();
    external.classify(&netflix).await.unwrap();
    let _failing = mock.clone().with_transient_failures(u32::MAX);

    let err = categorizer.categorize_table(&mut txs).await.unwrap_err();
    assert!(matches!(err, Error::RetryExhausted { attempts: 3, .. }));
    assert!(cache.get(&netflix).is_some());
    assert!(cache.get("ACME PLUMBING CO").is_none());
}
