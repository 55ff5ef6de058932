//! Mock backend for testing
//!
//! Answers with a keyword heuristic by default. Tests can queue exact
//! responses, inject transient failures, count calls and make the health
//! check fail. Clones share state,
//! so a test can keep a handle while the classifier owns another.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::{Error, Result};

use super::{AIBackend, GenerationParams};

#[derive(Default)]
struct MockState {
    responses: Mutex<VecDeque<String>>,
    transient_failures: AtomicU32,
    calls: AtomicU32,
    prompts: Mutex<Vec<String>>,
    unreachable: AtomicBool,
}

/// Mock AI backend for testing
#[derive(Clone, Default)]
pub struct MockBackend {
    state: Arc<MockState>,
}

impl MockBackend {
    /// Create a new mock backend
    pub fn new() -> Self {
        Self::default()
    }

    /// A mock whose health check fails, as if the server were down
    pub fn unreachable() -> Self {
        let mock = Self::default();
        mock.state.unreachable.store(true, Ordering::SeqCst);
        mock
    }

    /// Queue responses returned in order before falling back to the heuristic
    pub fn with_responses<I, S>(self, responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if let Ok(mut queue) = self.state.responses.lock() {
            queue.extend(responses.into_iter().map(Into::into));
        }
        self
    }

    /// Fail the next `n` calls with a rate-limit error
    pub fn with_transient_failures(self, n: u32) -> Self {
        self.state.transient_failures.store(n, Ordering::SeqCst);
        self
    }

    /// Number of `complete` calls made, including failed ones
    pub fn call_count(&self) -> u32 {
        self.state.calls.load(Ordering::SeqCst)
    }

    /// Prompts received, in call order
    pub fn prompts(&self) -> Vec<String> {
        self.state
            .prompts
            .lock()
            .map(|p| p.clone())
            .unwrap_or_default()
    }
}

/// Keyword heuristic answer for a prompt
fn heuristic_answer(prompt: &str) -> String {
    let description = extract_description(prompt);
    let (category, vendor) = match description.to_uppercase().as_str() {
        d if d.contains("NETFLIX") => ("Subscriptions", "Netflix"),
        d if d.contains("SPOTIFY") => ("Subscriptions", "Spotify"),
        d if d.contains("AMAZON") || d.contains("AMZN") => ("Shopping", "Amazon"),
        d if d.contains("STARBUCKS") => ("Dining", "Starbucks"),
        d if d.contains("UBER") || d.contains("LYFT") => ("Transportation", "Uber"),
        d if d.contains("WHOLE FOODS") || d.contains("WHOLEFDS") => ("Groceries", "Whole Foods"),
        d if d.contains("SHELL") || d.contains("CHEVRON") || d.contains("EXXON") => {
            ("Fuel", "Gas Station")
        }
        d if d.contains("PAYROLL") || d.contains("DIRECT DEP") => ("Income", "Payroll"),
        _ => return format!("Services | {}", description),
    };
    format!("{} | {}", category, vendor)
}

/// Text between `Description: "` and the next quote, or the whole prompt
fn extract_description(prompt: &str) -> &str {
    const MARKER: &str = "Description: \"";
    prompt
        .find(MARKER)
        .map(|start| &prompt[start + MARKER.len()..])
        .and_then(|rest| rest.find('"').map(|end| &rest[..end]))
        .unwrap_or(prompt)
}

#[async_trait]
impl AIBackend for MockBackend {
    async fn complete(&self, prompt: &str, _params: &GenerationParams) -> Result<String> {
        self.state.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut prompts) = self.state.prompts.lock() {
            prompts.push(prompt.to_string());
        }

        let failing = self
            .state
            .transient_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(Error::RateLimited("mock rate limit".into()));
        }

        let queued = self
            .state
            .responses
            .lock()
            .ok()
            .and_then(|mut queue| queue.pop_front());
        Ok(queued.unwrap_or_else(|| heuristic_answer(prompt)))
    }

    async fn health_check(&self) -> bool {
        !self.state.unreachable.load(Ordering::SeqCst)
    }

    fn model(&self) -> &str {
        "mock"
    }

    fn host(&self) -> &str {
        "mock://localhost"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_heuristic_answers() {
        let mock = MockBackend::new();
        let params = GenerationParams::default();
        assert_eq!(
            mock.complete("Description: \"AMZN MKTP US\"", &params)
                .await
                .unwrap(),
            "Shopping | Amazon"
        );
        assert_eq!(
            mock.complete("Description: \"LOCAL PLUMBER\"", &params)
                .await
                .unwrap(),
            "Services | LOCAL PLUMBER"
        );
    }

    #[tokio::test]
    async fn test_queued_responses_then_heuristic() {
        let mock = MockBackend::new().with_responses(["garbage", "Dining | Cafe"]);
        let params = GenerationParams::default();
        assert_eq!(mock.complete("x", &params).await.unwrap(), "garbage");
        assert_eq!(mock.complete("x", &params).await.unwrap(), "Dining | Cafe");
        assert_eq!(
            mock.complete("Description: \"NETFLIX\"", &params)
                .await
                .unwrap(),
            "Subscriptions | Netflix"
        );
        assert_eq!(mock.call_count(), 3);
    }

    #[tokio::test]
    async fn test_transient_failures_and_shared_counter() {
        let mock = MockBackend::new().with_transient_failures(2);
        let handle = mock.clone();
        let params = GenerationParams::default();

        assert!(matches!(
            mock.complete("a", &params).await,
            Err(Error::RateLimited(_))
        ));
        assert!(mock.complete("b", &params).await.is_err());
        assert!(mock.complete("c", &params).await.is_ok());

        assert_eq!(handle.call_count(), 3);
        assert_eq!(handle.prompts(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_health() {
        assert!(MockBackend::new().health_check().await);
        let down = MockBackend::unreachable();
        assert!(!down.clone().health_check().await);
        assert_eq!(down.call_count(), 0);
    }
}
