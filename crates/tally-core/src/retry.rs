//! Bounded exponential backoff
//!
//! The delay before retry `n` (1-based) is
//! `min(initial_delay * multiplier^(n-1), max_delay)`, with no jitter. Retrying
//! stops when the elapsed time reaches `max_elapsed` or the optional attempt
//! limit is hit. Errors decide for themselves whether they are worth retrying
//! via [`Error::is_transient`].

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tracing::warn;

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub initial_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
    /// Total time budget across all attempts and sleeps
    pub max_elapsed: Duration,
    pub max_attempts: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_delay: Duration::from_secs(30),
            max_elapsed: Duration::from_secs(60),
            max_attempts: None,
        }
    }
}

impl RetryPolicy {
    /// Single attempt, no retries
    pub fn none() -> Self {
        Self {
            max_attempts: Some(1),
            ..Self::default()
        }
    }

    /// Delay before the given retry (1-based)
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exp = retry.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.initial_delay.as_secs_f64() * self.multiplier.powi(exp);
        let capped = secs.min(self.max_delay.as_secs_f64());
        Duration::try_from_secs_f64(capped).unwrap_or(self.max_delay)
    }

    /// Run `operation` until it succeeds, fails fatally, or the budget runs out
    pub async fn run<T, F, Fut>(&self, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let start = Instant::now();
        let mut attempts: u32 = 0;

        loop {
            attempts += 1;
            let err = match operation().await {
                Ok(value) => return Ok(value),
                Err(e) if !e.is_transient() => return Err(e),
                Err(e) => e,
            };

            let elapsed = start.elapsed();
            let out_of_attempts = self.max_attempts.is_some_and(|max| attempts >= max);
            if out_of_attempts || elapsed >= self.max_elapsed {
                return Err(Error::RetryExhausted {
                    attempts,
                    last: Box::new(err),
                });
            }

            let remaining = self.max_elapsed - elapsed;
            let delay = self.delay_for(attempts).min(remaining);
            warn!(
                attempt = attempts,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Transient failure, backing off"
            );
            tokio::time::sleep(delay).await;
        }
    }
}
