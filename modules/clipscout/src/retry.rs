//! Bounded retry with exponential backoff for transient upstream failures.
//!
//! Delay before retry `n` (0-based) is `base * 3^n` plus up to 1s of jitter,
//! the same curve the page scraper used for flaky browser launches.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::warn;

use crate::traits::UpstreamError;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, the first call included.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// No sleeping between attempts. For tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            jitter: false,
        }
    }

    pub fn delay_for(&self, retry: u32) -> Duration {
        let backoff = self.base_delay * 3u32.saturating_pow(retry);
        if self.jitter && !self.base_delay.is_zero() {
            backoff + Duration::from_millis(rand::rng().random_range(0..1000))
        } else {
            backoff
        }
    }
}

/// Outcome of a retried call, with the number of attempts it took.
#[derive(Debug)]
pub struct Retried<T> {
    pub result: Result<T, UpstreamError>,
    pub attempts: u32,
}

impl<T> Retried<T> {
    pub fn retries(&self) -> u32 {
        self.attempts.saturating_sub(1)
    }
}

/// Call `op` until it succeeds, fails permanently, or attempts run out.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, label: &str, mut op: F) -> Retried<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, UpstreamError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => {
                return Retried {
                    result: Ok(value),
                    attempts: attempt,
                }
            }
            Err(e) if e.is_transient() && attempt < max_attempts => {
                let backoff = policy.delay_for(attempt - 1);
                warn!(
                    label,
                    attempt,
                    backoff_ms = backoff.as_millis() as u64,
                    error = %e,
                    "Transient upstream error, retrying after backoff"
                );
                if !backoff.is_zero() {
                    tokio::time::sleep(backoff).await;
                }
            }
            Err(e) => {
                return Retried {
                    result: Err(e),
                    attempts: attempt,
                }
            }
        }
    }
}
