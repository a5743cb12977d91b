use std::future::Future;
use std::time::Duration;

use log::{info, warn};

use crate::core::BenchError;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries: max_retries.max(1),
            base_delay,
        }
    }

    /// Pause after failed attempt `attempt` (1-based): `base_delay * 2^(attempt-1)`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32
            .checked_shl(attempt.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }

    /// Longest time `acquire` can spend sleeping before giving up.
    pub fn total_backoff(&self) -> Duration {
        (1..self.max_retries)
            .map(|attempt| self.backoff(attempt))
            .fold(Duration::ZERO, Duration::saturating_add)
    }
}

/// Runs a connection routine until it succeeds or the policy runs out of attempts.
#[derive(Debug, Clone)]
pub struct ResilientConnector {
    policy: RetryPolicy,
}

impl ResilientConnector {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    /// Calls `establish` up to `max_retries` times, sleeping with exponential
    /// backoff between attempts. Exhaustion yields `ConnectionExhausted`
    /// carrying the last failure.
    pub async fn acquire<T, F, Fut>(&self, name: &str, mut establish: F) -> Result<T, BenchError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, BenchError>>,
    {
        let max = self.policy.max_retries;
        let mut attempt = 1;
        loop {
            let err = match establish().await {
                Ok(conn) => {
                    if attempt > 1 {
                        info!(connection = name, attempt = attempt; "{name}: connected on attempt {attempt}/{max}");
                    }
                    return Ok(conn);
                }
                Err(err) => err,
            };

            if attempt >= max {
                return Err(BenchError::ConnectionExhausted {
                    attempts: attempt,
                    last: Box::new(err),
                });
            }

            let delay = self.policy.backoff(attempt);
            warn!(
                connection = name,
                attempt = attempt,
                delay_ms = delay.as_millis() as u64;
                "{name}: attempt {attempt}/{max} failed: {err}, retrying in {}",
                humantime::format_duration(delay)
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}
