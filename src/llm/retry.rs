//! Retry with exponential backoff around a single external call.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, error, info, warn};

/// Backoff schedule for `call_with_retry`.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt (total attempts = `max_retries + 1`).
    pub max_retries: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
    /// Multiplier applied per attempt.
    pub backoff_factor: f64,
    /// Scale each delay by a random factor in `[0.5, 1.0)`.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            backoff_factor: 2.0,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// A policy that makes exactly one attempt.
    pub fn no_retries() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Pre-jitter delay after failed attempt `attempt` (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let raw = self.base_delay.as_secs_f64() * self.backoff_factor.powi(exponent);
        let max = self.max_delay.as_secs_f64();
        let capped = if raw.is_nan() { max } else { raw.min(max) };
        Duration::from_secs_f64(capped.max(0.0))
    }

    fn jittered(&self, delay: Duration) -> Duration {
        if self.jitter {
            let factor: f64 = rand::thread_rng().gen_range(0.5..1.0);
            delay.mul_f64(factor)
        } else {
            delay
        }
    }
}

/// Run `operation` until it succeeds or the policy is exhausted.
///
/// The last error is returned unchanged. Backoff uses `tokio::time::sleep`,
/// so only the calling task is suspended.
pub async fn call_with_retry<T, E, F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let mut attempt: u32 = 0;
    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 0 {
                    debug!(operation = label, attempt = attempt + 1, "Succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) => {
                warn!(
                    operation = label,
                    attempt = attempt + 1,
                    error = %e,
                    "Attempt failed"
                );

                if attempt >= policy.max_retries {
                    error!(
                        operation = label,
                        attempts = attempt + 1,
                        error = %e,
                        "All attempts failed"
                    );
                    return Err(e);
                }

                let delay = policy.jittered(policy.delay_for_attempt(attempt));
                info!(
                    operation = label,
                    delay_ms = delay.as_millis() as u64,
                    "Retrying after backoff"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
