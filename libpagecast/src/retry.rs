//! Timeout and exponential backoff for calls to external services
//!
//! Every adapter call made by the pipeline goes through [`with_retry`]. Each
//! attempt is bounded by a timeout; a timeout counts as a transient failure of
//! the adapter's own error type.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tokio::time::{sleep, timeout};
use tracing::{info, warn};

use crate::config::RetryConfig;
use crate::error::{GenerationError, PublishError};

/// Errors that know whether another attempt could succeed
pub trait Transient: std::fmt::Display {
    fn is_transient(&self) -> bool;

    /// Error reported when an attempt exceeds the policy timeout
    fn timed_out(operation: &str, after: Duration) -> Self;
}

impl Transient for GenerationError {
    fn is_transient(&self) -> bool {
        matches!(self, GenerationError::Provider(_) | GenerationError::RateLimited(_))
    }

    fn timed_out(operation: &str, after: Duration) -> Self {
        GenerationError::Provider(format!("{} timed out after {}s", operation, after.as_secs()))
    }
}

impl Transient for PublishError {
    fn is_transient(&self) -> bool {
        matches!(self, PublishError::Network(_))
    }

    fn timed_out(operation: &str, after: Duration) -> Self {
        PublishError::Network(format!("{} timed out after {}s", operation, after.as_secs()))
    }
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub timeout: Duration,
    pub jitter: bool,
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_delay: Duration::from_millis(config.initial_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            timeout: Duration::from_secs(config.timeout_secs),
            jitter: config.jitter,
        }
    }

    /// Delay before attempt `attempt + 1`, doubling from `initial_delay`
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        let delay = self.initial_delay.saturating_mul(factor).min(self.max_delay);
        if self.jitter && !delay.is_zero() {
            let millis = delay.as_millis() as u64;
            let jittered = rand::thread_rng().gen_range(millis / 2..=millis);
            Duration::from_millis(jittered)
        } else {
            delay
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

/// Run `call` until it succeeds, fails permanently, or the attempts run out
pub async fn with_retry<T, E, F, Fut>(policy: &RetryPolicy, operation: &str, mut call: F) -> Result<T, E>
where
    E: Transient,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 1;
    loop {
        let outcome = match timeout(policy.timeout, call()).await {
            Ok(result) => result,
            Err(_) => Err(E::timed_out(operation, policy.timeout)),
        };

        match outcome {
            Ok(value) => {
                if attempt > 1 {
                    info!(operation, attempt, "Succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) if e.is_transient() && attempt < policy.max_attempts => {
                let delay = policy.delay_after(attempt);
                warn!(
                    operation,
                    attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Transient failure, retrying"
                );
                sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                if attempt > 1 {
                    warn!(operation, attempts = attempt, error = %e, "Giving up");
                }
                return Err(e);
            }
        }
    }
}
