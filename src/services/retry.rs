//! Bounded timeout + exponential backoff for chain calls.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::services::chain::ChainError;

#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Multiplier applied to the delay after each retry.
    pub backoff_factor: f64,
    /// Upper bound on a single attempt.
    pub timeout: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(10),
            backoff_factor: 2.0,
            timeout: Duration::from_secs(15),
        }
    }
}

impl RetryConfig {
    /// Delay after the given failed attempt (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.initial_delay.as_millis() as f64 * self.backoff_factor.powi(attempt as i32);
        let capped = base.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }
}

/// Runs `op` until it succeeds, returns [`ChainError::Fatal`], or the
/// attempt budget runs out. Each attempt is bounded by `config.timeout`.
pub async fn with_retry<T, F, Fut>(config: &RetryConfig, label: &str, mut op: F) -> Result<T, ChainError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ChainError>>,
{
    let attempts = config.max_attempts.max(1);
    let mut last_error = String::new();

    for attempt in 0..attempts {
        let outcome = match tokio::time::timeout(config.timeout, op()).await {
            Ok(result) => result,
            Err(_) => Err(ChainError::Transient(format!(
                "timed out after {:?}",
                config.timeout
            ))),
        };

        match outcome {
            Ok(value) => return Ok(value),
            Err(fatal @ ChainError::Fatal { .. }) => return Err(fatal),
            Err(ChainError::Transient(message)) => {
                last_error = message;
                if attempt + 1 < attempts {
                    let delay = config.delay_for_attempt(attempt);
                    warn!(
                        call = label,
                        attempt = attempt + 1,
                        max_attempts = attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %last_error,
                        "RPC call failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    Err(ChainError::Fatal {
        call: label.to_string(),
        attempts,
        message: last_error,
    })
}
