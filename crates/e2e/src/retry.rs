//! Retry with linear backoff for flaky UI actions

use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Attempt budget and base delay; the wait before attempt `n + 1` is `base_delay * n`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Delay slept after a failed attempt (1-based)
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }
}

/// Run `action` until it succeeds or the policy's attempts are used up.
///
/// Returns the first success, or the error of the final attempt.
pub async fn retry_with_backoff<T, E, F, Fut>(policy: RetryPolicy, mut action: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        debug!("Attempting action (attempt {}/{})", attempt, max_attempts);
        match action().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt >= max_attempts => {
                warn!("Action failed on final attempt {}: {}", attempt, e);
                return Err(e);
            }
            Err(e) => {
                warn!("Action failed on attempt {}: {}", attempt, e);
                tokio::time::sleep(policy.delay_after(attempt)).await;
                attempt += 1;
            }
        }
    }
}
