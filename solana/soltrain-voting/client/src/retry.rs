use std::future::Future;
use std::time::Duration;

use tracing::debug;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(200);

/// Fixed budget for reads that only become consistent some time after a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS, DEFAULT_RETRY_DELAY)
    }
}

#[derive(Debug)]
pub struct RetryExhausted<E> {
    pub attempts: u32,
    /// Error of the last attempt, `None` if it simply had no result yet.
    pub last_error: Option<E>,
}

/// Runs `operation` until it yields a value or the policy's attempts are used up.
///
/// Both `Ok(None)` and `Err(_)` count as "not there yet". The operation receives the
/// 1-based attempt number. No delay follows the final attempt.
pub async fn retry_until_some<T, E, F, Fut>(
    policy: RetryPolicy,
    mut operation: F,
) -> Result<T, RetryExhausted<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<Option<T>, E>>,
    E: std::fmt::Display,
{
    let mut last_error = None;
    for attempt in 1..=policy.max_attempts {
        match operation(attempt).await {
            Ok(Some(value)) => return Ok(value),
            Ok(None) => {
                debug!(attempt, "No result yet");
                last_error = None;
            }
            Err(err) => {
                debug!(attempt, error = %err, "Attempt failed");
                last_error = Some(err);
            }
        }
        if attempt < policy.max_attempts {
            tokio::time::sleep(policy.delay).await;
        }
    }
    Err(RetryExhausted {
        attempts: policy.max_attempts,
        last_error,
    })
}
