use log::{error, warn};
use std::{fmt::Debug, future::Future, time::Duration};

use crate::errors::CustomError;

/// Fixed number of attempts with a fixed pause in between.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    // What clients do when a socket drops
    pub const RECONNECT: RetryPolicy = RetryPolicy {
        max_attempts: 3,
        delay: Duration::from_secs(2),
    };

    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        RetryPolicy { max_attempts, delay }
    }
}

/// Runs `op` until it succeeds or the policy runs out, then fails with `ConnectionLost`.
pub async fn with_retry<T, E, F, Fut>(policy: RetryPolicy, what: &str, mut op: F) -> Result<T, CustomError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Debug,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < max_attempts => {
                warn!("{} failed (attempt {}/{}): {:?}", what, attempt, max_attempts, err);
                tokio::time::sleep(policy.delay).await;
            }
            Err(err) => {
                error!("{} failed after {} attempts: {:?}", what, attempt, err);
                return Err(CustomError::ConnectionLost);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_exactly_max_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);
        let started = tokio::time::Instant::now();

        let result: Result<(), _> = with_retry(RetryPolicy::RECONNECT, "connect", move || {
            let c = Arc::clone(&c);
            async move {
                c.fetch_add(1, Ordering::Relaxed);
                Err::<(), _>("refused")
            }
        })
        .await;

        assert_eq!(result, Err(CustomError::ConnectionLost));
        assert_eq!(calls.load(Ordering::Relaxed), 3);
        // two pauses between three attempts
        assert!(started.elapsed() >= Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn stops_retrying_on_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = Arc::clone(&calls);

        let result = with_retry(RetryPolicy::new(5, Duration::from_millis(100)), "connect", move || {
            let c = Arc::clone(&c);
            async move {
                if c.fetch_add(1, Ordering::Relaxed) == 0 {
                    Err("refused")
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result, Ok(42));
        assert_eq!(calls.load(Ordering::Relaxed), 2);
    }
}
