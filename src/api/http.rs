use anyhow::{Context, Result};
use rand::Rng;
use reqwest::StatusCode;
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;

const RETRY_JITTER_DIVISOR: u128 = 4; // + up to 25% jitter

/// Retry schedule for upstream requests: exponential backoff plus jitter.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: usize,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Backoff before retry number `attempt` (0-based), without jitter.
    fn base_delay_for(&self, attempt: usize) -> Duration {
        let multiplier = 1u32.checked_shl(attempt as u32).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(multiplier)
    }

    fn delay_for(&self, attempt: usize) -> Duration {
        add_jitter(self.base_delay_for(attempt))
    }
}

fn is_retriable_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::REQUEST_TIMEOUT
            | StatusCode::TOO_MANY_REQUESTS
            | StatusCode::INTERNAL_SERVER_ERROR
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
    )
}

fn is_retriable_send_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect()
}

fn add_jitter(delay: Duration) -> Duration {
    let max_jitter_ms = delay.as_millis() / RETRY_JITTER_DIVISOR;
    if max_jitter_ms == 0 {
        return delay;
    }

    let max_jitter_ms = std::cmp::min(max_jitter_ms, u128::from(u64::MAX)) as u64;
    let jitter_ms = rand::thread_rng().gen_range(0..=max_jitter_ms);
    delay + Duration::from_millis(jitter_ms)
}

/// Send a request, rebuilding and retrying it on transient failures.
///
/// Non-retriable error statuses are returned as `Ok(response)` for the
/// caller to inspect.
pub(super) async fn send_with_retry(
    policy: RetryPolicy,
    mut make_request: impl FnMut() -> reqwest::RequestBuilder,
) -> Result<reqwest::Response> {
    let mut attempt = 0;

    loop {
        let can_retry = attempt < policy.max_retries;
        match make_request().send().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() || !(is_retriable_status(status) && can_retry) {
                    return Ok(response);
                }

                let delay = policy.delay_for(attempt);
                debug!(
                    "Upstream returned {}; retrying in {:?} (attempt {}/{})",
                    status,
                    delay,
                    attempt + 1,
                    policy.max_retries + 1
                );
                let _ = response.bytes().await;
                sleep(delay).await;
            }
            Err(err) => {
                if !(is_retriable_send_error(&err) && can_retry) {
                    return Err(anyhow::Error::new(err.without_url())).with_context(|| {
                        format!("Upstream request failed after {} attempt(s)", attempt + 1)
                    });
                }

                let delay = policy.delay_for(attempt);
                debug!(
                    "Upstream request error: {}; retrying in {:?} (attempt {}/{})",
                    err.without_url(),
                    delay,
                    attempt + 1,
                    policy.max_retries + 1
                );
                sleep(delay).await;
            }
        }
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retriable_statuses() {
        assert!(is_retriable_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_retriable_status(StatusCode::SERVICE_UNAVAILABLE));
        assert!(!is_retriable_status(StatusCode::UNAUTHORIZED));
        assert!(!is_retriable_status(StatusCode::BAD_REQUEST));
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.base_delay_for(0), Duration::from_secs(1));
        assert_eq!(policy.base_delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.base_delay_for(2), Duration::from_secs(4));
        // Saturates instead of overflowing
        assert!(policy.base_delay_for(64) >= Duration::from_secs(1));
    }

    #[test]
    fn test_jitter_bounds() {
        let base = Duration::from_millis(400);
        for _ in 0..50 {
            let delay = add_jitter(base);
            assert!(delay >= base);
            assert!(delay <= base + Duration::from_millis(100));
        }
        assert_eq!(add_jitter(Duration::from_millis(3)), Duration::from_millis(3));
    }
}
