use std::{future::Future, num::NonZeroUsize, time::Duration};

use kube::Error as KubeError;
use tokio::time::sleep;
use tracing::debug;

mod api;
pub use api::ApiRetryExt;

/// Factor applied to the wait after every failed attempt.
const BACKOFF_MULTIPLIER: f64 = 2.0;

/// Attempts made per cluster request unless configured otherwise.
pub const DEFAULT_MAX_ATTEMPTS: NonZeroUsize = NonZeroUsize::MIN.saturating_add(4);

/// Retry policy applied to cluster API calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of attempts including the first call.
    pub max_attempts: NonZeroUsize,
    /// Initial wait duration before the next retry.
    pub initial_backoff: Duration,
    /// Upper bound for exponential backoff wait.
    pub max_backoff: Duration,
}

impl RetryPolicy {
    pub fn with_max_attempts(mut self, max_attempts: NonZeroUsize) -> Self {
        self.max_attempts = max_attempts;
        self
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(5),
        }
    }
}

/// Default retry condition for [`kube::Error`].
///
/// For `Api` errors, retries only on transient HTTP status codes (`408`, `429`, `5xx`).
/// Authorization failures and missing nodes are reported at once.
/// Other error types (transport, TLS, serialization) are retried.
pub fn default_retryable_error(error: &KubeError) -> bool {
    match error {
        KubeError::Api(response) => matches!(response.code, 408 | 429 | 500..=599),
        _ => true,
    }
}

fn next_backoff(current: Duration, policy: &RetryPolicy) -> Duration {
    current.mul_f64(BACKOFF_MULTIPLIER).min(policy.max_backoff)
}

/// Run `operation` until it succeeds, fails with a non-retryable error,
/// or the policy runs out of attempts. The last error is returned unchanged.
pub async fn retry_with_policy<T, F, Fut>(
    policy: &RetryPolicy,
    mut operation: F,
) -> Result<T, KubeError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, KubeError>>,
{
    let mut backoff = policy.initial_backoff.min(policy.max_backoff);
    let mut attempts = 0usize;

    loop {
        attempts = attempts.saturating_add(1);
        match operation().await {
            Ok(value) => return Ok(value),
            Err(error) => {
                if attempts >= policy.max_attempts.get() || !default_retryable_error(&error) {
                    return Err(error);
                }
                debug!(attempt = attempts, ?backoff, %error, "retrying cluster request");
                sleep(backoff).await;
                backoff = next_backoff(backoff, policy);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{num::NonZeroUsize, time::Duration};

    use kube::{Error as KubeError, core::ErrorResponse};

    use super::{RetryPolicy, default_retryable_error, next_backoff, retry_with_policy};

    fn max_attempts(attempts: usize) -> NonZeroUsize {
        NonZeroUsize::new(attempts).expect("max attempts must be > 0")
    }

    fn api_error(code: u16) -> KubeError {
        KubeError::Api(ErrorResponse {
            status: "Failure".to_string(),
            message: format!("status={code}"),
            reason: "Test".to_string(),
            code,
        })
    }

    fn immediate(attempts: usize) -> RetryPolicy {
        RetryPolicy {
            max_attempts: max_attempts(attempts),
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    #[tokio::test]
    async fn retries_transient_errors_until_success() {
        let mut attempts = 0usize;
        let result = retry_with_policy(&immediate(5), || {
            attempts += 1;
            let current = attempts;
            async move {
                match current {
                    1 => Err(api_error(429)),
                    2 => Err(api_error(503)),
                    _ => Ok(current),
                }
            }
        })
        .await
        .expect("retry should eventually succeed");

        assert_eq!(result, 3);
        assert_eq!(attempts, 3);
    }

    #[tokio::test]
    async fn missing_node_is_not_retried() {
        let mut attempts = 0usize;
        let err = retry_with_policy::<(), _, _>(&immediate(5), || {
            attempts += 1;
            async { Err(api_error(404)) }
        })
        .await
        .expect_err("404 should not be retried");

        match err {
            KubeError::Api(response) => assert_eq!(response.code, 404),
            _ => panic!("expected api error"),
        }
        assert_eq!(attempts, 1);
    }

    #[tokio::test]
    async fn single_attempt_policy_gives_up_immediately() {
        let mut attempts = 0usize;
        let err = retry_with_policy::<(), _, _>(&immediate(1), || {
            attempts += 1;
            async { Err(api_error(500)) }
        })
        .await
        .expect_err("a single attempt is never retried");

        assert!(matches!(err, KubeError::Api(response) if response.code == 500));
        assert_eq!(attempts, 1);
    }

    #[tokio::test]
    async fn exhausts_attempts_on_retryable_error() {
        let mut attempts = 0usize;
        let err = retry_with_policy::<(), _, _>(&immediate(3), || {
            attempts += 1;
            async { Err(api_error(503)) }
        })
        .await
        .expect_err("retryable error should eventually exhaust attempts");

        match err {
            KubeError::Api(response) => assert_eq!(response.code, 503),
            _ => panic!("expected api error"),
        }
        assert_eq!(attempts, 3);
    }

    #[test]
    fn default_retryable_classifies_api_codes() {
        assert!(default_retryable_error(&api_error(408)));
        assert!(default_retryable_error(&api_error(429)));
        assert!(default_retryable_error(&api_error(500)));
        assert!(!default_retryable_error(&api_error(403)));
        assert!(!default_retryable_error(&api_error(404)));
    }

    #[test]
    fn default_policy_makes_five_attempts() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, max_attempts(5));
        assert_eq!(
            policy.with_max_attempts(max_attempts(2)).max_attempts,
            max_attempts(2)
        );
    }

    #[test]
    fn backoff_grows_up_to_the_cap() {
        let policy = RetryPolicy::default();
        let first = next_backoff(Duration::from_millis(200), &policy);
        assert_eq!(first, Duration::from_millis(400));
        assert_eq!(next_backoff(Duration::from_secs(4), &policy), Duration::from_secs(5));
    }
}
