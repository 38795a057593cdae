//! Fixed-delay retry combinator.
//!
//! The delay is constant rather than exponential: every failed attempt is
//! followed by the same pause, and the budget counts the first attempt too.

use std::error::Error;
use std::future::Future;

use tracing::warn;

use torshift_core::RetryPolicy;

/// Terminal outcome of a retried operation that never succeeded.
#[derive(Debug, thiserror::Error)]
pub enum RetryError<E: Error + 'static> {
    /// Every attempt in the budget failed; `source` is the last failure.
    #[error("gave up after {attempts} attempt(s): {source}")]
    Exhausted {
        attempts: u32,
        #[source]
        source: E,
    },

    /// An attempt failed with an error the predicate refused to retry.
    #[error("non-retryable failure on attempt {attempt}: {source}")]
    Permanent {
        attempt: u32,
        #[source]
        source: E,
    },
}

impl<E: Error + 'static> RetryError<E> {
    /// Number of attempts made before giving up.
    pub const fn attempts(&self) -> u32 {
        match self {
            Self::Exhausted { attempts, .. } => *attempts,
            Self::Permanent { attempt, .. } => *attempt,
        }
    }

    /// The failure of the last attempt.
    pub const fn last_error(&self) -> &E {
        match self {
            Self::Exhausted { source, .. } | Self::Permanent { source, .. } => source,
        }
    }
}

/// Run `operation` until it succeeds, the predicate rejects an error, or
/// `policy.max_attempts` attempts have failed.
///
/// `operation` receives the 1-based attempt number. Between attempts the
/// combinator sleeps for `policy.delay`; it never sleeps after the final
/// attempt. A zero budget is treated as a single attempt.
pub async fn retry_fixed<T, E, F, Fut, P>(
    policy: &RetryPolicy,
    is_retryable: P,
    mut operation: F,
) -> Result<T, RetryError<E>>
where
    E: Error + 'static,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(source) if !is_retryable(&source) => {
                warn!(attempt, error = %source, "Attempt failed with non-retryable error");
                return Err(RetryError::Permanent { attempt, source });
            }
            Err(source) if attempt >= max_attempts => {
                warn!(attempt, max_attempts, error = %source, "Attempt failed, no retries left");
                return Err(RetryError::Exhausted {
                    attempts: attempt,
                    source,
                });
            }
            Err(source) => {
                warn!(
                    attempt,
                    max_attempts,
                    error = %source,
                    delay_secs = policy.delay.as_secs(),
                    "Attempt failed, retrying"
                );
                tokio::time::sleep(policy.delay).await;
                attempt += 1;
            }
        }
    }
}
