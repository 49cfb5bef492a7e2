//! Bounded retry driver shared by the agent transport and the database store.
//!
//! An [`ErrorClassifier`] decides whether a failure is worth another attempt.
//! The wait between attempts grows linearly and is cut short when the
//! executor's [`CancellationToken`] fires.

use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Whether re-attempting a failed operation is expected to help.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Retriable,
    NonRetriable,
}

pub trait ErrorClassifier<E>: Send + Sync {
    fn classify(&self, err: &E) -> Classification;
}

impl<E, F> ErrorClassifier<E> for F
where
    F: Fn(&E) -> Classification + Send + Sync,
{
    fn classify(&self, err: &E) -> Classification {
        self(err)
    }
}

/// Attempt budget and backoff shape.
///
/// The wait after failed attempt `n` (0-based) is `backoff_base + n * backoff_step`.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use tally_common::retry::RetryPolicy;
///
/// let policy = RetryPolicy::default();
/// assert_eq!(policy.max_attempts, 3);
/// assert_eq!(policy.delay_for(0), Duration::from_secs(1));
/// assert_eq!(policy.delay_for(1), Duration::from_secs(3));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub backoff_step: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: Duration::from_secs(1),
            backoff_step: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn delay_for(&self, attempt_index: u32) -> Duration {
        self.backoff_base + self.backoff_step * attempt_index
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    /// The classifier rejected the failure; no further attempts were made.
    #[error("permanent failure after {attempts} attempt(s): {source}")]
    Permanent {
        attempts: u32,
        #[source]
        source: E,
    },

    #[error("failed after {attempts} attempts, last error: {source}")]
    Exhausted {
        attempts: u32,
        #[source]
        source: E,
    },

    #[error("cancelled after {attempts} attempt(s), last error: {source}")]
    Cancelled {
        attempts: u32,
        #[source]
        source: E,
    },
}

impl<E> RetryError<E> {
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Permanent { attempts, .. }
            | RetryError::Exhausted { attempts, .. }
            | RetryError::Cancelled { attempts, .. } => *attempts,
        }
    }

    /// The last underlying error.
    pub fn last_error(&self) -> &E {
        match self {
            RetryError::Permanent { source, .. }
            | RetryError::Exhausted { source, .. }
            | RetryError::Cancelled { source, .. } => source,
        }
    }
}

pub struct RetryExecutor<C> {
    policy: RetryPolicy,
    classifier: C,
    cancel: CancellationToken,
}

impl<C> RetryExecutor<C> {
    pub fn new(policy: RetryPolicy, classifier: C, cancel: CancellationToken) -> Self {
        Self {
            policy,
            classifier,
            cancel,
        }
    }

    /// Runs `operation` until it succeeds, hits a non-retriable error, runs
    /// out of attempts, or the executor is cancelled during a backoff wait.
    pub async fn execute<T, E, F, Fut>(&self, mut operation: F) -> Result<T, RetryError<E>>
    where
        C: ErrorClassifier<E>,
        E: std::fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0u32;
        loop {
            let err = match operation().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };
            let attempts = attempt + 1;

            if self.classifier.classify(&err) == Classification::NonRetriable {
                return Err(RetryError::Permanent {
                    attempts,
                    source: err,
                });
            }
            if attempts >= max_attempts {
                return Err(RetryError::Exhausted {
                    attempts,
                    source: err,
                });
            }
            if self.cancel.is_cancelled() {
                return Err(RetryError::Cancelled {
                    attempts,
                    source: err,
                });
            }

            let delay = self.policy.delay_for(attempt);
            tracing::warn!(
                attempt = attempts,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "Operation failed, retrying"
            );

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = self.cancel.cancelled() => {
                    return Err(RetryError::Cancelled {
                        attempts,
                        source: err,
                    });
                }
            }
            attempt += 1;
        }
    }
}
