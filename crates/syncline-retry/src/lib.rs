//! Retry engine for the sync worker.
//!
//! Repeatedly invokes an operation until it succeeds, its error becomes
//! non-retryable, or the attempt ceiling is reached. Delays follow capped
//! exponential backoff with symmetric jitter; a server-supplied
//! `Retry-After` hint overrides the exponential term for that attempt.
//!
//! # Examples
//!
//! ```
//! use syncline_retry::RetryPolicy;
//! use syncline_core::SyncError;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), SyncError> {
//! let policy = RetryPolicy::builder()
//!     .max_attempts(3)
//!     .base_delay(Duration::from_millis(50))
//!     .name("page-fetch")
//!     .build();
//!
//! let page = policy
//!     .run("fetch page 1", || async {
//!         Ok::<_, SyncError>("page body")
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```

mod config;
mod events;

pub use config::RetryPolicyBuilder;
pub use events::RetryEvent;

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use syncline_core::events::EventListeners;
use syncline_core::SyncError;

#[cfg(feature = "metrics")]
use metrics::counter;

/// Predicate deciding whether an error may be retried.
pub type RetryPredicate = Arc<dyn Fn(&SyncError) -> bool + Send + Sync>;

/// A reusable retry policy.
///
/// Cheap to clone; the predicate and listeners are shared.
#[derive(Clone)]
pub struct RetryPolicy {
    pub(crate) max_attempts: usize,
    pub(crate) base_delay: Duration,
    pub(crate) max_delay: Duration,
    pub(crate) jitter: Duration,
    pub(crate) predicate: RetryPredicate,
    pub(crate) event_listeners: EventListeners<RetryEvent>,
    pub(crate) name: String,
}

impl RetryPolicy {
    /// Creates a builder with the pipeline defaults
    /// (5 attempts, 1s base, 16s cap, 250ms jitter).
    pub fn builder() -> RetryPolicyBuilder {
        RetryPolicyBuilder::new()
    }

    /// The tightened policy used for credential acquisition: 3 attempts,
    /// 1s base, 5s cap, 250ms jitter. Retries network-class failures and
    /// 401 token rejections; other credential rejections surface at once.
    pub fn credential() -> Self {
        Self::builder()
            .max_attempts(3)
            .base_delay(Duration::from_millis(1000))
            .max_delay(Duration::from_millis(5000))
            .jitter(Duration::from_millis(250))
            .retry_on(|err| {
                matches!(
                    err,
                    SyncError::NetworkFailure { .. }
                        | SyncError::Timeout { .. }
                        | SyncError::ServiceUnavailable { .. }
                        | SyncError::CredentialExpired
                )
            })
            .name("credential")
            .build()
    }

    /// Maximum number of attempts, including the initial one.
    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    /// Runs `op` under this policy, surfacing either its successful value,
    /// the first non-retryable error, or [`SyncError::MaxRetriesExceeded`].
    pub async fn run<T, F, Fut>(&self, context: &str, op: F) -> Result<T, SyncError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, SyncError>>,
    {
        self.run_observed(context, |_, _| {}, op).await
    }

    /// Like [`run`](Self::run), but reports `(attempt_index, delay)` to
    /// `observe` before every retry sleep. Callers use this to count the
    /// retries a single invocation consumed.
    pub async fn run_observed<T, F, Fut, O>(
        &self,
        context: &str,
        mut observe: O,
        mut op: F,
    ) -> Result<T, SyncError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, SyncError>>,
        O: FnMut(usize, Duration),
    {
        // Completed-attempt count; doubles as the 0-based retry index when
        // a failure is being scheduled.
        let mut attempt = 0usize;

        loop {
            match op().await {
                Ok(value) => {
                    if attempt > 0 {
                        tracing::info!(
                            retry = %self.name,
                            context,
                            attempts = attempt + 1,
                            "operation succeeded after retries"
                        );
                    }

                    #[cfg(feature = "metrics")]
                    counter!("syncline_retry_calls_total", "retry" => self.name.clone(), "result" => "success")
                        .increment(1);

                    self.event_listeners.emit(&RetryEvent::Success {
                        component: self.name.clone(),
                        timestamp: Instant::now(),
                        attempts: attempt + 1,
                    });
                    return Ok(value);
                }
                Err(error) => {
                    if !(self.predicate)(&error) {
                        tracing::debug!(
                            retry = %self.name,
                            context,
                            kind = error.kind(),
                            "error not retryable, surfacing immediately"
                        );
                        self.event_listeners.emit(&RetryEvent::IgnoredError {
                            component: self.name.clone(),
                            timestamp: Instant::now(),
                            error_kind: error.kind(),
                        });
                        return Err(error);
                    }

                    if attempt + 1 >= self.max_attempts {
                        tracing::error!(
                            retry = %self.name,
                            context,
                            attempts = attempt + 1,
                            kind = error.kind(),
                            error = %error,
                            "retry attempts exhausted"
                        );

                        #[cfg(feature = "metrics")]
                        counter!("syncline_retry_calls_total", "retry" => self.name.clone(), "result" => "exhausted")
                            .increment(1);

                        self.event_listeners.emit(&RetryEvent::Exhausted {
                            component: self.name.clone(),
                            timestamp: Instant::now(),
                            attempts: attempt + 1,
                            error_kind: error.kind(),
                        });
                        return Err(SyncError::MaxRetriesExceeded {
                            attempts: attempt + 1,
                            cause: Box::new(error),
                        });
                    }

                    let delay = self.delay_for(attempt, error.retry_after());

                    tracing::warn!(
                        retry = %self.name,
                        context,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        kind = error.kind(),
                        error = %error,
                        "attempt failed, retrying after delay"
                    );

                    #[cfg(feature = "metrics")]
                    counter!("syncline_retry_attempts_total", "retry" => self.name.clone())
                        .increment(1);

                    self.event_listeners.emit(&RetryEvent::Retry {
                        component: self.name.clone(),
                        timestamp: Instant::now(),
                        attempt,
                        delay,
                        error_kind: error.kind(),
                    });
                    observe(attempt, delay);

                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Computes the delay before retry `attempt_index` (0-based).
    ///
    /// Without a hint: `min(base * 2^a, max_delay) ± jitter`, floored at 0.
    /// With a server hint the hint replaces the exponential term.
    pub(crate) fn delay_for(&self, attempt_index: usize, hint: Option<Duration>) -> Duration {
        let backoff_ms = match hint {
            Some(hint) => hint.as_millis() as u64,
            None => {
                let base = self.base_delay.as_millis() as u64;
                let factor = 2u64.saturating_pow(attempt_index.min(u32::MAX as usize) as u32);
                base.saturating_mul(factor)
                    .min(self.max_delay.as_millis() as u64)
            }
        };

        let jitter_ms = self.jitter.as_millis() as i64;
        let jitter_component = if jitter_ms == 0 {
            0
        } else {
            use rand::Rng;
            rand::rng().random_range(-jitter_ms..=jitter_ms)
        };

        Duration::from_millis((backoff_ms as i64 + jitter_component).max(0) as u64)
    }
}
