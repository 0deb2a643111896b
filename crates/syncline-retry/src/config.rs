use crate::events::RetryEvent;
use crate::{RetryPolicy, RetryPredicate};
use std::sync::Arc;
use std::time::Duration;
use syncline_core::events::{EventListeners, FnListener};
use syncline_core::SyncError;

/// Builder for [`RetryPolicy`].
pub struct RetryPolicyBuilder {
    max_attempts: usize,
    base_delay: Duration,
    max_delay: Duration,
    jitter: Duration,
    predicate: Option<RetryPredicate>,
    event_listeners: EventListeners<RetryEvent>,
    name: String,
}

impl Default for RetryPolicyBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RetryPolicyBuilder {
    /// Creates a new builder with defaults.
    ///
    /// Defaults:
    /// - max_attempts: 5
    /// - base_delay: 1000ms
    /// - max_delay: 16000ms
    /// - jitter: 250ms
    /// - predicate: [`SyncError::is_retryable`]
    /// - name: `"<unnamed>"`
    pub fn new() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(16_000),
            jitter: Duration::from_millis(250),
            predicate: None,
            event_listeners: EventListeners::new(),
            name: "<unnamed>".to_string(),
        }
    }

    /// Sets the maximum number of attempts, including the initial one.
    /// `max_attempts = 5` means 1 initial attempt + up to 4 retries.
    pub fn max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Sets the backoff base delay (the first retry's delay before jitter).
    pub fn base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Caps the exponential backoff.
    pub fn max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Sets the symmetric jitter applied to every computed delay.
    pub fn jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    /// Sets a predicate to determine which errors should be retried.
    ///
    /// Defaults to [`SyncError::is_retryable`]. The credential manager
    /// narrows this to network-class failures and token rejections.
    pub fn retry_on<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&SyncError) -> bool + Send + Sync + 'static,
    {
        self.predicate = Some(Arc::new(predicate));
        self
    }

    /// Sets the name for this policy instance (used in events and logs).
    pub fn name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = name.into();
        self
    }

    /// Registers a callback when a retry is about to be scheduled.
    ///
    /// Called with the attempt index (0-based after the initial failure)
    /// and the computed delay.
    pub fn on_retry<F>(mut self, f: F) -> Self
    where
        F: Fn(usize, Duration) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let RetryEvent::Retry { attempt, delay, .. } = event {
                f(*attempt, *delay);
            }
        }));
        self
    }

    /// Registers a callback when an operation succeeds, with the total
    /// number of attempts made.
    pub fn on_success<F>(mut self, f: F) -> Self
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let RetryEvent::Success { attempts, .. } = event {
                f(*attempts);
            }
        }));
        self
    }

    /// Registers a callback when all attempts are exhausted.
    pub fn on_exhausted<F>(mut self, f: F) -> Self
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let RetryEvent::Exhausted { attempts, .. } = event {
                f(*attempts);
            }
        }));
        self
    }

    /// Builds the policy.
    pub fn build(self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            base_delay: self.base_delay,
            max_delay: self.max_delay,
            jitter: self.jitter,
            predicate: self
                .predicate
                .unwrap_or_else(|| Arc::new(SyncError::is_retryable)),
            event_listeners: self.event_listeners,
            name: self.name,
        }
    }
}
