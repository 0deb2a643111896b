use std::time::{Duration, Instant};
use syncline_core::events::SyncEvent;

/// Events emitted by the retry engine.
#[derive(Debug, Clone)]
pub enum RetryEvent {
    /// A retry is about to be scheduled after a failed attempt.
    Retry {
        component: String,
        timestamp: Instant,
        attempt: usize,
        delay: Duration,
        error_kind: &'static str,
    },
    /// The operation succeeded (either on first try or after retries).
    Success {
        component: String,
        timestamp: Instant,
        attempts: usize,
    },
    /// The operation failed after exhausting all attempts.
    Exhausted {
        component: String,
        timestamp: Instant,
        attempts: usize,
        error_kind: &'static str,
    },
    /// An error occurred but was not retried (filtered by the predicate).
    IgnoredError {
        component: String,
        timestamp: Instant,
        error_kind: &'static str,
    },
}

impl SyncEvent for RetryEvent {
    fn event_type(&self) -> &'static str {
        match self {
            RetryEvent::Retry { .. } => "retry",
            RetryEvent::Success { .. } => "success",
            RetryEvent::Exhausted { .. } => "exhausted",
            RetryEvent::IgnoredError { .. } => "ignored_error",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            RetryEvent::Retry { timestamp, .. }
            | RetryEvent::Success { timestamp, .. }
            | RetryEvent::Exhausted { timestamp, .. }
            | RetryEvent::IgnoredError { timestamp, .. } => *timestamp,
        }
    }

    fn component(&self) -> &str {
        match self {
            RetryEvent::Retry { component, .. }
            | RetryEvent::Success { component, .. }
            | RetryEvent::Exhausted { component, .. }
            | RetryEvent::IgnoredError { component, .. } => component,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_types_are_stable() {
        let now = Instant::now();
        let retry = RetryEvent::Retry {
            component: "test".to_string(),
            timestamp: now,
            attempt: 0,
            delay: Duration::from_millis(100),
            error_kind: "timeout",
        };
        assert_eq!(retry.event_type(), "retry");
        assert_eq!(retry.component(), "test");

        let exhausted = RetryEvent::Exhausted {
            component: "test".to_string(),
            timestamp: now,
            attempts: 5,
            error_kind: "network_failure",
        };
        assert_eq!(exhausted.event_type(), "exhausted");
    }
}
