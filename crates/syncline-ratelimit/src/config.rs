use crate::events::RateLimiterEvent;
use crate::RateLimiter;
use std::time::Duration;
use syncline_core::events::{EventListeners, FnListener};

/// Configuration for the rate limiter.
pub struct RateLimiterConfig {
    pub(crate) capacity: usize,
    pub(crate) window: Duration,
    pub(crate) event_listeners: EventListeners<RateLimiterEvent>,
    pub(crate) name: String,
}

impl RateLimiterConfig {
    /// Creates a new builder with defaults.
    pub fn builder() -> RateLimiterConfigBuilder {
        RateLimiterConfigBuilder::new()
    }
}

/// Builder for [`RateLimiterConfig`].
pub struct RateLimiterConfigBuilder {
    capacity: usize,
    window: Duration,
    event_listeners: EventListeners<RateLimiterEvent>,
    name: String,
}

impl Default for RateLimiterConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiterConfigBuilder {
    /// Creates a new builder with defaults.
    ///
    /// Defaults:
    /// - capacity: 10
    /// - window: 60 seconds
    /// - name: `"<unnamed>"`
    pub fn new() -> Self {
        Self {
            capacity: 10,
            window: Duration::from_secs(60),
            event_listeners: EventListeners::new(),
            name: "<unnamed>".to_string(),
        }
    }

    /// Sets the maximum number of admissions per rolling window.
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    /// Sets the rolling window duration.
    pub fn window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    /// Sets the name for this limiter instance (used in events and logs).
    pub fn name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = name.into();
        self
    }

    /// Registers a callback when a caller is admitted, with the duration it
    /// waited (zero for immediate admission).
    pub fn on_slot_acquired<F>(mut self, f: F) -> Self
    where
        F: Fn(Duration) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let RateLimiterEvent::SlotAcquired { wait_duration, .. } = event {
                f(*wait_duration);
            }
        }));
        self
    }

    /// Registers a callback when a caller joins the waiting queue, with its
    /// priority and the resulting queue depth.
    pub fn on_waiter_enqueued<F>(mut self, f: F) -> Self
    where
        F: Fn(i32, usize) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let RateLimiterEvent::WaiterEnqueued {
                priority,
                queue_depth,
                ..
            } = event
            {
                f(*priority, *queue_depth);
            }
        }));
        self
    }

    /// Registers a callback when the limiter is reset, with the number of
    /// waiters that were cancelled.
    pub fn on_reset<F>(mut self, f: F) -> Self
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let RateLimiterEvent::LimiterReset {
                cancelled_waiters, ..
            } = event
            {
                f(*cancelled_waiters);
            }
        }));
        self
    }

    /// Builds the rate limiter.
    pub fn build(self) -> RateLimiter {
        RateLimiter::new(RateLimiterConfig {
            capacity: self.capacity,
            window: self.window,
            event_listeners: self.event_listeners,
            name: self.name,
        })
    }
}
