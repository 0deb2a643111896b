use std::time::{Duration, Instant};
use syncline_core::events::SyncEvent;

/// Events emitted by the rate limiter.
#[derive(Debug, Clone)]
pub enum RateLimiterEvent {
    /// A caller was admitted through the window, possibly after queueing.
    SlotAcquired {
        component: String,
        timestamp: Instant,
        wait_duration: Duration,
    },
    /// A caller was denied immediate admission and joined the waiting queue.
    WaiterEnqueued {
        component: String,
        timestamp: Instant,
        priority: i32,
        queue_depth: usize,
    },
    /// `reset` dropped all window state and cancelled pending waiters.
    LimiterReset {
        component: String,
        timestamp: Instant,
        cancelled_waiters: usize,
    },
}

impl SyncEvent for RateLimiterEvent {
    fn event_type(&self) -> &'static str {
        match self {
            RateLimiterEvent::SlotAcquired { .. } => "slot_acquired",
            RateLimiterEvent::WaiterEnqueued { .. } => "waiter_enqueued",
            RateLimiterEvent::LimiterReset { .. } => "limiter_reset",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            RateLimiterEvent::SlotAcquired { timestamp, .. }
            | RateLimiterEvent::WaiterEnqueued { timestamp, .. }
            | RateLimiterEvent::LimiterReset { timestamp, .. } => *timestamp,
        }
    }

    fn component(&self) -> &str {
        match self {
            RateLimiterEvent::SlotAcquired { component, .. }
            | RateLimiterEvent::WaiterEnqueued { component, .. }
            | RateLimiterEvent::LimiterReset { component, .. } => component,
        }
    }
}
