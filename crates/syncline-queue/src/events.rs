use std::time::{Duration, Instant};
use syncline_core::events::SyncEvent;

/// Events emitted by the concurrency queue.
#[derive(Debug, Clone)]
pub enum QueueEvent {
    /// A task left the backlog and began executing.
    TaskStarted {
        component: String,
        timestamp: Instant,
        active: usize,
        pending: usize,
    },
    /// A task finished successfully.
    TaskCompleted {
        component: String,
        timestamp: Instant,
        duration: Duration,
    },
    /// A task finished with an error (or panicked).
    TaskFailed {
        component: String,
        timestamp: Instant,
        duration: Duration,
    },
    /// `purge` dropped unstarted tasks from the backlog.
    BacklogPurged {
        component: String,
        timestamp: Instant,
        dropped: usize,
    },
}

impl SyncEvent for QueueEvent {
    fn event_type(&self) -> &'static str {
        match self {
            QueueEvent::TaskStarted { .. } => "task_started",
            QueueEvent::TaskCompleted { .. } => "task_completed",
            QueueEvent::TaskFailed { .. } => "task_failed",
            QueueEvent::BacklogPurged { .. } => "backlog_purged",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            QueueEvent::TaskStarted { timestamp, .. }
            | QueueEvent::TaskCompleted { timestamp, .. }
            | QueueEvent::TaskFailed { timestamp, .. }
            | QueueEvent::BacklogPurged { timestamp, .. } => *timestamp,
        }
    }

    fn component(&self) -> &str {
        match self {
            QueueEvent::TaskStarted { component, .. }
            | QueueEvent::TaskCompleted { component, .. }
            | QueueEvent::TaskFailed { component, .. }
            | QueueEvent::BacklogPurged { component, .. } => component,
        }
    }
}
