use crate::events::QueueEvent;
use crate::SyncQueue;
use syncline_core::events::{EventListeners, FnListener};
use syncline_core::SyncError;

/// Configuration for the concurrency queue.
pub struct SyncQueueConfig {
    pub(crate) max_parallel: usize,
    pub(crate) event_listeners: EventListeners<QueueEvent>,
    pub(crate) name: String,
}

impl SyncQueueConfig {
    /// Creates a new builder with defaults.
    pub fn builder() -> SyncQueueConfigBuilder {
        SyncQueueConfigBuilder::new()
    }
}

/// Builder for [`SyncQueueConfig`].
pub struct SyncQueueConfigBuilder {
    max_parallel: usize,
    event_listeners: EventListeners<QueueEvent>,
    name: String,
}

impl Default for SyncQueueConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncQueueConfigBuilder {
    /// Creates a new builder with defaults.
    ///
    /// Defaults:
    /// - max_parallel: 5
    /// - name: `"<unnamed>"`
    pub fn new() -> Self {
        Self {
            max_parallel: 5,
            event_listeners: EventListeners::new(),
            name: "<unnamed>".to_string(),
        }
    }

    /// Sets the maximum number of concurrently running tasks.
    /// Must be at least 1; `build` rejects 0.
    pub fn max_parallel(mut self, max_parallel: usize) -> Self {
        self.max_parallel = max_parallel;
        self
    }

    /// Sets the name for this queue instance (used in events and logs).
    pub fn name<S: Into<String>>(mut self, name: S) -> Self {
        self.name = name.into();
        self
    }

    /// Registers a callback when a task starts, with the active count and
    /// remaining backlog depth.
    pub fn on_task_started<F>(mut self, f: F) -> Self
    where
        F: Fn(usize, usize) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let QueueEvent::TaskStarted {
                active, pending, ..
            } = event
            {
                f(*active, *pending);
            }
        }));
        self
    }

    /// Registers a callback when a task completes successfully, with its
    /// run duration.
    pub fn on_task_completed<F>(mut self, f: F) -> Self
    where
        F: Fn(std::time::Duration) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let QueueEvent::TaskCompleted { duration, .. } = event {
                f(*duration);
            }
        }));
        self
    }

    /// Registers a callback when a task fails, with its run duration.
    pub fn on_task_failed<F>(mut self, f: F) -> Self
    where
        F: Fn(std::time::Duration) + Send + Sync + 'static,
    {
        self.event_listeners.add(FnListener::new(move |event| {
            if let QueueEvent::TaskFailed { duration, .. } = event {
                f(*duration);
            }
        }));
        self
    }

    /// Builds the queue.
    ///
    /// Fails with [`SyncError::ConfigurationInvalid`] when `max_parallel`
    /// is zero.
    pub fn build(self) -> Result<SyncQueue, SyncError> {
        if self.max_parallel == 0 {
            return Err(SyncError::ConfigurationInvalid {
                message: "max_parallel must be at least 1".to_string(),
            });
        }
        Ok(SyncQueue::new(SyncQueueConfig {
            max_parallel: self.max_parallel,
            event_listeners: self.event_listeners,
            name: self.name,
        }))
    }
}
