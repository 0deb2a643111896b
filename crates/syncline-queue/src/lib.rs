//! Priority-fair bounded-parallelism executor for per-record sync tasks.
//!
//! At most `max_parallel` tasks run concurrently; the backlog is ordered by
//! priority (descending) with FIFO fairness at equal priority. A task's
//! failure never disturbs its siblings or the queue's liveness.
//!
//! # Examples
//!
//! ```
//! use syncline_queue::SyncQueueConfig;
//! use syncline_core::SyncError;
//!
//! # async fn example() -> Result<(), SyncError> {
//! let queue = SyncQueueConfig::builder()
//!     .max_parallel(5)
//!     .name("records")
//!     .build()?;
//!
//! let handle = queue.submit(async { Ok::<_, SyncError>(1 + 1) }, 0);
//! assert_eq!(handle.await?, 2);
//! # Ok(())
//! # }
//! ```

mod config;
mod events;

pub use config::{SyncQueueConfig, SyncQueueConfigBuilder};
pub use events::QueueEvent;

use futures::future::BoxFuture;
use futures::FutureExt;
use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;
use syncline_core::SyncError;
use tokio::sync::oneshot;
use tokio::time::Instant;

#[cfg(feature = "metrics")]
use metrics::{counter, gauge};

/// Interval of the bounded idle-detection poll in [`SyncQueue::await_idle`].
const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Counters and gauges describing the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueueStats {
    /// Tasks waiting in the backlog.
    pub pending: usize,
    /// Tasks currently executing.
    pub active: usize,
    /// Tasks that finished successfully (monotonic).
    pub completed: u64,
    /// Tasks that finished with an error (monotonic).
    pub failed: u64,
}

/// Handle returned by [`SyncQueue::submit`]; resolves to the task's result.
///
/// A task dropped by [`SyncQueue::purge`] before it started resolves to
/// [`SyncError::Cancelled`].
pub struct TaskHandle<T> {
    rx: oneshot::Receiver<Result<T, SyncError>>,
}

impl<T> Future for TaskHandle<T> {
    type Output = Result<T, SyncError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => Poll::Ready(Err(SyncError::cancelled(
                "task dropped from the backlog before it started",
            ))),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// A queued, not-yet-started task. Ordered by priority (descending) then
/// submission sequence (ascending).
struct PendingTask {
    priority: i32,
    seq: u64,
    task: BoxFuture<'static, bool>,
}

impl Ord for PendingTask {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for PendingTask {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for PendingTask {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for PendingTask {}

struct QueueState {
    backlog: BinaryHeap<PendingTask>,
    active: usize,
    completed: u64,
    failed: u64,
    next_seq: u64,
}

struct QueueShared {
    state: Mutex<QueueState>,
    config: SyncQueueConfig,
}

/// Bounded-parallelism executor with a priority-ordered backlog.
///
/// Cheap to clone; clones share the same backlog and counters.
#[derive(Clone)]
pub struct SyncQueue {
    shared: Arc<QueueShared>,
}

impl SyncQueue {
    pub(crate) fn new(config: SyncQueueConfig) -> Self {
        Self {
            shared: Arc::new(QueueShared {
                state: Mutex::new(QueueState {
                    backlog: BinaryHeap::new(),
                    active: 0,
                    completed: 0,
                    failed: 0,
                    next_seq: 0,
                }),
                config,
            }),
        }
    }

    /// Enqueues `work`; the returned handle completes with the task's
    /// result. Panics inside `work` are contained and counted as failures.
    pub fn submit<T, F>(&self, work: F, priority: i32) -> TaskHandle<T>
    where
        F: Future<Output = Result<T, SyncError>> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let task: BoxFuture<'static, bool> = Box::pin(async move {
            match std::panic::AssertUnwindSafe(work).catch_unwind().await {
                Ok(result) => {
                    let succeeded = result.is_ok();
                    let _ = tx.send(result);
                    succeeded
                }
                Err(_panic) => {
                    let _ = tx.send(Err(SyncError::validation("task panicked")));
                    false
                }
            }
        });

        {
            let mut state = self.shared.state.lock().unwrap();
            let seq = state.next_seq;
            state.next_seq += 1;
            state.backlog.push(PendingTask {
                priority,
                seq,
                task,
            });
        }

        Self::schedule(&self.shared);
        TaskHandle { rx }
    }

    /// Bulk [`submit`](Self::submit): every task gets the same priority;
    /// FIFO order among them is the iteration order.
    pub fn submit_all<T, F, I>(&self, works: I, priority: i32) -> Vec<TaskHandle<T>>
    where
        I: IntoIterator<Item = F>,
        F: Future<Output = Result<T, SyncError>> + Send + 'static,
        T: Send + 'static,
    {
        works
            .into_iter()
            .map(|work| self.submit(work, priority))
            .collect()
    }

    /// Returns the current counters and gauges.
    pub fn stats(&self) -> QueueStats {
        let state = self.shared.state.lock().unwrap();
        QueueStats {
            pending: state.backlog.len(),
            active: state.active,
            completed: state.completed,
            failed: state.failed,
        }
    }

    /// Tasks waiting in the backlog.
    pub fn pending_depth(&self) -> usize {
        self.shared.state.lock().unwrap().backlog.len()
    }

    /// Tasks currently executing.
    pub fn active_count(&self) -> usize {
        self.shared.state.lock().unwrap().active
    }

    /// True when nothing is executing and the backlog is empty.
    pub fn is_idle(&self) -> bool {
        let state = self.shared.state.lock().unwrap();
        state.active == 0 && state.backlog.is_empty()
    }

    /// Suspends until the queue is idle (bounded 100 ms poll).
    pub async fn await_idle(&self) {
        loop {
            if self.is_idle() {
                return;
            }
            tokio::time::sleep(IDLE_POLL_INTERVAL).await;
        }
    }

    /// Drops every pending (unstarted) task from the backlog; in-flight
    /// tasks are untouched. Purged submitters observe
    /// [`SyncError::Cancelled`] through their handles. Returns the number
    /// of tasks dropped.
    pub fn purge(&self) -> usize {
        let dropped = {
            let mut state = self.shared.state.lock().unwrap();
            let dropped = state.backlog.len();
            state.backlog.clear();
            dropped
        };

        if dropped > 0 {
            tracing::debug!(
                queue = %self.shared.config.name,
                dropped,
                "purged pending tasks from the backlog"
            );
        }

        self.shared
            .config
            .event_listeners
            .emit(&QueueEvent::BacklogPurged {
                component: self.shared.config.name.clone(),
                timestamp: std::time::Instant::now(),
                dropped,
            });
        dropped
    }

    /// The scheduler: starts backlog tasks while capacity allows. Invoked
    /// on every submit and every task completion.
    fn schedule(shared: &Arc<QueueShared>) {
        loop {
            let (pending_task, active, pending) = {
                let mut state = shared.state.lock().unwrap();
                if state.active >= shared.config.max_parallel || state.backlog.is_empty() {
                    return;
                }
                state.active += 1;
                let task = state.backlog.pop().expect("backlog is non-empty");
                (task, state.active, state.backlog.len())
            };

            shared
                .config
                .event_listeners
                .emit(&QueueEvent::TaskStarted {
                    component: shared.config.name.clone(),
                    timestamp: std::time::Instant::now(),
                    active,
                    pending,
                });

            #[cfg(feature = "metrics")]
            {
                gauge!("syncline_queue_active", "queue" => shared.config.name.clone())
                    .set(active as f64);
                gauge!("syncline_queue_pending", "queue" => shared.config.name.clone())
                    .set(pending as f64);
            }

            let shared = Arc::clone(shared);
            tokio::spawn(async move {
                let started = Instant::now();
                let succeeded = pending_task.task.await;
                let duration = started.elapsed();

                {
                    let mut state = shared.state.lock().unwrap();
                    state.active -= 1;
                    if succeeded {
                        state.completed += 1;
                    } else {
                        state.failed += 1;
                    }
                }

                let event = if succeeded {
                    QueueEvent::TaskCompleted {
                        component: shared.config.name.clone(),
                        timestamp: std::time::Instant::now(),
                        duration,
                    }
                } else {
                    QueueEvent::TaskFailed {
                        component: shared.config.name.clone(),
                        timestamp: std::time::Instant::now(),
                        duration,
                    }
                };
                shared.config.event_listeners.emit(&event);

                #[cfg(feature = "metrics")]
                {
                    let outcome = if succeeded { "completed" } else { "failed" };
                    counter!("syncline_queue_tasks_total", "queue" => shared.config.name.clone(), "outcome" => outcome)
                        .increment(1);
                }

                SyncQueue::schedule(&shared);
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn queue(max_parallel: usize) -> SyncQueue {
        SyncQueueConfig::builder()
            .max_parallel(max_parallel)
            .name("test")
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn submit_returns_the_works_value() {
        let queue = queue(2);
        let handle = queue.submit(async { Ok::<_, SyncError>("payload") }, 0);
        assert_eq!(handle.await.unwrap(), "payload");

        let stats = queue.stats();
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.failed, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn active_count_never_exceeds_max_parallel() {
        let queue = queue(3);
        let concurrent = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..20 {
            let concurrent = Arc::clone(&concurrent);
            let peak = Arc::clone(&peak);
            handles.push(queue.submit(
                async move {
                    let now = concurrent.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    concurrent.fetch_sub(1, Ordering::SeqCst);
                    Ok::<_, SyncError>(())
                },
                0,
            ));
        }

        for handle in handles {
            handle.await.unwrap();
        }
        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert_eq!(queue.stats().completed, 20);
    }

    #[tokio::test(start_paused = true)]
    async fn backlog_starts_by_priority_with_fifo_tiebreak() {
        let queue = queue(1);
        let order = Arc::new(Mutex::new(Vec::new()));

        // Occupy the only slot so the rest pile up in the backlog.
        let gate = queue.submit(
            async {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok::<_, SyncError>(())
            },
            0,
        );
        tokio::task::yield_now().await;

        let mut handles = Vec::new();
        for (label, priority) in [("a", 0), ("b", 10), ("c", 5), ("b2", 10)] {
            let order = Arc::clone(&order);
            handles.push(queue.submit(
                async move {
                    order.lock().unwrap().push(label);
                    Ok::<_, SyncError>(())
                },
                priority,
            ));
        }

        gate.await.unwrap();
        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(*order.lock().unwrap(), vec!["b", "b2", "c", "a"]);
    }

    #[tokio::test]
    async fn failure_is_isolated_and_counted() {
        let queue = queue(2);
        let failing = queue.submit(
            async {
                Err::<(), _>(SyncError::ApiFailure {
                    status: 500,
                    body_excerpt: "boom".into(),
                })
            },
            0,
        );
        let succeeding = queue.submit(async { Ok::<_, SyncError>(7) }, 0);

        assert!(matches!(
            failing.await.unwrap_err(),
            SyncError::ApiFailure { status: 500, .. }
        ));
        assert_eq!(succeeding.await.unwrap(), 7);

        queue.await_idle().await;
        let stats = queue.stats();
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.failed, 1);
    }

    #[tokio::test]
    async fn panicking_task_does_not_break_the_queue() {
        let queue = queue(1);
        let panicking = queue.submit(
            async {
                if true {
                    panic!("kaboom");
                }
                Ok::<_, SyncError>(())
            },
            0,
        );
        let after = queue.submit(async { Ok::<_, SyncError>("still alive") }, 0);

        assert!(panicking.await.is_err());
        assert_eq!(after.await.unwrap(), "still alive");
        assert_eq!(queue.stats().failed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn purge_cancels_pending_but_not_in_flight() {
        let queue = queue(1);
        let in_flight = queue.submit(
            async {
                tokio::time::sleep(Duration::from_millis(50)).await;
                Ok::<_, SyncError>("finished")
            },
            0,
        );
        tokio::task::yield_now().await;

        let pending = queue.submit(async { Ok::<_, SyncError>("never runs") }, 0);
        assert_eq!(queue.pending_depth(), 1);

        let dropped = queue.purge();
        assert_eq!(dropped, 1);
        assert!(matches!(
            pending.await.unwrap_err(),
            SyncError::Cancelled { .. }
        ));
        assert_eq!(in_flight.await.unwrap(), "finished");
    }

    #[tokio::test(start_paused = true)]
    async fn await_idle_returns_once_drained() {
        let queue = queue(2);
        assert!(queue.is_idle());

        for _ in 0..5 {
            queue.submit(
                async {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    Ok::<_, SyncError>(())
                },
                0,
            );
        }
        assert!(!queue.is_idle());

        queue.await_idle().await;
        assert!(queue.is_idle());
        assert_eq!(queue.stats().completed, 5);
    }

    #[tokio::test]
    async fn submit_all_preserves_order_at_equal_priority() {
        let queue = queue(1);
        let order = Arc::new(Mutex::new(Vec::new()));

        let works: Vec<_> = (0..4)
            .map(|i| {
                let order = Arc::clone(&order);
                async move {
                    order.lock().unwrap().push(i);
                    Ok::<_, SyncError>(i)
                }
            })
            .collect();

        let handles = queue.submit_all(works, 0);
        for (i, handle) in handles.into_iter().enumerate() {
            assert_eq!(handle.await.unwrap(), i);
        }
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3]);
    }
}
