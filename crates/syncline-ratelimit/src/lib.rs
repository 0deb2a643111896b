//! Sliding-window rate limiting for the sync worker's outbound calls.
//!
//! Admits at most `capacity` requests per rolling `window`; excess callers
//! suspend in a priority-ordered queue (FIFO within equal priority) and are
//! released by a single drain task as admissions age out of the window.
//!
//! # Examples
//!
//! ```
//! use syncline_ratelimit::RateLimiterConfig;
//! use syncline_core::SyncError;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), SyncError> {
//! let limiter = RateLimiterConfig::builder()
//!     .capacity(10)
//!     .window(Duration::from_secs(60))
//!     .name("api")
//!     .build();
//!
//! let body = limiter
//!     .execute(|| async { Ok::<_, SyncError>("response") }, 0)
//!     .await?;
//! # Ok(())
//! # }
//! ```

mod config;
mod events;
mod limiter;

pub use config::{RateLimiterConfig, RateLimiterConfigBuilder};
pub use events::RateLimiterEvent;

use crate::limiter::WindowState;
use std::future::Future;
use std::sync::{Arc, Mutex};
use syncline_core::SyncError;
use tokio::sync::oneshot;
use tokio::time::{sleep_until, Instant};

#[cfg(feature = "metrics")]
use metrics::{counter, gauge};

/// Point-in-time view of the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitSnapshot {
    /// Slots available right now (`capacity - admissions in window`).
    pub remaining: usize,
    /// When the oldest admission leaves the window (now, if the window is
    /// empty).
    pub reset_at: Instant,
    /// Configured window capacity.
    pub capacity: usize,
    /// Callers currently suspended in the waiting queue.
    pub queue_depth: usize,
}

/// Sliding-window rate limiter with a priority-fair waiting queue.
///
/// Cheap to clone; clones share the same window.
#[derive(Clone)]
pub struct RateLimiter {
    state: Arc<Mutex<WindowState>>,
    config: Arc<RateLimiterConfig>,
}

enum Admission {
    Immediate,
    Queued(oneshot::Receiver<Result<(), SyncError>>),
}

impl RateLimiter {
    pub(crate) fn new(config: RateLimiterConfig) -> Self {
        let state = WindowState::new(config.capacity, config.window);
        Self {
            state: Arc::new(Mutex::new(state)),
            config: Arc::new(config),
        }
    }

    /// Executes `work` inside a rate-limit slot.
    ///
    /// If the window admits immediately, `work` runs inline; otherwise the
    /// caller suspends until the drain task resumes it in priority-fair
    /// order. The slot is consumed whether or not `work` succeeds. A
    /// [`reset`](Self::reset) while queued yields `SyncError::Cancelled`.
    pub async fn execute<T, F, Fut>(&self, work: F, priority: i32) -> Result<T, SyncError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, SyncError>>,
    {
        let (admission, queued_depth) = {
            let mut state = self.state.lock().unwrap();
            let now = Instant::now();
            state.prune(now);

            // The fast path must not overtake queued waiters: direct
            // admission only when nobody is waiting.
            if state.queue_depth() == 0 && state.has_capacity() {
                state.record_admission(now);
                (Admission::Immediate, None)
            } else {
                let (tx, rx) = oneshot::channel();
                state.enqueue(priority, now, tx);
                let depth = state.queue_depth();
                self.spawn_drain_if_needed(&mut state);
                (Admission::Queued(rx), Some(depth))
            }
        };

        if let Some(depth) = queued_depth {
            self.config
                .event_listeners
                .emit(&RateLimiterEvent::WaiterEnqueued {
                    component: self.config.name.clone(),
                    timestamp: std::time::Instant::now(),
                    priority,
                    queue_depth: depth,
                });

            #[cfg(feature = "metrics")]
            gauge!("syncline_ratelimit_queue_depth", "limiter" => self.config.name.clone())
                .set(depth as f64);
        }

        let wait_duration = match admission {
            Admission::Immediate => std::time::Duration::ZERO,
            Admission::Queued(rx) => {
                let enqueued = Instant::now();
                match rx.await {
                    Ok(Ok(())) => enqueued.elapsed(),
                    Ok(Err(err)) => return Err(err),
                    Err(_) => {
                        return Err(SyncError::cancelled("rate limiter dropped the waiter"))
                    }
                }
            }
        };

        #[cfg(feature = "metrics")]
        counter!("syncline_ratelimit_admissions_total", "limiter" => self.config.name.clone())
            .increment(1);

        self.config
            .event_listeners
            .emit(&RateLimiterEvent::SlotAcquired {
                component: self.config.name.clone(),
                timestamp: std::time::Instant::now(),
                wait_duration,
            });

        work().await
    }

    /// Prunes the window and reports whether a request could be admitted
    /// right now.
    pub fn can_admit_now(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        state.prune(Instant::now());
        state.has_capacity()
    }

    /// Returns a point-in-time view of the window.
    pub fn snapshot(&self) -> RateLimitSnapshot {
        let mut state = self.state.lock().unwrap();
        let now = Instant::now();
        state.prune(now);
        RateLimitSnapshot {
            remaining: state.remaining(),
            reset_at: state.next_expiry().unwrap_or(now),
            capacity: state.capacity(),
            queue_depth: state.queue_depth(),
        }
    }

    /// Number of callers currently suspended in the waiting queue.
    pub fn queue_depth(&self) -> usize {
        self.state.lock().unwrap().queue_depth()
    }

    /// Suspends until at least one slot is free. No-op when capacity
    /// already exists.
    pub async fn wait_for_reset(&self) {
        loop {
            let next_expiry = {
                let mut state = self.state.lock().unwrap();
                state.prune(Instant::now());
                if state.has_capacity() {
                    return;
                }
                state.next_expiry()
            };
            match next_expiry {
                Some(at) => sleep_until(at).await,
                // Full with no admissions cannot happen; bail out rather
                // than spin.
                None => return,
            }
        }
    }

    /// Drops all window state. Pending waiters are cancelled with
    /// [`SyncError::Cancelled`]; recorded admissions are forgotten.
    pub fn reset(&self) {
        let cancelled = {
            let mut state = self.state.lock().unwrap();
            state.clear_admissions();
            let waiters = state.take_waiters();
            let cancelled = waiters.len();
            for waiter in waiters {
                let _ = waiter
                    .resume
                    .send(Err(SyncError::cancelled("rate limiter reset")));
            }
            cancelled
        };

        if cancelled > 0 {
            tracing::debug!(
                limiter = %self.config.name,
                cancelled,
                "limiter reset cancelled queued waiters"
            );
        }

        self.config
            .event_listeners
            .emit(&RateLimiterEvent::LimiterReset {
                component: self.config.name.clone(),
                timestamp: std::time::Instant::now(),
                cancelled_waiters: cancelled,
            });
    }

    /// Spawns the drain task unless one is already running. Must be called
    /// with the state lock held.
    fn spawn_drain_if_needed(&self, state: &mut WindowState) {
        if !state.draining {
            state.draining = true;
            let limiter = self.clone();
            tokio::spawn(async move { limiter.drain().await });
        }
    }

    /// The single logical queue-processing loop.
    ///
    /// Each iteration either resumes the highest-priority waiter (recording
    /// its admission atomically with the pop) or sleeps until the next
    /// admission leaves the window. Exits when the queue empties.
    async fn drain(self) {
        enum Step {
            Resumed { waited: std::time::Duration },
            Sleep(Instant),
            Done,
        }

        loop {
            let step = {
                let mut state = self.state.lock().unwrap();
                let now = Instant::now();
                state.prune(now);

                loop {
                    if state.queue_depth() == 0 {
                        state.draining = false;
                        break Step::Done;
                    }
                    if !state.has_capacity() {
                        break Step::Sleep(state.next_expiry().unwrap_or(now));
                    }
                    let waiter = state.pop_waiter().expect("queue is non-empty");
                    let waited = now.duration_since(waiter.enqueued_at);
                    if waiter.resume.send(Ok(())).is_ok() {
                        state.record_admission(now);
                        break Step::Resumed { waited };
                    }
                    // Receiver gone (caller cancelled while queued): the
                    // waiter is removed without consuming a slot.
                }
            };

            match step {
                Step::Done => return,
                Step::Resumed { waited } => {
                    tracing::trace!(
                        limiter = %self.config.name,
                        waited_ms = waited.as_millis() as u64,
                        "queued waiter resumed"
                    );
                }
                Step::Sleep(until) => sleep_until(until).await,
            }
        }
    }
}
