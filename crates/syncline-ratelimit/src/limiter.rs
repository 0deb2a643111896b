//! Sliding-window state and the priority-ordered waiter queue.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, VecDeque};
use std::time::Duration;
use syncline_core::SyncError;
use tokio::sync::oneshot;
use tokio::time::Instant;

/// A caller suspended on admission denial. Resumed (or cancelled) through
/// its oneshot channel by the drain task.
pub(crate) struct Waiter {
    pub(crate) priority: i32,
    /// Monotonic enqueue sequence; encodes arrival order race-free.
    pub(crate) seq: u64,
    pub(crate) enqueued_at: Instant,
    pub(crate) resume: oneshot::Sender<Result<(), SyncError>>,
}

// Max-heap order: highest priority first, earliest arrival first within a
// priority.
impl Ord for Waiter {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Waiter {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Waiter {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for Waiter {}

/// Mutable limiter state: the pruned admission log plus the waiter queue.
///
/// Invariant: after [`prune`](Self::prune), `admissions.len() <= capacity`.
pub(crate) struct WindowState {
    capacity: usize,
    window: Duration,
    admissions: VecDeque<Instant>,
    waiters: BinaryHeap<Waiter>,
    /// Guards against a second drain task being spawned while one runs.
    pub(crate) draining: bool,
    next_seq: u64,
}

impl WindowState {
    pub(crate) fn new(capacity: usize, window: Duration) -> Self {
        Self {
            capacity,
            window,
            admissions: VecDeque::with_capacity(capacity),
            waiters: BinaryHeap::new(),
            draining: false,
            next_seq: 0,
        }
    }

    /// Drops admission timestamps that have left the rolling window.
    pub(crate) fn prune(&mut self, now: Instant) {
        while let Some(&oldest) = self.admissions.front() {
            if now.duration_since(oldest) >= self.window {
                self.admissions.pop_front();
            } else {
                break;
            }
        }
    }

    pub(crate) fn has_capacity(&self) -> bool {
        self.admissions.len() < self.capacity
    }

    pub(crate) fn record_admission(&mut self, now: Instant) {
        self.admissions.push_back(now);
    }

    /// The instant the oldest admission leaves the window.
    pub(crate) fn next_expiry(&self) -> Option<Instant> {
        self.admissions.front().map(|&oldest| oldest + self.window)
    }

    pub(crate) fn remaining(&self) -> usize {
        self.capacity.saturating_sub(self.admissions.len())
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    pub(crate) fn clear_admissions(&mut self) {
        self.admissions.clear();
    }

    pub(crate) fn enqueue(
        &mut self,
        priority: i32,
        now: Instant,
        resume: oneshot::Sender<Result<(), SyncError>>,
    ) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.waiters.push(Waiter {
            priority,
            seq,
            enqueued_at: now,
            resume,
        });
    }

    pub(crate) fn pop_waiter(&mut self) -> Option<Waiter> {
        self.waiters.pop()
    }

    pub(crate) fn take_waiters(&mut self) -> Vec<Waiter> {
        std::mem::take(&mut self.waiters).into_vec()
    }

    pub(crate) fn queue_depth(&self) -> usize {
        self.waiters.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(capacity: usize, window_ms: u64) -> WindowState {
        WindowState::new(capacity, Duration::from_millis(window_ms))
    }

    #[tokio::test]
    async fn prune_keeps_recent_admissions() {
        let mut s = state(5, 1000);
        let t0 = Instant::now();
        s.record_admission(t0);
        s.record_admission(t0 + Duration::from_millis(600));

        s.prune(t0 + Duration::from_millis(900));
        assert_eq!(s.remaining(), 3);

        // t0 has aged out, the second admission has not.
        s.prune(t0 + Duration::from_millis(1100));
        assert_eq!(s.remaining(), 4);
    }

    #[tokio::test]
    async fn capacity_invariant_after_prune() {
        let mut s = state(3, 1000);
        let t0 = Instant::now();
        for i in 0..3 {
            s.record_admission(t0 + Duration::from_millis(i * 10));
        }
        s.prune(t0 + Duration::from_millis(50));
        assert!(!s.has_capacity());
        assert_eq!(s.next_expiry(), Some(t0 + Duration::from_millis(1000)));
    }

    #[tokio::test]
    async fn waiter_order_is_priority_then_fifo() {
        let mut s = state(1, 1000);
        let now = Instant::now();

        let mut enqueue = |priority| {
            let (tx, rx) = oneshot::channel();
            s.enqueue(priority, now, tx);
            rx
        };
        let _rx_a = enqueue(0);
        let _rx_b = enqueue(10);
        let _rx_c = enqueue(5);
        let _rx_d = enqueue(10);

        let order: Vec<(i32, u64)> = std::iter::from_fn(|| s.pop_waiter())
            .map(|w| (w.priority, w.seq))
            .collect();
        assert_eq!(order, vec![(10, 1), (10, 3), (5, 2), (0, 0)]);
    }
}
