//! Bounded, multi-producer/multi-consumer ticket queue with blocking timeouts.
//!
//! This is deliberately a different data structure from a lock-free SPSC
//! ring: `put`/`get` need *blocking-with-timeout* semantics so that every
//! worker returns to its loop head at least every ~100ms to observe the
//! stop signal. A `Mutex` + `Condvar` bounded deque gives that directly and
//! cheaply — tickets are 16 bytes, so lock overhead dominates, not copy
//! cost.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::invariants::debug_assert_bounded_queue;
use crate::metrics::{Metrics, MetricsSnapshot};
use crate::Ticket;

/// Default bounded capacity: comfortably above any realistic slot count, so
/// arena rotation never deadlocks against queue backpressure.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1000;

/// Errors raised by [`TicketQueue`] operations.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum QueueError {
    /// `put`/`get` did not complete within the requested timeout.
    #[error("ticket queue operation timed out")]
    Timeout,
}

struct Inner {
    deque: VecDeque<Ticket>,
    capacity: usize,
}

/// A bounded FIFO of [`Ticket`]s, safe for many producers and many
/// consumers. Never drops a ticket silently: `put` either succeeds or
/// returns [`QueueError::Timeout`].
pub struct TicketQueue {
    state: Mutex<Inner>,
    not_full: Condvar,
    not_empty: Condvar,
    metrics: Metrics,
}

impl TicketQueue {
    /// Creates a queue with the given bounded capacity.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "queue capacity must be positive");
        Self {
            state: Mutex::new(Inner {
                deque: VecDeque::with_capacity(capacity.min(DEFAULT_QUEUE_CAPACITY)),
                capacity,
            }),
            not_full: Condvar::new(),
            not_empty: Condvar::new(),
            metrics: Metrics::new(),
        }
    }

    /// Enqueues `ticket`, blocking while the queue is full. Returns
    /// [`QueueError::Timeout`] if `timeout` elapses first; the ticket is
    /// never silently dropped in that case (the caller still holds it).
    pub fn put(&self, ticket: Ticket, timeout: Duration) -> Result<(), QueueError> {
        let deadline = Instant::now() + timeout;
        let mut guard = self.state.lock().expect("ticket queue mutex poisoned");
        loop {
            if guard.deque.len() < guard.capacity {
                debug_assert_bounded_queue!(guard.deque.len(), guard.capacity);
                guard.deque.push_back(ticket);
                self.metrics.record_put();
                drop(guard);
                self.not_empty.notify_one();
                return Ok(());
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(QueueError::Timeout);
            }
            let (g, result) = self
                .not_full
                .wait_timeout(guard, deadline - now)
                .expect("ticket queue condvar poisoned");
            guard = g;
            if result.timed_out() && guard.deque.len() >= guard.capacity {
                return Err(QueueError::Timeout);
            }
        }
    }

    /// Dequeues the oldest ticket, blocking while the queue is empty.
    /// Returns [`QueueError::Timeout`] if `timeout` elapses first.
    pub fn get(&self, timeout: Duration) -> Result<Ticket, QueueError> {
        let deadline = Instant::now() + timeout;
        let mut guard = self.state.lock().expect("ticket queue mutex poisoned");
        loop {
            if let Some(ticket) = guard.deque.pop_front() {
                self.metrics.record_get();
                drop(guard);
                self.not_full.notify_one();
                return Ok(ticket);
            }
            let now = Instant::now();
            if now >= deadline {
                self.metrics.record_timeout();
                return Err(QueueError::Timeout);
            }
            let (g, result) = self
                .not_empty
                .wait_timeout(guard, deadline - now)
                .expect("ticket queue condvar poisoned");
            guard = g;
            if result.timed_out() && guard.deque.is_empty() {
                self.metrics.record_timeout();
                return Err(QueueError::Timeout);
            }
        }
    }

    /// Current number of tickets queued, for diagnostics/tests.
    pub fn len(&self) -> usize {
        self.state.lock().expect("ticket queue mutex poisoned").deque.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.state.lock().expect("ticket queue mutex poisoned").capacity
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn put_then_get_fifo() {
        let q = TicketQueue::new(4);
        q.put(Ticket::new(0, 0), Duration::from_millis(50)).unwrap();
        q.put(Ticket::new(1, 1), Duration::from_millis(50)).unwrap();

        let first = q.get(Duration::from_millis(50)).unwrap();
        let second = q.get(Duration::from_millis(50)).unwrap();
        assert_eq!(first.frame_index(), 0);
        assert_eq!(second.frame_index(), 1);
    }

    #[test]
    fn get_times_out_on_empty() {
        let q = TicketQueue::new(4);
        let err = q.get(Duration::from_millis(20)).unwrap_err();
        assert_eq!(err, QueueError::Timeout);
    }

    #[test]
    fn put_times_out_when_full() {
        let q = TicketQueue::new(1);
        q.put(Ticket::new(0, 0), Duration::from_millis(50)).unwrap();
        let err = q.put(Ticket::new(0, 1), Duration::from_millis(20)).unwrap_err();
        assert_eq!(err, QueueError::Timeout);
    }

    #[test]
    fn sentinel_is_a_normal_ticket_value() {
        let q = TicketQueue::new(4);
        q.put(Ticket::SENTINEL, Duration::from_millis(50)).unwrap();
        let got = q.get(Duration::from_millis(50)).unwrap();
        assert!(got.is_sentinel());
    }

    #[test]
    fn concurrent_producers_never_lose_a_ticket() {
        let q = Arc::new(TicketQueue::new(8));
        let producers: Vec<_> = (0..4)
            .map(|p| {
                let q = Arc::clone(&q);
                thread::spawn(move || {
                    for i in 0..50u64 {
                        q.put(Ticket::new(0, p * 1000 + i), Duration::from_secs(2)).unwrap();
                    }
                })
            })
            .collect();

        let mut received = 0usize;
        while received < 200 {
            if q.get(Duration::from_millis(500)).is_ok() {
                received += 1;
            }
        }
        for p in producers {
            p.join().unwrap();
        }
        assert_eq!(received, 200);
    }
}
