use std::sync::atomic::{AtomicU64, Ordering};

/// Optional metrics for monitoring queue performance.
#[derive(Debug, Default)]
pub struct Metrics {
    puts: AtomicU64,
    gets: AtomicU64,
    timeouts: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub(crate) fn record_put(&self) {
        self.puts.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_get(&self) {
        self.gets.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub(crate) fn record_timeout(&self) {
        self.timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            puts: self.puts.load(Ordering::Relaxed),
            gets: self.gets.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
        }
    }
}

/// A point-in-time copy of [`Metrics`], safe to pass around and compare.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub puts: u64,
    pub gets: u64,
    pub timeouts: u64,
}
