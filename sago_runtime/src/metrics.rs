//! Cache metrics: hits, misses, expirations and write failures.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Kind of cache event being tracked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheEvent {
    /// Entry found and fresh
    Hit,
    /// No usable entry
    Miss,
    /// Entry found but past its TTL (also counted as a miss)
    Expired,
    /// Entry present but unreadable (also counted as a miss)
    Corrupt,
    /// Result written
    Store,
    /// Write failed and was swallowed
    StoreFailed,
}

/// Cache metrics collector.
///
/// Cheap to clone; clones share counters.
#[derive(Clone, Debug)]
pub struct CacheMetrics {
    inner: Arc<[AtomicU64; 6]>,
}

impl CacheMetrics {
    /// Creates a new metrics collector.
    pub fn new() -> Self {
        Self {
            inner: Arc::new([
                AtomicU64::new(0), // Hit
                AtomicU64::new(0), // Miss
                AtomicU64::new(0), // Expired
                AtomicU64::new(0), // Corrupt
                AtomicU64::new(0), // Store
                AtomicU64::new(0), // StoreFailed
            ]),
        }
    }

    /// Records an event occurrence.
    pub fn record(&self, event: CacheEvent) {
        self.inner[event as usize].fetch_add(1, Ordering::Relaxed);
        if matches!(event, CacheEvent::Expired | CacheEvent::Corrupt) {
            self.inner[CacheEvent::Miss as usize].fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Gets the count for a specific event.
    pub fn count(&self, event: CacheEvent) -> u64 {
        self.inner[event as usize].load(Ordering::Relaxed)
    }

    /// Gets the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let hits = self.count(CacheEvent::Hit);
        let total = hits + self.count(CacheEvent::Miss);

        if total == 0 {
            return 0.0;
        }

        hits as f64 / total as f64
    }

    /// Gets all counters as a summary.
    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            hits: self.count(CacheEvent::Hit),
            misses: self.count(CacheEvent::Miss),
            expired: self.count(CacheEvent::Expired),
            corrupt: self.count(CacheEvent::Corrupt),
            stores: self.count(CacheEvent::Store),
            store_failures: self.count(CacheEvent::StoreFailed),
            hit_rate: self.hit_rate(),
        }
    }

    /// Resets all counters to zero.
    pub fn reset(&self) {
        for count in self.inner.iter() {
            count.store(0, Ordering::Relaxed);
        }
    }
}

impl Default for CacheMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of cache counters.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsSummary {
    pub hits: u64,
    pub misses: u64,
    pub expired: u64,
    pub corrupt: u64,
    pub stores: u64,
    pub store_failures: u64,
    /// Hit rate (0.0 to 1.0)
    pub hit_rate: f64,
}
