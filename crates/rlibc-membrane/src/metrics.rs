//! Atomic counters for runtime observability.
//!
//! All counters use relaxed ordering: they are diagnostic, not
//! synchronization primitives.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Global operation counters.
pub struct RuntimeMetrics {
    /// Successful heap allocations (including resize-by-move).
    pub allocations: AtomicU64,
    /// Successful heap releases.
    pub frees: AtomicU64,
    /// Allocation requests that failed for lack of space.
    pub alloc_failures: AtomicU64,
    /// Releases rejected because the address was not a live allocation.
    pub invalid_frees: AtomicU64,
    /// Raw read calls issued by the stream layer.
    pub raw_reads: AtomicU64,
    /// Raw write calls issued by the stream layer.
    pub raw_writes: AtomicU64,
    /// Buffer flushes that reached the raw layer.
    pub flushes: AtomicU64,
    /// Sticky stream errors recorded.
    pub stream_errors: AtomicU64,
    pub forks: AtomicU64,
    pub waits: AtomicU64,
}

impl RuntimeMetrics {
    /// Create a new zeroed metrics instance.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            allocations: AtomicU64::new(0),
            frees: AtomicU64::new(0),
            alloc_failures: AtomicU64::new(0),
            invalid_frees: AtomicU64::new(0),
            raw_reads: AtomicU64::new(0),
            raw_writes: AtomicU64::new(0),
            flushes: AtomicU64::new(0),
            stream_errors: AtomicU64::new(0),
            forks: AtomicU64::new(0),
            waits: AtomicU64::new(0),
        }
    }

    /// Increment a counter by 1.
    pub fn inc(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Read a counter value.
    pub fn get(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }

    /// Snapshot all counters.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            allocations: Self::get(&self.allocations),
            frees: Self::get(&self.frees),
            alloc_failures: Self::get(&self.alloc_failures),
            invalid_frees: Self::get(&self.invalid_frees),
            raw_reads: Self::get(&self.raw_reads),
            raw_writes: Self::get(&self.raw_writes),
            flushes: Self::get(&self.flushes),
            stream_errors: Self::get(&self.stream_errors),
            forks: Self::get(&self.forks),
            waits: Self::get(&self.waits),
        }
    }
}

impl Default for RuntimeMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time snapshot of all counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub allocations: u64,
    pub frees: u64,
    pub alloc_failures: u64,
    pub invalid_frees: u64,
    pub raw_reads: u64,
    pub raw_writes: u64,
    pub flushes: u64,
    pub stream_errors: u64,
    pub forks: u64,
    pub waits: u64,
}

impl MetricsSnapshot {
    /// Per-counter difference `self - earlier`, saturating at zero.
    #[must_use]
    pub fn since(&self, earlier: &Self) -> Self {
        Self {
            allocations: self.allocations.saturating_sub(earlier.allocations),
            frees: self.frees.saturating_sub(earlier.frees),
            alloc_failures: self.alloc_failures.saturating_sub(earlier.alloc_failures),
            invalid_frees: self.invalid_frees.saturating_sub(earlier.invalid_frees),
            raw_reads: self.raw_reads.saturating_sub(earlier.raw_reads),
            raw_writes: self.raw_writes.saturating_sub(earlier.raw_writes),
            flushes: self.flushes.saturating_sub(earlier.flushes),
            stream_errors: self.stream_errors.saturating_sub(earlier.stream_errors),
            forks: self.forks.saturating_sub(earlier.forks),
            waits: self.waits.saturating_sub(earlier.waits),
        }
    }
}

static GLOBAL_METRICS: RuntimeMetrics = RuntimeMetrics::new();

/// Access the global metrics singleton.
#[must_use]
pub fn global_metrics() -> &'static RuntimeMetrics {
    &GLOBAL_METRICS
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_start_at_zero() {
        let m = RuntimeMetrics::new();
        assert_eq!(m.snapshot(), MetricsSnapshot::default());
    }

    #[test]
    fn increment_works() {
        let m = RuntimeMetrics::new();
        RuntimeMetrics::inc(&m.allocations);
        RuntimeMetrics::inc(&m.allocations);
        RuntimeMetrics::inc(&m.flushes);
        let snap = m.snapshot();
        assert_eq!(snap.allocations, 2);
        assert_eq!(snap.flushes, 1);
        assert_eq!(snap.frees, 0);
    }

    #[test]
    fn delta_between_snapshots() {
        let m = RuntimeMetrics::new();
        RuntimeMetrics::inc(&m.raw_writes);
        let before = m.snapshot();
        RuntimeMetrics::inc(&m.raw_writes);
        RuntimeMetrics::inc(&m.raw_writes);
        let delta = m.snapshot().since(&before);
        assert_eq!(delta.raw_writes, 2);
        assert_eq!(delta.allocations, 0);
    }

    #[test]
    fn snapshot_serializes() {
        let json = serde_json::to_string(&MetricsSnapshot::default()).unwrap();
        assert!(json.contains("\"raw_writes\":0"));
    }
}
