use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

#[derive(Debug, Default)]
struct Inner {
    rows_read: AtomicU64,
    rows_written: AtomicU64,
    rows_deleted: AtomicU64,
    batches: AtomicU64,
    failed_batches: AtomicU64,
    throttle_pauses: AtomicU64,
}

/// Cheap shared counters; cloned handles observe the same totals.
#[derive(Debug, Clone, Default)]
pub struct SyncMetrics {
    inner: Arc<Inner>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub rows_read: u64,
    pub rows_written: u64,
    pub rows_deleted: u64,
    pub batches: u64,
    pub failed_batches: u64,
    pub throttle_pauses: u64,
}

impl SyncMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_rows_read(&self, n: u64) {
        self.inner.rows_read.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_rows_written(&self, n: u64) {
        self.inner.rows_written.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_rows_deleted(&self, n: u64) {
        self.inner.rows_deleted.fetch_add(n, Ordering::Relaxed);
    }

    pub fn add_batch(&self) {
        self.inner.batches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_failed_batch(&self) {
        self.inner.failed_batches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_throttle_pause(&self) {
        self.inner.throttle_pauses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            rows_read: self.inner.rows_read.load(Ordering::Relaxed),
            rows_written: self.inner.rows_written.load(Ordering::Relaxed),
            rows_deleted: self.inner.rows_deleted.load(Ordering::Relaxed),
            batches: self.inner.batches.load(Ordering::Relaxed),
            failed_batches: self.inner.failed_batches.load(Ordering::Relaxed),
            throttle_pauses: self.inner.throttle_pauses.load(Ordering::Relaxed),
        }
    }
}
