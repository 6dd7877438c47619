use std::sync::atomic::{AtomicU64, Ordering};

use crate::metrics::snapshot::CacheMetricsSnapshot;

/// Lifetime counters shared by a cache and every object it allocates.
///
/// All counters use `Ordering::Relaxed`: they are observational and never
/// used to synchronize other memory. Objects hold an `Arc` to the counters so
/// that a deallocation happening long after a delete (when the last handle is
/// dropped) is still recorded.
#[derive(Debug, Default)]
pub struct CacheCounters {
    find_calls: AtomicU64,
    find_hits: AtomicU64,
    find_misses: AtomicU64,
    adds: AtomicU64,
    alloc_failures: AtomicU64,
    deletes: AtomicU64,
    delete_misses: AtomicU64,
    evictions: AtomicU64,
    retired: AtomicU64,
    reclaimed: AtomicU64,
    objects_freed: AtomicU64,
}

impl CacheCounters {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn record_find_hit(&self) {
        self.find_calls.fetch_add(1, Ordering::Relaxed);
        self.find_hits.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_find_miss(&self) {
        self.find_calls.fetch_add(1, Ordering::Relaxed);
        self.find_misses.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_add(&self) {
        self.adds.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_alloc_failure(&self) {
        self.alloc_failures.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_delete(&self) {
        self.deletes.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_delete_miss(&self) {
        self.delete_misses.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_eviction(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_retired(&self) {
        self.retired.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_reclaimed(&self) {
        self.reclaimed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_object_freed(&self) {
        self.objects_freed.fetch_add(1, Ordering::Relaxed);
    }

    /// Captures the counters together with the caller-supplied gauges.
    pub fn snapshot(&self, len: usize, capacity: usize, pending_reclaim: usize) -> CacheMetricsSnapshot {
        CacheMetricsSnapshot {
            find_calls: self.find_calls.load(Ordering::Relaxed),
            find_hits: self.find_hits.load(Ordering::Relaxed),
            find_misses: self.find_misses.load(Ordering::Relaxed),
            adds: self.adds.load(Ordering::Relaxed),
            alloc_failures: self.alloc_failures.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            delete_misses: self.delete_misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            retired: self.retired.load(Ordering::Relaxed),
            reclaimed: self.reclaimed.load(Ordering::Relaxed),
            objects_freed: self.objects_freed.load(Ordering::Relaxed),
            len,
            capacity,
            pending_reclaim,
        }
    }
}
