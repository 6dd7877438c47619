/// Point-in-time view of a cache's counters and gauges.
///
/// Counters are monotonic over the cache's lifetime; gauges are sampled when
/// the snapshot is taken. Under concurrent use the fields are individually
/// accurate but not mutually consistent.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheMetricsSnapshot {
    pub find_calls: u64,
    pub find_hits: u64,
    pub find_misses: u64,

    pub adds: u64,
    pub alloc_failures: u64,

    pub deletes: u64,
    pub delete_misses: u64,
    pub evictions: u64,

    // deferred releases handed to / run by the reclaim engine
    pub retired: u64,
    pub reclaimed: u64,
    // objects whose memory was actually freed
    pub objects_freed: u64,

    // gauges captured at snapshot time
    pub len: usize,
    pub capacity: usize,
    pub pending_reclaim: usize,
}

impl CacheMetricsSnapshot {
    /// Fraction of `find` calls that hit, or `0.0` before the first call.
    pub fn hit_ratio(&self) -> f64 {
        if self.find_calls == 0 {
            0.0
        } else {
            self.find_hits as f64 / self.find_calls as f64
        }
    }

    /// Objects allocated by `add` that have not been freed yet.
    ///
    /// Includes members, objects pinned by outstanding handles, and objects
    /// waiting for their grace period.
    pub fn objects_live(&self) -> u64 {
        self.adds.saturating_sub(self.objects_freed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hit_ratio_handles_zero_calls() {
        assert_eq!(CacheMetricsSnapshot::default().hit_ratio(), 0.0);
        let snapshot = CacheMetricsSnapshot {
            find_calls: 4,
            find_hits: 3,
            find_misses: 1,
            ..Default::default()
        };
        assert!((snapshot.hit_ratio() - 0.75).abs() < f64::EPSILON);
    }

    #[test]
    fn live_objects_is_adds_minus_frees() {
        let snapshot = CacheMetricsSnapshot {
            adds: 12,
            objects_freed: 5,
            ..Default::default()
        };
        assert_eq!(snapshot.objects_live(), 7);
    }
}
