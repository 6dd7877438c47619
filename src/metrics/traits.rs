//! Consumption side of the metrics hierarchy.
//!
//! Recording is done directly on [`CacheCounters`](super::counters::CacheCounters);
//! these traits only cover reading snapshots back out and publishing them.

/// Anything that can produce a metrics snapshot.
pub trait MetricsSnapshotProvider<S> {
    fn snapshot(&self) -> S;
}

/// Publishes snapshots to an external monitoring system.
pub trait MetricsExporter<S> {
    fn export(&self, snapshot: &S);
}
