//! Cache counters, snapshots, and exporters.
//!
//! Recording and consumption are kept apart: [`counters::CacheCounters`] is
//! written on the hot path with relaxed atomics, [`snapshot::CacheMetricsSnapshot`]
//! is the plain-data view handed to callers, and exporters (behind the
//! `metrics` feature) publish snapshots to monitoring systems.

pub mod counters;
#[cfg(feature = "metrics")]
pub mod exporter;
pub mod snapshot;
pub mod traits;
