use std::io::Write;

use parking_lot::Mutex;

use crate::metrics::snapshot::CacheMetricsSnapshot;
use crate::metrics::traits::MetricsExporter;

/// Prometheus text exporter for cache metrics snapshots.
///
/// Writes the Prometheus text exposition format so the output can be served
/// from a scrape endpoint or forwarded to a collector. Write errors are
/// dropped: metrics export never fails a cache operation.
///
/// # Example
///
/// ```
/// use refcache::Cache;
/// use refcache::metrics::exporter::PrometheusTextExporter;
/// use refcache::metrics::traits::MetricsExporter;
///
/// let cache = Cache::new(4);
/// cache.add(1, "one").unwrap();
///
/// let exporter = PrometheusTextExporter::new("objcache", Vec::new());
/// exporter.export(&cache.metrics());
/// let text = String::from_utf8(exporter.into_inner()).unwrap();
/// assert!(text.contains("objcache_adds_total 1"));
/// ```
#[derive(Debug)]
pub struct PrometheusTextExporter<W: Write + Send> {
    prefix: String,
    writer: Mutex<W>,
}

impl<W: Write + Send> PrometheusTextExporter<W> {
    pub fn new(prefix: impl Into<String>, writer: W) -> Self {
        Self {
            prefix: prefix.into(),
            writer: Mutex::new(writer),
        }
    }

    /// Returns the underlying writer.
    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }

    fn write_sample(&self, kind: &str, suffix: &str, value: u64) {
        let name = self.metric_name(suffix);
        let mut writer = self.writer.lock();
        let _ = writeln!(writer, "# TYPE {} {}", name, kind);
        let _ = writeln!(writer, "{} {}", name, value);
    }

    fn metric_name(&self, suffix: &str) -> String {
        if self.prefix.is_empty() {
            suffix.to_string()
        } else {
            format!("{}_{}", self.prefix, suffix)
        }
    }
}

impl<W: Write + Send> MetricsExporter<CacheMetricsSnapshot> for PrometheusTextExporter<W> {
    fn export(&self, snapshot: &CacheMetricsSnapshot) {
        let counters = [
            ("find_calls_total", snapshot.find_calls),
            ("find_hits_total", snapshot.find_hits),
            ("find_misses_total", snapshot.find_misses),
            ("adds_total", snapshot.adds),
            ("alloc_failures_total", snapshot.alloc_failures),
            ("deletes_total", snapshot.deletes),
            ("delete_misses_total", snapshot.delete_misses),
            ("evictions_total", snapshot.evictions),
            ("retired_total", snapshot.retired),
            ("reclaimed_total", snapshot.reclaimed),
            ("objects_freed_total", snapshot.objects_freed),
        ];
        for (suffix, value) in counters {
            self.write_sample("counter", suffix, value);
        }

        self.write_sample("gauge", "len", snapshot.len as u64);
        self.write_sample("gauge", "capacity", snapshot.capacity as u64);
        self.write_sample("gauge", "pending_reclaim", snapshot.pending_reclaim as u64);
    }
}
