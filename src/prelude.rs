pub use crate::builder::{CacheBuilder, ReadStrategy};
pub use crate::cache::{Cache, DEFAULT_CAPACITY};
pub use crate::ds::{ReclaimEngine, RefCount};
pub use crate::error::{CacheError, ConfigError, InvariantError};
#[cfg(feature = "metrics")]
pub use crate::metrics::exporter::PrometheusTextExporter;
pub use crate::metrics::snapshot::CacheMetricsSnapshot;
pub use crate::metrics::traits::{MetricsExporter, MetricsSnapshotProvider};
pub use crate::store::object::{NAME_CAPACITY, Name, Object, ObjectId, ObjectRef};
