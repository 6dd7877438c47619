//! refcache: a fixed-capacity concurrent object cache with reference-counted
//! entries, popularity-based eviction and lock-free lookups backed by
//! epoch-based deferred reclamation.
//!
//! Start with [`Cache`] or [`CacheBuilder`].

pub mod builder;
pub mod cache;
pub mod ds;
pub mod error;
pub mod metrics;
pub mod policy;
pub mod prelude;
pub mod store;

pub use builder::{CacheBuilder, ReadStrategy};
pub use cache::{Cache, DEFAULT_CAPACITY};
pub use error::{CacheError, ConfigError, InvariantError};
pub use store::object::{NAME_CAPACITY, Object, ObjectId, ObjectRef};
