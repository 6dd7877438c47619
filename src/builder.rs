//! Construction-time configuration for [`Cache`].
//!
//! Capacity and read strategy are fixed for the lifetime of a cache; there is
//! nothing to reconfigure afterwards.
//!
//! ## Example
//!
//! ```rust
//! use refcache::builder::{CacheBuilder, ReadStrategy};
//!
//! let cache = CacheBuilder::new(100).strategy(ReadStrategy::Locked).build();
//! cache.add(1, "hello").unwrap();
//! assert_eq!(cache.find(1).unwrap().name().as_str(), "hello");
//! ```

use crate::cache::Cache;
use crate::error::ConfigError;

/// How `find` reaches cache members.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReadStrategy {
    /// `find` enters the cache's exclusive section. Removed members are
    /// released immediately.
    Locked,
    /// `find` walks the members without locking. Removed members are released
    /// once every reader that could still see them has finished.
    #[default]
    LockFree,
}

/// Builder for creating cache instances.
#[derive(Debug, Clone)]
pub struct CacheBuilder {
    capacity: usize,
    strategy: ReadStrategy,
}

impl CacheBuilder {
    /// Create a new cache builder with the specified capacity.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            strategy: ReadStrategy::default(),
        }
    }

    /// Selects the read strategy. Defaults to [`ReadStrategy::LockFree`].
    pub fn strategy(mut self, strategy: ReadStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Builds the cache, rejecting a zero capacity.
    ///
    /// # Example
    ///
    /// ```rust
    /// use refcache::builder::CacheBuilder;
    ///
    /// assert!(CacheBuilder::new(0).try_build().is_err());
    /// assert_eq!(CacheBuilder::new(3).try_build().unwrap().capacity(), 3);
    /// ```
    pub fn try_build(self) -> Result<Cache, ConfigError> {
        if self.capacity == 0 {
            return Err(ConfigError::new("cache capacity must be greater than zero"));
        }
        Ok(Cache::with_config(self.capacity, self.strategy))
    }

    /// Builds the cache.
    ///
    /// # Panics
    ///
    /// Panics if the capacity is zero.
    pub fn build(self) -> Cache {
        match self.try_build() {
            Ok(cache) => cache,
            Err(err) => panic!("{}", err),
        }
    }
}
