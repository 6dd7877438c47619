//! Error types for the refcache library.
//!
//! ## Key Components
//!
//! - [`CacheError`]: Returned by cache operations. Covers allocation failure on
//!   `add` and a `delete` of an id that is not cached.
//! - [`ConfigError`]: Returned when construction parameters are invalid
//!   (e.g. zero capacity).
//! - [`InvariantError`]: Returned when internal invariants are violated
//!   (`check_invariants`, a debug/test aid).
//!
//! Eviction and reclamation never fail: they only touch memory the cache
//! already owns.
//!
//! ## Example Usage
//!
//! ```
//! use refcache::error::{CacheError, ConfigError};
//! use refcache::{Cache, CacheBuilder};
//!
//! let bad: Result<Cache, ConfigError> = CacheBuilder::new(0).try_build();
//! assert!(bad.is_err());
//!
//! let cache = Cache::new(4);
//! assert_eq!(cache.delete(9), Err(CacheError::NotFound(9)));
//! ```

use std::fmt;

use crate::store::object::ObjectId;

// ---------------------------------------------------------------------------
// CacheError
// ---------------------------------------------------------------------------

/// Error returned by [`Cache`](crate::Cache) operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheError {
    /// Memory for a new object could not be obtained. Nothing was inserted.
    AllocationFailed {
        /// Size of the allocation that failed.
        bytes: usize,
    },
    /// `delete` was asked to remove an id that is not a member.
    NotFound(ObjectId),
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheError::AllocationFailed { bytes } => {
                write!(f, "failed to allocate {} bytes for a cache object", bytes)
            },
            CacheError::NotFound(id) => write!(f, "object {} is not cached", id),
        }
    }
}

impl std::error::Error for CacheError {}

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// Error returned when cache construction parameters are invalid.
///
/// Produced by [`CacheBuilder::try_build`](crate::CacheBuilder::try_build) and
/// [`Cache::try_new`](crate::Cache::try_new).
///
/// # Example
///
/// ```
/// use refcache::Cache;
///
/// let err = Cache::try_new(0).unwrap_err();
/// assert!(err.to_string().contains("capacity"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError(String);

impl ConfigError {
    /// Creates a new `ConfigError` with the given description.
    #[inline]
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }

    /// Returns the error description.
    #[inline]
    pub fn message(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for ConfigError {}

// ---------------------------------------------------------------------------
// InvariantError
// ---------------------------------------------------------------------------

/// Error returned when an internal cache invariant does not hold.
///
/// Produced by [`Cache::check_invariants`](crate::Cache::check_invariants).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvariantError(String);

impl InvariantError {
    #[inline]
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }

    #[inline]
    pub fn message(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InvariantError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for InvariantError {}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
