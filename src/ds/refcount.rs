//! Atomic reference counter with a decrement-to-zero protocol.
//!
//! Every cached object embeds one [`RefCount`]. The count starts at `1` (the
//! creator's reference), [`acquire`](RefCount::acquire) adds a reference and
//! [`release`](RefCount::release) drops one, reporting whether the caller just
//! released the last reference and must therefore deallocate.
//!
//! ```text
//!   new() ──► 1 ──acquire()──► 2 ──release()──► 1 ──release()──► 0 ⇒ caller frees
//! ```
//!
//! ## Ordering
//!
//! - `acquire` is `Relaxed`: a new reference can only be created from an
//!   existing one, so the object is already visible to the acquiring thread.
//! - `release` is `Release`, followed by an `Acquire` fence on the final
//!   decrement, so every write made through any reference happens-before the
//!   deallocation.
//!
//! ## Contract
//!
//! Releasing more references than were acquired is a caller bug. Debug builds
//! catch it with an assertion the moment a release observes a zero count;
//! release builds do not check.

use std::sync::atomic::{AtomicUsize, Ordering, fence};

/// Upper bound before the count is considered to have overflowed.
///
/// Leaking handles in a loop could otherwise wrap the counter and free a live
/// object, so crossing this bound aborts the process.
const MAX_REFCOUNT: usize = isize::MAX as usize;

/// Atomic reference count embedded in each cache object.
#[derive(Debug)]
pub struct RefCount {
    count: AtomicUsize,
}

impl RefCount {
    /// Creates a counter holding its creator's single reference.
    ///
    /// # Example
    ///
    /// ```
    /// use refcache::ds::RefCount;
    ///
    /// let refs = RefCount::new();
    /// assert_eq!(refs.get(), 1);
    /// ```
    #[inline]
    pub const fn new() -> Self {
        Self {
            count: AtomicUsize::new(1),
        }
    }

    /// Adds one reference.
    ///
    /// The caller must already hold a reference (or otherwise guarantee the
    /// count cannot concurrently reach zero).
    #[inline]
    pub fn acquire(&self) {
        let previous = self.count.fetch_add(1, Ordering::Relaxed);
        debug_assert!(previous != 0, "acquire on an object with no references");
        if previous > MAX_REFCOUNT {
            std::process::abort();
        }
    }

    /// Drops one reference.
    ///
    /// Returns `true` when this call released the last reference; the caller is
    /// then responsible for deallocating the owner.
    ///
    /// # Example
    ///
    /// ```
    /// use refcache::ds::RefCount;
    ///
    /// let refs = RefCount::new();
    /// refs.acquire();
    /// assert!(!refs.release());
    /// assert!(refs.release());
    /// ```
    #[inline]
    #[must_use = "a `true` result means the owner must be freed"]
    pub fn release(&self) -> bool {
        let previous = self.count.fetch_sub(1, Ordering::Release);
        debug_assert!(
            previous != 0,
            "unbalanced release: reference count was already zero"
        );
        if previous != 1 {
            return false;
        }
        fence(Ordering::Acquire);
        true
    }

    /// Returns the current count.
    ///
    /// Only meaningful as a diagnostic: other threads may change it at any time.
    #[inline]
    pub fn get(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }
}

impl Default for RefCount {
    fn default() -> Self {
        Self::new()
    }
}
