//! Reference-counted cache objects and the handles that own them.
//!
//! ## Architecture
//!
//! ```text
//!   ObjectRef (cache's own)  ─┐
//!   ObjectRef (find #1)      ─┼──► ┌──────────────────────────────┐
//!   ObjectRef (find #2)      ─┘    │ Object (one heap allocation) │
//!                                  │   id          immutable      │
//!                                  │   sequence    immutable      │
//!                                  │   name        RwLock<Name>   │
//!                                  │   popularity  AtomicU64      │
//!                                  │   refs        RefCount = 3   │
//!                                  └──────────────────────────────┘
//! ```
//!
//! Every [`ObjectRef`] carries exactly one reference. Cloning acquires,
//! dropping (or [`ObjectRef::release`]) releases, and the release that brings
//! the count to zero frees the object. The cache holds one reference for as
//! long as the object is a member; each successful `find` hands the caller
//! another.
//!
//! ## Locking tiers
//!
//! - Membership changes go through the cache's exclusive section.
//! - `refs` and `popularity` are atomics, touched by readers without a lock.
//! - `name` has its own per-object lock so payload updates never contend with
//!   structural changes.
//!
//! ## Allocation
//!
//! Objects are allocated through the global allocator directly so that
//! exhaustion surfaces as [`CacheError::AllocationFailed`] instead of an abort.

use std::alloc::{self, Layout};
use std::fmt;
use std::marker::PhantomData;
use std::ops::Deref;
use std::ptr::{self, NonNull};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use arrayvec::ArrayString;
use parking_lot::RwLock;

use crate::ds::refcount::RefCount;
use crate::error::CacheError;
use crate::metrics::counters::CacheCounters;

/// Integer key identifying a cached object.
pub type ObjectId = u64;

/// Maximum payload length in bytes.
pub const NAME_CAPACITY: usize = 31;

/// Fixed-capacity object payload.
pub type Name = ArrayString<NAME_CAPACITY>;

/// Copies `name` into a [`Name`], silently truncating at [`NAME_CAPACITY`]
/// bytes without splitting a UTF-8 character.
///
/// # Example
///
/// ```
/// use refcache::store::object::{NAME_CAPACITY, truncate_name};
///
/// assert_eq!(truncate_name("widget").as_str(), "widget");
/// let long = "x".repeat(40);
/// assert_eq!(truncate_name(&long).len(), NAME_CAPACITY);
/// ```
pub fn truncate_name(name: &str) -> Name {
    let mut end = name.len().min(NAME_CAPACITY);
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    let mut out = Name::new();
    out.push_str(&name[..end]);
    out
}

/// A cache entry.
///
/// Only reachable through an [`ObjectRef`]; the memory stays valid for as long
/// as any handle exists.
pub struct Object {
    id: ObjectId,
    sequence: u64,
    name: RwLock<Name>,
    popularity: AtomicU64,
    refs: RefCount,
    counters: Arc<CacheCounters>,
}

impl Object {
    /// The object's key.
    #[inline]
    pub fn id(&self) -> ObjectId {
        self.id
    }

    /// Copy of the current payload.
    pub fn name(&self) -> Name {
        *self.name.read()
    }

    /// Runs `f` against the payload while holding the object's read lock.
    pub fn with_name<R>(&self, f: impl FnOnce(&str) -> R) -> R {
        f(self.name.read().as_str())
    }

    /// Replaces the payload, truncating like `add` does.
    pub fn set_name(&self, name: &str) {
        *self.name.write() = truncate_name(name);
    }

    /// Number of successful lookups that matched this object.
    #[inline]
    pub fn popularity(&self) -> u64 {
        self.popularity.load(Ordering::Relaxed)
    }

    /// Records a lookup hit. Best-effort under concurrent removal.
    #[inline]
    pub(crate) fn touch(&self) {
        self.popularity.fetch_add(1, Ordering::Relaxed);
    }

    /// Insertion order within the owning cache; lower is older.
    #[inline]
    pub(crate) fn sequence(&self) -> u64 {
        self.sequence
    }

    #[inline]
    pub(crate) fn ref_count(&self) -> usize {
        self.refs.get()
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Object")
            .field("id", &self.id)
            .field("name", &self.name())
            .field("popularity", &self.popularity())
            .field("refs", &self.refs.get())
            .finish()
    }
}

impl Drop for Object {
    fn drop(&mut self) {
        self.counters.record_object_freed();
    }
}

/// An owned reference to an [`Object`].
///
/// `Clone` acquires a new reference; dropping releases one.
pub struct ObjectRef {
    ptr: NonNull<Object>,
    _marker: PhantomData<Object>,
}

// SAFETY: Object is Send + Sync (atomics, a parking_lot lock, and an Arc), and
// the reference count that governs the allocation is atomic.
unsafe impl Send for ObjectRef {}
unsafe impl Sync for ObjectRef {}

impl ObjectRef {
    /// Allocates a new object holding a single reference.
    pub(crate) fn try_new(
        id: ObjectId,
        name: &str,
        counters: Arc<CacheCounters>,
    ) -> Result<Self, CacheError> {
        let layout = Layout::new::<Object>();
        let raw = allocate(layout).cast::<Object>();
        let ptr = NonNull::new(raw).ok_or(CacheError::AllocationFailed {
            bytes: layout.size(),
        })?;

        // SAFETY: `ptr` is a fresh, properly aligned allocation for one Object.
        unsafe {
            ptr.as_ptr().write(Object {
                id,
                sequence: 0,
                name: RwLock::new(truncate_name(name)),
                popularity: AtomicU64::new(0),
                refs: RefCount::new(),
                counters,
            });
        }
        Ok(Self {
            ptr,
            _marker: PhantomData,
        })
    }

    /// Stamps the insertion sequence before the object is published.
    pub(crate) fn set_sequence(&mut self, sequence: u64) {
        debug_assert_eq!(self.refs.get(), 1, "sequence set on a shared object");
        // SAFETY: `&mut self` on the only reference means nothing else can
        // observe the object.
        unsafe { (*self.ptr.as_ptr()).sequence = sequence };
    }

    /// Takes another reference on the same object.
    #[inline]
    pub fn acquire(&self) -> Self {
        self.refs.acquire();
        Self {
            ptr: self.ptr,
            _marker: PhantomData,
        }
    }

    /// Gives up this reference, freeing the object if it was the last one.
    #[inline]
    pub fn release(self) {
        drop(self);
    }

    /// Current reference count, for diagnostics.
    #[inline]
    pub fn ref_count(this: &Self) -> usize {
        this.refs.get()
    }

    /// Returns `true` if both handles refer to the same object.
    #[inline]
    pub fn ptr_eq(this: &Self, other: &Self) -> bool {
        this.ptr == other.ptr
    }

    /// Turns the handle into a raw pointer without releasing its reference.
    #[inline]
    pub(crate) fn into_raw(self) -> *mut Object {
        let raw = self.ptr.as_ptr();
        std::mem::forget(self);
        raw
    }

    /// Rebuilds a handle from [`into_raw`](Self::into_raw), taking over the
    /// reference it carried.
    ///
    /// # Safety
    ///
    /// `raw` must come from `into_raw` and must not be reconstructed twice.
    #[inline]
    pub(crate) unsafe fn from_raw(raw: *mut Object) -> Self {
        Self {
            // SAFETY: into_raw never yields null.
            ptr: unsafe { NonNull::new_unchecked(raw) },
            _marker: PhantomData,
        }
    }

    /// Creates a new handle for an object reached by reference.
    ///
    /// # Safety
    ///
    /// `object` must live in an allocation made by [`try_new`](Self::try_new)
    /// whose count cannot reach zero during this call (e.g. the caller is in a
    /// read-side section and the cache's reference has not been released).
    #[inline]
    pub(crate) unsafe fn acquire_from(object: &Object) -> Self {
        object.refs.acquire();
        Self {
            ptr: NonNull::from(object),
            _marker: PhantomData,
        }
    }
}

impl Deref for ObjectRef {
    type Target = Object;

    #[inline]
    fn deref(&self) -> &Object {
        // SAFETY: this handle's reference keeps the allocation alive.
        unsafe { self.ptr.as_ref() }
    }
}

impl Clone for ObjectRef {
    #[inline]
    fn clone(&self) -> Self {
        self.acquire()
    }
}

impl Drop for ObjectRef {
    fn drop(&mut self) {
        if !self.refs.release() {
            return;
        }
        // SAFETY: the count reached zero, so no other handle exists and the
        // allocation came from `try_new` with the same layout.
        unsafe {
            ptr::drop_in_place(self.ptr.as_ptr());
            alloc::dealloc(self.ptr.as_ptr().cast(), Layout::new::<Object>());
        }
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&**self, f)
    }
}

#[cfg(not(test))]
#[inline]
fn allocate(layout: Layout) -> *mut u8 {
    // SAFETY: Object is not zero-sized.
    unsafe { alloc::alloc(layout) }
}

#[cfg(test)]
thread_local! {
    static FAIL_NEXT_ALLOCATION: std::cell::Cell<bool> = const { std::cell::Cell::new(false) };
}

/// Makes the next object allocation on this thread report exhaustion.
#[cfg(test)]
pub(crate) fn fail_next_allocation() {
    FAIL_NEXT_ALLOCATION.with(|flag| flag.set(true));
}

#[cfg(test)]
fn allocate(layout: Layout) -> *mut u8 {
    if FAIL_NEXT_ALLOCATION.with(|flag| flag.replace(false)) {
        return ptr::null_mut();
    }
    // SAFETY: Object is not zero-sized.
    unsafe { alloc::alloc(layout) }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    fn object(id: ObjectId, name: &str) -> (ObjectRef, Arc<CacheCounters>) {
        let counters = Arc::new(CacheCounters::new());
        let object = ObjectRef::try_new(id, name, Arc::clone(&counters)).unwrap();
        (object, counters)
    }

    fn freed(counters: &CacheCounters) -> u64 {
        counters.snapshot(0, 0, 0).objects_freed
    }

    #[test]
    fn new_object_has_single_reference() {
        let (object, counters) = object(7, "seven");
        assert_eq!(object.id(), 7);
        assert_eq!(object.name().as_str(), "seven");
        assert_eq!(object.popularity(), 0);
        assert_eq!(ObjectRef::ref_count(&object), 1);
        drop(object);
        assert_eq!(freed(&counters), 1);
    }

    #[test]
    fn freed_only_after_last_handle() {
        let (object, counters) = object(1, "a");
        let second = object.acquire();
        let third = second.clone();
        assert_eq!(ObjectRef::ref_count(&object), 3);
        assert!(ObjectRef::ptr_eq(&object, &third));

        object.release();
        second.release();
        assert_eq!(freed(&counters), 0);
        assert_eq!(third.name().as_str(), "a");
        third.release();
        assert_eq!(freed(&counters), 1);
    }

    #[test]
    fn names_are_truncated_on_char_boundaries() {
        let exact = "a".repeat(NAME_CAPACITY);
        assert_eq!(truncate_name(&exact).as_str(), exact);

        let long = "b".repeat(NAME_CAPACITY + 10);
        assert_eq!(truncate_name(&long).len(), NAME_CAPACITY);

        // 'é' is two bytes; 16 of them straddle the 31-byte limit.
        let accented = "é".repeat(16);
        let truncated = truncate_name(&accented);
        assert_eq!(truncated.len(), 30);
        assert_eq!(truncated.chars().count(), 15);
    }

    #[test]
    fn set_name_is_visible_through_every_handle() {
        let (object, _) = object(3, "before");
        let other = object.clone();
        other.set_name("after");
        assert_eq!(object.with_name(|name| name.to_owned()), "after");
    }

    #[test]
    fn touch_increments_popularity() {
        let (object, _) = object(4, "x");
        object.touch();
        object.touch();
        assert_eq!(object.popularity(), 2);
    }

    #[test]
    fn allocation_failure_is_reported() {
        let counters = Arc::new(CacheCounters::new());
        fail_next_allocation();
        let result = ObjectRef::try_new(1, "x", Arc::clone(&counters));
        assert!(matches!(result, Err(CacheError::AllocationFailed { .. })));
        assert_eq!(freed(&counters), 0);
        // Only the next allocation fails.
        assert!(ObjectRef::try_new(1, "x", counters).is_ok());
    }

    #[test]
    fn handles_cross_threads() {
        let (object, counters) = object(9, "shared");
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let handle = object.clone();
                thread::spawn(move || {
                    for _ in 0..1_000 {
                        let extra = handle.acquire();
                        assert_eq!(extra.id(), 9);
                    }
                    handle.name()
                })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap().as_str(), "shared");
        }
        assert_eq!(ObjectRef::ref_count(&object), 1);
        drop(object);
        assert_eq!(freed(&counters), 1);
    }
}
