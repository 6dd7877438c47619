//! Fixed-capacity object cache with reference-counted entries.
//!
//! ## Architecture
//!
//! ```text
//!   ┌──────────────── Cache ────────────────────────────────────────────┐
//!   │                                                                   │
//!   │  members: Mutex<Members>            exclusive section             │
//!   │    index: FxHashMap<ObjectId, [SlotId]>   (oldest duplicate first) │
//!   │    free:  FreeSlots                                               │
//!   │    next_sequence                                                  │
//!   │                                                                   │
//!   │  slots: SlotTable<Object>           capacity + 1 atomic pointers  │
//!   │    [0] ──► Object(id 4)   [1] null   [2] ──► Object(id 9)   ...    │
//!   │                                                                   │
//!   │  reclaim: ReclaimEngine             deferred cache releases       │
//!   └───────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Each slot holds the cache's own reference to its object. `add`, `delete`
//! and eviction mutate membership inside the exclusive section. How `find`
//! reaches a member, and when a removed member's cache reference is released,
//! depends on the [`ReadStrategy`]:
//!
//! | Strategy   | `find`                              | Removal releases the cache reference |
//! |------------|-------------------------------------|--------------------------------------|
//! | `Locked`   | index lookup in the exclusive section | immediately                        |
//! | `LockFree` | pinned scan of the slot table       | after a grace period                 |
//!
//! Either way a handle returned by `find` keeps its object alive until the
//! caller drops it, even after the object leaves the cache.
//!
//! ## Ordering
//!
//! Members are ordered by insertion. Eviction removes the least popular member
//! and breaks ties in favour of the oldest; `find` and `delete` on a duplicated
//! id both resolve to its oldest member.
//!
//! ## Example
//!
//! ```
//! use refcache::Cache;
//!
//! let cache = Cache::new(2);
//! cache.add(1, "one").unwrap();
//! cache.add(2, "two").unwrap();
//!
//! let two = cache.find(2).unwrap();
//! cache.add(3, "three").unwrap(); // evicts id 1, the least popular
//!
//! assert!(!cache.contains(1));
//! cache.delete(2).unwrap();
//! assert_eq!(two.name().as_str(), "two"); // still valid after removal
//! ```

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tracing::{debug, trace, warn};

use crate::builder::{CacheBuilder, ReadStrategy};
use crate::ds::reclaim::{Guard, ReclaimEngine};
use crate::ds::slot_table::{FreeSlots, SlotId, SlotTable};
use crate::error::{CacheError, ConfigError, InvariantError};
use crate::metrics::counters::CacheCounters;
use crate::metrics::snapshot::CacheMetricsSnapshot;
use crate::metrics::traits::MetricsSnapshotProvider;
use crate::policy::popularity::{Candidate, LeastPopular, VictimSelector};
use crate::store::object::{Object, ObjectId, ObjectRef};

/// Capacity used by [`Cache::default`].
pub const DEFAULT_CAPACITY: usize = 10;

/// State guarded by the exclusive section.
struct Members {
    index: FxHashMap<ObjectId, Vec<SlotId>>,
    free: FreeSlots,
    next_sequence: u64,
}

impl Members {
    fn oldest(&self, id: ObjectId) -> Option<SlotId> {
        self.index.get(&id).and_then(|slots| slots.first().copied())
    }
}

/// Concurrent fixed-capacity cache of named objects.
///
/// All operations take `&self`; share the cache between threads with an
/// `Arc` or scoped threads.
pub struct Cache {
    members: Mutex<Members>,
    slots: SlotTable<Object>,
    len: AtomicUsize,
    reclaim: ReclaimEngine,
    counters: Arc<CacheCounters>,
    selector: LeastPopular,
    capacity: usize,
    strategy: ReadStrategy,
}

impl Cache {
    /// Creates a lock-free cache holding at most `capacity` objects.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero. Use [`try_new`](Self::try_new) or
    /// [`CacheBuilder`] to handle that case.
    pub fn new(capacity: usize) -> Self {
        CacheBuilder::new(capacity).build()
    }

    /// Creates a lock-free cache, rejecting a zero capacity.
    pub fn try_new(capacity: usize) -> Result<Self, ConfigError> {
        CacheBuilder::new(capacity).try_build()
    }

    pub(crate) fn with_config(capacity: usize, strategy: ReadStrategy) -> Self {
        debug_assert!(capacity > 0);
        // One spare slot holds the new member while its victim is chosen.
        let slot_count = capacity + 1;
        Self {
            members: Mutex::new(Members {
                index: FxHashMap::default(),
                free: FreeSlots::new(slot_count),
                next_sequence: 0,
            }),
            slots: SlotTable::new(slot_count),
            len: AtomicUsize::new(0),
            reclaim: ReclaimEngine::new(),
            counters: Arc::new(CacheCounters::new()),
            selector: LeastPopular,
            capacity,
            strategy,
        }
    }

    /// Number of members.
    #[inline]
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of members.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn strategy(&self) -> ReadStrategy {
        self.strategy
    }

    /// Inserts a new object with popularity zero.
    ///
    /// `name` is truncated to [`NAME_CAPACITY`](crate::store::object::NAME_CAPACITY)
    /// bytes. Ids are not deduplicated: adding an id twice creates two members.
    /// If the cache was full, the least popular member is evicted.
    ///
    /// # Errors
    ///
    /// [`CacheError::AllocationFailed`] if the object could not be allocated.
    /// The cache is left untouched.
    pub fn add(&self, id: ObjectId, name: &str) -> Result<(), CacheError> {
        let mut object = match ObjectRef::try_new(id, name, Arc::clone(&self.counters)) {
            Ok(object) => object,
            Err(err) => {
                self.counters.record_alloc_failure();
                warn!(id, error = %err, "cache object allocation failed");
                return Err(err);
            },
        };

        let mut members = self.members.lock();
        object.set_sequence(members.next_sequence);
        members.next_sequence += 1;

        let slot = members
            .free
            .allocate()
            .expect("slot table holds capacity + 1 slots and len <= capacity");
        members.index.entry(id).or_default().push(slot);
        self.slots.publish(slot, object.into_raw());
        let len = self.len.fetch_add(1, Ordering::Relaxed) + 1;
        self.counters.record_add();
        debug!(id, slot = slot.index(), len, "object added");

        if len > self.capacity {
            self.evict(&mut members);
        }
        drop(members);

        self.collect();
        Ok(())
    }

    /// Looks up `id`, bumping its popularity and returning a new handle on a
    /// hit.
    ///
    /// With [`ReadStrategy::LockFree`] this never waits for writers. Under
    /// concurrent removal it may return an object that has just left the
    /// cache; the handle is valid regardless.
    pub fn find(&self, id: ObjectId) -> Option<ObjectRef> {
        let found = self.with_member(id, |object| {
            object.touch();
            // SAFETY: `with_member` only lends objects whose cache reference
            // cannot be released while `f` runs.
            unsafe { ObjectRef::acquire_from(object) }
        });
        match &found {
            Some(object) => {
                self.counters.record_find_hit();
                trace!(id, popularity = object.popularity(), "find hit");
            },
            None => {
                self.counters.record_find_miss();
                trace!(id, "find miss");
            },
        }
        found
    }

    /// Removes the oldest member with `id`.
    ///
    /// Outstanding handles stay valid; the object is freed once the last of
    /// them is dropped.
    ///
    /// # Errors
    ///
    /// [`CacheError::NotFound`] if no member has `id`. The cache is unchanged.
    pub fn delete(&self, id: ObjectId) -> Result<(), CacheError> {
        let mut members = self.members.lock();
        let Some(slot) = members.oldest(id) else {
            drop(members);
            self.counters.record_delete_miss();
            debug!(id, "delete of uncached object");
            return Err(CacheError::NotFound(id));
        };
        self.unlink(&mut members, slot);
        drop(members);

        self.counters.record_delete();
        debug!(id, "object deleted");
        self.collect();
        Ok(())
    }

    /// Returns `true` if `id` is a member. Does not affect popularity.
    pub fn contains(&self, id: ObjectId) -> bool {
        self.with_member(id, |_| ()).is_some()
    }

    /// Popularity of the oldest member with `id`, without bumping it.
    pub fn popularity(&self, id: ObjectId) -> Option<u64> {
        self.with_member(id, Object::popularity)
    }

    /// Member ids, oldest insertion first.
    pub fn ids(&self) -> Vec<ObjectId> {
        let _members = self.members.lock();
        let mut entries: Vec<(u64, ObjectId)> = self
            .slots
            .iter()
            .map(|(_, raw)| {
                // SAFETY: members cannot be unlinked while we hold the
                // exclusive section.
                let object = unsafe { &*raw };
                (object.sequence(), object.id())
            })
            .collect();
        entries.sort_unstable();
        entries.into_iter().map(|(_, id)| id).collect()
    }

    /// Removes every member.
    pub fn clear(&self) {
        let mut members = self.members.lock();
        let occupied: Vec<SlotId> = self.slots.iter().map(|(slot, _)| slot).collect();
        let removed = occupied.len();
        for slot in occupied {
            self.unlink(&mut members, slot);
        }
        drop(members);

        debug!(removed, "cache cleared");
        self.collect();
    }

    /// Blocks until every cache reference released by a removal so far has
    /// actually been dropped.
    ///
    /// A no-op with [`ReadStrategy::Locked`]. Must not be called while the
    /// current thread is inside `find` on this cache (e.g. from a callback).
    pub fn synchronize(&self) {
        if self.strategy == ReadStrategy::LockFree {
            self.reclaim.synchronize();
        }
    }

    /// Point-in-time view of the cache counters.
    pub fn metrics(&self) -> CacheMetricsSnapshot {
        self.counters
            .snapshot(self.len(), self.capacity, self.reclaim.pending())
    }

    /// Validates internal invariants. Intended for tests and debugging.
    pub fn check_invariants(&self) -> Result<(), InvariantError> {
        let members = self.members.lock();
        let len = self.len();

        if len > self.capacity {
            return Err(InvariantError::new(format!(
                "len {} exceeds capacity {}",
                len, self.capacity
            )));
        }
        let occupied = self.slots.occupied();
        if occupied != len {
            return Err(InvariantError::new(format!(
                "{} occupied slots but len is {}",
                occupied, len
            )));
        }
        if members.free.len() + len != self.slots.len() {
            return Err(InvariantError::new(format!(
                "{} free slots and {} members do not cover {} slots",
                members.free.len(),
                len,
                self.slots.len()
            )));
        }
        let indexed: usize = members.index.values().map(Vec::len).sum();
        if indexed != len {
            return Err(InvariantError::new(format!(
                "index tracks {} members but len is {}",
                indexed, len
            )));
        }

        for (&id, slots) in &members.index {
            if slots.is_empty() {
                return Err(InvariantError::new(format!("id {} has an empty index entry", id)));
            }
            let mut previous: Option<u64> = None;
            for &slot in slots {
                let raw = self.slots.load(slot);
                if raw.is_null() {
                    return Err(InvariantError::new(format!(
                        "id {} indexed at empty slot {}",
                        id,
                        slot.index()
                    )));
                }
                // SAFETY: occupied slots hold live members while the exclusive
                // section is held.
                let object = unsafe { &*raw };
                if object.id() != id {
                    return Err(InvariantError::new(format!(
                        "slot {} indexed under id {} holds id {}",
                        slot.index(),
                        id,
                        object.id()
                    )));
                }
                if object.ref_count() == 0 {
                    return Err(InvariantError::new(format!(
                        "member {} in slot {} has no references",
                        id,
                        slot.index()
                    )));
                }
                if previous.is_some_and(|seq| seq >= object.sequence()) {
                    return Err(InvariantError::new(format!(
                        "duplicates of id {} are not ordered oldest first",
                        id
                    )));
                }
                previous = Some(object.sequence());
            }
        }
        Ok(())
    }

    /// Lends the oldest member with `id` to `f` for the duration of the call.
    fn with_member<R>(&self, id: ObjectId, f: impl FnOnce(&Object) -> R) -> Option<R> {
        match self.strategy {
            ReadStrategy::Locked => {
                let members = self.members.lock();
                let slot = members.oldest(id)?;
                // SAFETY: the slot stays occupied while the exclusive section
                // is held, and its cache reference keeps the object alive.
                let object = unsafe { &*self.slots.load(slot) };
                Some(f(object))
            },
            ReadStrategy::LockFree => {
                let guard = self.reclaim.pin();
                self.scan(id, &guard).map(f)
            },
        }
    }

    /// Finds the oldest member with `id` without locking.
    ///
    /// Each slot is read once, so the result reflects some interleaving with
    /// concurrent writers rather than a single snapshot.
    fn scan<'g>(&self, id: ObjectId, _guard: &'g Guard<'_>) -> Option<&'g Object> {
        let mut oldest: Option<&'g Object> = None;
        for (_, raw) in self.slots.iter() {
            // SAFETY: a pointer read from the table while pinned stays valid
            // until the guard drops. Removal retires the cache reference, and
            // the retired release cannot run before every reader pinned at
            // that point has unpinned.
            let object: &'g Object = unsafe { &*raw };
            if object.id() == id && oldest.is_none_or(|best| object.sequence() < best.sequence())
            {
                oldest = Some(object);
            }
        }
        oldest
    }

    fn evict(&self, members: &mut Members) {
        let candidates = self.slots.iter().map(|(slot, raw)| {
            // SAFETY: the caller holds the exclusive section.
            let object = unsafe { &*raw };
            Candidate {
                slot,
                popularity: object.popularity(),
                sequence: object.sequence(),
            }
        });
        let Some(victim) = self.selector.select(candidates) else {
            return;
        };
        let id = self.unlink(members, victim.slot);
        self.counters.record_eviction();
        debug!(id, popularity = victim.popularity, "evicted least popular object");
    }

    /// Removes the member in `slot` and hands its cache reference to the
    /// release path. Caller holds the exclusive section.
    fn unlink(&self, members: &mut Members, slot: SlotId) -> ObjectId {
        let raw = self.slots.take(slot);
        debug_assert!(!raw.is_null(), "unlinked empty slot {}", slot.index());
        // SAFETY: the slot owned the reference published by `add`; taking it
        // out of the table transfers that reference to us.
        let object = unsafe { ObjectRef::from_raw(raw) };
        let id = object.id();

        if let Some(slots) = members.index.get_mut(&id) {
            slots.retain(|&candidate| candidate != slot);
            if slots.is_empty() {
                members.index.remove(&id);
            }
        }
        members.free.release(slot);
        self.len.fetch_sub(1, Ordering::Relaxed);

        match self.strategy {
            ReadStrategy::Locked => object.release(),
            ReadStrategy::LockFree => {
                self.counters.record_retired();
                let counters = Arc::clone(&self.counters);
                self.reclaim.retire(move || {
                    counters.record_reclaimed();
                    object.release();
                });
            },
        }
        id
    }

    fn collect(&self) {
        if self.strategy == ReadStrategy::LockFree {
            self.reclaim.collect();
        }
    }
}

impl Default for Cache {
    fn default() -> Self {
        Self::with_config(DEFAULT_CAPACITY, ReadStrategy::default())
    }
}

impl Drop for Cache {
    fn drop(&mut self) {
        // `&mut self` rules out readers; the engine's own drop then runs
        // whatever is still retired.
        for idx in 0..self.slots.len() {
            let raw = self.slots.take(SlotId(idx));
            if !raw.is_null() {
                // SAFETY: the slot held the cache's reference.
                unsafe { ObjectRef::from_raw(raw) }.release();
            }
        }
    }
}

impl fmt::Debug for Cache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cache")
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .field("strategy", &self.strategy)
            .field("reclaim", &self.reclaim)
            .finish()
    }
}

impl MetricsSnapshotProvider<CacheMetricsSnapshot> for Cache {
    fn snapshot(&self) -> CacheMetricsSnapshot {
        self.metrics()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Barrier;
    use std::sync::mpsc::{self, RecvTimeoutError};
    use std::thread;
    use std::time::Duration;

    use super::*;
    use crate::store::object::fail_next_allocation;

    const STRATEGIES: [ReadStrategy; 2] = [ReadStrategy::Locked, ReadStrategy::LockFree];

    fn cache(capacity: usize, strategy: ReadStrategy) -> Cache {
        CacheBuilder::new(capacity).strategy(strategy).build()
    }

    // ==============================================
    // Basic operations
    // ==============================================

    #[test]
    fn add_then_find_returns_payload() {
        for strategy in STRATEGIES {
            let cache = cache(4, strategy);
            cache.add(7, "seven").unwrap();

            let found = cache.find(7).unwrap();
            assert_eq!(found.id(), 7);
            assert_eq!(found.name().as_str(), "seven");
            assert_eq!(found.popularity(), 1);
            // Cache reference plus ours.
            assert_eq!(ObjectRef::ref_count(&found), 2);
            cache.check_invariants().unwrap();
        }
    }

    #[test]
    fn find_miss_is_not_an_error() {
        for strategy in STRATEGIES {
            let cache = cache(4, strategy);
            assert!(cache.find(1).is_none());
            let metrics = cache.metrics();
            assert_eq!(metrics.find_calls, 1);
            assert_eq!(metrics.find_misses, 1);
        }
    }

    #[test]
    fn long_names_are_truncated() {
        let cache = Cache::new(2);
        let long = "n".repeat(64);
        cache.add(1, &long).unwrap();
        assert_eq!(cache.find(1).unwrap().name().len(), crate::store::NAME_CAPACITY);
    }

    #[test]
    fn each_find_bumps_popularity_once() {
        for strategy in STRATEGIES {
            let cache = cache(4, strategy);
            cache.add(3, "x").unwrap();
            for _ in 0..5 {
                cache.find(3);
            }
            assert_eq!(cache.popularity(3), Some(5));
            // Neither query counts as a lookup.
            assert!(cache.contains(3));
            assert_eq!(cache.popularity(3), Some(5));
            assert_eq!(cache.popularity(4), None);
        }
    }

    #[test]
    fn delete_missing_id_reports_not_found() {
        for strategy in STRATEGIES {
            let cache = cache(4, strategy);
            cache.add(1, "one").unwrap();
            assert_eq!(cache.delete(2), Err(CacheError::NotFound(2)));
            assert_eq!(cache.len(), 1);
            assert_eq!(cache.metrics().delete_misses, 1);
        }
    }

    #[test]
    fn allocation_failure_leaves_cache_untouched() {
        for strategy in STRATEGIES {
            let cache = cache(2, strategy);
            cache.add(1, "one").unwrap();

            fail_next_allocation();
            let err = cache.add(2, "two").unwrap_err();
            assert!(matches!(err, CacheError::AllocationFailed { .. }));

            assert_eq!(cache.ids(), vec![1]);
            let metrics = cache.metrics();
            assert_eq!(metrics.adds, 1);
            assert_eq!(metrics.alloc_failures, 1);
            cache.check_invariants().unwrap();
        }
    }

    // ==============================================
    // Eviction
    // ==============================================

    #[test]
    fn least_popular_member_is_evicted() {
        for strategy in STRATEGIES {
            let cache = cache(10, strategy);
            for id in 1..=10 {
                cache.add(id, "v").unwrap();
            }
            for id in 2..=10 {
                cache.find(id);
            }
            cache.add(11, "v").unwrap();

            assert_eq!(cache.len(), 10);
            assert!(!cache.contains(1));
            for id in 2..=11 {
                assert!(cache.contains(id), "id {} should be cached", id);
            }
            assert_eq!(cache.metrics().evictions, 1);
            cache.check_invariants().unwrap();
        }
    }

    #[test]
    fn eviction_ties_go_to_the_oldest_member() {
        for strategy in STRATEGIES {
            let cache = cache(3, strategy);
            cache.add(1, "a").unwrap();
            cache.add(2, "b").unwrap();
            cache.add(3, "c").unwrap();
            cache.find(1);
            cache.add(4, "d").unwrap();
            assert_eq!(cache.ids(), vec![1, 3, 4]);
        }
    }

    #[test]
    fn traversal_order_survives_slot_reuse() {
        let cache = cache(3, ReadStrategy::LockFree);
        cache.add(1, "a").unwrap();
        cache.add(2, "b").unwrap();
        cache.add(3, "c").unwrap();
        cache.delete(1).unwrap();
        // Id 4 reuses slot 0 but is the newest member.
        cache.add(4, "d").unwrap();
        assert_eq!(cache.ids(), vec![2, 3, 4]);

        cache.find(2);
        cache.find(4);
        cache.add(5, "e").unwrap();
        assert_eq!(cache.ids(), vec![2, 4, 5]);
    }

    #[test]
    fn size_never_exceeds_capacity() {
        for strategy in STRATEGIES {
            let cache = cache(5, strategy);
            for id in 0..50 {
                cache.add(id, "v").unwrap();
                assert!(cache.len() <= 5);
            }
            assert_eq!(cache.metrics().evictions, 45);
            cache.check_invariants().unwrap();
        }
    }

    // ==============================================
    // Duplicates
    // ==============================================

    #[test]
    fn duplicates_resolve_to_the_oldest() {
        for strategy in STRATEGIES {
            let cache = cache(4, strategy);
            cache.add(9, "first").unwrap();
            cache.add(9, "second").unwrap();
            assert_eq!(cache.len(), 2);

            assert_eq!(cache.find(9).unwrap().name().as_str(), "first");
            cache.delete(9).unwrap();
            assert_eq!(cache.find(9).unwrap().name().as_str(), "second");
            cache.delete(9).unwrap();
            assert!(!cache.contains(9));
            cache.check_invariants().unwrap();
        }
    }

    // ==============================================
    // Reference lifetime
    // ==============================================

    #[test]
    fn handle_outlives_delete() {
        for strategy in STRATEGIES {
            let cache = cache(4, strategy);
            cache.add(5, "five").unwrap();
            let handle = cache.find(5).unwrap();

            cache.delete(5).unwrap();
            cache.synchronize();
            assert!(cache.find(5).is_none());
            assert_eq!(handle.name().as_str(), "five");
            assert_eq!(cache.metrics().objects_freed, 0);

            handle.release();
            assert_eq!(cache.metrics().objects_freed, 1);
        }
    }

    #[test]
    fn lock_free_removal_is_deferred_past_readers() {
        let cache = cache(4, ReadStrategy::LockFree);
        cache.add(1, "one").unwrap();

        let guard = cache.reclaim.pin();
        cache.delete(1).unwrap();
        assert_eq!(cache.metrics().retired, 1);
        assert_eq!(cache.metrics().pending_reclaim, 1);
        drop(guard);

        cache.synchronize();
        let metrics = cache.metrics();
        assert_eq!(metrics.pending_reclaim, 0);
        assert_eq!(metrics.reclaimed, 1);
        assert_eq!(metrics.objects_freed, 1);
    }

    #[test]
    fn locked_removal_releases_immediately() {
        let cache = cache(4, ReadStrategy::Locked);
        cache.add(1, "one").unwrap();
        cache.delete(1).unwrap();
        let metrics = cache.metrics();
        assert_eq!(metrics.retired, 0);
        assert_eq!(metrics.objects_freed, 1);
    }

    #[test]
    fn clear_then_drop_frees_everything_once() {
        for strategy in STRATEGIES {
            let cache = cache(8, strategy);
            for id in 0..8 {
                cache.add(id, "v").unwrap();
            }
            let kept = cache.find(3).unwrap();
            cache.clear();
            assert!(cache.is_empty());
            assert!(cache.ids().is_empty());
            cache.check_invariants().unwrap();

            let counters = Arc::clone(&cache.counters);
            drop(cache);
            assert_eq!(counters.snapshot(0, 0, 0).objects_freed, 7);
            assert_eq!(kept.name().as_str(), "v");
            drop(kept);
            assert_eq!(counters.snapshot(0, 0, 0).objects_freed, 8);
        }
    }

    #[test]
    fn dropping_the_cache_releases_members() {
        let cache = Cache::default();
        assert_eq!(cache.capacity(), DEFAULT_CAPACITY);
        cache.add(1, "one").unwrap();
        cache.add(2, "two").unwrap();
        let counters = Arc::clone(&cache.counters);
        drop(cache);
        assert_eq!(counters.snapshot(0, 0, 0).objects_freed, 2);
    }

    // ==============================================
    // Concurrency
    // ==============================================

    #[test]
    fn concurrent_finds_race_a_delete() {
        for strategy in STRATEGIES {
            let owned = cache(10, strategy);
            owned.add(5, "five").unwrap();
            let cache = &owned;
            let barrier = &Barrier::new(3);

            let handles: Vec<Option<ObjectRef>> = thread::scope(|scope| {
                let finders: Vec<_> = (0..2)
                    .map(|_| {
                        scope.spawn(move || {
                            barrier.wait();
                            let found = cache.find(5);
                            if let Some(object) = &found {
                                assert_eq!(object.name().as_str(), "five");
                            }
                            found
                        })
                    })
                    .collect();
                scope.spawn(move || {
                    barrier.wait();
                    cache.delete(5).unwrap();
                });
                finders.into_iter().map(|h| h.join().unwrap()).collect()
            });

            cache.synchronize();
            let live = handles.iter().filter(|h| h.is_some()).count();
            assert_eq!(cache.metrics().objects_freed, u64::from(live == 0));
            drop(handles);
            assert_eq!(cache.metrics().objects_freed, 1);
        }
    }

    #[test]
    fn lock_free_find_does_not_wait_for_writers() {
        let cache = cache(4, ReadStrategy::LockFree);
        cache.add(1, "one").unwrap();
        let (tx, rx) = mpsc::channel();

        thread::scope(|scope| {
            // Stand in for a writer parked inside the exclusive section.
            let members = cache.members.lock();
            let cache = &cache;
            scope.spawn(move || {
                tx.send(cache.find(1).map(|object| object.id())).unwrap();
            });
            let found = rx.recv_timeout(Duration::from_secs(5));
            drop(members);
            assert_eq!(found, Ok(Some(1)));
        });
        assert_eq!(cache.popularity(1), Some(1));
    }

    #[test]
    fn locked_find_waits_for_writers() {
        let cache = cache(4, ReadStrategy::Locked);
        cache.add(1, "one").unwrap();
        let (tx, rx) = mpsc::channel();

        thread::scope(|scope| {
            let members = cache.members.lock();
            let cache = &cache;
            scope.spawn(move || {
                tx.send(cache.find(1).map(|object| object.id())).unwrap();
            });
            let early = rx.recv_timeout(Duration::from_millis(200));
            drop(members);
            assert_eq!(early, Err(RecvTimeoutError::Timeout));
            assert_eq!(rx.recv(), Ok(Some(1)));
        });
    }

    #[test]
    fn debug_output_names_strategy() {
        let cache = cache(2, ReadStrategy::Locked);
        let debug = format!("{:?}", cache);
        assert!(debug.contains("Locked"));
        assert!(debug.contains("capacity: 2"));
    }
}
