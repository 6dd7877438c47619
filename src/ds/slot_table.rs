//! Fixed-size table of atomically published pointers.
//!
//! The cache keeps its members in a [`SlotTable`] sized once at construction
//! and never reallocated, so a reader can walk it without a lock: every slot
//! is an `AtomicPtr` that is either null or points at a live member.
//!
//! ```text
//!   slots (Box<[AtomicPtr<T>]>, never reallocated)
//!   ┌────────┬──────────────┐
//!   │ SlotId │ pointer      │
//!   ├────────┼──────────────┤
//!   │ 0      │ ──► obj(7)   │
//!   │ 1      │ null         │◄── FreeSlots [1, 3]
//!   │ 2      │ ──► obj(3)   │
//!   │ 3      │ null         │
//!   └────────┴──────────────┘
//! ```
//!
//! Writers own slot allocation through [`FreeSlots`], which must only be
//! touched inside the owner's exclusive section. Publication is a single
//! pointer store and removal a single pointer swap, so a concurrent reader
//! sees each slot either before or after a mutation, never in between.
//!
//! The table does not own what its pointers refer to. Whoever publishes a
//! pointer is responsible for reclaiming it after taking it back out.

use std::fmt;
use std::ptr;
use std::sync::atomic::{AtomicPtr, Ordering};

/// Index of a slot in a [`SlotTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotId(pub(crate) usize);

impl SlotId {
    /// Returns the raw slot index.
    pub fn index(self) -> usize {
        self.0
    }
}

/// Fixed array of atomic pointers readable without locking.
pub struct SlotTable<T> {
    slots: Box<[AtomicPtr<T>]>,
}

impl<T> SlotTable<T> {
    /// Creates a table of `len` empty slots.
    pub fn new(len: usize) -> Self {
        Self {
            slots: (0..len).map(|_| AtomicPtr::new(ptr::null_mut())).collect(),
        }
    }

    /// Total number of slots, occupied or not.
    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    /// Makes `value` visible in slot `id`.
    ///
    /// The slot must be empty; writers serialize through their exclusive
    /// section, so a debug assertion suffices.
    #[inline]
    pub fn publish(&self, id: SlotId, value: *mut T) {
        debug_assert!(!value.is_null(), "published a null pointer");
        let previous = self.slots[id.0].swap(value, Ordering::SeqCst);
        debug_assert!(previous.is_null(), "published into occupied slot {}", id.0);
    }

    /// Empties slot `id`, returning what it held (null if it was empty).
    #[inline]
    pub fn take(&self, id: SlotId) -> *mut T {
        self.slots[id.0].swap(ptr::null_mut(), Ordering::SeqCst)
    }

    /// Reads slot `id`.
    #[inline]
    pub fn load(&self, id: SlotId) -> *mut T {
        self.slots[id.0].load(Ordering::SeqCst)
    }

    /// Iterates occupied slots in index order.
    ///
    /// Each slot is read once; a concurrent writer may change slots that have
    /// not been visited yet.
    pub fn iter(&self) -> impl Iterator<Item = (SlotId, *mut T)> + '_ {
        self.slots.iter().enumerate().filter_map(|(idx, slot)| {
            let value = slot.load(Ordering::SeqCst);
            (!value.is_null()).then_some((SlotId(idx), value))
        })
    }

    /// Number of occupied slots at the moment each one is read.
    pub fn occupied(&self) -> usize {
        self.iter().count()
    }
}

impl<T> fmt::Debug for SlotTable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlotTable")
            .field("len", &self.len())
            .field("occupied", &self.occupied())
            .finish()
    }
}

/// Free-slot bookkeeping for a [`SlotTable`].
///
/// Not synchronized: keep it behind the same lock that serializes writers.
/// Lower indices are handed out first.
#[derive(Debug, Clone)]
pub struct FreeSlots {
    free: Vec<usize>,
}

impl FreeSlots {
    /// All `len` slots start free.
    pub fn new(len: usize) -> Self {
        Self {
            free: (0..len).rev().collect(),
        }
    }

    /// Takes a free slot, if any remain.
    #[inline]
    pub fn allocate(&mut self) -> Option<SlotId> {
        self.free.pop().map(SlotId)
    }

    /// Returns `id` to the free pool.
    #[inline]
    pub fn release(&mut self, id: SlotId) {
        debug_assert!(!self.free.contains(&id.0), "double free of slot {}", id.0);
        self.free.push(id.0);
    }

    /// Number of free slots.
    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.free.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_take_and_iterate() {
        let table: SlotTable<u32> = SlotTable::new(4);
        let mut a = 10u32;
        let mut b = 20u32;

        table.publish(SlotId(1), &mut a);
        table.publish(SlotId(3), &mut b);
        assert_eq!(table.occupied(), 2);

        let seen: Vec<_> = table.iter().map(|(id, _)| id.index()).collect();
        assert_eq!(seen, vec![1, 3]);

        let taken = table.take(SlotId(1));
        assert_eq!(taken, &mut a as *mut u32);
        assert!(table.load(SlotId(1)).is_null());
        assert!(table.take(SlotId(1)).is_null());
        assert_eq!(table.occupied(), 1);
    }

    #[test]
    fn free_slots_hand_out_lowest_first_and_reuse() {
        let mut free = FreeSlots::new(3);
        assert_eq!(free.len(), 3);
        let first = free.allocate().unwrap();
        let second = free.allocate().unwrap();
        assert_eq!((first.index(), second.index()), (0, 1));

        free.release(first);
        assert_eq!(free.allocate(), Some(first));
        assert_eq!(free.allocate().map(SlotId::index), Some(2));
        assert_eq!(free.len(), 0);
        assert_eq!(free.allocate(), None);
    }

    #[test]
    fn empty_table() {
        let table: SlotTable<u8> = SlotTable::new(0);
        assert_eq!(table.len(), 0);
        assert_eq!(table.iter().count(), 0);
    }
}
