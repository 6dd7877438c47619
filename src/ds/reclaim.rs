//! Epoch-based deferred reclamation.
//!
//! [`ReclaimEngine`] lets readers walk shared structure without taking a lock
//! while writers unlink entries concurrently. Writers never free what they
//! unlink; they hand a release callback to [`retire`](ReclaimEngine::retire)
//! and the engine runs it once every reader that could still observe the
//! unlinked entry has left its read-side section (a grace period).
//!
//! ## Architecture
//!
//! ```text
//!   global epoch:  e
//!
//!   pinned[e % 3]        readers that entered at epoch e
//!   pinned[(e - 1) % 3]  readers that entered at epoch e - 1 (draining)
//!   pinned[(e + 1) % 3]  empty (transient retries only)
//!
//!   garbage:  [(epoch 4, release) (epoch 4, release) (epoch 5, release) ...]
//!              ▲
//!              └── runs once the global epoch reaches 4 + 2
//! ```
//!
//! ## Protocol
//!
//! - `pin()`: read the global epoch, bump that epoch's pin counter, re-read the
//!   epoch. If it moved, undo and retry. On success, the reader is counted
//!   against the epoch it observed for as long as the [`Guard`] lives.
//! - advance: the epoch moves from `e` to `e + 1` only when nobody is pinned at
//!   `e - 1`. Readers are therefore always pinned at the current or the
//!   previous epoch.
//! - `retire(f)`: tag `f` with the current epoch `r`. Any reader that could
//!   have seen the unlinked entry pinned at or before `r`. Two advances past
//!   `r` prove all of them have unpinned, so `f` runs once the epoch is at
//!   least `r + 2`.
//!
//! ## Blocking
//!
//! Pinning and unpinning never block: unpinning only *tries* the garbage lock
//! to run due callbacks. Writers retire and collect without waiting for
//! readers. Only [`synchronize`](ReclaimEngine::synchronize) waits, and it
//! must not be called from inside a read-side section.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use parking_lot::Mutex;
use tracing::{debug, trace};

/// Epochs a retired callback must wait before it may run.
const GRACE_EPOCHS: u64 = 2;

/// Number of pin counters; one per epoch that can be live at once plus one.
const EPOCH_SLOTS: usize = 3;

type Deferred = Box<dyn FnOnce() + Send>;

struct Retired {
    epoch: u64,
    release: Deferred,
}

/// Grace-period tracker and deferred-release queue.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicBool, Ordering};
/// use refcache::ds::ReclaimEngine;
///
/// let engine = ReclaimEngine::new();
/// let freed = Arc::new(AtomicBool::new(false));
///
/// let guard = engine.pin();
/// let flag = Arc::clone(&freed);
/// engine.retire(move || flag.store(true, Ordering::SeqCst));
///
/// // A reader that predates the retirement is still pinned.
/// engine.collect();
/// assert!(!freed.load(Ordering::SeqCst));
///
/// drop(guard);
/// engine.synchronize();
/// assert!(freed.load(Ordering::SeqCst));
/// ```
pub struct ReclaimEngine {
    epoch: AtomicU64,
    pinned: [AtomicUsize; EPOCH_SLOTS],
    garbage: Mutex<VecDeque<Retired>>,
    pending: AtomicUsize,
    // callbacks taken off the queue whose batch has not finished running
    running: AtomicUsize,
    reclaimed: AtomicU64,
}

impl ReclaimEngine {
    /// Creates an engine at epoch zero with nothing pending.
    pub fn new() -> Self {
        Self {
            epoch: AtomicU64::new(0),
            pinned: [AtomicUsize::new(0), AtomicUsize::new(0), AtomicUsize::new(0)],
            garbage: Mutex::new(VecDeque::new()),
            pending: AtomicUsize::new(0),
            running: AtomicUsize::new(0),
            reclaimed: AtomicU64::new(0),
        }
    }

    /// Current global epoch.
    #[inline]
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// Number of retired callbacks that have not run yet.
    #[inline]
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Relaxed)
    }

    /// Total number of retired callbacks that have run.
    #[inline]
    pub fn reclaimed(&self) -> u64 {
        self.reclaimed.load(Ordering::Relaxed)
    }

    /// Enters a read-side section.
    ///
    /// Anything retired after this call returns will not be released until the
    /// returned guard is dropped.
    pub fn pin(&self) -> Guard<'_> {
        loop {
            let epoch = self.epoch.load(Ordering::SeqCst);
            let slot = slot_of(epoch);
            self.pinned[slot].fetch_add(1, Ordering::SeqCst);
            if self.epoch.load(Ordering::SeqCst) == epoch {
                return Guard { engine: self, slot };
            }
            // The epoch advanced between the read and the pin; our count may
            // be attributed to the wrong generation, so back out and retry.
            self.pinned[slot].fetch_sub(1, Ordering::SeqCst);
        }
    }

    /// Schedules `release` to run after the current grace period.
    ///
    /// The caller must have already made the retired entry unreachable for new
    /// readers before calling this.
    pub fn retire<F>(&self, release: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let epoch = self.epoch.load(Ordering::SeqCst);
        self.garbage.lock().push_back(Retired {
            epoch,
            release: Box::new(release),
        });
        self.pending.fetch_add(1, Ordering::Relaxed);
    }

    /// Advances the epoch as far as outstanding readers allow and runs every
    /// callback whose grace period has elapsed.
    ///
    /// Returns the number of callbacks run.
    pub fn collect(&self) -> usize {
        let epoch = self.advance();
        let ready = self.take_ready(&mut self.garbage.lock(), epoch);
        self.run(ready, epoch)
    }

    /// Like [`collect`](Self::collect), but gives up instead of waiting when
    /// another thread holds the garbage queue.
    fn try_collect(&self) -> usize {
        let epoch = self.advance();
        let ready = match self.garbage.try_lock() {
            Some(mut garbage) => self.take_ready(&mut garbage, epoch),
            None => return 0,
        };
        self.run(ready, epoch)
    }

    /// Blocks until every callback retired before this call has run.
    ///
    /// Waits for concurrent readers to unpin, and for batches another thread
    /// has already taken off the queue to finish. Calling this while the
    /// current thread holds a [`Guard`], or from inside a retired callback,
    /// never returns.
    pub fn synchronize(&self) {
        let target = self.epoch() + GRACE_EPOCHS;
        loop {
            self.collect();
            if self.epoch() >= target {
                break;
            }
            std::thread::yield_now();
        }
        self.collect();
        // A batch drained under the garbage lock before our last collect is
        // counted in `running` until its callbacks return.
        while self.running.load(Ordering::SeqCst) != 0 {
            std::thread::yield_now();
        }
    }

    /// Drains due callbacks and marks them in flight. Called with the
    /// garbage lock held.
    fn take_ready(&self, garbage: &mut VecDeque<Retired>, epoch: u64) -> Vec<Deferred> {
        let ready = drain_ready(garbage, epoch);
        if !ready.is_empty() {
            self.running.fetch_add(ready.len(), Ordering::SeqCst);
        }
        ready
    }

    /// Moves the epoch forward up to the grace distance, stopping at the first
    /// generation that still has pinned readers.
    fn advance(&self) -> u64 {
        let mut epoch = self.epoch.load(Ordering::SeqCst);
        for _ in 0..GRACE_EPOCHS {
            let previous = slot_of(epoch + EPOCH_SLOTS as u64 - 1);
            if self.pinned[previous].load(Ordering::SeqCst) != 0 {
                break;
            }
            match self
                .epoch
                .compare_exchange(epoch, epoch + 1, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => {
                    epoch += 1;
                    debug!(epoch, "reclaim epoch advanced");
                },
                Err(current) => epoch = current,
            }
        }
        epoch
    }

    fn run(&self, ready: Vec<Deferred>, epoch: u64) -> usize {
        let count = ready.len();
        if count == 0 {
            return 0;
        }
        for release in ready {
            release();
        }
        self.pending.fetch_sub(count, Ordering::Relaxed);
        self.reclaimed.fetch_add(count as u64, Ordering::Relaxed);
        self.running.fetch_sub(count, Ordering::SeqCst);
        trace!(count, epoch, "ran deferred releases");
        count
    }
}

impl Default for ReclaimEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ReclaimEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReclaimEngine")
            .field("epoch", &self.epoch())
            .field("pending", &self.pending())
            .field("reclaimed", &self.reclaimed())
            .finish()
    }
}

impl Drop for ReclaimEngine {
    fn drop(&mut self) {
        // No guard can outlive the engine, so every grace period is over.
        let garbage = std::mem::take(self.garbage.get_mut());
        for retired in garbage {
            (retired.release)();
        }
    }
}

/// Proof of an active read-side section.
///
/// Dropping the guard leaves the section and opportunistically runs callbacks
/// whose grace period just ended.
#[must_use = "dropping the guard immediately ends the read-side section"]
pub struct Guard<'a> {
    engine: &'a ReclaimEngine,
    slot: usize,
}

impl fmt::Debug for Guard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Guard").field("slot", &self.slot).finish()
    }
}

impl Drop for Guard<'_> {
    fn drop(&mut self) {
        self.engine.pinned[self.slot].fetch_sub(1, Ordering::SeqCst);
        if self.engine.pending() > 0 {
            self.engine.try_collect();
        }
    }
}

#[inline]
fn slot_of(epoch: u64) -> usize {
    (epoch % EPOCH_SLOTS as u64) as usize
}

fn drain_ready(garbage: &mut VecDeque<Retired>, epoch: u64) -> Vec<Deferred> {
    let mut ready = Vec::new();
    while let Some(front) = garbage.front() {
        if front.epoch + GRACE_EPOCHS > epoch {
            break;
        }
        if let Some(retired) = garbage.pop_front() {
            ready.push(retired.release);
        }
    }
    ready
}
