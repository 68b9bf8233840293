//! Thread-level synchronization primitives.
//!
//! These mirror the five primitives of `SPEC_FULL.md` §4.1: [`Semaphore`],
//! [`Lock`], [`Condition`], [`Channel`], and the file system's [`RWFile`]
//! (kept in `crate::fs::synch_file` since it is only ever used there).
//!
//! The teacher kernel (`kernel-rs`) gets mutual exclusion by disabling
//! interrupts on a single physical CPU; we have no such primitive in a
//! hosted, multi-core Rust program, so every primitive here is built on a
//! `std::sync::Mutex` guarding its state plus a `Condvar`-based wait queue.
//! The *contract* each primitive exposes is unchanged from the spec: FIFO
//! wakeup for `Semaphore`, single-hop donation for `Lock`, Mesa-style
//! re-checking for `Condition`.

mod channel;
mod condition;
mod lock;
mod semaphore;

pub use channel::Channel;
pub use condition::Condition;
pub use lock::{Lock, PriorityDonee};
pub use semaphore::Semaphore;

use std::sync::atomic::{AtomicU64, Ordering};
use std::cell::Cell;

/// Identifies a simulated kernel thread for ownership/re-entrancy checks
/// (lock holder, `RWFile` writer identity). Deliberately not a pointer, per
/// the "cyclic references" design note in `SPEC_FULL.md` §9: a `ThreadId` is
/// stable even if the underlying `Thread` bookkeeping is ever recycled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ThreadId(u64);

static NEXT_THREAD_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static CURRENT_THREAD_ID: Cell<Option<ThreadId>> = Cell::new(None);
}

impl ThreadId {
    /// Allocates a fresh id. Used by the scheduler when it spins up a new
    /// simulated thread; never called by sync-primitive users directly.
    pub fn fresh() -> Self {
        Self(NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// The id of the thread currently executing, assigning one on first use
    /// for OS threads that were never routed through the scheduler (e.g. the
    /// test harness's own thread).
    pub fn current() -> Self {
        CURRENT_THREAD_ID.with(|cell| {
            if let Some(id) = cell.get() {
                return id;
            }
            let id = Self::fresh();
            cell.set(Some(id));
            id
        })
    }

    /// Binds the calling OS thread to a specific id, used by the scheduler
    /// so that a spawned worker thread's `ThreadId::current()` matches the
    /// id the scheduler assigned it.
    pub fn bind_current(id: ThreadId) {
        CURRENT_THREAD_ID.with(|cell| cell.set(Some(id)));
    }

    /// The id's numeric value, for surfacing as a syscall-visible pid.
    pub fn raw(&self) -> u64 {
        self.0
    }

    /// Reconstructs an id from a raw value previously obtained from
    /// [`Self::raw`], for the syscall gateway to turn a user-supplied pid
    /// back into a lookup key.
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}
