use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};

use super::ThreadId;

struct Waiter {
    ticket: u64,
    priority: u32,
}

/// Something a blocked `Lock::acquire_for` can donate priority to, and must
/// tell to give the boost back on release. Defined here rather than on
/// `proc::Thread` directly so `sync` does not need to depend on `proc`;
/// `Thread` implements it.
pub trait PriorityDonee: Send + Sync {
    fn boost_priority(&self, to: u32);
    fn clear_boost(&self);
}

struct Inner {
    held: bool,
    owner: Option<ThreadId>,
    queue: VecDeque<Waiter>,
    next_ticket: u64,
    /// Highest priority donated to the current owner by a blocked waiter.
    /// Single-hop only: a waiter donates to the lock's immediate owner and
    /// no further, matching the spec's "single hop suffices" mandate.
    donated_priority: Option<u32>,
    /// The current owner's donee handle, set by `acquire_for` and consulted
    /// whenever `donated_priority` rises so the owner's observable priority
    /// actually reflects the donation.
    owner_donee: Option<Arc<dyn PriorityDonee>>,
}

/// An ownership-tracked mutual-exclusion lock with single-hop priority
/// donation. Built atop the same FIFO-ticket discipline as [`Semaphore`],
/// plus an owner field so double-acquire and release-by-non-owner are
/// programmer-contract errors (they panic, per `SPEC_FULL.md` §7).
///
/// [`Semaphore`]: super::Semaphore
pub struct Lock {
    name: &'static str,
    inner: Mutex<Inner>,
    cond: Condvar,
}

impl Lock {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            inner: Mutex::new(Inner {
                held: false,
                owner: None,
                queue: VecDeque::new(),
                next_ticket: 0,
                donated_priority: None,
                owner_donee: None,
            }),
            cond: Condvar::new(),
        }
    }

    /// Acquires the lock, donating `priority` to the current holder while
    /// blocked. Panics if the calling thread already holds the lock.
    pub fn acquire(&self, priority: u32) {
        self.acquire_for(priority, None)
    }

    /// Acquires the lock like [`Self::acquire`], additionally registering
    /// `owner` as the thread to boost for as long as a higher-priority
    /// thread is blocked waiting on it. The boost is handed back via
    /// [`PriorityDonee::clear_boost`] on [`Self::release`]. Passing `None`
    /// behaves exactly like `acquire`.
    pub fn acquire_for(&self, priority: u32, owner: Option<Arc<dyn PriorityDonee>>) {
        let me = ThreadId::current();
        let mut guard = self.inner.lock().unwrap();
        assert!(
            guard.owner != Some(me),
            "Lock::acquire: {} already held by current thread",
            self.name
        );

        if !guard.held && guard.queue.is_empty() {
            guard.held = true;
            guard.owner = Some(me);
            guard.owner_donee = owner;
            return;
        }

        let ticket = guard.next_ticket;
        guard.next_ticket += 1;
        guard.queue.push_back(Waiter { ticket, priority });
        let donated = guard.donated_priority.map_or(priority, |p| p.max(priority));
        guard.donated_priority = Some(donated);
        if let Some(donee) = &guard.owner_donee {
            donee.boost_priority(donated);
        }

        loop {
            let at_front = guard.queue.front().map(|w| w.ticket) == Some(ticket);
            if at_front && !guard.held {
                guard.queue.pop_front();
                guard.held = true;
                guard.owner = Some(me);
                guard.owner_donee = owner;
                if guard.queue.is_empty() {
                    guard.donated_priority = None;
                }
                return;
            }
            guard = self.cond.wait(guard).unwrap();
        }
    }

    /// Releases the lock. Panics if the calling thread is not the owner.
    pub fn release(&self) {
        let me = ThreadId::current();
        let mut guard = self.inner.lock().unwrap();
        assert_eq!(
            guard.owner,
            Some(me),
            "Lock::release: {} not held by current thread",
            self.name
        );
        guard.held = false;
        guard.owner = None;
        guard.donated_priority = None;
        if let Some(donee) = guard.owner_donee.take() {
            donee.clear_boost();
        }
        self.cond.notify_all();
    }

    pub fn is_held_by_current_thread(&self) -> bool {
        self.inner.lock().unwrap().owner == Some(ThreadId::current())
    }

    /// The highest priority currently donated to this lock's owner by a
    /// blocked waiter, if any. Exposed for tests of the donation mechanism.
    pub fn donated_priority(&self) -> Option<u32> {
        self.inner.lock().unwrap().donated_priority
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn basic_mutual_exclusion() {
        let lock = Lock::new("test");
        lock.acquire(0);
        assert!(lock.is_held_by_current_thread());
        lock.release();
        assert!(!lock.is_held_by_current_thread());
    }

    #[test]
    #[should_panic(expected = "already held")]
    fn double_acquire_is_fatal() {
        let lock = Lock::new("test");
        lock.acquire(0);
        lock.acquire(0);
    }

    #[test]
    #[should_panic(expected = "not held")]
    fn release_by_non_owner_is_fatal() {
        let lock = Arc::new(Lock::new("test"));
        lock.acquire(0);
        let other = Arc::clone(&lock);
        thread::spawn(move || other.release()).join().unwrap();
    }

    #[test]
    fn donation_boosts_a_registered_owner_and_clears_on_release() {
        struct Recorder(Mutex<u32>);
        impl PriorityDonee for Recorder {
            fn boost_priority(&self, to: u32) {
                *self.0.lock().unwrap() = to;
            }
            fn clear_boost(&self) {
                *self.0.lock().unwrap() = 0;
            }
        }

        let lock = Arc::new(Lock::new("donee"));
        let owner = Arc::new(Recorder(Mutex::new(0)));
        lock.acquire_for(0, Some(owner.clone() as Arc<dyn PriorityDonee>));
        assert_eq!(*owner.0.lock().unwrap(), 0);

        let waiter_lock = Arc::clone(&lock);
        let handle = thread::spawn(move || {
            waiter_lock.acquire(10);
            waiter_lock.release();
        });

        let mut tries = 0;
        while *owner.0.lock().unwrap() != 10 && tries < 200 {
            thread::sleep(Duration::from_millis(5));
            tries += 1;
        }
        assert_eq!(*owner.0.lock().unwrap(), 10);

        lock.release();
        handle.join().unwrap();
        assert_eq!(*owner.0.lock().unwrap(), 0);
    }

    #[test]
    fn blocked_waiter_donates_priority_to_owner() {
        let lock = Arc::new(Lock::new("donation"));
        lock.acquire(0);

        let waiter_lock = Arc::clone(&lock);
        let handle = thread::spawn(move || {
            waiter_lock.acquire(10);
            waiter_lock.release();
        });

        // Give the waiter time to park and donate.
        let mut tries = 0;
        while lock.donated_priority() != Some(10) && tries < 200 {
            thread::sleep(Duration::from_millis(5));
            tries += 1;
        }
        assert_eq!(lock.donated_priority(), Some(10));

        lock.release();
        handle.join().unwrap();
        assert_eq!(lock.donated_priority(), None);
    }
}
