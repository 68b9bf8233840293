use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use super::{Lock, Semaphore};

/// A Mesa-style condition variable, bound to a [`Lock`] at each call site
/// (not at construction) so that one `Condition` can be reused across the
/// several `Lock`s a caller might coordinate, mirroring the teacher's
/// `WaitChannel::sleep(lock_guard, ctx)` signature rather than literally
/// embedding a `&Lock` field (which would make `Condition` self-referential
/// whenever it lives in the same struct as its lock, e.g. `RWFile`).
///
/// Each waiter parks on its own private one-shot [`Semaphore`], which is
/// exactly the "block on a private wait semaphore" construction the spec
/// calls for: `signal` can then wake precisely the longest-waiting thread
/// without the spurious-wakeup ambiguity a single shared `Condvar` would
/// introduce.
pub struct Condition {
    waiters: Mutex<VecDeque<Arc<Semaphore>>>,
}

impl Condition {
    pub fn new() -> Self {
        Self {
            waiters: Mutex::new(VecDeque::new()),
        }
    }

    /// Atomically releases `lock` and blocks; reacquires `lock` before
    /// returning. The caller must hold `lock`, and must re-check its
    /// predicate after `wait` returns (Mesa semantics give no guarantee
    /// that the condition still holds).
    pub fn wait(&self, lock: &Lock) {
        assert!(
            lock.is_held_by_current_thread(),
            "Condition::wait called without holding the lock"
        );
        let private = Arc::new(Semaphore::new(0));
        self.waiters.lock().unwrap().push_back(Arc::clone(&private));
        lock.release();
        private.p();
        lock.acquire(0);
    }

    /// Wakes at most one waiter (the longest-waiting one). No-op if none.
    pub fn signal(&self, _lock: &Lock) {
        if let Some(waiter) = self.waiters.lock().unwrap().pop_front() {
            waiter.v();
        }
    }

    /// Wakes every thread currently waiting.
    pub fn broadcast(&self, _lock: &Lock) {
        let mut waiters = self.waiters.lock().unwrap();
        for waiter in waiters.drain(..) {
            waiter.v();
        }
    }
}

impl Default for Condition {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc as StdArc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn signal_wakes_one_waiter() {
        let lock = StdArc::new(Lock::new("cond-test"));
        let cond = StdArc::new(Condition::new());
        let ready = StdArc::new(Mutex::new(false));

        let (l2, c2, r2) = (StdArc::clone(&lock), StdArc::clone(&cond), StdArc::clone(&ready));
        let handle = thread::spawn(move || {
            l2.acquire(0);
            while !*r2.lock().unwrap() {
                c2.wait(&l2);
            }
            l2.release();
        });

        thread::sleep(Duration::from_millis(20));
        lock.acquire(0);
        *ready.lock().unwrap() = true;
        cond.signal(&lock);
        lock.release();

        handle.join().unwrap();
    }

    #[test]
    fn broadcast_wakes_all_waiters() {
        let lock = StdArc::new(Lock::new("cond-broadcast"));
        let cond = StdArc::new(Condition::new());
        let ready = StdArc::new(Mutex::new(false));
        let mut handles = Vec::new();

        for _ in 0..4 {
            let (l, c, r) = (StdArc::clone(&lock), StdArc::clone(&cond), StdArc::clone(&ready));
            handles.push(thread::spawn(move || {
                l.acquire(0);
                while !*r.lock().unwrap() {
                    c.wait(&l);
                }
                l.release();
            }));
        }

        thread::sleep(Duration::from_millis(30));
        lock.acquire(0);
        *ready.lock().unwrap() = true;
        cond.broadcast(&lock);
        lock.release();

        for h in handles {
            h.join().unwrap();
        }
    }
}
