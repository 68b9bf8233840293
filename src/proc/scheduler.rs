//! The cooperative scheduler: a ready queue plus the CPU token that
//! realizes "one logical CPU, one kernel context at a time"
//! (`SPEC_FULL.md` §5).
//!
//! Grounded on `original_source/code/threads/scheduler.cc`/`.hh`: `ReadyToRun`
//! appends to a FIFO ready list; `Run` (via `Thread::Yield`/the timer
//! interrupt) picks the next thread and switches to it. This crate has no
//! single-threaded emulator to switch stacks inside, so each simulated
//! thread is a real OS thread (`Thread::fork` spawns one); the CPU token is
//! what makes "only one of them is doing kernel work right now" true. Every
//! sync primitive (`Semaphore`, `Lock`, `Condition`, `Channel`, `RWFile`)
//! already serializes its *own* state with its own `Mutex`/`Condvar`, so
//! correctness of those primitives does not depend on the token; the token
//! exists for the scheduler's own bookkeeping (the ready queue, and
//! `Yield`/`Sleep` accounting) where nothing else provides that guarantee.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};
use std::time::Duration;

use crate::sync::ThreadId;

/// A mutex that models "holds the CPU": acquired by a thread before it runs
/// scheduler bookkeeping, released at `Yield`/`Sleep` and reacquired after.
pub struct CpuToken {
    holder: Mutex<Option<ThreadId>>,
    cond: Condvar,
}

impl CpuToken {
    pub fn new() -> Self {
        Self {
            holder: Mutex::new(None),
            cond: Condvar::new(),
        }
    }

    pub fn acquire(&self) {
        let me = ThreadId::current();
        let mut holder = self.holder.lock().unwrap();
        while holder.is_some() {
            holder = self.cond.wait(holder).unwrap();
        }
        *holder = Some(me);
    }

    pub fn release(&self) {
        let mut holder = self.holder.lock().unwrap();
        *holder = None;
        self.cond.notify_one();
    }
}

impl Default for CpuToken {
    fn default() -> Self {
        Self::new()
    }
}

/// The ready queue and CPU token shared by every simulated thread.
pub struct Scheduler {
    ready: Mutex<VecDeque<ThreadId>>,
    pub token: CpuToken,
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            ready: Mutex::new(VecDeque::new()),
            token: CpuToken::new(),
        }
    }

    pub fn ready_count(&self) -> usize {
        self.ready.lock().unwrap().len()
    }

    /// `ReadyToRun`: appends a thread id to the tail of the ready queue.
    pub fn ready_to_run(&self, id: ThreadId) {
        self.ready.lock().unwrap().push_back(id);
    }

    fn pop_ready(&self) -> Option<ThreadId> {
        self.ready.lock().unwrap().pop_front()
    }

    /// `Thread::Yield`: a suspension point. Releases the CPU token, lets the
    /// host OS scheduler run someone else, then re-acquires it. If another
    /// thread is in the ready queue, it is nudged to the back to model
    /// "yielded to whoever was next."
    pub fn yield_now(&self, me: ThreadId) {
        if let Some(next) = self.pop_ready() {
            self.ready.lock().unwrap().push_back(next);
        }
        self.ready_to_run(me);
        self.token.release();
        std::thread::yield_now();
        self.token.acquire();
        self.pop_ready();
    }

    /// `Thread::Sleep`: a suspension point modeled as a real sleep, with the
    /// CPU token released for the duration so other threads can run.
    pub fn sleep(&self, duration: Duration) {
        self.token.release();
        std::thread::sleep(duration);
        self.token.acquire();
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ready_to_run_and_pop_are_fifo() {
        let scheduler = Scheduler::new();
        let a = ThreadId::fresh();
        let b = ThreadId::fresh();
        scheduler.ready_to_run(a);
        scheduler.ready_to_run(b);
        assert_eq!(scheduler.pop_ready(), Some(a));
        assert_eq!(scheduler.pop_ready(), Some(b));
        assert_eq!(scheduler.pop_ready(), None);
    }

    #[test]
    fn token_is_mutually_exclusive() {
        use std::sync::Arc;
        use std::sync::atomic::{AtomicUsize, Ordering};

        let scheduler = Arc::new(Scheduler::new());
        let concurrent = Arc::new(AtomicUsize::new(0));
        let max_concurrent = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let scheduler = Arc::clone(&scheduler);
            let concurrent = Arc::clone(&concurrent);
            let max_concurrent = Arc::clone(&max_concurrent);
            handles.push(std::thread::spawn(move || {
                scheduler.token.acquire();
                let now = concurrent.fetch_add(1, Ordering::SeqCst) + 1;
                max_concurrent.fetch_max(now, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(5));
                concurrent.fetch_sub(1, Ordering::SeqCst);
                scheduler.token.release();
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(max_concurrent.load(Ordering::SeqCst), 1);
    }
}
