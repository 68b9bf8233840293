use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};

struct Inner {
    value: u64,
    /// FIFO order of outstanding waiters, by ticket. A waiter may proceed
    /// only once it reaches the front *and* `value > 0`, which is what
    /// gives `V` the "wakes exactly the longest-waiting `P`" guarantee even
    /// though we wake every parked thread on every `notify_all`.
    queue: VecDeque<u64>,
    next_ticket: u64,
}

/// A counting, FIFO-fair semaphore.
///
/// `P`/`V` correspond to the classic `Down`/`Up`; we additionally expose
/// `try_p` for callers (the scheduler's non-blocking polling paths) that
/// must not suspend.
pub struct Semaphore {
    inner: Mutex<Inner>,
    cond: Condvar,
}

impl Semaphore {
    pub fn new(initial: u64) -> Self {
        Self {
            inner: Mutex::new(Inner {
                value: initial,
                queue: VecDeque::new(),
                next_ticket: 0,
            }),
            cond: Condvar::new(),
        }
    }

    /// Waits until the semaphore's value is positive, then decrements it.
    /// Blocked callers are released in the order they called `p`.
    pub fn p(&self) {
        let mut guard = self.inner.lock().unwrap();
        if guard.value > 0 && guard.queue.is_empty() {
            guard.value -= 1;
            return;
        }
        let ticket = guard.next_ticket;
        guard.next_ticket += 1;
        guard.queue.push_back(ticket);
        loop {
            let at_front = guard.queue.front() == Some(&ticket);
            if at_front && guard.value > 0 {
                guard.value -= 1;
                guard.queue.pop_front();
                return;
            }
            guard = self.cond.wait(guard).unwrap();
        }
    }

    /// Increments the value, waking the longest-waiting `p` if any.
    pub fn v(&self) {
        let mut guard = self.inner.lock().unwrap();
        guard.value += 1;
        self.cond.notify_all();
    }

    /// Non-blocking `p`: succeeds only if the semaphore is immediately
    /// available and no thread is already queued ahead of a fresh caller.
    pub fn try_p(&self) -> bool {
        let mut guard = self.inner.lock().unwrap();
        if guard.value > 0 && guard.queue.is_empty() {
            guard.value -= 1;
            true
        } else {
            false
        }
    }

    pub fn value(&self) -> u64 {
        self.inner.lock().unwrap().value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn p_v_round_trips() {
        let sem = Semaphore::new(1);
        sem.p();
        assert_eq!(sem.value(), 0);
        sem.v();
        assert_eq!(sem.value(), 1);
    }

    #[test]
    fn fifo_fairness_under_contention() {
        // N threads block on P(); N successive V()s must unblock them in
        // the order they arrived (SPEC_FULL.md §8, "Semaphore fairness").
        let sem = Arc::new(Semaphore::new(0));
        let order = Arc::new(Mutex::new(Vec::new()));
        let started = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for i in 0..5 {
            let sem = Arc::clone(&sem);
            let order = Arc::clone(&order);
            let started = Arc::clone(&started);
            handles.push(thread::spawn(move || {
                started.fetch_add(1, Ordering::SeqCst);
                sem.p();
                order.lock().unwrap().push(i);
            }));
            // Give each thread a chance to actually park before spawning
            // the next one, so arrival order is deterministic.
            while started.load(Ordering::SeqCst) <= i {
                thread::sleep(Duration::from_millis(1));
            }
            thread::sleep(Duration::from_millis(20));
        }

        for _ in 0..5 {
            sem.v();
            thread::sleep(Duration::from_millis(20));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }
}
