//! Threads and the cooperative scheduler (`SPEC_FULL.md` §3/§5).

mod fd_table;
mod scheduler;
mod thread;

pub use fd_table::{is_console, FdTable, CONSOLE_STDIN, CONSOLE_STDOUT};
pub use scheduler::{CpuToken, Scheduler};
pub use thread::Thread;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::errors::{KernelError, KernelResult};
use crate::sync::ThreadId;

/// The live-thread table: maps a [`ThreadId`] to the [`Thread`] it names,
/// so that `Join(pid)` can find a thread it did not itself create.
/// Grounded on `original_source/code/threads/thread_test.cc`'s pattern of
/// handing back a `Thread*` from `Fork` for a later `Join`; this crate
/// instead hands back the stable id and resolves it through the table,
/// per the "cyclic references" design note already applied to `SpaceTable`.
pub struct ThreadTable {
    threads: Mutex<HashMap<ThreadId, Arc<Thread>>>,
}

impl ThreadTable {
    pub fn new() -> Self {
        Self {
            threads: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, id: ThreadId) -> Option<Arc<Thread>> {
        self.threads.lock().unwrap().get(&id).cloned()
    }

    fn insert(&self, thread: Arc<Thread>) {
        self.threads.lock().unwrap().insert(thread.id, thread);
    }

    /// Drops a reaped thread's bookkeeping. Safe to call more than once.
    pub fn remove(&self, id: ThreadId) {
        self.threads.lock().unwrap().remove(&id);
    }
}

impl Default for ThreadTable {
    fn default() -> Self {
        Self::new()
    }
}

/// `Thread::Fork`: creates a new thread, registers it, and spawns the OS
/// thread that will run its body once it is actually scheduled onto the CPU
/// token. The body runs with the token held, exactly as any other kernel
/// code does, and receives its own `Thread` handle (so it can, for example,
/// record the `SpaceId` an `Exec` built for it); its return value becomes
/// the thread's exit status for `Join`.
pub fn fork(
    table: &Arc<ThreadTable>,
    scheduler: &Arc<Scheduler>,
    name: impl Into<String>,
    priority: u32,
    joinable: bool,
    body: impl FnOnce(Arc<Thread>) -> i32 + Send + 'static,
) -> ThreadId {
    let thread = Arc::new(Thread::new(name, priority, joinable));
    let id = thread.id;
    table.insert(Arc::clone(&thread));
    scheduler.ready_to_run(id);

    let scheduler = Arc::clone(scheduler);
    std::thread::spawn(move || {
        ThreadId::bind_current(id);
        scheduler.token.acquire();
        let status = body(Arc::clone(&thread));
        scheduler.token.release();
        thread.finish(status);
    });
    id
}

/// `Join(pid)`: blocks until the named thread finishes, returning its exit
/// status. Fails if no such thread is known to the table (already reaped,
/// or the pid never existed).
pub fn join(table: &ThreadTable, id: ThreadId) -> KernelResult<i32> {
    let thread = table
        .get(id)
        .ok_or_else(|| KernelError::NoSuchThread(id.raw() as u32))?;
    Ok(thread.join())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI32, Ordering};

    #[test]
    fn fork_then_join_returns_exit_status() {
        let table = Arc::new(ThreadTable::new());
        let scheduler = Arc::new(Scheduler::new());
        let id = fork(&table, &scheduler, "child", 0, true, |_thread| 42);
        assert_eq!(join(&table, id).unwrap(), 42);
    }

    #[test]
    fn join_unknown_pid_fails() {
        use crate::sync::ThreadId as Tid;
        let table = ThreadTable::new();
        let bogus = Tid::fresh();
        assert!(join(&table, bogus).is_err());
    }

    #[test]
    fn only_one_forked_thread_runs_kernel_code_at_a_time() {
        let table = Arc::new(ThreadTable::new());
        let scheduler = Arc::new(Scheduler::new());
        let concurrent = Arc::new(AtomicI32::new(0));
        let max_concurrent = Arc::new(AtomicI32::new(0));

        let mut ids = Vec::new();
        for _ in 0..6 {
            let concurrent = Arc::clone(&concurrent);
            let max_concurrent = Arc::clone(&max_concurrent);
            ids.push(fork(&table, &scheduler, "worker", 0, true, move |_thread| {
                let now = concurrent.fetch_add(1, Ordering::SeqCst) + 1;
                max_concurrent.fetch_max(now, Ordering::SeqCst);
                std::thread::sleep(std::time::Duration::from_millis(5));
                concurrent.fetch_sub(1, Ordering::SeqCst);
                0
            }));
        }
        for id in ids {
            join(&table, id).unwrap();
        }
        assert_eq!(max_concurrent.load(Ordering::SeqCst), 1);
    }
}
