//! Run-time counters, mirroring the original `StatisticsCounters` /
//! `kernel-rs`'s habit of keeping a small plain counters struct off the
//! kernel context rather than scattering ad-hoc metrics through the code.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Default)]
pub struct Stats {
    pub num_disk_reads: AtomicU64,
    pub num_disk_writes: AtomicU64,
    pub num_page_faults: AtomicU64,
    pub num_context_switches: AtomicU64,
    pub num_syscalls: AtomicU64,
}

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn disk_read(&self) {
        self.num_disk_reads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn disk_write(&self) {
        self.num_disk_writes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn page_fault(&self) {
        self.num_page_faults.fetch_add(1, Ordering::Relaxed);
    }

    pub fn context_switch(&self) {
        self.num_context_switches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn syscall(&self) {
        self.num_syscalls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            num_disk_reads: self.num_disk_reads.load(Ordering::Relaxed),
            num_disk_writes: self.num_disk_writes.load(Ordering::Relaxed),
            num_page_faults: self.num_page_faults.load(Ordering::Relaxed),
            num_context_switches: self.num_context_switches.load(Ordering::Relaxed),
            num_syscalls: self.num_syscalls.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub num_disk_reads: u64,
    pub num_disk_writes: u64,
    pub num_page_faults: u64,
    pub num_context_switches: u64,
    pub num_syscalls: u64,
}
