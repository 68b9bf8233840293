//! The explicit kernel context: owns every piece of "shared global kernel
//! state" the original keeps as file-scope statics (`machine`, `fileSystem`,
//! `scheduler`, `stats`, `usedPages`), per the Design Note in `SPEC_FULL.md`
//! §9. Constructed once per simulation or test and threaded through every
//! subsystem instead of living behind a process-wide `static`.
//!
//! Init order mirrors the field order below: sync primitives need nothing
//! global, so the disk comes first, then the file system, the coremap, the
//! scheduler, and finally the machine (coremap + MMU together back the
//! address spaces threads will `Exec`).

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use crate::console::Console;
use crate::errors::KernelResult;
use crate::fs::{FileSystem, OpenFile, SynchDisk};
use crate::param::NUM_PHYS_PAGES;
use crate::proc::{Scheduler, ThreadTable};
use crate::vm::{page_fault_handler, AddressSpace, BuildMode, Coremap, Mmu, ReplacementPolicy, SpaceId, SpaceTable};

pub struct Kernel {
    pub fs: FileSystem,
    pub coremap: Mutex<Coremap>,
    pub policy: Mutex<Box<dyn ReplacementPolicy>>,
    pub mmu: Mutex<Mmu>,
    pub space_table: SpaceTable,
    pub scheduler: Arc<Scheduler>,
    pub threads: Arc<ThreadTable>,
    pub console: Console,
    pub build_mode: BuildMode,
    next_pid: AtomicU32,
}

impl Kernel {
    pub fn new(
        disk: SynchDisk,
        format: bool,
        build_mode: BuildMode,
        tlb_enabled: bool,
        policy: Box<dyn ReplacementPolicy>,
    ) -> KernelResult<Self> {
        let fs = FileSystem::new(disk, format)?;
        Ok(Self {
            fs,
            coremap: Mutex::new(Coremap::new(NUM_PHYS_PAGES)),
            policy: Mutex::new(policy),
            mmu: Mutex::new(Mmu::new(NUM_PHYS_PAGES, tlb_enabled)),
            space_table: SpaceTable::new(),
            scheduler: Arc::new(Scheduler::new()),
            threads: Arc::new(ThreadTable::new()),
            console: Console::new(),
            build_mode,
            next_pid: AtomicU32::new(1),
        })
    }

    /// Allocates the next process id, used to name a `DemandSwap` address
    /// space's swap file (`SWAP.<pid>`); stands in for the original's
    /// process counter, one of the "shared global kernel state" fields
    /// folded into this struct.
    pub fn allocate_pid(&self) -> u32 {
        self.next_pid.fetch_add(1, Ordering::Relaxed)
    }

    /// Builds an address space for `exec` under this kernel's configured
    /// build mode and registers it, returning the id a thread can carry in
    /// its `space_id` slot.
    pub fn exec(&self, exec: OpenFile, pid: u32) -> KernelResult<SpaceId> {
        let mut coremap = self.coremap.lock().unwrap();
        let mmu = self.mmu.lock().unwrap();
        let space = AddressSpace::new(&self.fs, &mut coremap, &mmu, self.build_mode, exec, pid)?;
        Ok(self.space_table.insert(space))
    }

    /// Services a page fault for `space_id` at `vaddr`, allocating or
    /// evicting a frame as needed.
    pub fn page_fault(&self, space_id: SpaceId, vaddr: u32) -> KernelResult<()> {
        self.fs.stats().page_fault();
        let mut coremap = self.coremap.lock().unwrap();
        let mut policy = self.policy.lock().unwrap();
        let mut mmu = self.mmu.lock().unwrap();
        page_fault_handler(
            &self.space_table,
            space_id,
            vaddr,
            &self.fs,
            &mut coremap,
            policy.as_mut(),
            &mut mmu,
        )
    }

    /// Tears down a finished process's address space: reclaims every frame
    /// it still holds and removes its swap file, per `SPEC_FULL.md` §3's
    /// `AddressSpace` lifecycle ("at destruction it clears all its frames
    /// from the coremap and removes the swap file").
    pub fn destroy_address_space(&self, space_id: SpaceId) {
        let Some(space) = self.space_table.remove(space_id) else {
            return;
        };
        let mut coremap = self.coremap.lock().unwrap();
        for entry in &space.page_table {
            if entry.valid {
                coremap.clear(entry.physical_page as usize);
            }
        }
        drop(coremap);
        if let Some(swap) = space.swap {
            let name = swap.info.name.clone();
            self.fs.close(swap);
            let _ = self.fs.remove(&name);
        }
    }
}
