//! A host-side stand-in for the simulated MMU: the physical-memory frame
//! array the out-of-scope MIPS interpreter would normally own, plus the
//! software TLB when that build mode is enabled.
//!
//! `SPEC_FULL.md` §1 puts the instruction interpreter itself out of scope;
//! this module exists only so `AddressSpace::load_page`/the page-fault path
//! have real bytes to move and a real TLB to refill, in the same spirit as
//! `kernel-rs`'s `PageTable`/`kalloc` standing in for hardware this crate
//! never drives directly.

use crate::param::{PAGE_SIZE, TLB_SIZE};
use crate::vm::address_space::TranslationEntry;

pub type Frame = [u8; PAGE_SIZE];

/// The simulated machine's physical memory: one fixed-size byte array per
/// frame, indexed by physical frame number.
pub struct PhysicalMemory {
    frames: std::sync::Mutex<Vec<Frame>>,
}

impl PhysicalMemory {
    pub fn new(num_frames: usize) -> Self {
        Self {
            frames: std::sync::Mutex::new(vec![[0u8; PAGE_SIZE]; num_frames]),
        }
    }

    pub fn zero_frame(&self, frame: usize) {
        self.frames.lock().unwrap()[frame] = [0u8; PAGE_SIZE];
    }

    pub fn write_frame(&self, frame: usize, data: &[u8]) {
        let mut frames = self.frames.lock().unwrap();
        let len = data.len().min(PAGE_SIZE);
        frames[frame][..len].copy_from_slice(&data[..len]);
    }

    /// Writes `data` at `offset` within `frame`, for the partial fills
    /// demand loading performs (code/init-data segments rarely start or end
    /// on a page boundary).
    pub fn write_frame_at(&self, frame: usize, offset: usize, data: &[u8]) {
        let mut frames = self.frames.lock().unwrap();
        frames[frame][offset..offset + data.len()].copy_from_slice(data);
    }

    pub fn read_frame(&self, frame: usize) -> Frame {
        self.frames.lock().unwrap()[frame]
    }
}

/// The software TLB and the one bit of machine state ("which address space
/// is this MMU currently wired to") needed when the TLB is absent.
pub struct Mmu {
    pub memory: PhysicalMemory,
    tlb: Option<[Option<TranslationEntry>; TLB_SIZE]>,
    next_slot: usize,
}

impl Mmu {
    pub fn new(num_frames: usize, tlb_enabled: bool) -> Self {
        Self {
            memory: PhysicalMemory::new(num_frames),
            tlb: tlb_enabled.then(|| [None; TLB_SIZE]),
            next_slot: 0,
        }
    }

    pub fn has_tlb(&self) -> bool {
        self.tlb.is_some()
    }

    /// `SaveState`: folds every still-valid TLB slot's `use`/`dirty` bits
    /// back into the owning page table before a context switch.
    pub fn save_state(&self, page_table: &mut [TranslationEntry]) {
        let Some(tlb) = &self.tlb else { return };
        for slot in tlb.iter().flatten() {
            let entry = &mut page_table[slot.virtual_page as usize];
            entry.use_bit = slot.use_bit;
            entry.dirty = slot.dirty;
        }
    }

    /// `RestoreState`: invalidates every TLB slot (TLB build) -- the
    /// non-TLB build instead looks the current page table up by id on every
    /// access, so there is nothing to restore here.
    pub fn restore_state(&mut self) {
        if let Some(tlb) = &mut self.tlb {
            *tlb = [None; TLB_SIZE];
        }
    }

    /// Finds `vpn` in the TLB, if present.
    pub fn tlb_lookup(&self, vpn: u32) -> Option<TranslationEntry> {
        self.tlb
            .as_ref()?
            .iter()
            .flatten()
            .find(|e| e.virtual_page == vpn)
            .copied()
    }

    /// Circular TLB refill: overwrites the next slot in round-robin order,
    /// first folding its previous occupant's bits back (the caller is
    /// expected to have already persisted them via `save_state` if needed).
    pub fn tlb_refill(&mut self, entry: TranslationEntry) {
        let Some(tlb) = &mut self.tlb else { return };
        tlb[self.next_slot] = Some(entry);
        self.next_slot = (self.next_slot + 1) % TLB_SIZE;
    }

    /// Invalidates any TLB slot caching `frame`, returning its `use`/`dirty`
    /// bits so the caller can fold them back into the owning page table.
    /// Used during victim handling.
    pub fn tlb_evict_frame(&mut self, frame: u32) -> Option<(bool, bool)> {
        let tlb = self.tlb.as_mut()?;
        for slot in tlb.iter_mut() {
            if let Some(entry) = slot {
                if entry.physical_page == frame {
                    let bits = (entry.use_bit, entry.dirty);
                    *slot = None;
                    return Some(bits);
                }
            }
        }
        None
    }
}
