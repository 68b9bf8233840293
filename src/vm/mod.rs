//! Address spaces, paging, and the simulated MMU/coremap they sit on top
//! of (`SPEC_FULL.md` §4.5).

mod address_space;
mod coremap;
mod mmu;
mod noff;
mod replacement;

pub use address_space::{handle_victim, AddressSpace, BuildMode, SpaceTable, TranslationEntry};
pub use coremap::{Coremap, FrameOwner, SpaceId};
pub use mmu::{Mmu, PhysicalMemory};
pub use noff::{NoffHeader, NOFF_HEADER_SIZE, NOFF_MAGIC};
pub use replacement::{EnhancedClock, Fifo, FrameBits, Random, ReplacementPolicy};
