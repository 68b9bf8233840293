//! Centralized tunables for the simulated machine, disk, and file system.
//!
//! Mirrors the role of `kernel-rs/src/param.rs` in the teacher kernel: one
//! place all subsystems pull their sizing constants from, instead of magic
//! numbers scattered through the tree.

/// Bytes per disk sector.
pub const SECTOR_SIZE: usize = 128;

/// Number of sectors on the simulated disk.
pub const NUM_SECTORS: usize = 1024;

/// Sector holding the free-sector bitmap's file header.
pub const FREE_MAP_SECTOR: u32 = 0;

/// Sector holding the root directory's file header.
pub const DIRECTORY_SECTOR: u32 = 1;

/// Maximum length of a file name, not counting the NUL terminator.
pub const FILE_NAME_MAX_LEN: usize = 9;

/// Number of entries in the (single-level) root directory.
pub const NUM_DIR_ENTRIES: usize = 64;

/// Number of `u32` data-sector pointers per indirection table (one sector's worth).
pub const NUM_DIRECT: usize = SECTOR_SIZE / core::mem::size_of::<u32>();

/// Number of indirection-table pointers in a file header (one sector's worth,
/// minus the `numBytes` field).
pub const NUM_INDIRECT: usize =
    (SECTOR_SIZE - core::mem::size_of::<u32>()) / core::mem::size_of::<u32>();

/// Largest file representable by one header: every indirection table full of
/// data sectors.
pub const MAX_FILE_SIZE: usize = NUM_INDIRECT * NUM_DIRECT * SECTOR_SIZE;

/// Bytes per virtual/physical page.
pub const PAGE_SIZE: usize = 128;

/// Number of physical frames backing the simulated machine's main memory.
pub const NUM_PHYS_PAGES: usize = 32;

/// Number of software TLB entries, when the TLB build mode is enabled.
pub const TLB_SIZE: usize = 4;

/// Bytes reserved for the user stack of a freshly `Exec`'d address space.
pub const USER_STACK_SIZE: usize = 1024;

/// Sentinel physical page number for an invalid translation-table entry.
pub const INVALID_PHYS_PAGE: u32 = u32::MAX;

/// Open files per process (per-thread FD table size).
pub const NUM_FD: usize = 16;

/// Open files tracked process-wide by the open-files registry.
pub const NUM_OPEN_FILES: usize = 100;

/// Maximum number of simulated kernel threads.
pub const NUM_THREADS: usize = 64;

/// Maximum number of arguments `Exec` will copy onto a new user stack.
pub const MAX_EXEC_ARGS: usize = 32;

/// Bytes of MIPS-ABI register save area `Exec` leaves below a fresh stack pointer.
pub const STACK_REGISTER_SAVE_AREA: usize = 24;

/// Default thread priority; `Lock` donation raises a thread above this.
pub const DEFAULT_PRIORITY: u32 = 0;

static_assertions::const_assert!(NUM_DIRECT > 0);
static_assertions::const_assert!(NUM_INDIRECT > 0);
static_assertions::const_assert!(MAX_FILE_SIZE > 0);
