//! Per-thread file descriptor table (`SPEC_FULL.md` §3, "Per-thread FD
//! table"). Local ids 0 and 1 are reserved for the console and never hold a
//! real `OpenFile`.

use crate::errors::{KernelError, KernelResult};
use crate::fs::OpenFile;
use crate::param::NUM_FD;

pub const CONSOLE_STDIN: i32 = 0;
pub const CONSOLE_STDOUT: i32 = 1;

pub fn is_console(fd: i32) -> bool {
    fd == CONSOLE_STDIN || fd == CONSOLE_STDOUT
}

/// Maps a thread-local file id to its open file. Slots 0 and 1 stay empty
/// forever; `Open` never hands them out.
pub struct FdTable {
    slots: Vec<Option<OpenFile>>,
}

impl FdTable {
    pub fn new() -> Self {
        let mut slots = Vec::with_capacity(NUM_FD);
        slots.resize_with(NUM_FD, || None);
        Self { slots }
    }

    /// Installs `file` in the first free slot at or above 2, returning its
    /// local id.
    pub fn install(&mut self, file: OpenFile) -> KernelResult<i32> {
        for (i, slot) in self.slots.iter_mut().enumerate().skip(2) {
            if slot.is_none() {
                *slot = Some(file);
                return Ok(i as i32);
            }
        }
        Err(KernelError::NoFreeFd)
    }

    pub fn get(&self, fd: i32) -> KernelResult<&OpenFile> {
        if is_console(fd) {
            return Err(KernelError::InvalidFd(fd));
        }
        self.slots
            .get(fd as usize)
            .and_then(|slot| slot.as_ref())
            .ok_or(KernelError::InvalidFd(fd))
    }

    /// Removes and returns the file at `fd`, for `Close`.
    pub fn take(&mut self, fd: i32) -> KernelResult<OpenFile> {
        if is_console(fd) {
            return Err(KernelError::InvalidFd(fd));
        }
        self.slots
            .get_mut(fd as usize)
            .and_then(|slot| slot.take())
            .ok_or(KernelError::InvalidFd(fd))
    }
}

impl Default for FdTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dummy_registry() -> crate::fs::OpenFilesRegistry {
        crate::fs::OpenFilesRegistry::new()
    }

    fn dummy_open_file(registry: &crate::fs::OpenFilesRegistry) -> OpenFile {
        let (id, info) = registry
            .insert("f".into(), 5, crate::fs::FileHeader::new())
            .unwrap();
        OpenFile::new(id, info)
    }

    #[test]
    fn install_skips_reserved_console_slots() {
        let registry = dummy_registry();
        let mut table = FdTable::new();
        let fd = table.install(dummy_open_file(&registry)).unwrap();
        assert!(fd >= 2);
    }

    #[test]
    fn console_fds_are_never_real_files() {
        let table = FdTable::new();
        assert!(table.get(CONSOLE_STDIN).is_err());
        assert!(table.get(CONSOLE_STDOUT).is_err());
    }

    #[test]
    fn take_removes_the_slot() {
        let registry = dummy_registry();
        let mut table = FdTable::new();
        let fd = table.install(dummy_open_file(&registry)).unwrap();
        assert!(table.take(fd).is_ok());
        assert!(table.get(fd).is_err());
    }

    #[test]
    fn table_of_full_slots_rejects_further_installs() {
        let registry = dummy_registry();
        let mut table = FdTable::new();
        let mut last = Ok(0);
        for _ in 2..NUM_FD {
            last = table.install(dummy_open_file(&registry));
        }
        assert!(last.is_ok());
        assert!(table.install(dummy_open_file(&registry)).is_err());
    }
}
