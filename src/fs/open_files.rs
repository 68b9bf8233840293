//! The process-wide open-files registry and the per-thread `OpenFile`
//! handle it hands out.
//!
//! Grounded on `original_source/code/filesys/open_files_table.cc`/`.hh`:
//! `FileInfo` bundles the shared `FileHeader`/`RWFile` and a reference
//! count; the registry maps a small integer *global file id* to one
//! `FileInfo`, exactly mirroring the `Table<FileInfo*>` there.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use crate::errors::{KernelError, KernelResult};
use crate::fs::file_header::FileHeader;
use crate::fs::synch_file::RWFile;
use crate::param::NUM_OPEN_FILES;

pub type GlobalFileId = u32;

/// The registry's shared record for one file that is currently open by at
/// least one thread.
pub struct FileInfo {
    pub name: String,
    pub header_sector: u32,
    pub header: Mutex<FileHeader>,
    pub sync: RWFile,
    refcount: Mutex<u32>,
    /// Cleared by `Remove` while the file is still open, to defer deletion
    /// until every handle has been closed (SPEC_FULL.md §4.4).
    available: Mutex<bool>,
}

impl FileInfo {
    pub fn is_available(&self) -> bool {
        *self.available.lock().unwrap()
    }

    pub fn mark_unavailable(&self) {
        *self.available.lock().unwrap() = false;
    }

    pub fn refcount(&self) -> u32 {
        *self.refcount.lock().unwrap()
    }
}

/// Maps global file ids to their shared [`FileInfo`]. One instance exists
/// per file system (`SPEC_FULL.md` §3, "Open-files registry").
pub struct OpenFilesRegistry {
    entries: Mutex<HashMap<GlobalFileId, Arc<FileInfo>>>,
    next_id: AtomicU32,
}

impl OpenFilesRegistry {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            next_id: AtomicU32::new(0),
        }
    }

    /// Finds an already-open, still-available entry for `name`.
    pub fn find_available(&self, name: &str) -> Option<(GlobalFileId, Arc<FileInfo>)> {
        let entries = self.entries.lock().unwrap();
        entries
            .iter()
            .find(|(_, info)| info.name == name && info.is_available())
            .map(|(&id, info)| (id, Arc::clone(info)))
    }

    /// Installs a brand-new entry (the caller has just fetched `header`
    /// from disk). Returns the new global id.
    pub fn insert(
        &self,
        name: String,
        header_sector: u32,
        header: FileHeader,
    ) -> KernelResult<(GlobalFileId, Arc<FileInfo>)> {
        let mut entries = self.entries.lock().unwrap();
        if entries.len() >= NUM_OPEN_FILES {
            return Err(KernelError::RegistryFull);
        }
        let info = Arc::new(FileInfo {
            name,
            header_sector,
            header: Mutex::new(header),
            sync: RWFile::new(),
            refcount: Mutex::new(1),
            available: Mutex::new(true),
        });
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        entries.insert(id, Arc::clone(&info));
        Ok((id, info))
    }

    pub fn get(&self, id: GlobalFileId) -> Option<Arc<FileInfo>> {
        self.entries.lock().unwrap().get(&id).cloned()
    }

    pub fn incref(&self, id: GlobalFileId) {
        if let Some(info) = self.get(id) {
            *info.refcount.lock().unwrap() += 1;
        }
    }

    /// Decrements the refcount. Returns `true` exactly when the refcount
    /// reached zero *and* the file was marked unavailable (so the caller
    /// must now perform the deferred `Delete`).
    pub fn decref(&self, id: GlobalFileId) -> bool {
        let mut entries = self.entries.lock().unwrap();
        let Some(info) = entries.get(&id) else {
            return false;
        };
        let mut refcount = info.refcount.lock().unwrap();
        *refcount -= 1;
        let reclaim = *refcount == 0;
        let needs_delete = reclaim && !info.is_available();
        if reclaim {
            drop(refcount);
            entries.remove(&id);
        }
        needs_delete
    }
}

impl Default for OpenFilesRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// A per-thread handle into an open file, installed in a thread's FD table.
/// Several `OpenFile`s (from separate `Open` calls, or the same call
/// duplicated across threads) may share one `FileInfo` via the registry.
pub struct OpenFile {
    pub global_id: GlobalFileId,
    pub info: Arc<FileInfo>,
    position: Mutex<u32>,
}

impl OpenFile {
    pub fn new(global_id: GlobalFileId, info: Arc<FileInfo>) -> Self {
        Self {
            global_id,
            info,
            position: Mutex::new(0),
        }
    }

    pub fn position(&self) -> u32 {
        *self.position.lock().unwrap()
    }

    pub fn seek(&self, pos: u32) {
        *self.position.lock().unwrap() = pos;
    }

    pub fn advance(&self, by: u32) {
        *self.position.lock().unwrap() += by;
    }
}
