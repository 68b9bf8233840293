//! The single-level root directory: itself an ordinary file holding a flat
//! array of [`DirectoryEntry`].

use zerocopy::{AsBytes, FromBytes};

use crate::param::{FILE_NAME_MAX_LEN, NUM_DIR_ENTRIES};

#[repr(C)]
#[derive(Clone, Copy, AsBytes, FromBytes)]
struct RawDirectoryEntry {
    in_use: u8,
    name: [u8; FILE_NAME_MAX_LEN + 1],
    sector: u32,
}

#[derive(Clone, Copy, Debug)]
pub struct DirectoryEntry {
    pub in_use: bool,
    pub name: [u8; FILE_NAME_MAX_LEN],
    pub name_len: u8,
    pub sector: u32,
}

impl DirectoryEntry {
    fn empty() -> Self {
        Self {
            in_use: false,
            name: [0; FILE_NAME_MAX_LEN],
            name_len: 0,
            sector: 0,
        }
    }

    pub fn name_str(&self) -> &str {
        std::str::from_utf8(&self.name[..self.name_len as usize]).unwrap_or("")
    }
}

/// The directory's in-memory contents: a fixed-size table of entries,
/// serialized byte-exactly to/from the sectors of its own `FileHeader`.
pub struct Directory {
    entries: Vec<DirectoryEntry>,
}

impl Directory {
    pub fn new() -> Self {
        Self {
            entries: vec![DirectoryEntry::empty(); NUM_DIR_ENTRIES],
        }
    }

    pub const fn byte_size() -> usize {
        NUM_DIR_ENTRIES * core::mem::size_of::<RawDirectoryEntry>()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::byte_size());
        for entry in &self.entries {
            let mut name = [0u8; FILE_NAME_MAX_LEN + 1];
            name[..entry.name_len as usize].copy_from_slice(&entry.name[..entry.name_len as usize]);
            let raw = RawDirectoryEntry {
                in_use: entry.in_use as u8,
                name,
                sector: entry.sector,
            };
            out.extend_from_slice(raw.as_bytes());
        }
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        let entry_size = core::mem::size_of::<RawDirectoryEntry>();
        let mut entries = Vec::with_capacity(NUM_DIR_ENTRIES);
        for i in 0..NUM_DIR_ENTRIES {
            let raw = RawDirectoryEntry::read_from(&bytes[i * entry_size..(i + 1) * entry_size])
                .expect("Directory::from_bytes");
            let name_len = raw
                .name
                .iter()
                .position(|&b| b == 0)
                .unwrap_or(FILE_NAME_MAX_LEN)
                .min(FILE_NAME_MAX_LEN) as u8;
            let mut name = [0u8; FILE_NAME_MAX_LEN];
            name[..name_len as usize].copy_from_slice(&raw.name[..name_len as usize]);
            entries.push(DirectoryEntry {
                in_use: raw.in_use != 0,
                name,
                name_len,
                sector: raw.sector,
            });
        }
        Self { entries }
    }

    /// Returns the header sector of `name`, if present.
    pub fn find(&self, name: &str) -> Option<u32> {
        self.entries
            .iter()
            .find(|e| e.in_use && e.name_str() == name)
            .map(|e| e.sector)
    }

    /// Adds `(name, sector)`. Fails if the name already exists or the
    /// directory has no free slot.
    pub fn add(&mut self, name: &str, sector: u32) -> bool {
        if self.find(name).is_some() {
            return false;
        }
        let bytes = name.as_bytes();
        if bytes.len() > FILE_NAME_MAX_LEN {
            return false;
        }
        if let Some(slot) = self.entries.iter_mut().find(|e| !e.in_use) {
            let mut buf = [0u8; FILE_NAME_MAX_LEN];
            buf[..bytes.len()].copy_from_slice(bytes);
            slot.in_use = true;
            slot.name = buf;
            slot.name_len = bytes.len() as u8;
            slot.sector = sector;
            true
        } else {
            false
        }
    }

    pub fn remove(&mut self, name: &str) -> bool {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.in_use && e.name_str() == name) {
            *entry = DirectoryEntry::empty();
            true
        } else {
            false
        }
    }

    pub fn list(&self) -> Vec<(String, u32)> {
        self.entries
            .iter()
            .filter(|e| e.in_use)
            .map(|e| (e.name_str().to_string(), e.sector))
            .collect()
    }
}

impl Default for Directory {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_find_remove() {
        let mut dir = Directory::new();
        assert!(dir.add("a", 5));
        assert!(!dir.add("a", 6), "duplicate name must fail");
        assert_eq!(dir.find("a"), Some(5));
        assert!(dir.remove("a"));
        assert_eq!(dir.find("a"), None);
    }

    #[test]
    fn serialize_round_trip() {
        let mut dir = Directory::new();
        dir.add("foo", 3);
        dir.add("bar", 9);
        let bytes = dir.to_bytes();
        let reloaded = Directory::from_bytes(&bytes);
        assert_eq!(reloaded.find("foo"), Some(3));
        assert_eq!(reloaded.find("bar"), Some(9));
    }

    #[test]
    fn full_directory_rejects_add() {
        let mut dir = Directory::new();
        for i in 0..NUM_DIR_ENTRIES {
            assert!(dir.add(&format!("f{i}"), i as u32));
        }
        assert!(!dir.add("overflow", 0));
    }
}
