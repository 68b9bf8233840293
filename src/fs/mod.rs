//! The indexed file system: a single flat directory over a simulated disk,
//! headers with one level of indirection, and an open-files registry
//! arbitrating deferred deletes and readers/writer access.
//!
//! Grounded on `original_source/code/filesys/file_system.cc`/`.hh`: the
//! free-sector bitmap and the root directory are themselves ordinary files,
//! addressed through fixed header sectors (`FREE_MAP_SECTOR`,
//! `DIRECTORY_SECTOR`), and every mutating operation follows the same
//! fetch-modify-writeback protocol the original uses around
//! `freeMapLock`/`directoryLock`.

mod bitmap;
mod directory;
mod disk;
mod file_header;
mod open_files;
mod synch_file;

pub use bitmap::Bitmap;
pub use directory::Directory;
pub use disk::SynchDisk;
pub use file_header::FileHeader;
pub use open_files::{FileInfo, GlobalFileId, OpenFile, OpenFilesRegistry};
pub use synch_file::RWFile;

use crate::errors::{KernelError, KernelResult};
use crate::param::{DIRECTORY_SECTOR, FILE_NAME_MAX_LEN, FREE_MAP_SECTOR, NUM_SECTORS, SECTOR_SIZE};
use crate::stats::Stats;
use crate::sync::Lock;

const FREE_MAP_FILE_SIZE: usize = (NUM_SECTORS + 7) / 8;

/// Ties the disk, the two fixed-location metadata files (free map,
/// directory), and the open-files registry together behind the public
/// operations a syscall gateway drives.
pub struct FileSystem {
    disk: SynchDisk,
    free_map_lock: Lock,
    directory_lock: Lock,
    registry: OpenFilesRegistry,
    stats: Stats,
}

impl FileSystem {
    /// Builds a file system over `disk`. When `format` is set the disk is
    /// treated as blank and a fresh free map plus empty root directory are
    /// laid down at their fixed sectors, mirroring the constructor in
    /// `file_system.cc`.
    pub fn new(disk: SynchDisk, format: bool) -> KernelResult<Self> {
        let stats = Stats::new();
        if format {
            log::info!("formatting file system");
            let mut free_map = Bitmap::new(NUM_SECTORS);
            free_map.mark(FREE_MAP_SECTOR as usize);
            free_map.mark(DIRECTORY_SECTOR as usize);

            let mut free_map_header = FileHeader::new();
            free_map_header
                .allocate(&mut free_map, FREE_MAP_FILE_SIZE)
                .expect("free map file does not fit on a freshly formatted disk");
            let mut directory_header = FileHeader::new();
            directory_header
                .allocate(&mut free_map, Directory::byte_size())
                .expect("directory file does not fit on a freshly formatted disk");

            free_map_header.write_back(&disk, FREE_MAP_SECTOR, &stats);
            directory_header.write_back(&disk, DIRECTORY_SECTOR, &stats);

            write_bytes_at(&disk, &stats, &directory_header, 0, &Directory::new().to_bytes());
            write_bytes_at(&disk, &stats, &free_map_header, 0, &free_map.to_bytes());
            // free map's own bitmap changed (the sectors just allocated for
            // these two headers), so persist it again now that it is final.
            free_map_header.write_back(&disk, FREE_MAP_SECTOR, &stats);
        }

        Ok(Self {
            disk,
            free_map_lock: Lock::new("free-map"),
            directory_lock: Lock::new("directory"),
            registry: OpenFilesRegistry::new(),
            stats,
        })
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    /// Serializes the backing disk image, for the CLI driver to persist
    /// `DISK` to the host file system between runs.
    pub fn disk_bytes(&self) -> Vec<u8> {
        self.disk.to_bytes()
    }

    fn read_header(&self, sector: u32) -> FileHeader {
        let mut header = FileHeader::new();
        header.fetch_from(&self.disk, sector, &self.stats);
        header
    }

    fn read_whole(&self, header: &FileHeader) -> Vec<u8> {
        let mut buf = vec![0u8; header.num_bytes()];
        read_bytes_at(&self.disk, &self.stats, header, 0, &mut buf);
        buf
    }

    fn load_free_map(&self) -> (FileHeader, Bitmap) {
        let header = self.read_header(FREE_MAP_SECTOR);
        let bytes = self.read_whole(&header);
        (header, Bitmap::from_bytes(&bytes, NUM_SECTORS))
    }

    fn store_free_map(&self, header: &mut FileHeader, free_map: &Bitmap) {
        write_bytes_at(&self.disk, &self.stats, header, 0, &free_map.to_bytes());
        header.write_back(&self.disk, FREE_MAP_SECTOR, &self.stats);
    }

    fn load_directory(&self) -> (FileHeader, Directory) {
        let header = self.read_header(DIRECTORY_SECTOR);
        let bytes = self.read_whole(&header);
        (header, Directory::from_bytes(&bytes))
    }

    fn store_directory(&self, header: &mut FileHeader, directory: &Directory) {
        write_bytes_at(&self.disk, &self.stats, header, 0, &directory.to_bytes());
        header.write_back(&self.disk, DIRECTORY_SECTOR, &self.stats);
    }

    /// Creates a file of `initial_size` bytes. All-or-nothing: either the
    /// directory entry, the header, and the free map all end up updated, or
    /// none of them do.
    pub fn create(&self, name: &str, initial_size: usize) -> KernelResult<()> {
        if name.as_bytes().len() > FILE_NAME_MAX_LEN {
            return Err(KernelError::NameTooLong(name.to_string()));
        }

        self.directory_lock.acquire(0);
        let (mut directory_header, mut directory) = self.load_directory();
        if directory.find(name).is_some() {
            self.directory_lock.release();
            return Err(KernelError::FileAlreadyExists(name.to_string()));
        }

        self.free_map_lock.acquire(0);
        let (mut free_map_header, mut free_map) = self.load_free_map();

        let result = (|| -> KernelResult<u32> {
            let header_sector = free_map.find().ok_or(KernelError::NoFreeSector)? as u32;
            let mut header = FileHeader::new();
            if let Err(e) = header.allocate(&mut free_map, initial_size) {
                free_map.clear(header_sector as usize);
                return Err(e);
            }
            if !directory.add(name, header_sector) {
                header.deallocate(&mut free_map);
                free_map.clear(header_sector as usize);
                return Err(KernelError::DirectoryFull);
            }
            header.write_back(&self.disk, header_sector, &self.stats);
            Ok(header_sector)
        })();

        match result {
            Ok(header_sector) => {
                self.store_free_map(&mut free_map_header, &free_map);
                self.store_directory(&mut directory_header, &directory);
                log::info!("created file `{name}` ({initial_size} bytes, header sector {header_sector})");
                self.free_map_lock.release();
                self.directory_lock.release();
                Ok(())
            }
            Err(e) => {
                self.free_map_lock.release();
                self.directory_lock.release();
                Err(e)
            }
        }
    }

    /// Opens `name`, sharing the in-memory `FileInfo` with any other thread
    /// that already has it open.
    pub fn open(&self, name: &str) -> KernelResult<OpenFile> {
        if let Some((id, info)) = self.registry.find_available(name) {
            self.registry.incref(id);
            return Ok(OpenFile::new(id, info));
        }

        self.directory_lock.acquire(0);
        let (_, directory) = self.load_directory();
        let sector = directory.find(name);
        self.directory_lock.release();
        let sector = sector.ok_or_else(|| KernelError::FileNotFound(name.to_string()))?;

        // Another thread may have opened it between the registry check above
        // and now; re-check before inserting a duplicate entry.
        if let Some((id, info)) = self.registry.find_available(name) {
            self.registry.incref(id);
            return Ok(OpenFile::new(id, info));
        }

        let header = self.read_header(sector);
        let (id, info) = self.registry.insert(name.to_string(), sector, header)?;
        Ok(OpenFile::new(id, info))
    }

    /// Closes a handle. Performs the deferred delete if this was the last
    /// open handle onto a file `remove` had already unlinked.
    pub fn close(&self, open_file: OpenFile) {
        {
            let header = open_file.info.header.lock().unwrap();
            header.write_back(&self.disk, open_file.info.header_sector, &self.stats);
        }
        if self.registry.decref(open_file.global_id) {
            self.finish_delete(&open_file.info);
        }
    }

    fn finish_delete(&self, info: &FileInfo) {
        self.free_map_lock.acquire(0);
        let (mut free_map_header, mut free_map) = self.load_free_map();
        {
            let mut header = info.header.lock().unwrap();
            header.deallocate(&mut free_map);
        }
        free_map.clear(info.header_sector as usize);
        self.store_free_map(&mut free_map_header, &free_map);
        self.free_map_lock.release();
        log::info!("deferred delete of `{}` completed", info.name);
    }

    /// Unlinks `name` from the directory. If the file is currently open,
    /// deletion is deferred to the last matching `close`.
    pub fn remove(&self, name: &str) -> KernelResult<()> {
        self.directory_lock.acquire(0);
        let (mut directory_header, mut directory) = self.load_directory();
        let Some(sector) = directory.find(name) else {
            self.directory_lock.release();
            return Err(KernelError::FileNotFound(name.to_string()));
        };
        directory.remove(name);
        self.store_directory(&mut directory_header, &directory);
        self.directory_lock.release();

        if let Some((_, info)) = self.registry.find_available(name) {
            info.mark_unavailable();
            return Ok(());
        }

        self.free_map_lock.acquire(0);
        let (mut free_map_header, mut free_map) = self.load_free_map();
        let mut header = self.read_header(sector);
        header.deallocate(&mut free_map);
        free_map.clear(sector as usize);
        self.store_free_map(&mut free_map_header, &free_map);
        self.free_map_lock.release();
        Ok(())
    }

    /// `Extend(globalId, newSize)`: grows an open file's header to cover
    /// `new_size` bytes, allocating new data/indirection sectors through the
    /// free map as needed. On failure the in-memory header is refetched from
    /// disk to restore it to what is actually there, rather than left
    /// holding whatever partial state `FileHeader::extend_file` left behind.
    pub fn extend(&self, open_file: &OpenFile, new_size: usize) -> KernelResult<()> {
        self.free_map_lock.acquire(0);
        let (mut free_map_header, mut free_map) = self.load_free_map();
        let mut header = open_file.info.header.lock().unwrap();
        let result = header.extend_file(&mut free_map, new_size);
        match result {
            Ok(()) => {
                self.store_free_map(&mut free_map_header, &free_map);
                header.write_back(&self.disk, open_file.info.header_sector, &self.stats);
            }
            Err(_) => {
                *header = self.read_header(open_file.info.header_sector);
            }
        }
        drop(header);
        self.free_map_lock.release();
        result
    }

    pub fn list(&self) -> Vec<String> {
        self.directory_lock.acquire(0);
        let (_, directory) = self.load_directory();
        self.directory_lock.release();
        directory.list().into_iter().map(|(name, _)| name).collect()
    }

    /// Walks the free map, directory, and every directory entry's header,
    /// logging anything that looks inconsistent. Unspecified return value by
    /// design (SPEC_FULL.md §9's `Print`/`Check` are debug-only stubs in the
    /// original); we log findings instead of returning a verdict type no
    /// caller in scope consumes.
    pub fn check(&self) {
        self.free_map_lock.acquire(0);
        let (_, free_map) = self.load_free_map();
        self.free_map_lock.release();

        self.directory_lock.acquire(0);
        let (_, directory) = self.load_directory();
        self.directory_lock.release();

        log::debug!(
            "check: {} sector(s) free of {NUM_SECTORS}",
            free_map.count_clear()
        );
        for (name, sector) in directory.list() {
            let header = self.read_header(sector);
            log::debug!("check: `{name}` at sector {sector}, {} bytes", header.num_bytes());
        }
    }

    /// Logs the free map, the directory, and every file header's debug dump.
    pub fn print(&self) {
        self.directory_lock.acquire(0);
        let (directory_header, directory) = self.load_directory();
        directory_header.debug_dump();
        for (name, sector) in directory.list() {
            log::debug!("print: `{name}`");
            self.read_header(sector).debug_dump();
        }
        self.directory_lock.release();
    }

    /// Reads up to `buf.len()` bytes starting at `open_file`'s current
    /// position, advancing it by the amount actually read.
    pub fn read(&self, open_file: &OpenFile, buf: &mut [u8]) -> usize {
        open_file.info.sync.begin_read();
        let header = open_file.info.header.lock().unwrap();
        let pos = open_file.position() as usize;
        let available = header.num_bytes().saturating_sub(pos);
        let to_read = available.min(buf.len());
        read_bytes_at(&self.disk, &self.stats, &header, pos, &mut buf[..to_read]);
        drop(header);
        open_file.advance(to_read as u32);
        open_file.info.sync.end_read();
        to_read
    }

    /// Writes `data` at `open_file`'s current position, extending the file
    /// (and allocating new data sectors) if the write runs past the current
    /// end of file.
    pub fn write(&self, open_file: &OpenFile, data: &[u8]) -> KernelResult<usize> {
        open_file.info.sync.begin_write();
        let result = (|| -> KernelResult<usize> {
            let pos = open_file.position() as usize;
            let end = pos + data.len();
            if end > open_file.info.header.lock().unwrap().num_bytes() {
                self.extend(open_file, end)?;
            }
            let header = open_file.info.header.lock().unwrap();
            write_bytes_at(&self.disk, &self.stats, &header, pos, data);
            Ok(data.len())
        })();
        open_file.info.sync.end_write();
        if let Ok(written) = result {
            open_file.advance(written as u32);
        }
        result
    }
}

fn read_bytes_at(disk: &SynchDisk, stats: &Stats, header: &FileHeader, start: usize, buf: &mut [u8]) {
    let mut done = 0;
    while done < buf.len() {
        let offset = start + done;
        let sector = header.byte_to_sector(offset);
        let sector_offset = offset % SECTOR_SIZE;
        let chunk = (SECTOR_SIZE - sector_offset).min(buf.len() - done);
        let data = disk.read_sector(sector, stats);
        buf[done..done + chunk].copy_from_slice(&data[sector_offset..sector_offset + chunk]);
        done += chunk;
    }
}

fn write_bytes_at(disk: &SynchDisk, stats: &Stats, header: &FileHeader, start: usize, data: &[u8]) {
    let mut done = 0;
    while done < data.len() {
        let offset = start + done;
        let sector = header.byte_to_sector(offset);
        let sector_offset = offset % SECTOR_SIZE;
        let chunk = (SECTOR_SIZE - sector_offset).min(data.len() - done);
        let mut sector_data = if chunk < SECTOR_SIZE {
            disk.read_sector(sector, stats)
        } else {
            [0u8; SECTOR_SIZE]
        };
        sector_data[sector_offset..sector_offset + chunk].copy_from_slice(&data[done..done + chunk]);
        disk.write_sector(sector, &sector_data, stats);
        done += chunk;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fresh_fs() -> FileSystem {
        FileSystem::new(SynchDisk::new(), true).unwrap()
    }

    #[test]
    fn create_open_write_read_remove() {
        let fs = fresh_fs();
        fs.create("hello", 0).unwrap();
        let handle = fs.open("hello").unwrap();
        fs.write(&handle, b"hello world").unwrap();
        handle.seek(0);
        let mut buf = [0u8; 11];
        let n = fs.read(&handle, &mut buf);
        assert_eq!(n, 11);
        assert_eq!(&buf, b"hello world");
        fs.close(handle);
        fs.remove("hello").unwrap();
        assert!(fs.list().is_empty());
    }

    #[test]
    fn deferred_delete_waits_for_last_close() {
        let fs = fresh_fs();
        fs.create("a", 0).unwrap();
        let h1 = fs.open("a").unwrap();
        let h2 = fs.open("a").unwrap();
        fs.remove("a").unwrap();
        assert!(fs.list().is_empty(), "directory entry removed immediately");
        fs.write(&h1, b"still writable while open").unwrap();
        fs.close(h1);
        fs.close(h2);
    }

    #[test]
    fn write_past_eof_extends_file() {
        let fs = fresh_fs();
        fs.create("grows", 0).unwrap();
        let handle = fs.open("grows").unwrap();
        let big = vec![7u8; SECTOR_SIZE * 3 + 5];
        fs.write(&handle, &big).unwrap();
        handle.seek(0);
        let mut buf = vec![0u8; big.len()];
        let n = fs.read(&handle, &mut buf);
        assert_eq!(n, big.len());
        assert_eq!(buf, big);
        fs.close(handle);
    }

    #[test]
    fn create_rejects_duplicate_name() {
        let fs = fresh_fs();
        fs.create("dup", 10).unwrap();
        let err = fs.create("dup", 10).unwrap_err();
        assert_eq!(err, KernelError::FileAlreadyExists("dup".to_string()));
    }

    #[test]
    fn open_missing_file_fails() {
        let fs = fresh_fs();
        let err = fs.open("nope").unwrap_err();
        assert_eq!(err, KernelError::FileNotFound("nope".to_string()));
    }
}
