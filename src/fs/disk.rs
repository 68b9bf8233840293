//! The simulated disk: a flat, sector-addressed byte array with synchronized
//! access, the one piece of `SPEC_FULL.md` §6 ("Disk image") this crate
//! owns directly (the disk *controller*/interrupt simulation proper is the
//! out-of-scope collaborator; what's left in scope is the byte store and
//! the synchronization wrapping it, which the file system depends on).

use std::sync::Mutex;

use crate::param::{NUM_SECTORS, SECTOR_SIZE};
use crate::stats::Stats;

/// One on-disk sector's worth of bytes.
pub type SectorData = [u8; SECTOR_SIZE];

/// A synchronized, sector-addressed disk image. Reads and writes are
/// serialized through a single internal lock, mirroring `kernel-rs`'s
/// `SynchDisk`/`Bio` layer sitting in front of the raw device.
pub struct SynchDisk {
    sectors: Mutex<Vec<SectorData>>,
}

impl SynchDisk {
    /// A fresh, zeroed disk image of `NUM_SECTORS` sectors.
    pub fn new() -> Self {
        Self {
            sectors: Mutex::new(vec![[0u8; SECTOR_SIZE]; NUM_SECTORS]),
        }
    }

    /// Loads a disk image from a flat byte buffer (e.g. read from a host
    /// file via the `-f`/format flag's counterpart, or a prior `-cp`'d
    /// image). Panics if `bytes.len()` does not exactly match the disk
    /// geometry -- a corrupt disk image is a programmer-contract error
    /// (SPEC_FULL.md §7, item 5), not a recoverable one.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        assert_eq!(
            bytes.len(),
            NUM_SECTORS * SECTOR_SIZE,
            "disk image has wrong size"
        );
        let mut sectors = vec![[0u8; SECTOR_SIZE]; NUM_SECTORS];
        for (i, sector) in sectors.iter_mut().enumerate() {
            sector.copy_from_slice(&bytes[i * SECTOR_SIZE..(i + 1) * SECTOR_SIZE]);
        }
        Self {
            sectors: Mutex::new(sectors),
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let sectors = self.sectors.lock().unwrap();
        let mut out = Vec::with_capacity(NUM_SECTORS * SECTOR_SIZE);
        for sector in sectors.iter() {
            out.extend_from_slice(sector);
        }
        out
    }

    pub fn read_sector(&self, sector: u32, stats: &Stats) -> SectorData {
        let sectors = self.sectors.lock().unwrap();
        stats.disk_read();
        log::trace!("disk: read sector {sector}");
        sectors[sector as usize]
    }

    pub fn write_sector(&self, sector: u32, data: &SectorData, stats: &Stats) {
        let mut sectors = self.sectors.lock().unwrap();
        sectors[sector as usize] = *data;
        stats.disk_write();
        log::trace!("disk: wrote sector {sector}");
    }
}

impl Default for SynchDisk {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_round_trips() {
        let disk = SynchDisk::new();
        let stats = Stats::new();
        let mut data = [0u8; SECTOR_SIZE];
        data[0] = 0xAB;
        disk.write_sector(5, &data, &stats);
        assert_eq!(disk.read_sector(5, &stats)[0], 0xAB);
        assert_eq!(stats.snapshot().num_disk_writes, 1);
        assert_eq!(stats.snapshot().num_disk_reads, 1);
    }

    #[test]
    fn bytes_round_trip() {
        let disk = SynchDisk::new();
        let stats = Stats::new();
        let mut data = [0u8; SECTOR_SIZE];
        data[3] = 7;
        disk.write_sector(2, &data, &stats);
        let bytes = disk.to_bytes();
        let reloaded = SynchDisk::from_bytes(&bytes);
        assert_eq!(reloaded.read_sector(2, &stats)[3], 7);
    }
}
