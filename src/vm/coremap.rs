//! The global frame table: a reverse map from physical frame number to the
//! address space (and virtual page) currently occupying it.
//!
//! Grounded on `original_source/code/vmem/coremap.cc`/`.hh`. The original's
//! `AddressSpace*` owner pointer becomes a [`SpaceId`] here, per the
//! "cyclic references" design note: the coremap never reaches back into an
//! `AddressSpace` directly, only through the id a [`crate::vm::SpaceTable`]
//! resolves.

use crate::fs::Bitmap;

/// Stable identifier for a live address space; replaces the original's
/// `AddressSpace*` owner pointer in coremap entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SpaceId(u32);

static NEXT_SPACE_ID: std::sync::atomic::AtomicU32 = std::sync::atomic::AtomicU32::new(0);

impl SpaceId {
    pub fn fresh() -> Self {
        Self(NEXT_SPACE_ID.fetch_add(1, std::sync::atomic::Ordering::Relaxed))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameOwner {
    pub space: SpaceId,
    pub vpn: u32,
}

/// One entry per physical frame.
pub struct Coremap {
    frames_map: Bitmap,
    owners: Vec<Option<FrameOwner>>,
}

impl Coremap {
    pub fn new(num_frames: usize) -> Self {
        Self {
            frames_map: Bitmap::new(num_frames),
            owners: vec![None; num_frames],
        }
    }

    pub fn num_frames(&self) -> usize {
        self.owners.len()
    }

    pub fn count_clear(&self) -> usize {
        self.frames_map.count_clear()
    }

    pub fn owner(&self, frame: usize) -> Option<FrameOwner> {
        self.owners[frame]
    }

    /// Finds a free frame and assigns it to `(space, vpn)`. `None` if every
    /// frame is occupied -- the caller must run the replacement policy.
    pub fn allocate(&mut self, space: SpaceId, vpn: u32) -> Option<usize> {
        let frame = self.frames_map.find()?;
        self.owners[frame] = Some(FrameOwner { space, vpn });
        Some(frame)
    }

    /// Assigns a specific frame directly, for eager construction where pages
    /// are handed out in page-table order rather than searched for.
    pub fn mark(&mut self, frame: usize, space: SpaceId, vpn: u32) {
        self.frames_map.mark(frame);
        self.owners[frame] = Some(FrameOwner { space, vpn });
    }

    pub fn clear(&mut self, frame: usize) {
        self.frames_map.clear(frame);
        self.owners[frame] = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_then_clear_frees_frame() {
        let mut coremap = Coremap::new(4);
        let space = SpaceId::fresh();
        let frame = coremap.allocate(space, 0).unwrap();
        assert_eq!(coremap.count_clear(), 3);
        assert_eq!(coremap.owner(frame), Some(FrameOwner { space, vpn: 0 }));
        coremap.clear(frame);
        assert_eq!(coremap.count_clear(), 4);
        assert_eq!(coremap.owner(frame), None);
    }

    #[test]
    fn allocate_fails_when_full() {
        let mut coremap = Coremap::new(1);
        let space = SpaceId::fresh();
        coremap.allocate(space, 0).unwrap();
        assert!(coremap.allocate(space, 1).is_none());
    }
}
