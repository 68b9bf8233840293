//! Parses the Nachos Object Code Format header every executable file starts
//! with. Treated as an external collaborator's contract in `SPEC_FULL.md`
//! §1 ("the NOFF executable header parser"); this is the minimal support
//! code needed to read that contract's bytes, not a general loader.

use zerocopy::{AsBytes, FromBytes};

use crate::errors::{KernelError, KernelResult};

pub const NOFF_MAGIC: u32 = 0xBADFAD;

#[repr(C)]
#[derive(Clone, Copy, AsBytes, FromBytes)]
struct RawSegment {
    virtual_addr: u32,
    in_file_addr: u32,
    size: u32,
}

#[repr(C)]
#[derive(Clone, Copy, AsBytes, FromBytes)]
struct RawNoffHeader {
    magic: u32,
    code: RawSegment,
    init_data: RawSegment,
    uninit_data: RawSegment,
}

pub const NOFF_HEADER_SIZE: usize = core::mem::size_of::<RawNoffHeader>();

#[derive(Clone, Copy, Debug, Default)]
pub struct Segment {
    pub virtual_addr: u32,
    pub in_file_addr: u32,
    pub size: u32,
}

impl From<RawSegment> for Segment {
    fn from(raw: RawSegment) -> Self {
        Self {
            virtual_addr: raw.virtual_addr,
            in_file_addr: raw.in_file_addr,
            size: raw.size,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct NoffHeader {
    pub code: Segment,
    pub init_data: Segment,
    pub uninit_data: Segment,
}

impl NoffHeader {
    /// Parses `bytes` (must be at least `NOFF_HEADER_SIZE` long). Rejects
    /// anything whose magic doesn't match -- this crate doesn't attempt the
    /// byte-swapped-magic recovery the original driver's cross-endian build
    /// supported, since every host this runs on is little-endian.
    pub fn parse(bytes: &[u8]) -> KernelResult<Self> {
        let raw = RawNoffHeader::read_from(&bytes[..NOFF_HEADER_SIZE])
            .ok_or_else(|| KernelError::InvalidExecutable("truncated NOFF header".to_string()))?;
        if raw.magic != NOFF_MAGIC {
            return Err(KernelError::InvalidExecutable(format!(
                "bad NOFF magic {:#x}",
                raw.magic
            )));
        }
        Ok(Self {
            code: raw.code.into(),
            init_data: raw.init_data.into(),
            uninit_data: raw.uninit_data.into(),
        })
    }

    pub fn total_size(&self) -> u32 {
        self.code.size + self.init_data.size + self.uninit_data.size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header_bytes(code_size: u32, init_size: u32, uninit_size: u32) -> Vec<u8> {
        let raw = RawNoffHeader {
            magic: NOFF_MAGIC,
            code: RawSegment {
                virtual_addr: 0,
                in_file_addr: NOFF_HEADER_SIZE as u32,
                size: code_size,
            },
            init_data: RawSegment {
                virtual_addr: code_size,
                in_file_addr: NOFF_HEADER_SIZE as u32 + code_size,
                size: init_size,
            },
            uninit_data: RawSegment {
                virtual_addr: code_size + init_size,
                in_file_addr: 0,
                size: uninit_size,
            },
        };
        raw.as_bytes().to_vec()
    }

    #[test]
    fn parses_well_formed_header() {
        let bytes = header_bytes(100, 20, 8);
        let header = NoffHeader::parse(&bytes).unwrap();
        assert_eq!(header.code.size, 100);
        assert_eq!(header.total_size(), 128);
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = header_bytes(10, 0, 0);
        bytes[0] = 0;
        assert!(NoffHeader::parse(&bytes).is_err());
    }
}
