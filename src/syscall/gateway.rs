//! User/kernel memory transfer (`SPEC_FULL.md` §4.6): `ReadBufferFromUser`,
//! `WriteBufferToUser`, `ReadStringFromUser`, `WriteStringToUser`, all built
//! on a single-byte `ReadMem`/`WriteMem` primitive that retries (up to four
//! times) through the page-fault path when a virtual address isn't yet
//! mapped.
//!
//! The MIPS-like instruction interpreter that would normally own the
//! register file and raw `ReadMem`/`WriteMem` is out of scope; what is in
//! scope is translating a user virtual address through a thread's
//! `AddressSpace` page table and the shared `Mmu`, which is exactly what
//! these functions do.

use crate::errors::{KernelError, KernelResult};
use crate::kernel::Kernel;
use crate::param::PAGE_SIZE;
use crate::vm::SpaceId;

const MAX_MEM_RETRIES: usize = 4;

/// Translates `vaddr`, retrying through the page-fault path when unmapped,
/// and marks the owning `TranslationEntry`'s `use` bit (and `dirty`, for a
/// write) the way the original's `Translate(addr, ..., writing)` does --
/// this is what `EnhancedClock` and eviction's dirty check (`apply_eviction`)
/// actually see.
fn translate(kernel: &Kernel, space_id: SpaceId, vaddr: u32, is_write: bool) -> KernelResult<usize> {
    let vpn = vaddr as usize / PAGE_SIZE;
    for _ in 0..MAX_MEM_RETRIES {
        let frame = kernel.space_table.with_mut(space_id, |space| {
            let entry = space.page_table.get_mut(vpn)?;
            if !entry.valid {
                return None;
            }
            entry.use_bit = true;
            if is_write {
                entry.dirty = true;
            }
            Some(entry.physical_page as usize)
        });
        if let Some(frame) = frame {
            return Ok(frame);
        }
        kernel.page_fault(space_id, vaddr)?;
    }
    Err(KernelError::BadUserPointer(vaddr))
}

fn read_byte(kernel: &Kernel, space_id: SpaceId, vaddr: u32) -> KernelResult<u8> {
    let frame = translate(kernel, space_id, vaddr, false)?;
    let offset = vaddr as usize % PAGE_SIZE;
    let bytes = kernel.mmu.lock().unwrap().memory.read_frame(frame);
    Ok(bytes[offset])
}

fn write_byte(kernel: &Kernel, space_id: SpaceId, vaddr: u32, byte: u8) -> KernelResult<()> {
    let frame = translate(kernel, space_id, vaddr, true)?;
    let offset = vaddr as usize % PAGE_SIZE;
    kernel.mmu.lock().unwrap().memory.write_frame_at(frame, offset, &[byte]);
    Ok(())
}

/// `ReadBufferFromUser`: copies `len` bytes starting at `addr` into a fresh
/// kernel-owned buffer.
pub fn read_buffer_from_user(kernel: &Kernel, space_id: SpaceId, addr: u32, len: usize) -> KernelResult<Vec<u8>> {
    let mut buf = Vec::with_capacity(len);
    for i in 0..len {
        buf.push(read_byte(kernel, space_id, addr + i as u32)?);
    }
    Ok(buf)
}

/// `WriteBufferToUser`: copies `data` to user memory starting at `addr`.
pub fn write_buffer_to_user(kernel: &Kernel, space_id: SpaceId, addr: u32, data: &[u8]) -> KernelResult<()> {
    for (i, &byte) in data.iter().enumerate() {
        write_byte(kernel, space_id, addr + i as u32, byte)?;
    }
    Ok(())
}

/// `ReadStringFromUser`: reads a NUL-terminated string, failing if it is not
/// terminated within `max_len` bytes.
pub fn read_string_from_user(kernel: &Kernel, space_id: SpaceId, addr: u32, max_len: usize) -> KernelResult<String> {
    let mut bytes = Vec::new();
    for i in 0..max_len {
        let byte = read_byte(kernel, space_id, addr + i as u32)?;
        if byte == 0 {
            return String::from_utf8(bytes).map_err(|_| KernelError::BadUserPointer(addr));
        }
        bytes.push(byte);
    }
    Err(KernelError::BadUserPointer(addr))
}

/// `WriteStringToUser`: writes `s` followed by a NUL terminator.
pub fn write_string_to_user(kernel: &Kernel, space_id: SpaceId, addr: u32, s: &str) -> KernelResult<()> {
    write_buffer_to_user(kernel, space_id, addr, s.as_bytes())?;
    write_byte(kernel, space_id, addr + s.len() as u32, 0)
}
