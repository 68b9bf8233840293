//! End-to-end scenarios exercising the file system and virtual memory
//! subsystems together through their public `Kernel`/`FileSystem` APIs,
//! rather than one module in isolation.

use nachos::errors::KernelError;
use nachos::fs::{FileSystem, SynchDisk};
use nachos::kernel::Kernel;
use nachos::param::{NUM_DIRECT, NUM_PHYS_PAGES, PAGE_SIZE, SECTOR_SIZE, USER_STACK_SIZE};
use nachos::syscall::gateway;
use nachos::vm::{BuildMode, Fifo, NOFF_HEADER_SIZE, NOFF_MAGIC};

fn fresh_fs() -> FileSystem {
    FileSystem::new(SynchDisk::new(), true).unwrap()
}

fn fresh_kernel(mode: BuildMode) -> Kernel {
    Kernel::new(SynchDisk::new(), true, mode, false, Box::new(Fifo::new(NUM_PHYS_PAGES))).unwrap()
}

/// Lays out a minimal NOFF executable with a single code segment and no
/// initialized/uninitialized data, matching `original_source/code/bin/
/// noff.h`'s layout byte-for-byte (magic, then three `(virtualAddr,
/// inFileAddr, size)` segments).
fn build_noff_executable(code_size: u32) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(NOFF_HEADER_SIZE + code_size as usize);
    bytes.extend_from_slice(&NOFF_MAGIC.to_le_bytes());
    // code segment: virtual_addr=0, in_file_addr=NOFF_HEADER_SIZE, size=code_size
    bytes.extend_from_slice(&0u32.to_le_bytes());
    bytes.extend_from_slice(&(NOFF_HEADER_SIZE as u32).to_le_bytes());
    bytes.extend_from_slice(&code_size.to_le_bytes());
    // init_data segment: empty
    bytes.extend_from_slice(&code_size.to_le_bytes());
    bytes.extend_from_slice(&0u32.to_le_bytes());
    bytes.extend_from_slice(&0u32.to_le_bytes());
    // uninit_data segment: empty
    bytes.extend_from_slice(&code_size.to_le_bytes());
    bytes.extend_from_slice(&0u32.to_le_bytes());
    bytes.extend_from_slice(&0u32.to_le_bytes());
    assert_eq!(bytes.len(), NOFF_HEADER_SIZE);
    bytes.extend(std::iter::repeat(0xAB).take(code_size as usize));
    bytes
}

#[test]
fn create_open_write_read_remove_round_trip() {
    let fs = fresh_fs();
    fs.create("greeting", 0).unwrap();

    let writer = fs.open("greeting").unwrap();
    let n = fs.write(&writer, b"hello, nachos").unwrap();
    assert_eq!(n, 13);
    fs.close(writer);

    let reader = fs.open("greeting").unwrap();
    let mut buf = [0u8; 32];
    let n = fs.read(&reader, &mut buf);
    assert_eq!(&buf[..n], b"hello, nachos");
    fs.close(reader);

    assert!(fs.list().contains(&"greeting".to_string()));
    fs.remove("greeting").unwrap();
    assert!(!fs.list().contains(&"greeting".to_string()));
    assert!(matches!(fs.open("greeting"), Err(KernelError::FileNotFound(name)) if name == "greeting"));
}

#[test]
fn remove_while_open_defers_deletion_until_close() {
    let fs = fresh_fs();
    fs.create("scratch", 0).unwrap();
    let handle = fs.open("scratch").unwrap();
    fs.write(&handle, b"still here").unwrap();

    fs.remove("scratch").unwrap();
    // Unlinked from the directory immediately...
    assert!(!fs.list().contains(&"scratch".to_string()));
    // ...but a second open must fail, and the data already in hand is
    // unaffected, since the header/data sectors are not yet reclaimed.
    assert!(fs.open("scratch").is_err());

    let mut buf = [0u8; 16];
    let n = fs.read(&handle, &mut buf);
    assert_eq!(&buf[..n], b"still here");

    fs.close(handle);
    // Now that the last handle is gone, a fresh file may reuse the name.
    fs.create("scratch", 0).unwrap();
}

#[test]
fn extending_a_file_across_the_indirection_boundary_preserves_its_prefix() {
    let fs = fresh_fs();
    fs.create("big", 0).unwrap();
    let file = fs.open("big").unwrap();

    // One indirection table only reaches NUM_DIRECT data sectors; writing
    // past that forces `FileHeader::extend_file` to allocate a second one.
    let first_chunk = vec![1u8; SECTOR_SIZE];
    fs.write(&file, &first_chunk).unwrap();

    let boundary_size = NUM_DIRECT * SECTOR_SIZE;
    file.seek(boundary_size as u32);
    let second_chunk = vec![2u8; SECTOR_SIZE * 2];
    fs.write(&file, &second_chunk).unwrap();

    file.seek(0);
    let mut buf = vec![0u8; SECTOR_SIZE];
    fs.read(&file, &mut buf);
    assert_eq!(buf, first_chunk);

    file.seek(boundary_size as u32);
    let mut buf = vec![0u8; SECTOR_SIZE * 2];
    fs.read(&file, &mut buf);
    assert_eq!(buf, second_chunk);

    fs.close(file);
}

#[test]
fn a_writer_blocks_concurrent_readers_on_the_same_open_file() {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    let fs = Arc::new(fresh_fs());
    fs.create("shared", 0).unwrap();

    let writer = fs.open("shared").unwrap();
    // Grab the write role directly through the handle's shared RWFile, to
    // hold it open across the assertion without a real syscall boundary.
    writer.info.sync.begin_write();

    let fs2 = Arc::clone(&fs);
    let read_done = Arc::new(AtomicBool::new(false));
    let rd2 = Arc::clone(&read_done);
    let handle = thread::spawn(move || {
        let reader = fs2.open("shared").unwrap();
        let mut buf = [0u8; 8];
        fs2.read(&reader, &mut buf); // blocks until the writer finishes
        rd2.store(true, Ordering::SeqCst);
        fs2.close(reader);
    });

    thread::sleep(Duration::from_millis(30));
    assert!(!read_done.load(Ordering::SeqCst), "reader must wait for the writer");

    writer.info.sync.end_write();
    handle.join().unwrap();
    assert!(read_done.load(Ordering::SeqCst));
    fs.close(writer);
}

#[test]
fn demand_loading_with_swap_returns_every_frame_on_exit() {
    // `NUM_PHYS_PAGES` frames worth of memory is not enough to hold this
    // executable resident at once, so faulting in every page forces repeated
    // eviction (and swap-out) under `BuildMode::DemandSwap`.
    let kernel = fresh_kernel(BuildMode::DemandSwap);
    let code_size = (NUM_PHYS_PAGES as u32 + 8) * PAGE_SIZE as u32;
    let image = build_noff_executable(code_size);

    kernel.fs.create("big-prog", image.len()).unwrap();
    let file = kernel.fs.open("big-prog").unwrap();
    kernel.fs.write(&file, &image).unwrap();
    kernel.fs.close(file);

    let exec = kernel.fs.open("big-prog").unwrap();
    let space_id = kernel.exec(exec, 1).unwrap();

    let num_pages = (code_size as usize + USER_STACK_SIZE + PAGE_SIZE - 1) / PAGE_SIZE;
    assert!(num_pages > NUM_PHYS_PAGES, "test should actually exceed physical memory");
    for vpn in 0..num_pages {
        kernel.page_fault(space_id, (vpn * PAGE_SIZE) as u32).unwrap();
    }

    assert!(kernel.coremap.lock().unwrap().count_clear() < NUM_PHYS_PAGES);
    kernel.destroy_address_space(space_id);
    assert_eq!(kernel.coremap.lock().unwrap().count_clear(), NUM_PHYS_PAGES);
}

#[test]
fn written_bytes_survive_eviction_and_reload() {
    // Stamps every page with a distinct byte through the same
    // `read_buffer_from_user`/`write_buffer_to_user` gateway a syscall would
    // use, touching more pages than there are physical frames so the later
    // writes evict the earlier ones. The dirty bit `write_buffer_to_user`
    // sets on each page is what makes `apply_eviction` swap it out instead
    // of discarding it.
    let kernel = fresh_kernel(BuildMode::DemandSwap);
    let code_size = (NUM_PHYS_PAGES as u32 + 4) * PAGE_SIZE as u32;
    let image = build_noff_executable(code_size);

    kernel.fs.create("writer", image.len()).unwrap();
    let file = kernel.fs.open("writer").unwrap();
    kernel.fs.write(&file, &image).unwrap();
    kernel.fs.close(file);

    let exec = kernel.fs.open("writer").unwrap();
    let space_id = kernel.exec(exec, 7).unwrap();

    let num_pages = (code_size as usize + USER_STACK_SIZE + PAGE_SIZE - 1) / PAGE_SIZE;
    assert!(num_pages > NUM_PHYS_PAGES, "test should actually exceed physical memory");

    for vpn in 0..num_pages {
        let byte = (vpn % 251) as u8;
        let addr = (vpn * PAGE_SIZE) as u32;
        gateway::write_buffer_to_user(&kernel, space_id, addr, &[byte; 4]).unwrap();
    }
    assert!(kernel.coremap.lock().unwrap().count_clear() < NUM_PHYS_PAGES);

    for vpn in 0..num_pages {
        let byte = (vpn % 251) as u8;
        let addr = (vpn * PAGE_SIZE) as u32;
        let bytes = gateway::read_buffer_from_user(&kernel, space_id, addr, 4).unwrap();
        assert_eq!(bytes, vec![byte; 4], "page {vpn} lost its contents across eviction");
    }

    kernel.destroy_address_space(space_id);
}
