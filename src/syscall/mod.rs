//! The syscall dispatch table (`SPEC_FULL.md` §4.6).
//!
//! The MIPS-like instruction interpreter that decodes a trap's syscall id
//! and arguments out of registers 2 and 4-7 is out of scope; what belongs
//! to this crate is everything downstream of that decode, so [`Syscall`]
//! carries already-decoded arguments and [`dispatch`] does the rest: FD
//! table lookups, the file system, address-space construction, and the
//! fork/join protocol.

pub mod gateway;

use std::sync::Arc;

use crate::errors::{KernelError, KernelResult};
use crate::kernel::Kernel;
use crate::param::{DEFAULT_PRIORITY, FILE_NAME_MAX_LEN, MAX_EXEC_ARGS, PAGE_SIZE, STACK_REGISTER_SAVE_AREA};
use crate::proc::{self, is_console, Thread, CONSOLE_STDIN, CONSOLE_STDOUT};
use crate::sync::ThreadId;
use crate::vm::SpaceId;

/// Longest argument string `Exec` will copy out of a parent's user memory.
const MAX_ARG_LEN: usize = 256;

#[derive(Debug, Clone)]
pub enum Syscall {
    Halt,
    Exit { status: i32 },
    Exec { name_addr: u32, argv_addr: u32, joinable: bool },
    Join { pid: u32 },
    Create { name_addr: u32 },
    Remove { name_addr: u32 },
    Open { name_addr: u32 },
    Close { fd: i32 },
    Read { buf_addr: u32, size: i32, fd: i32 },
    Write { buf_addr: u32, size: i32, fd: i32 },
}

fn caller_thread(kernel: &Kernel, caller: ThreadId) -> Arc<Thread> {
    kernel
        .threads
        .get(caller)
        .expect("dispatch: syscall from a thread not in the thread table")
}

fn caller_space(thread: &Thread) -> KernelResult<SpaceId> {
    thread
        .space_id
        .lock()
        .unwrap()
        .ok_or_else(|| KernelError::InvalidExecutable("thread has no user address space".into()))
}

fn read_u32(kernel: &Kernel, space: SpaceId, addr: u32) -> KernelResult<u32> {
    let bytes = gateway::read_buffer_from_user(kernel, space, addr, 4)?;
    Ok(u32::from_le_bytes(bytes.try_into().unwrap()))
}

/// Dispatches one decoded syscall, returning the value that would be
/// written to register 2 (`-1` on any `KernelError`). Increments
/// `Stats::num_syscalls` and logs the call, mirroring the original's
/// `DEBUG('s', ...)` trace points.
pub fn dispatch(kernel: &Arc<Kernel>, caller: ThreadId, call: Syscall) -> i32 {
    kernel.fs.stats().syscall();
    log::debug!("syscall: thread {:?} -> {:?}", caller, call);

    match call {
        Syscall::Halt => {
            log::info!("syscall: Halt");
            0
        }
        Syscall::Exit { status } => {
            let thread = caller_thread(kernel, caller);
            if let Ok(space) = caller_space(&thread) {
                kernel.destroy_address_space(space);
            }
            thread.finish(status);
            status
        }
        Syscall::Exec { name_addr, argv_addr, joinable } => {
            match try_exec(kernel, caller, name_addr, argv_addr, joinable) {
                Ok(pid) => pid as i32,
                Err(e) => {
                    log::debug!("syscall: Exec failed: {e}");
                    -1
                }
            }
        }
        Syscall::Join { pid } => match proc::join(&kernel.threads, ThreadId::from_raw(pid as u64)) {
            Ok(status) => status,
            Err(e) => {
                log::debug!("syscall: Join failed: {e}");
                -1
            }
        },
        Syscall::Create { name_addr } => match try_name_op(kernel, caller, name_addr, |name| kernel.fs.create(name, 0)) {
            Ok(()) => 0,
            Err(_) => -1,
        },
        Syscall::Remove { name_addr } => match try_name_op(kernel, caller, name_addr, |name| kernel.fs.remove(name)) {
            Ok(()) => 0,
            Err(_) => -1,
        },
        Syscall::Open { name_addr } => match try_open(kernel, caller, name_addr) {
            Ok(fd) => fd,
            Err(e) => {
                log::debug!("syscall: Open failed: {e}");
                -1
            }
        },
        Syscall::Close { fd } => match try_close(kernel, caller, fd) {
            Ok(()) => 0,
            Err(_) => -1,
        },
        Syscall::Read { buf_addr, size, fd } => match try_read(kernel, caller, buf_addr, size, fd) {
            Ok(n) => n as i32,
            Err(e) => {
                log::debug!("syscall: Read failed: {e}");
                -1
            }
        },
        Syscall::Write { buf_addr, size, fd } => match try_write(kernel, caller, buf_addr, size, fd) {
            Ok(n) => n as i32,
            Err(e) => {
                log::debug!("syscall: Write failed: {e}");
                -1
            }
        },
    }
}

fn try_name_op(
    kernel: &Kernel,
    caller: ThreadId,
    name_addr: u32,
    op: impl FnOnce(&str) -> KernelResult<()>,
) -> KernelResult<()> {
    let thread = caller_thread(kernel, caller);
    let space = caller_space(&thread)?;
    let name = gateway::read_string_from_user(kernel, space, name_addr, FILE_NAME_MAX_LEN + 1)?;
    op(&name)
}

fn try_open(kernel: &Kernel, caller: ThreadId, name_addr: u32) -> KernelResult<i32> {
    let thread = caller_thread(kernel, caller);
    let space = caller_space(&thread)?;
    let name = gateway::read_string_from_user(kernel, space, name_addr, FILE_NAME_MAX_LEN + 1)?;
    let file = kernel.fs.open(&name)?;
    thread.fd_table.lock().unwrap().install(file)
}

fn try_close(kernel: &Kernel, caller: ThreadId, fd: i32) -> KernelResult<()> {
    let thread = caller_thread(kernel, caller);
    let file = thread.fd_table.lock().unwrap().take(fd)?;
    kernel.fs.close(file);
    Ok(())
}

fn try_read(kernel: &Kernel, caller: ThreadId, buf_addr: u32, size: i32, fd: i32) -> KernelResult<usize> {
    if size <= 0 {
        return Err(KernelError::InvalidFd(fd));
    }
    let thread = caller_thread(kernel, caller);
    let space = caller_space(&thread)?;

    let data = if fd == CONSOLE_STDIN {
        let mut buf = vec![0u8; size as usize];
        let n = kernel.console.read_avail(&mut buf);
        buf.truncate(n);
        buf
    } else if is_console(fd) {
        return Err(KernelError::InvalidFd(fd));
    } else {
        let table = thread.fd_table.lock().unwrap();
        let file = table.get(fd)?;
        let mut buf = vec![0u8; size as usize];
        let n = kernel.fs.read(file, &mut buf);
        buf.truncate(n);
        buf
    };

    let n = data.len();
    gateway::write_buffer_to_user(kernel, space, buf_addr, &data)?;
    Ok(n)
}

fn try_write(kernel: &Kernel, caller: ThreadId, buf_addr: u32, size: i32, fd: i32) -> KernelResult<usize> {
    if size <= 0 {
        return Err(KernelError::InvalidFd(fd));
    }
    let thread = caller_thread(kernel, caller);
    let space = caller_space(&thread)?;
    let data = gateway::read_buffer_from_user(kernel, space, buf_addr, size as usize)?;

    if fd == CONSOLE_STDOUT {
        kernel.console.write_done(&data);
        Ok(data.len())
    } else if is_console(fd) {
        Err(KernelError::InvalidFd(fd))
    } else {
        let table = thread.fd_table.lock().unwrap();
        let file = table.get(fd)?;
        kernel.fs.write(file, &data)
    }
}

fn try_exec(kernel: &Arc<Kernel>, caller: ThreadId, name_addr: u32, argv_addr: u32, joinable: bool) -> KernelResult<u32> {
    let parent = caller_thread(kernel, caller);
    let parent_space = caller_space(&parent)?;

    let name = gateway::read_string_from_user(kernel, parent_space, name_addr, FILE_NAME_MAX_LEN + 1)?;
    let mut argv = Vec::new();
    for i in 0..MAX_EXEC_ARGS {
        let ptr = read_u32(kernel, parent_space, argv_addr + (i as u32) * 4)?;
        if ptr == 0 {
            break;
        }
        argv.push(gateway::read_string_from_user(kernel, parent_space, ptr, MAX_ARG_LEN)?);
    }

    let swap_pid = kernel.allocate_pid();
    let exec_file = kernel.fs.open(&name)?;
    let space_id = kernel.exec(exec_file, swap_pid)?;
    write_args_onto_stack(kernel, space_id, &argv)?;

    let kernel = Arc::clone(kernel);
    let thread_name = name.clone();
    let child = proc::fork(&kernel.threads, &kernel.scheduler, thread_name, DEFAULT_PRIORITY, joinable, move |thread| {
        *thread.space_id.lock().unwrap() = Some(space_id);
        kernel.space_table.with(space_id, |space| {
            space.restore_state(&mut kernel.mmu.lock().unwrap());
        });
        log::debug!("exec: `{}` ready to jump to user code", thread.name);
        0
    });
    Ok(child.raw() as u32)
}

/// `WriteArgs`: lays `argv` out just below the new address space's initial
/// stack pointer -- each string, then the pointer array indexing them, then
/// `STACK_REGISTER_SAVE_AREA` bytes of untouched MIPS-ABI save area.
fn write_args_onto_stack(kernel: &Kernel, space_id: SpaceId, argv: &[String]) -> KernelResult<u32> {
    let num_pages = kernel.space_table.with(space_id, |space| space.num_pages());
    let mut addr = (num_pages * PAGE_SIZE) as u32;

    let mut pointers = Vec::with_capacity(argv.len());
    for arg in argv.iter().rev() {
        addr -= (arg.len() + 1) as u32;
        gateway::write_string_to_user(kernel, space_id, addr, arg)?;
        pointers.push(addr);
    }
    pointers.reverse();

    let array_addr = addr - (pointers.len() as u32) * 4;
    for (i, ptr) in pointers.iter().enumerate() {
        gateway::write_buffer_to_user(kernel, space_id, array_addr + (i as u32) * 4, &ptr.to_le_bytes())?;
    }
    Ok(array_addr.saturating_sub(STACK_REGISTER_SAVE_AREA as u32))
}
