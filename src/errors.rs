//! The Rust encoding of the kernel's error taxonomy (see `SPEC_FULL.md` §7).
//!
//! Resource-exhaustion and user-input errors are represented here and
//! propagated with `Result`. Programmer-contract violations and I/O
//! exceptions from the simulated disk are *not* represented here: they
//! `panic!`/`assert!` at the point of violation, matching the original
//! Nachos `ASSERT` idiom.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KernelError {
    #[error("no free sector on disk")]
    NoFreeSector,

    #[error("no free physical frame available")]
    NoFreeFrame,

    #[error("thread's file descriptor table is full")]
    NoFreeFd,

    #[error("directory is full")]
    DirectoryFull,

    #[error("open-files registry is full")]
    RegistryFull,

    #[error("file `{0}` not found")]
    FileNotFound(String),

    #[error("file `{0}` already exists")]
    FileAlreadyExists(String),

    #[error("file name `{0}` exceeds FILE_NAME_MAX_LEN")]
    NameTooLong(String),

    #[error("invalid file descriptor {0}")]
    InvalidFd(i32),

    #[error("requested size {0} exceeds MAX_FILE_SIZE")]
    FileTooLarge(usize),

    #[error("user pointer {0:#x} is not mapped")]
    BadUserPointer(u32),

    #[error("write would touch a read-only page")]
    ReadOnlyViolation,

    #[error("not a valid executable: {0}")]
    InvalidExecutable(String),

    #[error("no joinable thread with pid {0}")]
    NoSuchThread(u32),
}

pub type KernelResult<T> = Result<T, KernelError>;
