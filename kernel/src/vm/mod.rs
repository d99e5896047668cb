//! Virtual memory: per-process address spaces, a software-managed TLB,
//! the physical-frame coremap, and the swap engine that backs it.
//! Grounded on upstream `userprog/address_space.cc`, `userprog/swap.cc`,
//! `userprog/transfer.cc`, and `lib/coremap.cc`; `machine/mmu.hh` for the
//! TLB's shape and size. Active only when `BootConfig::features.userprog`
//! is set, same as upstream's `-DUSER_PROGRAM`/`-DVM` build.

pub mod address_space;
pub mod coremap;
pub mod executable;
pub mod page_table;
pub mod swap;
pub mod tlb;

pub use address_space::AddressSpace;
pub use coremap::Coremap;
pub use page_table::{PageTable, PageTableEntry};
pub use tlb::Tlb;

use std::fmt;

use crate::fs::FsError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmError {
    /// The executable's magic number didn't match; not a loadable image.
    BadExecutable,
    /// A page fault occurred for a virtual page beyond the address
    /// space's `num_pages`.
    InvalidVirtualAddress,
    /// No physical frame was available and none could be evicted (swap
    /// disabled and memory full).
    NoFreeFrames,
    /// `ReadBufferFromUser`/`WriteBufferToUser` exhausted their retry
    /// budget translating a user address.
    TransferFailed,
    Fs(FsError),
}

impl fmt::Display for VmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VmError::BadExecutable => write!(f, "not a valid executable image"),
            VmError::InvalidVirtualAddress => write!(f, "virtual address out of range"),
            VmError::NoFreeFrames => write!(f, "no free physical frames"),
            VmError::TransferFailed => write!(f, "could not translate user address"),
            VmError::Fs(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for VmError {}

impl From<FsError> for VmError {
    fn from(e: FsError) -> Self {
        VmError::Fs(e)
    }
}
