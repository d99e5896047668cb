//! The simulated machine: disk, console, statistics, and the interrupt/event
//! queue that stands in for real hardware. Everything above this module
//! talks to the machine only through these types; nothing here knows about
//! threads, files, or address spaces.

pub mod console;
pub mod disk;
pub mod interrupt;
pub mod memory;
pub mod rng;
pub mod stats;

/// Bytes per disk sector, and so also the simulated page size (spec.md §2:
/// "sector size doubles as the paging unit"). Nachos fixes this at 128.
pub const SECTOR_SIZE: usize = 128;
