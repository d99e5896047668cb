//! User-kernel argument transfer: copying syscall arguments and results
//! across the virtual-address boundary one byte at a time. Grounded on
//! upstream `ReadBufferFromUser`/`ReadStringFromUser`/
//! `WriteBufferToUser`/`WriteStringToUser` (`userprog/transfer.cc`).
//!
//! Upstream's versions retry the whole transfer, up to `maxIter` times,
//! because `Machine::ReadMem`/`WriteMem` can report a TLB miss that the
//! kernel must service and then retry from scratch. Here
//! [`crate::vm::AddressSpace::translate`] already resolves a miss (via
//! the page-fault path) before returning, so there is nothing left for
//! this layer to retry — a single pass over the bytes is equivalent.

use std::sync::Arc;

use crate::thread::Thread;
use crate::vm::{AddressSpace, VmError};

/// Reads `len` bytes starting at user virtual address `vaddr`.
pub fn read_buffer_from_user(
    space: &Arc<AddressSpace>,
    me: &Arc<Thread>,
    vaddr: u32,
    len: usize,
) -> Result<Vec<u8>, VmError> {
    let mut buf = Vec::with_capacity(len);
    for i in 0..len as u32 {
        buf.push(space.read_user_byte(me, vaddr + i)?);
    }
    Ok(buf)
}

/// Writes `data` starting at user virtual address `vaddr`.
pub fn write_buffer_to_user(space: &Arc<AddressSpace>, me: &Arc<Thread>, vaddr: u32, data: &[u8]) -> Result<(), VmError> {
    for (i, &byte) in data.iter().enumerate() {
        space.write_user_byte(me, vaddr + i as u32, byte)?;
    }
    Ok(())
}

/// Reads a NUL-terminated string of at most `max_len` bytes starting at
/// user virtual address `vaddr`. A missing terminator within `max_len`
/// bytes is not an error — the read simply stops there, matching
/// upstream's bounded scan.
pub fn read_string_from_user(space: &Arc<AddressSpace>, me: &Arc<Thread>, vaddr: u32, max_len: usize) -> Result<String, VmError> {
    let mut bytes = Vec::new();
    for i in 0..max_len as u32 {
        let byte = space.read_user_byte(me, vaddr + i)?;
        if byte == 0 {
            break;
        }
        bytes.push(byte);
    }
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Writes `s` followed by a NUL terminator starting at user virtual
/// address `vaddr`.
pub fn write_string_to_user(space: &Arc<AddressSpace>, me: &Arc<Thread>, vaddr: u32, s: &str) -> Result<(), VmError> {
    let mut bytes = s.as_bytes().to_vec();
    bytes.push(0);
    write_buffer_to_user(space, me, vaddr, &bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BootConfig, Features, SwapPolicy};
    use crate::fs::FileSystem;
    use crate::machine::disk::SynchDisk;
    use crate::machine::memory::PhysicalMemory;
    use crate::machine::stats::Statistics;
    use crate::thread::thread::DEFAULT_PRIORITY;
    use crate::thread::Scheduler;
    use crate::vm::Coremap;

    fn dummy_space() -> (Arc<AddressSpace>, Arc<Thread>) {
        let scheduler = Scheduler::new();
        let me = Arc::new(Thread::new("t", DEFAULT_PRIORITY));
        let dir = std::env::temp_dir().join(format!("nachos-transfer-test-{:?}", std::thread::current().id()));
        let disk = Arc::new(SynchDisk::open(&dir, 64).unwrap());
        let stats = Arc::new(Statistics::new());
        let fs = Arc::new(FileSystem::new(disk, scheduler.clone(), stats.clone(), 64, true).unwrap());
        let memory = Arc::new(PhysicalMemory::new(8));
        let config = BootConfig {
            features: Features {
                filesys: true,
                userprog: true,
                use_tlb: true,
                demand_load: true,
                swap: true,
            },
            swap_policy: SwapPolicy::Fifo,
            num_phys_pages: 8,
            disk_path: String::new(),
            random_seed: 1,
            format: false,
            program: None,
        };
        fs.create(&me, "prog", 0, false).unwrap();
        let file = fs.open(&me, "prog").unwrap();
        let mut header = [0u8; 40];
        header[0..4].copy_from_slice(&0x0BAD_FAD0u32.to_ne_bytes());
        file.write_at(&me, &header, 0).unwrap();
        let file = fs.open(&me, "prog").unwrap();
        let space = AddressSpace::new(file, &me, &config, Arc::new(Coremap::new(8)), fs, stats, scheduler, memory).unwrap();
        (space, me)
    }

    #[test]
    fn buffer_round_trips_through_user_memory() {
        let (space, me) = dummy_space();
        write_buffer_to_user(&space, &me, 0, b"hello").unwrap();
        let read_back = read_buffer_from_user(&space, &me, 0, 5).unwrap();
        assert_eq!(read_back, b"hello");
    }

    #[test]
    fn string_round_trips_and_stops_at_nul() {
        let (space, me) = dummy_space();
        write_string_to_user(&space, &me, 0, "hi").unwrap();
        let read_back = read_string_from_user(&space, &me, 0, 64).unwrap();
        assert_eq!(read_back, "hi");
    }
}
