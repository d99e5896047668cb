//! The coremap: reverse mapping from physical frame number to the address
//! space and virtual page currently resident there. Grounded on upstream
//! `Coremap` (`lib/coremap.cc`): `Mark`/`Clear`/`Test`/`Find`/`CountClear`
//! carry over directly. Unlike the original's intrusive `fifoFrames`/
//! `clockFrames` linked lists threaded through the page table itself
//! (flagged for replacement), residency order here is one owned
//! `VecDeque<usize>` of frame indices that both the FIFO and CLOCK
//! policies read and rotate — only one policy is ever active in a given
//! build, so there is nothing to keep in sync between two lists.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::vm::address_space::AddressSpace;

struct FrameOwner {
    space: Arc<AddressSpace>,
    vpn: u32,
}

struct CoremapInner {
    owners: Vec<Option<FrameOwner>>,
    order: VecDeque<usize>,
}

pub struct Coremap {
    inner: Mutex<CoremapInner>,
    num_frames: usize,
}

impl Coremap {
    pub fn new(num_frames: usize) -> Self {
        Coremap {
            inner: Mutex::new(CoremapInner {
                owners: (0..num_frames).map(|_| None).collect(),
                order: VecDeque::new(),
            }),
            num_frames,
        }
    }

    pub fn num_frames(&self) -> usize {
        self.num_frames
    }

    /// Claims `which` for `(space, vpn)`, appending it to the residency
    /// order as the most-recently-resident frame.
    pub fn mark(&self, which: usize, space: Arc<AddressSpace>, vpn: u32) {
        let mut inner = self.inner.lock().unwrap();
        inner.owners[which] = Some(FrameOwner { space, vpn });
        inner.order.push_back(which);
    }

    /// Frees `which`, removing it from the residency order wherever it
    /// currently sits. Returns the owner it had, if any.
    pub fn clear(&self, which: usize) -> Option<(Arc<AddressSpace>, u32)> {
        let mut inner = self.inner.lock().unwrap();
        let owner = inner.owners[which].take();
        if let Some(pos) = inner.order.iter().position(|&f| f == which) {
            inner.order.remove(pos);
        }
        owner.map(|o| (o.space, o.vpn))
    }

    pub fn test(&self, which: usize) -> bool {
        self.inner.lock().unwrap().owners[which].is_some()
    }

    pub fn owner_of(&self, which: usize) -> Option<(Arc<AddressSpace>, u32)> {
        self.inner.lock().unwrap().owners[which]
            .as_ref()
            .map(|o| (o.space.clone(), o.vpn))
    }

    /// Finds a free frame and claims it for `(space, vpn)` in one step,
    /// mirroring `Coremap::Find`. Returns `None` if every frame is
    /// occupied; the caller (demand-loading or swap-out) decides whether
    /// that means "evict something" or "out of memory".
    pub fn find(&self, space: &Arc<AddressSpace>, vpn: u32) -> Option<usize> {
        let mut inner = self.inner.lock().unwrap();
        let which = inner.owners.iter().position(|o| o.is_none())?;
        inner.owners[which] = Some(FrameOwner {
            space: space.clone(),
            vpn,
        });
        inner.order.push_back(which);
        Some(which)
    }

    pub fn count_clear(&self) -> usize {
        self.inner.lock().unwrap().owners.iter().filter(|o| o.is_none()).count()
    }

    /// The frame that has been resident longest without being evicted —
    /// the FIFO victim, and the CLOCK hand's starting point.
    pub fn oldest(&self) -> Option<usize> {
        self.inner.lock().unwrap().order.front().copied()
    }

    /// Moves `which` to the back of the residency order, as CLOCK does to
    /// a frame it gives a second chance instead of evicting.
    pub fn rotate_to_back(&self, which: usize) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(pos) = inner.order.iter().position(|&f| f == which) {
            inner.order.remove(pos);
            inner.order.push_back(which);
        }
    }

    /// A snapshot of the residency order, oldest first, for CLOCK's
    /// multi-pass scan and RANDOM's uniform pick.
    pub fn order_snapshot(&self) -> Vec<usize> {
        self.inner.lock().unwrap().order.iter().copied().collect()
    }

    pub fn print(&self) {
        let inner = self.inner.lock().unwrap();
        for (frame, owner) in inner.owners.iter().enumerate() {
            if let Some(owner) = owner {
                log::info!("frame {frame}: vpn {} of {:p}", owner.vpn, Arc::as_ptr(&owner.space));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::FileSystem;
    use crate::machine::disk::SynchDisk;
    use crate::machine::memory::PhysicalMemory;
    use crate::machine::stats::Statistics;
    use crate::thread::{Scheduler, Thread};

    fn dummy_space() -> Arc<AddressSpace> {
        let scheduler = Scheduler::new();
        let me = Arc::new(Thread::new("t", crate::thread::thread::DEFAULT_PRIORITY));
        let dir = std::env::temp_dir().join(format!("nachos-coremap-test-{:?}", std::thread::current().id()));
        let disk = Arc::new(SynchDisk::open(&dir, 64).unwrap());
        let stats = Arc::new(Statistics::new());
        let fs = Arc::new(FileSystem::new(disk, scheduler.clone(), stats.clone(), 64, true).unwrap());
        let memory = Arc::new(PhysicalMemory::new(4));
        // demand_load on so AddressSpace::new doesn't try to eagerly
        // allocate frames from its own (separate, tiny) coremap.
        let config = crate::config::BootConfig {
            features: crate::config::Features {
                filesys: true,
                userprog: true,
                use_tlb: true,
                demand_load: true,
                swap: true,
            },
            swap_policy: crate::config::SwapPolicy::Fifo,
            num_phys_pages: 4,
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
        AddressSpace::new(file, &me, &config, Arc::new(Coremap::new(4)), fs, stats, scheduler, memory).unwrap()
    }

    #[test]
    fn find_then_clear_roundtrips() {
        let coremap = Coremap::new(2);
        let space = dummy_space();
        let frame = coremap.find(&space, 0).unwrap();
        assert!(coremap.test(frame));
        assert_eq!(coremap.count_clear(), 1);
        coremap.clear(frame);
        assert!(!coremap.test(frame));
        assert_eq!(coremap.count_clear(), 2);
    }

    #[test]
    fn oldest_is_fifo_order() {
        let coremap = Coremap::new(4);
        let space = dummy_space();
        let a = coremap.find(&space, 0).unwrap();
        let _b = coremap.find(&space, 1).unwrap();
        assert_eq!(coremap.oldest(), Some(a));
        coremap.rotate_to_back(a);
        assert_ne!(coremap.oldest(), Some(a));
    }
}
