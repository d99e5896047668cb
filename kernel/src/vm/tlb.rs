//! The software-managed TLB: a small, fixed-size cache of page table
//! entries the MMU consults before falling back to a page-table walk (or,
//! in this simulation, before the page-fault handler is invoked at all —
//! there is no hardware page-table walker here, only the TLB and the
//! fault path). Grounded on upstream `mmu.hh`'s `TLB_SIZE = 4` and
//! `AddressSpace::SaveState`/`RestoreState`'s TLB save/invalidate dance
//! around a context switch.

use crate::vm::page_table::{PageTable, PageTableEntry};

/// Number of entries in the TLB. Upstream fixes this at 4; kept as a
/// small constant here for the same reason — large enough to matter,
/// small enough that round-robin replacement is a reasonable policy.
pub const TLB_SIZE: usize = 4;

pub struct Tlb {
    slots: [PageTableEntry; TLB_SIZE],
    next: usize,
}

impl Tlb {
    pub fn new() -> Self {
        Tlb {
            slots: [PageTableEntry::default(); TLB_SIZE],
            next: 0,
        }
    }

    /// Looks up `vpn`, setting the `use` bit (and `dirty` if `writing`) on
    /// a hit. Returns the physical frame number on a hit, `None` on a
    /// miss — the caller must then run the page-fault path and `refill`.
    pub fn access(&mut self, vpn: u32, writing: bool) -> Option<u32> {
        let slot = self.slots.iter_mut().find(|e| e.valid && e.virtual_page == vpn)?;
        slot.use_bit = true;
        if writing {
            if slot.read_only {
                return None;
            }
            slot.dirty = true;
        }
        Some(slot.physical_page)
    }

    /// Installs `entry` into the next round-robin slot, returning the
    /// entry it replaced (if that slot held a valid mapping) so the
    /// caller can fold its use/dirty bits back into the owning page
    /// table before the information is lost.
    pub fn refill(&mut self, entry: PageTableEntry) -> Option<PageTableEntry> {
        let outgoing = self.slots[self.next];
        self.slots[self.next] = entry;
        self.next = (self.next + 1) % TLB_SIZE;
        if outgoing.valid {
            Some(outgoing)
        } else {
            None
        }
    }

    /// Folds every valid entry's use/dirty bits back into `table`, as
    /// `SaveState` does before a context switch away from this address
    /// space.
    pub fn save_to(&self, table: &mut PageTable) {
        for entry in self.slots.iter().filter(|e| e.valid) {
            let owned = table.entry_mut(entry.virtual_page as usize);
            owned.use_bit = entry.use_bit;
            owned.dirty = entry.dirty;
        }
    }

    /// Invalidates every entry, as `RestoreState` does on resume — the
    /// next process to run starts with a cold TLB and faults its
    /// mappings back in on demand.
    pub fn invalidate_all(&mut self) {
        for entry in self.slots.iter_mut() {
            entry.valid = false;
        }
    }

    /// Drops any entry mapping `vpn`, used when a page is evicted so a
    /// stale translation can't survive the eviction.
    pub fn invalidate(&mut self, vpn: u32) {
        for entry in self.slots.iter_mut() {
            if entry.valid && entry.virtual_page == vpn {
                entry.valid = false;
            }
        }
    }
}

impl Default for Tlb {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(vpn: u32, ppn: u32) -> PageTableEntry {
        PageTableEntry {
            virtual_page: vpn,
            physical_page: ppn,
            valid: true,
            use_bit: false,
            dirty: false,
            read_only: false,
        }
    }

    #[test]
    fn miss_on_empty_tlb() {
        let mut tlb = Tlb::new();
        assert_eq!(tlb.access(0, false), None);
    }

    #[test]
    fn hit_after_refill_sets_use_bit() {
        let mut tlb = Tlb::new();
        tlb.refill(entry(3, 7));
        assert_eq!(tlb.access(3, false), Some(7));
        let mut table = PageTable::new(4);
        tlb.save_to(&mut table);
        assert!(table.entry(3).use_bit);
        assert!(!table.entry(3).dirty);
    }

    #[test]
    fn write_access_sets_dirty_unless_read_only() {
        let mut tlb = Tlb::new();
        let mut ro = entry(1, 2);
        ro.read_only = true;
        tlb.refill(ro);
        assert_eq!(tlb.access(1, true), None);

        let mut tlb = Tlb::new();
        tlb.refill(entry(1, 2));
        assert_eq!(tlb.access(1, true), Some(2));
        let mut table = PageTable::new(2);
        tlb.save_to(&mut table);
        assert!(table.entry(1).dirty);
    }

    #[test]
    fn refill_round_robins_and_returns_outgoing() {
        let mut tlb = Tlb::new();
        for i in 0..TLB_SIZE as u32 {
            assert_eq!(tlb.refill(entry(i, i)), None);
        }
        let outgoing = tlb.refill(entry(99, 99));
        assert_eq!(outgoing, Some(entry(0, 0)));
    }

    #[test]
    fn invalidate_all_clears_hits() {
        let mut tlb = Tlb::new();
        tlb.refill(entry(5, 5));
        tlb.invalidate_all();
        assert_eq!(tlb.access(5, false), None);
    }
}
