//! A process's address space: its page table, its slice of the
//! executable it was loaded from, and (when swap is enabled) its
//! per-process swap file. Grounded on upstream `AddressSpace`
//! (`userprog/address_space.cc`): constructor sizing, the eager
//! allocate-then-load-segments sequence for a non-demand-loaded space,
//! and the save/restore-around-a-context-switch TLB dance all follow the
//! original step for step. Unlike the original, which keeps a single
//! global `TLB_SIZE`-entry TLB inside the `MMU` and one of two address
//! translation tables (`memBitMap` xor `memCoreMap`) chosen by `#ifdef`,
//! this port gives each `AddressSpace` its own `Tlb` (inert while the
//! process isn't running — RestoreState always starts it cold anyway) and
//! always allocates through `Coremap`, since `BootConfig` makes swap a
//! runtime rather than compile-time choice (see `DESIGN.md`).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::config::BootConfig;
use crate::fs::bitmap::Bitmap;
use crate::fs::{FileSystem, OpenFile};
use crate::machine::memory::{PhysicalMemory, PAGE_SIZE};
use crate::machine::rng::Rng;
use crate::machine::stats::Statistics;
use crate::thread::{Scheduler, Thread};
use crate::vm::coremap::Coremap;
use crate::vm::executable::Executable;
use crate::vm::page_table::{PageTable, PageTableEntry};
use crate::vm::swap;
use crate::vm::tlb::Tlb;
use crate::vm::VmError;

/// Bytes reserved for the user stack, appended past the executable's
/// segments when sizing the address space. Upstream's default
/// `UserStackSize` is 1024 bytes; kept the same here.
pub const USER_STACK_SIZE: u32 = 1024;

static NEXT_SWAP_ID: AtomicU64 = AtomicU64::new(0);

pub struct AddressSpace {
    page_table: Mutex<PageTable>,
    tlb: Mutex<Tlb>,
    swap_file: Mutex<Option<OpenFile>>,
    swap_map: Mutex<Option<Bitmap>>,
    swap_name: String,
    rng: Mutex<Rng>,
    coremap: Arc<Coremap>,
    memory: Arc<PhysicalMemory>,
    executable: Executable,
    num_pages: usize,
    fs: Arc<FileSystem>,
    scheduler: Arc<Scheduler>,
    stats: Arc<Statistics>,
    config: BootConfig,
    /// Stand-in caller identity for the disk I/O `Drop` needs to do
    /// (removing the swap file) with no real caller thread in scope.
    bootstrap_thread: Arc<Thread>,
}

impl AddressSpace {
    /// Builds an address space from `executable_file`, mirroring
    /// `AddressSpace::AddressSpace`: size the page table from the
    /// executable's segments plus the user stack, then either allocate
    /// and load everything now or leave every entry invalid for
    /// demand-loading to fill in on first fault.
    pub fn new(
        executable_file: OpenFile,
        me: &Arc<Thread>,
        config: &BootConfig,
        coremap: Arc<Coremap>,
        fs: Arc<FileSystem>,
        stats: Arc<Statistics>,
        scheduler: Arc<Scheduler>,
        memory: Arc<PhysicalMemory>,
    ) -> Result<Arc<Self>, VmError> {
        let executable = Executable::load(executable_file, me)?;
        let size = executable.in_memory_size() + USER_STACK_SIZE;
        let num_pages = (size as usize + PAGE_SIZE - 1) / PAGE_SIZE;

        let swap_id = NEXT_SWAP_ID.fetch_add(1, Ordering::Relaxed);
        let bootstrap_thread = Arc::new(Thread::new(
            "address space bootstrap",
            crate::thread::thread::DEFAULT_PRIORITY,
        ));

        let space = Arc::new(AddressSpace {
            page_table: Mutex::new(PageTable::new(num_pages)),
            tlb: Mutex::new(Tlb::new()),
            swap_file: Mutex::new(None),
            swap_map: Mutex::new(None),
            // 5 + 4 = 9 bytes, exactly the usable width of a directory
            // entry name; wraps every 65536 address spaces rather than
            // risking `NameTooLong` once `swap_id` grows past 4 digits.
            swap_name: format!("swap.{:04x}", swap_id % 0x1_0000),
            rng: Mutex::new(Rng::new(config.random_seed)),
            coremap,
            memory,
            executable,
            num_pages,
            fs,
            scheduler,
            stats,
            config: config.clone(),
            bootstrap_thread,
        });

        if !config.features.demand_load {
            space.load_eagerly(me)?;
        }

        Ok(space)
    }

    pub fn num_pages(&self) -> usize {
        self.num_pages
    }

    pub fn page_table_entry(&self, vpn: usize) -> PageTableEntry {
        self.page_table.lock().unwrap().entry(vpn)
    }

    pub fn clear_use_bit(&self, vpn: usize) {
        self.page_table.lock().unwrap().entry_mut(vpn).use_bit = false;
    }

    /// Invalidates a page table entry and, if a TLB is in use, any
    /// matching TLB entry — the cleanup a swap-out does to the victim it
    /// just evicted.
    pub fn invalidate_page(&self, vpn: usize) {
        self.page_table.lock().unwrap().entry_mut(vpn).valid = false;
        if self.config.features.use_tlb {
            self.tlb.lock().unwrap().invalidate(vpn as u32);
        }
    }

    pub fn is_in_swap(&self, vpn: usize) -> bool {
        self.swap_map.lock().unwrap().as_ref().is_some_and(|m| m.test(vpn))
    }

    /// Creates this address space's swap file on first use, as upstream
    /// does ("created lazily").
    fn ensure_swap_file(&self, me: &Arc<Thread>) -> Result<(), VmError> {
        let mut guard = self.swap_file.lock().unwrap();
        if guard.is_some() {
            return Ok(());
        }
        self.fs.create(me, &self.swap_name, 0, false)?;
        *guard = Some(self.fs.open(me, &self.swap_name)?);
        *self.swap_map.lock().unwrap() = Some(Bitmap::new(self.num_pages));
        Ok(())
    }

    pub fn write_swap_page(&self, me: &Arc<Thread>, vpn: usize, data: &[u8]) -> Result<(), VmError> {
        self.ensure_swap_file(me)?;
        self.swap_file
            .lock()
            .unwrap()
            .as_ref()
            .expect("just ensured")
            .write_at(me, data, (vpn * PAGE_SIZE) as u32)?;
        self.swap_map.lock().unwrap().as_mut().expect("just ensured").mark(vpn);
        Ok(())
    }

    pub fn read_swap_page(&self, me: &Arc<Thread>, vpn: usize) -> Result<[u8; PAGE_SIZE], VmError> {
        let guard = self.swap_file.lock().unwrap();
        let file = guard.as_ref().expect("page marked in swap implies a swap file exists");
        let mut buf = [0u8; PAGE_SIZE];
        file.read_at(me, &mut buf, (vpn * PAGE_SIZE) as u32)?;
        Ok(buf)
    }

    /// Finds a free frame for `vpn`, evicting one via the swap engine if
    /// memory is full and swap is enabled. Mirrors the two branches of
    /// `memBitMap->Find()`/`memCoreMap->Find()` plus `DoSwapOut` upstream
    /// keeps apart with `#ifdef USE_SWAP`.
    fn allocate_frame(self: &Arc<Self>, me: &Arc<Thread>, vpn: usize) -> Result<usize, VmError> {
        if let Some(frame) = self.coremap.find(self, vpn as u32) {
            return Ok(frame);
        }
        if !self.config.features.swap {
            return Err(VmError::NoFreeFrames);
        }
        let freed = swap::swap_out(
            me,
            &self.coremap,
            self.config.swap_policy,
            &mut self.rng.lock().unwrap(),
            &self.memory,
            &self.stats,
        )?;
        self.coremap.mark(freed, self.clone(), vpn as u32);
        Ok(freed)
    }

    fn load_eagerly(self: &Arc<Self>, me: &Arc<Thread>) -> Result<(), VmError> {
        for vpn in 0..self.num_pages {
            let frame = self.allocate_frame(me, vpn)?;
            self.memory.zero_frame(frame);
            let mut table = self.page_table.lock().unwrap();
            let entry = table.entry_mut(vpn);
            entry.physical_page = frame as u32;
            entry.valid = true;
        }
        for vpn in 0..self.num_pages {
            let frame = self.page_table.lock().unwrap().entry(vpn).physical_page as usize;
            self.load_segment_bytes(me, vpn, frame)?;
        }
        Ok(())
    }

    /// Copies whatever portion of the code and initialized-data segments
    /// falls inside page `vpn` into `frame`, leaving the rest of the page
    /// (already zeroed by the caller) as BSS/stack.
    fn load_segment_bytes(&self, me: &Arc<Thread>, vpn: usize, frame: usize) -> Result<(), VmError> {
        let page_start = (vpn * PAGE_SIZE) as u32;
        let page_end = page_start + PAGE_SIZE as u32;

        let code_start = self.executable.code_vaddr();
        let code_end = code_start + self.executable.code_size();
        let overlap_start = page_start.max(code_start);
        let overlap_end = page_end.min(code_end);
        if overlap_start < overlap_end {
            let mut buf = vec![0u8; (overlap_end - overlap_start) as usize];
            self.executable.read_code_block(me, &mut buf, overlap_start - code_start)?;
            self.memory.write_frame_at(frame, (overlap_start - page_start) as usize, &buf);
        }

        let data_start = self.executable.init_data_vaddr();
        let data_end = data_start + self.executable.init_data_size();
        let overlap_start = page_start.max(data_start);
        let overlap_end = page_end.min(data_end);
        if overlap_start < overlap_end {
            let mut buf = vec![0u8; (overlap_end - overlap_start) as usize];
            self.executable.read_data_block(me, &mut buf, overlap_start - data_start)?;
            self.memory.write_frame_at(frame, (overlap_start - page_start) as usize, &buf);
        }

        Ok(())
    }

    /// Services a page fault for `vpn`: allocates (possibly evicting) a
    /// frame, fills it from the executable or from swap, and marks the
    /// entry valid. Mirrors `AddressSpace::CheckPageinMemory`.
    pub fn handle_fault(self: &Arc<Self>, me: &Arc<Thread>, vpn: usize) -> Result<PageTableEntry, VmError> {
        if vpn >= self.num_pages {
            return Err(VmError::InvalidVirtualAddress);
        }
        {
            let table = self.page_table.lock().unwrap();
            let entry = table.entry(vpn);
            if entry.valid {
                self.stats.page_hit();
                return Ok(entry);
            }
        }
        self.stats.page_fault();

        let in_swap = self.is_in_swap(vpn);
        let frame = self.allocate_frame(me, vpn)?;
        if in_swap {
            let data = self.read_swap_page(me, vpn)?;
            self.memory.write_frame(frame, &data);
            self.stats.swap_in();
        } else {
            self.memory.zero_frame(frame);
            self.load_segment_bytes(me, vpn, frame)?;
        }

        let mut table = self.page_table.lock().unwrap();
        let entry = table.entry_mut(vpn);
        entry.physical_page = frame as u32;
        entry.valid = true;
        entry.use_bit = false;
        entry.dirty = false;
        Ok(*entry)
    }

    /// Translates a user virtual address to a physical byte offset into
    /// `PhysicalMemory`, servicing a TLB miss or (with no TLB configured)
    /// a direct page-table miss along the way. Mirrors `MMU::Translate`.
    pub fn translate(self: &Arc<Self>, me: &Arc<Thread>, vaddr: u32, writing: bool) -> Result<u32, VmError> {
        let vpn = vaddr as usize / PAGE_SIZE;
        let page_offset = vaddr as usize % PAGE_SIZE;

        let frame = if self.config.features.use_tlb {
            let hit = self.tlb.lock().unwrap().access(vpn as u32, writing);
            match hit {
                Some(frame) => frame,
                None => {
                    let entry = self.handle_fault(me, vpn)?;
                    if let Some(outgoing) = self.tlb.lock().unwrap().refill(entry) {
                        let mut table = self.page_table.lock().unwrap();
                        let owned = table.entry_mut(outgoing.virtual_page as usize);
                        owned.use_bit = outgoing.use_bit;
                        owned.dirty = outgoing.dirty;
                    }
                    entry.physical_page
                }
            }
        } else {
            let entry = self.handle_fault(me, vpn)?;
            if entry.read_only && writing {
                return Err(VmError::InvalidVirtualAddress);
            }
            let mut table = self.page_table.lock().unwrap();
            let owned = table.entry_mut(vpn);
            owned.use_bit = true;
            if writing {
                owned.dirty = true;
            }
            entry.physical_page
        };

        Ok(frame * PAGE_SIZE as u32 + page_offset as u32)
    }

    /// Reads one byte at user virtual address `vaddr`, faulting the page
    /// in if necessary. Building block for `syscall::transfer`.
    pub fn read_user_byte(self: &Arc<Self>, me: &Arc<Thread>, vaddr: u32) -> Result<u8, VmError> {
        let phys = self.translate(me, vaddr, false)? as usize;
        Ok(self.memory.read_byte(phys / PAGE_SIZE, phys % PAGE_SIZE))
    }

    /// Writes one byte at user virtual address `vaddr`, faulting the page
    /// in if necessary.
    pub fn write_user_byte(self: &Arc<Self>, me: &Arc<Thread>, vaddr: u32, value: u8) -> Result<(), VmError> {
        let phys = self.translate(me, vaddr, true)? as usize;
        self.memory.write_byte(phys / PAGE_SIZE, phys % PAGE_SIZE, value);
        Ok(())
    }

    /// Folds TLB use/dirty bits back into the page table before this
    /// address space's thread yields the turn token. Mirrors
    /// `AddressSpace::SaveState`.
    pub fn save_state(&self) {
        if self.config.features.use_tlb {
            let tlb = self.tlb.lock().unwrap();
            let mut table = self.page_table.lock().unwrap();
            tlb.save_to(&mut table);
        }
    }

    /// Invalidates the TLB on resume, as `AddressSpace::RestoreState`
    /// does — the resumed process faults its mappings back in lazily.
    pub fn restore_state(&self) {
        if self.config.features.use_tlb {
            self.tlb.lock().unwrap().invalidate_all();
        }
    }
}

impl Drop for AddressSpace {
    fn drop(&mut self) {
        {
            let table = self.page_table.lock().unwrap();
            for entry in table.iter() {
                if entry.valid {
                    self.coremap.clear(entry.physical_page as usize);
                }
            }
        }
        if let Some(file) = self.swap_file.lock().unwrap().take() {
            drop(file);
            let _ = self.fs.remove(&self.bootstrap_thread, &self.swap_name);
        }
    }
}
