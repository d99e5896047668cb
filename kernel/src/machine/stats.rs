//! Performance counters, kept for the same reason upstream keeps them: so
//! test workloads and `-d` debug runs can report what the machine actually
//! did. Grounded on `machine/statistics.cc`; counters not meaningful for a
//! compiled-out subsystem (TLB hits without `use-tlb`, swap without
//! `swap`) stay at zero rather than being removed, matching the original's
//! `#ifdef`-guarded fields degrading to unused rather than absent.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct Statistics {
    pub num_disk_reads: AtomicU64,
    pub num_disk_writes: AtomicU64,
    pub num_console_chars_read: AtomicU64,
    pub num_console_chars_written: AtomicU64,
    pub num_page_faults: AtomicU64,
    pub num_page_hits: AtomicU64,
    pub num_swap_out: AtomicU64,
    pub num_swap_in: AtomicU64,
}

impl Statistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn disk_read(&self) {
        self.num_disk_reads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn disk_write(&self) {
        self.num_disk_writes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn console_read(&self) {
        self.num_console_chars_read.fetch_add(1, Ordering::Relaxed);
    }

    pub fn console_write(&self) {
        self.num_console_chars_written.fetch_add(1, Ordering::Relaxed);
    }

    pub fn page_fault(&self) {
        self.num_page_faults.fetch_add(1, Ordering::Relaxed);
    }

    pub fn page_hit(&self) {
        self.num_page_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn swap_out(&self) {
        self.num_swap_out.fetch_add(1, Ordering::Relaxed);
    }

    pub fn swap_in(&self) {
        self.num_swap_in.fetch_add(1, Ordering::Relaxed);
    }

    pub fn report(&self) -> String {
        format!(
            "Disk I/O: reads {}, writes {}\nConsole I/O: reads {}, writes {}\nPaging: faults {}, hits {}\nSwap: out {}, in {}",
            self.num_disk_reads.load(Ordering::Relaxed),
            self.num_disk_writes.load(Ordering::Relaxed),
            self.num_console_chars_read.load(Ordering::Relaxed),
            self.num_console_chars_written.load(Ordering::Relaxed),
            self.num_page_faults.load(Ordering::Relaxed),
            self.num_page_hits.load(Ordering::Relaxed),
            self.num_swap_out.load(Ordering::Relaxed),
            self.num_swap_in.load(Ordering::Relaxed),
        )
    }
}
