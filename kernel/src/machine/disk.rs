//! The synchronized disk.
//!
//! The raw disk (`Disk`) is a flat file of fixed-size sectors and, like the
//! real hardware it simulates, can only have one request in flight at a
//! time and signals completion asynchronously. `SynchDisk` wraps it with a
//! `Lock` plus a completion `Semaphore`, the same shape as
//! [`super::console::SynchConsole`] and grounded on the same upstream
//! pattern (`machine/synch_disk.cc`, not carried into this port's trimmed
//! source set, but identical in spirit to `synch_console.cc`): callers see
//! a plain blocking `read_sector`/`write_sector`.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::machine::interrupt::{schedule_completion, DISK_LATENCY};
use crate::machine::stats::Statistics;
use crate::machine::SECTOR_SIZE;
use crate::sync::{Lock, Semaphore};
use crate::thread::{Scheduler, Thread};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiskError {
    Io,
    SectorOutOfRange,
}

impl std::fmt::Display for DiskError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DiskError::Io => write!(f, "disk I/O error"),
            DiskError::SectorOutOfRange => write!(f, "sector number out of range"),
        }
    }
}

impl std::error::Error for DiskError {}

/// A disk is a flat file of `num_sectors` fixed-size sectors, created (and
/// zero-filled) on first use if it does not already exist.
pub struct RawDisk {
    file: Mutex<File>,
    pub num_sectors: usize,
}

impl RawDisk {
    pub fn open(path: impl AsRef<Path>, num_sectors: usize) -> Result<Self, DiskError> {
        let path = path.as_ref();
        let fresh = !path.exists();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)
            .map_err(|_| DiskError::Io)?;
        let disk = RawDisk {
            file: Mutex::new(file),
            num_sectors,
        };
        if fresh {
            disk.zero_fill()?;
        }
        Ok(disk)
    }

    fn zero_fill(&self) -> Result<(), DiskError> {
        let zero = [0u8; SECTOR_SIZE];
        let mut file = self.file.lock().unwrap();
        for _ in 0..self.num_sectors {
            file.write_all(&zero).map_err(|_| DiskError::Io)?;
        }
        Ok(())
    }

    pub fn read_sector(&self, sector: usize, buf: &mut [u8; SECTOR_SIZE]) -> Result<(), DiskError> {
        if sector >= self.num_sectors {
            return Err(DiskError::SectorOutOfRange);
        }
        let mut file = self.file.lock().unwrap();
        file.seek(SeekFrom::Start((sector * SECTOR_SIZE) as u64))
            .map_err(|_| DiskError::Io)?;
        file.read_exact(buf).map_err(|_| DiskError::Io)
    }

    pub fn write_sector(&self, sector: usize, buf: &[u8; SECTOR_SIZE]) -> Result<(), DiskError> {
        if sector >= self.num_sectors {
            return Err(DiskError::SectorOutOfRange);
        }
        let mut file = self.file.lock().unwrap();
        file.seek(SeekFrom::Start((sector * SECTOR_SIZE) as u64))
            .map_err(|_| DiskError::Io)?;
        file.write_all(buf).map_err(|_| DiskError::Io)
    }
}

pub struct SynchDisk {
    raw: RawDisk,
    lock: Lock,
    request_done: Arc<Semaphore>,
}

impl SynchDisk {
    pub fn open(path: impl AsRef<Path>, num_sectors: usize) -> Result<Self, DiskError> {
        Ok(SynchDisk {
            raw: RawDisk::open(path, num_sectors)?,
            lock: Lock::new("disk lock"),
            request_done: Arc::new(Semaphore::new("disk request done", 0)),
        })
    }

    pub fn num_sectors(&self) -> usize {
        self.raw.num_sectors
    }

    pub fn read_sector(
        &self,
        scheduler: &Arc<Scheduler>,
        me: &Arc<Thread>,
        stats: &Statistics,
        sector: usize,
        buf: &mut [u8; SECTOR_SIZE],
    ) -> Result<(), DiskError> {
        self.lock.acquire(scheduler, me);
        let result = self.raw.read_sector(sector, buf);
        schedule_completion(self.request_done.clone(), scheduler.clone(), DISK_LATENCY);
        self.request_done.p(scheduler, me);
        stats.disk_read();
        self.lock.release(scheduler, me).unwrap();
        result
    }

    pub fn write_sector(
        &self,
        scheduler: &Arc<Scheduler>,
        me: &Arc<Thread>,
        stats: &Statistics,
        sector: usize,
        buf: &[u8; SECTOR_SIZE],
    ) -> Result<(), DiskError> {
        self.lock.acquire(scheduler, me);
        let result = self.raw.write_sector(sector, buf);
        schedule_completion(self.request_done.clone(), scheduler.clone(), DISK_LATENCY);
        self.request_done.p(scheduler, me);
        stats.disk_write();
        self.lock.release(scheduler, me).unwrap();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_disk_is_zero_filled() {
        let dir = std::env::temp_dir().join(format!("nachos-disk-test-{:?}", std::thread::current().id()));
        let disk = RawDisk::open(&dir, 4).unwrap();
        let mut buf = [0xAAu8; SECTOR_SIZE];
        disk.read_sector(0, &mut buf).unwrap();
        assert_eq!(buf, [0u8; SECTOR_SIZE]);
        let _ = std::fs::remove_file(&dir);
    }

    #[test]
    fn write_then_read_roundtrips() {
        let dir = std::env::temp_dir().join(format!("nachos-disk-test-rw-{:?}", std::thread::current().id()));
        let disk = RawDisk::open(&dir, 4).unwrap();
        let mut written = [0u8; SECTOR_SIZE];
        written[0] = 42;
        disk.write_sector(1, &written).unwrap();
        let mut read_back = [0u8; SECTOR_SIZE];
        disk.read_sector(1, &mut read_back).unwrap();
        assert_eq!(written, read_back);
        let _ = std::fs::remove_file(&dir);
    }

    #[test]
    fn out_of_range_sector_errors() {
        let dir = std::env::temp_dir().join(format!("nachos-disk-test-oor-{:?}", std::thread::current().id()));
        let disk = RawDisk::open(&dir, 2).unwrap();
        let mut buf = [0u8; SECTOR_SIZE];
        assert_eq!(disk.read_sector(5, &mut buf), Err(DiskError::SectorOutOfRange));
        let _ = std::fs::remove_file(&dir);
    }
}
