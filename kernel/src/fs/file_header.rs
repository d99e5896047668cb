//! The file header (i-node analogue): 28 direct sector pointers, one
//! single-indirect block of 32 more, and one double-indirect block of up
//! to 32×32 more. Grounded directly on upstream `FileHeader::Allocate`/
//! `Deallocate`/`Extend`/`ByteToSector` (`filesys/file_header.cc`); the
//! allocation/deallocation walk is reproduced level by level rather than
//! simplified, since the original's handling of a partially-filled last
//! indirect table is exactly the kind of edge case worth keeping faithful.

use std::sync::Arc;

use zerocopy::{AsBytes, FromBytes};

use crate::fs::bitmap::Bitmap;
use crate::fs::layout::{IndirectHeader, RawFileHeader, MAX_FILE_SIZE, NUM_DIRECT, NUM_INDIRECT};
use crate::fs::FsError;
use crate::machine::disk::SynchDisk;
use crate::machine::stats::Statistics;
use crate::machine::SECTOR_SIZE;
use crate::thread::{Scheduler, Thread};

fn read_sector<T: FromBytes>(
    disk: &SynchDisk,
    scheduler: &Arc<Scheduler>,
    me: &Arc<Thread>,
    stats: &Statistics,
    sector: u32,
) -> Result<T, FsError> {
    let mut buf = [0u8; SECTOR_SIZE];
    disk.read_sector(scheduler, me, stats, sector as usize, &mut buf)?;
    Ok(T::read_from(&buf[..]).expect("sector-sized buffer always matches layout"))
}

fn write_sector<T: AsBytes>(
    disk: &SynchDisk,
    scheduler: &Arc<Scheduler>,
    me: &Arc<Thread>,
    stats: &Statistics,
    sector: u32,
    value: &T,
) -> Result<(), FsError> {
    let mut buf = [0u8; SECTOR_SIZE];
    buf.copy_from_slice(value.as_bytes());
    disk.write_sector(scheduler, me, stats, sector as usize, &buf)?;
    Ok(())
}

fn div_round_up(a: usize, b: usize) -> usize {
    (a + b - 1) / b
}

pub struct FileHeader {
    pub raw: RawFileHeader,
}

impl FileHeader {
    pub fn new() -> Self {
        FileHeader {
            raw: RawFileHeader::default(),
        }
    }

    pub fn fetch_from(
        disk: &SynchDisk,
        scheduler: &Arc<Scheduler>,
        me: &Arc<Thread>,
        stats: &Statistics,
        sector: u32,
    ) -> Result<Self, FsError> {
        Ok(FileHeader {
            raw: read_sector(disk, scheduler, me, stats, sector)?,
        })
    }

    pub fn write_back(
        &self,
        disk: &SynchDisk,
        scheduler: &Arc<Scheduler>,
        me: &Arc<Thread>,
        stats: &Statistics,
        sector: u32,
    ) -> Result<(), FsError> {
        write_sector(disk, scheduler, me, stats, sector, &self.raw)
    }

    pub fn file_length(&self) -> u32 {
        self.raw.num_bytes
    }

    /// Splits a data-sector count into the direct/single-indirect/double-
    /// indirect bucket sizes, as every upstream method that walks the
    /// header's shape does inline.
    fn shape(num_data_sectors: usize) -> (usize, usize, usize, usize) {
        let dir = num_data_sectors.min(NUM_DIRECT);
        let ind = num_data_sectors - dir;
        let simple = ind.min(NUM_INDIRECT);
        let double = ind - simple;
        (dir, simple, double, div_round_up(double, NUM_INDIRECT))
    }

    fn other_sectors(simple: usize, double: usize, tables: usize) -> usize {
        let mut n = 0;
        if simple > 0 {
            n += 1;
        }
        if double > 0 {
            n += tables + 1;
        }
        n
    }

    /// Allocates data blocks for a newly created file of `file_size`
    /// bytes. Mirrors `FileHeader::Allocate`.
    #[allow(clippy::too_many_arguments)]
    pub fn allocate(
        &mut self,
        free_map: &mut Bitmap,
        disk: &SynchDisk,
        scheduler: &Arc<Scheduler>,
        me: &Arc<Thread>,
        stats: &Statistics,
        file_size: u32,
    ) -> Result<(), FsError> {
        if file_size as usize > MAX_FILE_SIZE {
            return Err(FsError::FileTooLarge);
        }
        self.raw.num_bytes = file_size;
        let num_data_sectors = div_round_up(file_size as usize, SECTOR_SIZE);
        let (dir, simple, double, tables) = Self::shape(num_data_sectors);
        let other = Self::other_sectors(simple, double, tables);

        if free_map.count_clear() < num_data_sectors + other {
            return Err(FsError::DiskFull);
        }
        self.raw.num_sectors = num_data_sectors as u32;

        for i in 0..dir {
            self.raw.data_sectors[i] = free_map.find()? as u32;
        }

        if simple + double > 0 {
            let mut simple_ih = IndirectHeader::default();
            self.raw.simple_indirect = free_map.find()? as u32;
            for slot in simple_ih.data_sectors.iter_mut().take(simple) {
                *slot = free_map.find()? as u32;
            }
            write_sector(disk, scheduler, me, stats, self.raw.simple_indirect, &simple_ih)?;

            if double > 0 {
                let mut double_ih = IndirectHeader::default();
                self.raw.double_indirect = free_map.find()? as u32;
                let mut remaining = double;
                for i in 0..tables {
                    let this_table = remaining.min(NUM_INDIRECT);
                    remaining -= this_table;
                    let mut inner = IndirectHeader::default();
                    let table_sector = free_map.find()? as u32;
                    double_ih.data_sectors[i] = table_sector;
                    for slot in inner.data_sectors.iter_mut().take(this_table) {
                        *slot = free_map.find()? as u32;
                    }
                    write_sector(disk, scheduler, me, stats, table_sector, &inner)?;
                }
                write_sector(disk, scheduler, me, stats, self.raw.double_indirect, &double_ih)?;
            }
        }
        Ok(())
    }

    /// Frees every data block owned by this header. Mirrors
    /// `FileHeader::Deallocate`.
    pub fn deallocate(
        &self,
        free_map: &mut Bitmap,
        disk: &SynchDisk,
        scheduler: &Arc<Scheduler>,
        me: &Arc<Thread>,
        stats: &Statistics,
    ) -> Result<(), FsError> {
        let (dir, simple, double, tables) = Self::shape(self.raw.num_sectors as usize);

        if double > 0 {
            let double_ih: IndirectHeader =
                read_sector(disk, scheduler, me, stats, self.raw.double_indirect)?;
            let mut remaining = double;
            for i in 0..tables {
                let this_table = remaining.min(NUM_INDIRECT);
                remaining -= this_table;
                let inner: IndirectHeader =
                    read_sector(disk, scheduler, me, stats, double_ih.data_sectors[i])?;
                for &sector in inner.data_sectors.iter().take(this_table) {
                    free_map.clear(sector as usize);
                }
                free_map.clear(double_ih.data_sectors[i] as usize);
            }
            free_map.clear(self.raw.double_indirect as usize);
        }

        if simple > 0 {
            let simple_ih: IndirectHeader =
                read_sector(disk, scheduler, me, stats, self.raw.simple_indirect)?;
            for &sector in simple_ih.data_sectors.iter().take(simple) {
                free_map.clear(sector as usize);
            }
            free_map.clear(self.raw.simple_indirect as usize);
        }

        for &sector in self.raw.data_sectors.iter().take(dir) {
            free_map.clear(sector as usize);
        }
        Ok(())
    }

    /// Marks every sector this header owns — data blocks plus the
    /// single- and double-indirect structure sectors — into `bitmap`.
    /// Walks the same shape as `deallocate`, but marks rather than
    /// clears; used by `FileSystem::check` to build its shadow bitmap.
    pub fn mark_owned_sectors(
        &self,
        bitmap: &mut Bitmap,
        disk: &SynchDisk,
        scheduler: &Arc<Scheduler>,
        me: &Arc<Thread>,
        stats: &Statistics,
    ) -> Result<(), FsError> {
        let (dir, simple, double, tables) = Self::shape(self.raw.num_sectors as usize);

        for &sector in self.raw.data_sectors.iter().take(dir) {
            bitmap.mark(sector as usize);
        }

        if simple > 0 {
            bitmap.mark(self.raw.simple_indirect as usize);
            let simple_ih: IndirectHeader =
                read_sector(disk, scheduler, me, stats, self.raw.simple_indirect)?;
            for &sector in simple_ih.data_sectors.iter().take(simple) {
                bitmap.mark(sector as usize);
            }
        }

        if double > 0 {
            bitmap.mark(self.raw.double_indirect as usize);
            let double_ih: IndirectHeader =
                read_sector(disk, scheduler, me, stats, self.raw.double_indirect)?;
            let mut remaining = double;
            for i in 0..tables {
                let this_table = remaining.min(NUM_INDIRECT);
                remaining -= this_table;
                bitmap.mark(double_ih.data_sectors[i] as usize);
                let inner: IndirectHeader =
                    read_sector(disk, scheduler, me, stats, double_ih.data_sectors[i])?;
                for &sector in inner.data_sectors.iter().take(this_table) {
                    bitmap.mark(sector as usize);
                }
            }
        }
        Ok(())
    }

    /// Grows the file in place by `extend_size` bytes, allocating only the
    /// newly needed blocks. Mirrors `FileHeader::Extend`, including its
    /// handling of a partially-filled last double-indirect table.
    #[allow(clippy::too_many_arguments)]
    pub fn extend(
        &mut self,
        free_map: &mut Bitmap,
        disk: &SynchDisk,
        scheduler: &Arc<Scheduler>,
        me: &Arc<Thread>,
        stats: &Statistics,
        extend_size: u32,
    ) -> Result<(), FsError> {
        let old_num_bytes = self.raw.num_bytes;
        let old_num_data_sectors = self.raw.num_sectors as usize;
        let (old_dir, old_simple, old_double, old_tables) = Self::shape(old_num_data_sectors);
        let old_other = Self::other_sectors(old_simple, old_double, old_tables);

        let new_num_bytes = old_num_bytes + extend_size;
        let num_data_sectors = div_round_up(new_num_bytes as usize, SECTOR_SIZE);
        let (dir, simple, double, tables) = Self::shape(num_data_sectors);
        let other = Self::other_sectors(simple, double, tables);

        if old_num_data_sectors == num_data_sectors {
            self.raw.num_bytes = new_num_bytes;
            return Ok(());
        }

        if new_num_bytes as usize > MAX_FILE_SIZE
            || free_map.count_clear() < (num_data_sectors + other) - (old_num_data_sectors + old_other)
        {
            return Err(FsError::DiskFull);
        }

        self.raw.num_bytes = new_num_bytes;
        self.raw.num_sectors = num_data_sectors as u32;

        for i in old_dir..dir {
            self.raw.data_sectors[i] = free_map.find()? as u32;
        }

        if old_simple < simple {
            let mut simple_ih = if old_simple == 0 {
                self.raw.simple_indirect = free_map.find()? as u32;
                IndirectHeader::default()
            } else {
                read_sector(disk, scheduler, me, stats, self.raw.simple_indirect)?
            };
            for slot in simple_ih.data_sectors[old_simple..simple].iter_mut() {
                *slot = free_map.find()? as u32;
            }
            write_sector(disk, scheduler, me, stats, self.raw.simple_indirect, &simple_ih)?;
        }

        if old_double < double {
            let mut double_ih = if old_double == 0 {
                self.raw.double_indirect = free_map.find()? as u32;
                IndirectHeader::default()
            } else {
                read_sector(disk, scheduler, me, stats, self.raw.double_indirect)?
            };

            if old_tables == tables {
                let last = tables - 1;
                let mut inner: IndirectHeader =
                    read_sector(disk, scheduler, me, stats, double_ih.data_sectors[last])?;
                let start = old_double % NUM_INDIRECT;
                let end = start + (double - old_double);
                for slot in inner.data_sectors[start..end].iter_mut() {
                    *slot = free_map.find()? as u32;
                }
                write_sector(disk, scheduler, me, stats, double_ih.data_sectors[last], &inner)?;
            } else {
                if old_tables > 0 {
                    let start = old_double % NUM_INDIRECT;
                    if start != 0 {
                        let last_old = old_tables - 1;
                        let mut inner: IndirectHeader =
                            read_sector(disk, scheduler, me, stats, double_ih.data_sectors[last_old])?;
                        for slot in inner.data_sectors[start..].iter_mut() {
                            *slot = free_map.find()? as u32;
                        }
                        write_sector(disk, scheduler, me, stats, double_ih.data_sectors[last_old], &inner)?;
                    }
                }
                for i in old_tables..tables - 1 {
                    let table_sector = free_map.find()? as u32;
                    double_ih.data_sectors[i] = table_sector;
                    let mut inner = IndirectHeader::default();
                    for slot in inner.data_sectors.iter_mut() {
                        *slot = free_map.find()? as u32;
                    }
                    write_sector(disk, scheduler, me, stats, table_sector, &inner)?;
                }
                let last = tables - 1;
                let table_sector = free_map.find()? as u32;
                double_ih.data_sectors[last] = table_sector;
                let mut inner = IndirectHeader::default();
                let count = double % NUM_INDIRECT;
                let count = if count == 0 { NUM_INDIRECT } else { count };
                for slot in inner.data_sectors[..count].iter_mut() {
                    *slot = free_map.find()? as u32;
                }
                write_sector(disk, scheduler, me, stats, table_sector, &inner)?;
            }
            write_sector(disk, scheduler, me, stats, self.raw.double_indirect, &double_ih)?;
        }

        Ok(())
    }

    /// Translates a byte offset within the file into the disk sector that
    /// stores it. Mirrors `FileHeader::ByteToSector`.
    pub fn byte_to_sector(
        &self,
        disk: &SynchDisk,
        scheduler: &Arc<Scheduler>,
        me: &Arc<Thread>,
        stats: &Statistics,
        offset: u32,
    ) -> Result<u32, FsError> {
        let num_sector = offset as usize / SECTOR_SIZE;
        if num_sector < NUM_DIRECT {
            return Ok(self.raw.data_sectors[num_sector]);
        }
        if num_sector < NUM_DIRECT + NUM_INDIRECT {
            let simple_ih: IndirectHeader =
                read_sector(disk, scheduler, me, stats, self.raw.simple_indirect)?;
            return Ok(simple_ih.data_sectors[num_sector - NUM_DIRECT]);
        }
        let index = num_sector - NUM_DIRECT - NUM_INDIRECT;
        let table = index / NUM_INDIRECT;
        let slot = index % NUM_INDIRECT;
        let double_ih: IndirectHeader =
            read_sector(disk, scheduler, me, stats, self.raw.double_indirect)?;
        let inner: IndirectHeader =
            read_sector(disk, scheduler, me, stats, double_ih.data_sectors[table])?;
        Ok(inner.data_sectors[slot])
    }
}

impl Default for FileHeader {
    fn default() -> Self {
        Self::new()
    }
}
