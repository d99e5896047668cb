//! An open file: a cached in-memory file header plus a seek position.
//! Grounded on upstream `OpenFile::ReadAt`/`WriteAt`
//! (`filesys/open_file.cc`): neither call is required to land on a sector
//! boundary, so both round out to the full sectors spanned by the request,
//! and a write that would fall partway into the unmodified edge of a
//! sector first reads that sector so the untouched bytes survive.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use crate::fs::file_header::FileHeader;
use crate::fs::file_system::FsShared;
use crate::fs::FsError;
use crate::machine::SECTOR_SIZE;
use crate::thread::Thread;

pub struct OpenFile {
    sector: u32,
    header: Mutex<FileHeader>,
    seek_position: AtomicU32,
    shared: Arc<FsShared>,
}

fn div_round_down(a: u32, b: u32) -> u32 {
    a / b
}

impl OpenFile {
    pub(crate) fn new(sector: u32, header: FileHeader, shared: Arc<FsShared>) -> Self {
        OpenFile {
            sector,
            header: Mutex::new(header),
            seek_position: AtomicU32::new(0),
            shared,
        }
    }

    pub fn sector(&self) -> u32 {
        self.sector
    }

    pub fn length(&self) -> u32 {
        self.header.lock().unwrap().file_length()
    }

    pub fn seek(&self, position: u32) {
        self.seek_position.store(position, Ordering::SeqCst);
    }

    pub fn read(&self, me: &Arc<Thread>, buf: &mut [u8]) -> Result<u32, FsError> {
        let position = self.seek_position.load(Ordering::SeqCst);
        let n = self.read_at(me, buf, position)?;
        self.seek_position.fetch_add(n, Ordering::SeqCst);
        Ok(n)
    }

    pub fn write(&self, me: &Arc<Thread>, buf: &[u8]) -> Result<u32, FsError> {
        let position = self.seek_position.load(Ordering::SeqCst);
        let n = self.write_at(me, buf, position)?;
        self.seek_position.fetch_add(n, Ordering::SeqCst);
        Ok(n)
    }

    pub fn read_at(&self, me: &Arc<Thread>, into: &mut [u8], position: u32) -> Result<u32, FsError> {
        let file_length = self.length();
        if position >= file_length {
            return Ok(0);
        }
        let num_bytes = into.len().min((file_length - position) as usize) as u32;
        if num_bytes == 0 {
            return Ok(0);
        }

        let first_sector = div_round_down(position, SECTOR_SIZE as u32);
        let last_sector = div_round_down(position + num_bytes - 1, SECTOR_SIZE as u32);
        let num_sectors = last_sector - first_sector + 1;
        let mut buf = vec![0u8; num_sectors as usize * SECTOR_SIZE];

        self.shared.open_files.acquire_read(&self.shared.scheduler, me, self.sector);
        let header = self.header.lock().unwrap();
        for i in first_sector..=last_sector {
            let sector = header.byte_to_sector(
                &self.shared.disk,
                &self.shared.scheduler,
                me,
                &self.shared.stats,
                i * SECTOR_SIZE as u32,
            )?;
            let chunk = &mut buf[((i - first_sector) * SECTOR_SIZE as u32) as usize
                ..((i - first_sector + 1) * SECTOR_SIZE as u32) as usize];
            let mut sector_buf = [0u8; SECTOR_SIZE];
            self.shared.disk.read_sector(
                &self.shared.scheduler,
                me,
                &self.shared.stats,
                sector as usize,
                &mut sector_buf,
            )?;
            chunk.copy_from_slice(&sector_buf);
        }
        drop(header);
        self.shared.open_files.release_read(&self.shared.scheduler, me, self.sector);

        let start = (position - first_sector * SECTOR_SIZE as u32) as usize;
        into[..num_bytes as usize].copy_from_slice(&buf[start..start + num_bytes as usize]);
        Ok(num_bytes)
    }

    pub fn write_at(&self, me: &Arc<Thread>, from: &[u8], position: u32) -> Result<u32, FsError> {
        let num_bytes = from.len() as u32;
        let mut file_length = self.length();

        if position >= file_length || position + num_bytes > file_length {
            let extend_size = position + num_bytes - file_length;
            let mut header = self.header.lock().unwrap();
            let extend_result = self.shared.with_free_map_mut(me, |free_map| {
                header.extend(
                    free_map,
                    &self.shared.disk,
                    &self.shared.scheduler,
                    me,
                    &self.shared.stats,
                    extend_size,
                )
            })?;
            extend_result?;
            file_length = header.file_length();
            header.write_back(
                &self.shared.disk,
                &self.shared.scheduler,
                me,
                &self.shared.stats,
                self.sector,
            )?;
        }
        let _ = file_length;

        let first_sector = div_round_down(position, SECTOR_SIZE as u32);
        let last_sector = div_round_down(position + num_bytes - 1, SECTOR_SIZE as u32);
        let first_aligned = position == first_sector * SECTOR_SIZE as u32;
        let last_aligned = position + num_bytes == (last_sector + 1) * SECTOR_SIZE as u32;

        let num_sectors = last_sector - first_sector + 1;
        let mut buf = vec![0u8; num_sectors as usize * SECTOR_SIZE];

        if !first_aligned {
            let _ = self.read_at(me, &mut buf[..SECTOR_SIZE], first_sector * SECTOR_SIZE as u32);
        }
        if !last_aligned && (first_sector != last_sector || first_aligned) {
            let offset = ((last_sector - first_sector) * SECTOR_SIZE as u32) as usize;
            let _ = self.read_at(me, &mut buf[offset..offset + SECTOR_SIZE], last_sector * SECTOR_SIZE as u32);
        }

        let start = (position - first_sector * SECTOR_SIZE as u32) as usize;
        buf[start..start + num_bytes as usize].copy_from_slice(from);

        self.shared.open_files.acquire_write(&self.shared.scheduler, me, self.sector);
        let header = self.header.lock().unwrap();
        for i in first_sector..=last_sector {
            let sector = header.byte_to_sector(
                &self.shared.disk,
                &self.shared.scheduler,
                me,
                &self.shared.stats,
                i * SECTOR_SIZE as u32,
            )?;
            let chunk = &buf[((i - first_sector) * SECTOR_SIZE as u32) as usize
                ..((i - first_sector + 1) * SECTOR_SIZE as u32) as usize];
            let mut sector_buf = [0u8; SECTOR_SIZE];
            sector_buf.copy_from_slice(chunk);
            self.shared.disk.write_sector(
                &self.shared.scheduler,
                me,
                &self.shared.stats,
                sector as usize,
                &sector_buf,
            )?;
        }
        drop(header);
        self.shared.open_files.release_write(&self.shared.scheduler, me, self.sector);

        Ok(num_bytes)
    }
}

impl Drop for OpenFile {
    fn drop(&mut self) {
        if self.shared.open_files.close(self.sector) {
            let header = self.header.lock().unwrap();
            let me = self.shared.bootstrap_thread.clone();
            let _ = self.shared.with_free_map_mut(&me, |free_map| {
                header.deallocate(
                    free_map,
                    &self.shared.disk,
                    &self.shared.scheduler,
                    &me,
                    &self.shared.stats,
                )?;
                free_map.clear(self.sector as usize);
                Ok::<(), FsError>(())
            });
        }
    }
}
