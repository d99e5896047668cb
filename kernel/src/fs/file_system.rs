//! The file system: ties the bitmap, file headers, directories, and the
//! open-file/subdirectory-lock registries together into `create`/`open`/
//! `remove`/`list`/`check`. Grounded on upstream `FileSystem`
//! (`filesys/file_system.cc`); the locking discipline (root directory
//! file stays permanently open, one lock per directory sector acquired
//! for the duration of any operation that touches that directory) follows
//! the original exactly, generalized from a single flat directory to the
//! hierarchical tree this port's directories support.

use std::sync::Arc;

use crate::fs::bitmap::Bitmap;
use crate::fs::directory::Directory;
use crate::fs::file_header::FileHeader;
use crate::fs::layout::DirectoryEntry;
use crate::fs::open_file::OpenFile;
use crate::fs::open_file_registry::OpenFileRegistry;
use crate::fs::path;
use crate::fs::subdir_lock::SubdirLockRegistry;
use crate::fs::{FsError, DIRECTORY_SECTOR, FREE_MAP_SECTOR, NUM_DIR_ENTRIES};
use crate::machine::disk::SynchDisk;
use crate::machine::stats::Statistics;
use crate::machine::SECTOR_SIZE;
use crate::sync::Lock;
use crate::thread::{Scheduler, Thread};

/// State shared between the `FileSystem` and every `OpenFile` it hands
/// out, so an `OpenFile` can extend its own data blocks without a back
/// reference to `FileSystem` itself.
pub struct FsShared {
    pub disk: Arc<SynchDisk>,
    pub scheduler: Arc<Scheduler>,
    pub stats: Arc<Statistics>,
    pub open_files: OpenFileRegistry,
    pub directories: SubdirLockRegistry,
    bitmap_lock: Lock,
    free_map_header: FileHeader,
    num_sectors: usize,
    /// Stand-in "current thread" used for operations with no caller
    /// context, such as the disk-space reclamation that runs when the
    /// last handle to a to-delete file is dropped.
    pub bootstrap_thread: Arc<Thread>,
}

impl FsShared {
    fn read_via_header(
        &self,
        me: &Arc<Thread>,
        header: &FileHeader,
    ) -> Result<Vec<u8>, FsError> {
        let len = header.file_length() as usize;
        let mut out = vec![0u8; len];
        let num_sectors = (len + SECTOR_SIZE - 1) / SECTOR_SIZE;
        for i in 0..num_sectors {
            let sector = header.byte_to_sector(
                &self.disk,
                &self.scheduler,
                me,
                &self.stats,
                (i * SECTOR_SIZE) as u32,
            )?;
            let mut buf = [0u8; SECTOR_SIZE];
            self.disk
                .read_sector(&self.scheduler, me, &self.stats, sector as usize, &mut buf)?;
            let start = i * SECTOR_SIZE;
            let end = (start + SECTOR_SIZE).min(len);
            out[start..end].copy_from_slice(&buf[..end - start]);
        }
        Ok(out)
    }

    fn write_via_header(
        &self,
        me: &Arc<Thread>,
        header: &FileHeader,
        bytes: &[u8],
    ) -> Result<(), FsError> {
        let num_sectors = (bytes.len() + SECTOR_SIZE - 1) / SECTOR_SIZE;
        for i in 0..num_sectors {
            let sector = header.byte_to_sector(
                &self.disk,
                &self.scheduler,
                me,
                &self.stats,
                (i * SECTOR_SIZE) as u32,
            )?;
            let mut buf = [0u8; SECTOR_SIZE];
            let start = i * SECTOR_SIZE;
            let end = (start + SECTOR_SIZE).min(bytes.len());
            buf[..end - start].copy_from_slice(&bytes[start..end]);
            self.disk
                .write_sector(&self.scheduler, me, &self.stats, sector as usize, &buf)?;
        }
        Ok(())
    }

    /// Runs `f` against the current free-space bitmap, holding
    /// `bitmap_lock` for the duration, then writes the (possibly changed)
    /// bitmap back. Mirrors `FileSystem::AquireFreeMap`/`ReleaseFreeMap`
    /// wrapping every allocation and deallocation.
    pub fn with_free_map_mut<R>(
        &self,
        me: &Arc<Thread>,
        f: impl FnOnce(&mut Bitmap) -> R,
    ) -> Result<R, FsError> {
        self.bitmap_lock.acquire(&self.scheduler, me);
        let bytes = self.read_via_header(me, &self.free_map_header)?;
        let mut bitmap = Bitmap::from_bytes(self.num_sectors, &bytes);
        let result = f(&mut bitmap);
        let out = self.write_via_header(me, &self.free_map_header, &bitmap.to_bytes());
        self.bitmap_lock.release(&self.scheduler, me).unwrap();
        out?;
        Ok(result)
    }
}

pub struct FileSystem {
    shared: Arc<FsShared>,
    directory_file: OpenFile,
}

fn directory_entry_size() -> usize {
    std::mem::size_of::<DirectoryEntry>()
}

impl FileSystem {
    /// Builds the file system on top of `disk`. If `format` is set the
    /// disk is treated as empty and reinitialized with an empty root
    /// directory and free-space bitmap, as `FileSystem::FileSystem(true)`
    /// does.
    pub fn new(
        disk: Arc<SynchDisk>,
        scheduler: Arc<Scheduler>,
        stats: Arc<Statistics>,
        num_sectors: usize,
        format: bool,
    ) -> Result<Self, FsError> {
        let bootstrap_thread = Arc::new(Thread::new("filesystem bootstrap", crate::thread::thread::DEFAULT_PRIORITY));

        let directory_file_size = NUM_DIR_ENTRIES * directory_entry_size();

        let free_map_header;
        if format {
            let mut free_map = Bitmap::new(num_sectors);
            // The bitmap's own on-disk size depends on its word-packed
            // layout, not just `num_sectors` bits rounded to a byte, so
            // measure it the same way `with_free_map_mut` will later.
            let free_map_file_size = free_map.to_bytes().len();
            free_map.mark(FREE_MAP_SECTOR as usize);
            free_map.mark(DIRECTORY_SECTOR as usize);

            let mut map_header = FileHeader::new();
            map_header.allocate(
                &mut free_map,
                &disk,
                &scheduler,
                &bootstrap_thread,
                &stats,
                free_map_file_size as u32,
            )?;
            let mut dir_header = FileHeader::new();
            dir_header.allocate(
                &mut free_map,
                &disk,
                &scheduler,
                &bootstrap_thread,
                &stats,
                directory_file_size as u32,
            )?;

            map_header.write_back(&disk, &scheduler, &bootstrap_thread, &stats, FREE_MAP_SECTOR)?;
            dir_header.write_back(&disk, &scheduler, &bootstrap_thread, &stats, DIRECTORY_SECTOR)?;

            // Flush the (still in-memory-only) bitmap and an empty
            // directory through the freshly allocated headers directly,
            // since `FsShared` does not exist yet.
            write_bytes_via(&disk, &scheduler, &bootstrap_thread, &stats, &map_header, &free_map.to_bytes())?;
            let empty_dir = Directory::new(NUM_DIR_ENTRIES);
            let mut buf = Vec::with_capacity(directory_file_size);
            for entry in empty_dir.entries_in_use() {
                buf.extend_from_slice(zerocopy::AsBytes::as_bytes(entry));
            }
            buf.resize(directory_file_size, 0);
            write_bytes_via(&disk, &scheduler, &bootstrap_thread, &stats, &dir_header, &buf)?;

            free_map_header = map_header;
        } else {
            free_map_header =
                FileHeader::fetch_from(&disk, &scheduler, &bootstrap_thread, &stats, FREE_MAP_SECTOR)?;
        }

        let shared = Arc::new(FsShared {
            disk,
            scheduler,
            stats,
            open_files: OpenFileRegistry::new(),
            directories: SubdirLockRegistry::new(),
            bitmap_lock: Lock::new("bitmap lock"),
            free_map_header,
            num_sectors,
            bootstrap_thread,
        });
        shared.open_files.open(FREE_MAP_SECTOR);
        shared.open_files.open(DIRECTORY_SECTOR);

        let dir_header = FileHeader::fetch_from(
            &shared.disk,
            &shared.scheduler,
            &shared.bootstrap_thread,
            &shared.stats,
            DIRECTORY_SECTOR,
        )?;
        let directory_file = OpenFile::new(DIRECTORY_SECTOR, dir_header, shared.clone());

        Ok(FileSystem {
            shared,
            directory_file,
        })
    }

    /// Loads the `Directory` a raw file header describes, reading its
    /// sectors directly rather than through an `OpenFile` — traversal
    /// reads a directory once and discards it, so there is nothing for
    /// the open-file table to track.
    fn load_directory(&self, me: &Arc<Thread>, header: &FileHeader) -> Result<Directory, FsError> {
        let bytes = self.shared.read_via_header(me, header)?;
        Ok(Directory::decode(bytes.len() / directory_entry_size(), &bytes))
    }

    fn store_directory(&self, me: &Arc<Thread>, header: &FileHeader, dir: &Directory) -> Result<(), FsError> {
        self.shared.write_via_header(me, header, &dir.encode())
    }

    /// The directory sector a path should start resolving from: the root
    /// for an absolute (`/`-prefixed) path, or the calling thread's
    /// current directory for a relative one. Mirrors `FileSystem::Open`'s
    /// distinction upstream between a path starting at the root and one
    /// continuing from `currentDirectory`, generalized past a single flat
    /// directory.
    fn start_sector(&self, me: &Arc<Thread>, path: &str) -> u32 {
        if path.starts_with('/') {
            DIRECTORY_SECTOR
        } else {
            me.cwd_sector()
        }
    }

    /// Walks `components` starting from `start_sector`, returning the
    /// file header and loaded contents of the directory named by the
    /// last component (`start_sector` itself if `components` is empty),
    /// along with the sector of every directory visited along the way.
    fn walk_from(
        &self,
        me: &Arc<Thread>,
        start_sector: u32,
        components: &[&str],
    ) -> Result<(FileHeader, Directory, Vec<u32>), FsError> {
        let mut header = FileHeader::fetch_from(
            &self.shared.disk,
            &self.shared.scheduler,
            me,
            &self.shared.stats,
            start_sector,
        )?;
        let mut dir = self.load_directory(me, &header)?;
        let mut visited = Vec::new();

        for component in components {
            let sector = dir.find(component).ok_or(FsError::FileNotFound)?;
            if !dir.is_directory(sector) {
                return Err(FsError::NotADirectory);
            }
            visited.push(sector);
            header = FileHeader::fetch_from(
                &self.shared.disk,
                &self.shared.scheduler,
                me,
                &self.shared.stats,
                sector,
            )?;
            dir = self.load_directory(me, &header)?;
        }
        Ok((header, dir, visited))
    }

    /// Walks `components` starting from `start_sector`, returning the
    /// file header, loaded contents, and sector of the directory named by
    /// the last component (`start_sector` itself if `components` is
    /// empty). Mirrors `FileSystem::ChangeDirectory` generalized to
    /// arbitrary nesting depth rather than the original's fixed
    /// ten-component array, and to an arbitrary starting directory rather
    /// than always the root.
    fn resolve_directory(
        &self,
        me: &Arc<Thread>,
        start_sector: u32,
        components: &[&str],
    ) -> Result<(FileHeader, Directory, u32), FsError> {
        let (header, dir, visited) = self.walk_from(me, start_sector, components)?;
        let sector = visited.last().copied().unwrap_or(start_sector);
        Ok((header, dir, sector))
    }

    fn resolve_parent<'a>(
        &self,
        me: &Arc<Thread>,
        path: &'a str,
    ) -> Result<(FileHeader, Directory, u32, &'a str), FsError> {
        let start = self.start_sector(me, path);
        let (components, name) = path::split(path)?;
        let (header, dir, sector) = self.resolve_directory(me, start, &components)?;
        Ok((header, dir, sector, name))
    }

    /// Resolves `path` to a directory and returns the full chain of
    /// header sectors from the root down to it, for `cd` to install as
    /// the calling thread's new working-directory stack. A leading `/`
    /// resolves from the root; otherwise resolution continues from (and
    /// the returned chain extends) the thread's current directory.
    pub fn resolve_cwd(&self, me: &Arc<Thread>, path: &str) -> Result<Vec<u32>, FsError> {
        let mut stack = if path.starts_with('/') { Vec::new() } else { me.cwd_stack() };
        let start_sector = stack.last().copied().unwrap_or(DIRECTORY_SECTOR);
        let components: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let (_header, _dir, visited) = self.walk_from(me, start_sector, &components)?;
        stack.extend(visited);
        Ok(stack)
    }

    pub fn create(
        &self,
        me: &Arc<Thread>,
        path: &str,
        initial_size: u32,
        is_dir: bool,
    ) -> Result<(), FsError> {
        let (parent_header, mut dir, parent_sector, name) = self.resolve_parent(me, path)?;
        let dir_lock_entry = self.shared.directories.add_directory(parent_sector);
        crate::fs::subdir_lock::lock_of(&dir_lock_entry).acquire(&self.shared.scheduler, me);

        let result = (|| {
            if dir.find(name).is_some() {
                return Err(FsError::FileAlreadyExists);
            }
            let sector = self.shared.with_free_map_mut(me, |free_map| free_map.find())??;
            let mut header = FileHeader::new();

            if let Err(e) = self.shared.with_free_map_mut(me, |free_map| {
                header.allocate(
                    free_map,
                    &self.shared.disk,
                    &self.shared.scheduler,
                    me,
                    &self.shared.stats,
                    initial_size,
                )
            })? {
                self.shared.with_free_map_mut(me, |free_map| free_map.clear(sector as usize))?;
                return Err(e);
            }

            if let Err(e) = dir.add(name, sector as u32, is_dir) {
                self.shared.with_free_map_mut(me, |free_map| {
                    header.deallocate(free_map, &self.shared.disk, &self.shared.scheduler, me, &self.shared.stats)?;
                    free_map.clear(sector as usize);
                    Ok::<(), FsError>(())
                })??;
                return Err(e);
            }

            header.write_back(&self.shared.disk, &self.shared.scheduler, me, &self.shared.stats, sector as u32)?;

            if is_dir {
                let entries = Directory::new(NUM_DIR_ENTRIES);
                self.store_directory(me, &header, &entries)?;
            }
            self.store_directory(me, &parent_header, &dir)?;
            Ok(())
        })();

        crate::fs::subdir_lock::lock_of(&dir_lock_entry).release(&self.shared.scheduler, me).unwrap();
        self.shared.directories.close_directory(parent_sector);
        result
    }

    pub fn open(&self, me: &Arc<Thread>, path: &str) -> Result<OpenFile, FsError> {
        let (_parent_header, dir, parent_sector, name) = self.resolve_parent(me, path)?;
        let dir_lock_entry = self.shared.directories.add_directory(parent_sector);
        crate::fs::subdir_lock::lock_of(&dir_lock_entry).acquire(&self.shared.scheduler, me);

        let result = (|| {
            let sector = dir.find(name).ok_or(FsError::FileNotFound)?;
            if dir.is_directory(sector) {
                return Err(FsError::IsADirectory);
            }
            if !self.shared.open_files.open(sector) {
                return Err(FsError::FileNotFound);
            }
            let header = FileHeader::fetch_from(
                &self.shared.disk,
                &self.shared.scheduler,
                me,
                &self.shared.stats,
                sector,
            )?;
            Ok(OpenFile::new(sector, header, self.shared.clone()))
        })();

        crate::fs::subdir_lock::lock_of(&dir_lock_entry).release(&self.shared.scheduler, me).unwrap();
        self.shared.directories.close_directory(parent_sector);
        result
    }

    pub fn remove(&self, me: &Arc<Thread>, path: &str) -> Result<(), FsError> {
        let (parent_header, mut dir, parent_sector, name) = self.resolve_parent(me, path)?;
        let dir_lock_entry = self.shared.directories.add_directory(parent_sector);
        crate::fs::subdir_lock::lock_of(&dir_lock_entry).acquire(&self.shared.scheduler, me);

        let result = (|| {
            let sector = dir.find(name).ok_or(FsError::FileNotFound)?;
            let is_dir = dir.is_directory(sector);

            if is_dir {
                self.remove_contents(me, sector)?;
            }

            dir.remove(name)?;
            self.store_directory(me, &parent_header, &dir)?;

            if self.shared.open_files.is_open(sector) {
                self.shared.open_files.mark_to_delete(sector);
            } else {
                self.release_sector(me, sector)?;
            }
            Ok(())
        })();

        crate::fs::subdir_lock::lock_of(&dir_lock_entry).release(&self.shared.scheduler, me).unwrap();
        self.shared.directories.close_directory(parent_sector);
        result
    }

    /// Recursively deletes every entry inside the directory at `sector`,
    /// bottom-up so a subdirectory's own contents are gone before its
    /// header is reclaimed. Mirrors the directory case of upstream
    /// `FileSystem::Remove` (`filesys/file_system.cc:494-510`), which
    /// walks and deletes a directory's children before removing it.
    fn remove_contents(&self, me: &Arc<Thread>, sector: u32) -> Result<(), FsError> {
        let dir_lock_entry = self.shared.directories.add_directory(sector);
        crate::fs::subdir_lock::lock_of(&dir_lock_entry).acquire(&self.shared.scheduler, me);

        let result = (|| {
            let header = FileHeader::fetch_from(
                &self.shared.disk,
                &self.shared.scheduler,
                me,
                &self.shared.stats,
                sector,
            )?;
            let dir = self.load_directory(me, &header)?;
            for entry in dir.entries_in_use() {
                if entry.is_directory != 0 {
                    self.remove_contents(me, entry.sector)?;
                }
                if self.shared.open_files.is_open(entry.sector) {
                    self.shared.open_files.mark_to_delete(entry.sector);
                } else {
                    self.release_sector(me, entry.sector)?;
                }
            }
            Ok(())
        })();

        crate::fs::subdir_lock::lock_of(&dir_lock_entry).release(&self.shared.scheduler, me).unwrap();
        self.shared.directories.close_directory(sector);
        result
    }

    fn release_sector(&self, me: &Arc<Thread>, sector: u32) -> Result<(), FsError> {
        let header = FileHeader::fetch_from(
            &self.shared.disk,
            &self.shared.scheduler,
            me,
            &self.shared.stats,
            sector,
        )?;
        self.shared.with_free_map_mut(me, |free_map| {
            header.deallocate(free_map, &self.shared.disk, &self.shared.scheduler, me, &self.shared.stats)?;
            free_map.clear(sector as usize);
            Ok::<(), FsError>(())
        })??;
        Ok(())
    }

    pub fn list(&self, me: &Arc<Thread>, path: &str) -> Result<Vec<String>, FsError> {
        if path == "/" {
            let mut dir = Directory::new(self.directory_file.length() as usize / directory_entry_size());
            let dir_lock_entry = self.shared.directories.add_directory(DIRECTORY_SECTOR);
            crate::fs::subdir_lock::lock_of(&dir_lock_entry).acquire(&self.shared.scheduler, me);
            dir.fetch_from(me, &self.directory_file)?;
            crate::fs::subdir_lock::lock_of(&dir_lock_entry).release(&self.shared.scheduler, me).unwrap();
            self.shared.directories.close_directory(DIRECTORY_SECTOR);
            return Ok(dir.list());
        }
        let start = self.start_sector(me, path);
        let components: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let (_header, dir, _sector) = self.resolve_directory(me, start, &components)?;
        Ok(dir.list())
    }

    /// Runs the shadow-bitmap consistency check described in
    /// `FileSystem::Check`: walks every reachable file header, marking
    /// the sectors it claims in a fresh bitmap, then compares that shadow
    /// bitmap against the real free-space bitmap sector for sector.
    pub fn check(&self, me: &Arc<Thread>) -> Result<bool, FsError> {
        let mut shadow = Bitmap::new(self.shared.num_sectors);
        shadow.mark(FREE_MAP_SECTOR as usize);
        shadow.mark(DIRECTORY_SECTOR as usize);
        let mut ok = true;

        let mut dir = Directory::new(self.directory_file.length() as usize / directory_entry_size());
        dir.fetch_from(me, &self.directory_file)?;
        self.check_directory(me, &dir, &mut shadow, &mut ok)?;

        let actual = self.shared.with_free_map_mut(me, |free_map| {
            for bit in 0..self.shared.num_sectors {
                if free_map.test(bit) != shadow.test(bit) {
                    return false;
                }
            }
            true
        })?;
        Ok(ok && actual)
    }

    /// Walks every entry in `dir`, marking each header's owned sectors
    /// (direct, single-indirect, and double-indirect alike) into `shadow`
    /// and recursing into subdirectories, so the shadow bitmap built by
    /// `check` actually mirrors what a consistent disk has allocated.
    fn check_directory(
        &self,
        me: &Arc<Thread>,
        dir: &Directory,
        shadow: &mut Bitmap,
        ok: &mut bool,
    ) -> Result<(), FsError> {
        for entry in dir.entries_in_use() {
            if shadow.test(entry.sector as usize) {
                *ok = false;
            } else {
                shadow.mark(entry.sector as usize);
            }
            let header = FileHeader::fetch_from(
                &self.shared.disk,
                &self.shared.scheduler,
                me,
                &self.shared.stats,
                entry.sector,
            )?;
            header.mark_owned_sectors(shadow, &self.shared.disk, &self.shared.scheduler, me, &self.shared.stats)?;
            if header.raw.num_sectors
                < ((header.raw.num_bytes as usize + SECTOR_SIZE - 1) / SECTOR_SIZE) as u32
            {
                *ok = false;
            }
            if entry.is_directory != 0 {
                let child_dir = self.load_directory(me, &header)?;
                self.check_directory(me, &child_dir, shadow, ok)?;
            }
        }
        Ok(())
    }

    /// Dumps the free-space bitmap, root directory listing, and every
    /// reachable file header's size to the log, mirroring
    /// `FileSystem::Print`.
    pub fn print(&self, me: &Arc<Thread>) -> Result<(), FsError> {
        self.shared.with_free_map_mut(me, |free_map| {
            log::info!(
                "free map: {} of {} sectors free",
                free_map.count_clear(),
                free_map.num_bits()
            );
        })?;

        let mut dir = Directory::new(self.directory_file.length() as usize / directory_entry_size());
        dir.fetch_from(me, &self.directory_file)?;
        for entry in dir.entries_in_use() {
            let header = FileHeader::fetch_from(
                &self.shared.disk,
                &self.shared.scheduler,
                me,
                &self.shared.stats,
                entry.sector,
            )?;
            log::info!(
                "{} ({}): {} bytes",
                entry.name_str(),
                if entry.is_directory != 0 { "dir" } else { "file" },
                header.file_length()
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machine::disk::SynchDisk;
    use crate::machine::stats::Statistics;
    use crate::thread::thread::DEFAULT_PRIORITY;
    use crate::thread::Scheduler;

    fn make_fs(name: &str, num_sectors: usize) -> (FileSystem, Arc<Thread>) {
        let scheduler = Scheduler::new();
        let bootstrap = Arc::new(Thread::new("bootstrap", DEFAULT_PRIORITY));
        let dir = std::env::temp_dir().join(format!("nachos-filesystem-test-{name}-{:?}", std::thread::current().id()));
        let disk = Arc::new(SynchDisk::open(&dir, num_sectors).unwrap());
        let stats = Arc::new(Statistics::new());
        let fs = FileSystem::new(disk, scheduler, stats, num_sectors, true).unwrap();
        (fs, bootstrap)
    }

    #[test]
    fn create_open_close_remove_leaves_free_map_unchanged() {
        let (fs, me) = make_fs("roundtrip", 64);
        assert!(fs.check(&me).unwrap());

        fs.create(&me, "greeting", 0, false).unwrap();
        let file = fs.open(&me, "greeting").unwrap();
        drop(file);
        fs.remove(&me, "greeting").unwrap();

        assert!(fs.check(&me).unwrap());
    }

    #[test]
    fn remove_recursively_deletes_directory_contents() {
        let (fs, me) = make_fs("recursive-remove", 64);
        fs.create(&me, "sub", 0, true).unwrap();
        fs.create(&me, "sub/a", 0, false).unwrap();
        fs.create(&me, "sub/nested", 0, true).unwrap();
        fs.create(&me, "sub/nested/b", 0, false).unwrap();

        fs.remove(&me, "sub").unwrap();

        match fs.open(&me, "sub/a") {
            Err(FsError::FileNotFound) => {}
            Ok(_) => panic!("expected removed directory's contents to be gone"),
            Err(e) => panic!("unexpected error: {e}"),
        }
        assert!(fs.list(&me, "/").unwrap().is_empty());
        assert!(fs.check(&me).unwrap());
    }

    #[test]
    fn create_rolls_back_header_sector_on_directory_full() {
        let (fs, me) = make_fs("create-rollback", 64);
        fs.create(&me, "sub", 0, true).unwrap();
        for i in 0..NUM_DIR_ENTRIES {
            fs.create(&me, &format!("sub/{i}"), 0, false).unwrap();
        }

        assert_eq!(
            fs.create(&me, "sub/overflow", 0, false).unwrap_err(),
            FsError::DirectoryFull
        );
        // The header sector claimed before `Directory::add` failed must
        // have been freed, or the free map would now disagree with what
        // is actually reachable from the root.
        assert!(fs.check(&me).unwrap());
    }

    #[test]
    fn relative_paths_resolve_against_thread_cwd() {
        let (fs, me) = make_fs("relative-cwd", 64);
        fs.create(&me, "sub", 0, true).unwrap();

        let stack = fs.resolve_cwd(&me, "sub").unwrap();
        me.set_cwd(stack);

        fs.create(&me, "inner", 0, false).unwrap();
        assert!(fs.open(&me, "sub/inner").is_ok());
        assert!(fs.open(&me, "inner").is_err());
        assert_eq!(fs.list(&me, "").unwrap(), vec!["inner".to_string()]);
    }

    #[test]
    fn check_reports_consistent_disk_with_nested_directories() {
        let (fs, me) = make_fs("check-nested", 128);
        fs.create(&me, "sub", 0, true).unwrap();
        // Large enough to spill past the direct blocks into the
        // single-indirect block, so `check` must mark those sectors too.
        fs.create(&me, "sub/file", (crate::fs::layout::NUM_DIRECT as u32 + 4) * SECTOR_SIZE as u32, false)
            .unwrap();
        assert!(fs.check(&me).unwrap());
    }
}

fn write_bytes_via(
    disk: &Arc<SynchDisk>,
    scheduler: &Arc<Scheduler>,
    me: &Arc<Thread>,
    stats: &Arc<Statistics>,
    header: &FileHeader,
    bytes: &[u8],
) -> Result<(), FsError> {
    let num_sectors = (bytes.len() + SECTOR_SIZE - 1) / SECTOR_SIZE;
    for i in 0..num_sectors {
        let sector = header.byte_to_sector(disk, scheduler, me, stats, (i * SECTOR_SIZE) as u32)?;
        let mut buf = [0u8; SECTOR_SIZE];
        let start = i * SECTOR_SIZE;
        let end = (start + SECTOR_SIZE).min(bytes.len());
        buf[..end - start].copy_from_slice(&bytes[start..end]);
        disk.write_sector(scheduler, me, stats, sector as usize, &buf)?;
    }
    Ok(())
}
