//! One lock per directory sector, reference-counted across concurrent
//! users of the same directory. Grounded on upstream `DirectoryList`
//! (`filesys/directory_list.cc`): `add_directory` returns the shared lock
//! for a sector, creating it on first reference; `close_directory` drops a
//! reference and tears the entry down once nobody holds it, so locks for
//! directories nobody is touching do not accumulate for the lifetime of
//! the file system.

use nachos_support::{Registry, RegistryHandle};

use crate::sync::Lock;

pub struct SubdirEntry {
    num_threads: std::sync::Mutex<u32>,
    lock: Lock,
}

pub struct SubdirLockRegistry {
    table: Registry<u32, SubdirEntry>,
}

impl SubdirLockRegistry {
    pub fn new() -> Self {
        SubdirLockRegistry {
            table: Registry::new(),
        }
    }

    /// Returns the lock for `sector`, creating it (with a reference count
    /// of 1) if this is the first reference, otherwise bumping the count.
    pub fn add_directory(&self, sector: u32) -> RegistryHandle<SubdirEntry> {
        let entry = self.table.get_or_insert_with(sector, || SubdirEntry {
            num_threads: std::sync::Mutex::new(0),
            lock: Lock::new("subdirectory lock"),
        });
        *entry.num_threads.lock().unwrap() += 1;
        entry
    }

    /// Drops one reference to `sector`'s lock, removing the entry once the
    /// count reaches zero. Returns `true` if the entry was removed.
    pub fn close_directory(&self, sector: u32) -> bool {
        let Some(entry) = self.table.get(&sector) else {
            return false;
        };
        let mut count = entry.num_threads.lock().unwrap();
        *count -= 1;
        let empty = *count == 0;
        drop(count);
        if empty {
            self.table.remove(&sector);
        }
        empty
    }
}

impl Default for SubdirLockRegistry {
    fn default() -> Self {
        Self::new()
    }
}

pub fn lock_of(entry: &RegistryHandle<SubdirEntry>) -> &Lock {
    &entry.lock
}
