//! Directories: a flat table of name/sector/is-directory entries, stored as
//! the data of an ordinary file. Grounded on upstream `Directory`
//! (`filesys/directory.cc`, referenced from `file_system.cc`'s `Create`/
//! `Open`/`Remove`); unlike the base Nachos assignment this line is built
//! from, entries carry an `is_directory` flag so the tree can nest, per
//! the "hierarchical directory tree" in scope here.

use std::mem::size_of;
use std::sync::Arc;

use crate::fs::layout::DirectoryEntry;
use crate::fs::open_file::OpenFile;
use crate::fs::FsError;
use crate::thread::Thread;

pub struct Directory {
    entries: Vec<DirectoryEntry>,
}

impl Directory {
    pub fn new(num_entries: usize) -> Self {
        Directory {
            entries: vec![DirectoryEntry::default(); num_entries],
        }
    }

    /// Decodes a directory's raw byte contents into entries, one
    /// `DirectoryEntry`-sized chunk at a time.
    pub fn decode(num_entries: usize, bytes: &[u8]) -> Self {
        let mut entries = vec![DirectoryEntry::default(); num_entries];
        for (i, entry) in entries.iter_mut().enumerate() {
            let start = i * size_of::<DirectoryEntry>();
            let end = start + size_of::<DirectoryEntry>();
            if end > bytes.len() {
                break;
            }
            *entry = zerocopy::FromBytes::read_from(&bytes[start..end])
                .expect("entry-sized slice always matches layout");
        }
        Directory { entries }
    }

    /// Encodes the directory back to the raw bytes a file's data blocks
    /// would hold.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.entries.len() * size_of::<DirectoryEntry>());
        for entry in &self.entries {
            buf.extend_from_slice(zerocopy::AsBytes::as_bytes(entry));
        }
        buf
    }

    pub fn fetch_from(&mut self, me: &Arc<Thread>, dir_file: &OpenFile) -> Result<(), FsError> {
        let len = dir_file.length() as usize;
        let mut buf = vec![0u8; len];
        dir_file.read_at(me, &mut buf, 0)?;
        *self = Directory::decode(len / size_of::<DirectoryEntry>(), &buf);
        Ok(())
    }

    pub fn write_back(&self, me: &Arc<Thread>, dir_file: &OpenFile) -> Result<(), FsError> {
        dir_file.write_at(me, &self.encode(), 0)?;
        Ok(())
    }

    pub fn find(&self, name: &str) -> Option<u32> {
        self.entries
            .iter()
            .find(|e| e.in_use != 0 && e.name_str() == name)
            .map(|e| e.sector)
    }

    pub fn is_directory(&self, sector: u32) -> bool {
        self.entries
            .iter()
            .any(|e| e.in_use != 0 && e.sector == sector && e.is_directory != 0)
    }

    pub fn add(&mut self, name: &str, sector: u32, is_directory: bool) -> Result<(), FsError> {
        if self.find(name).is_some() {
            return Err(FsError::FileAlreadyExists);
        }
        let slot = self
            .entries
            .iter_mut()
            .find(|e| e.in_use == 0)
            .ok_or(FsError::DirectoryFull)?;
        slot.in_use = 1;
        slot.is_directory = is_directory as u32;
        slot.sector = sector;
        slot.set_name(name)?;
        Ok(())
    }

    pub fn remove(&mut self, name: &str) -> Result<u32, FsError> {
        let entry = self
            .entries
            .iter_mut()
            .find(|e| e.in_use != 0 && e.name_str() == name)
            .ok_or(FsError::FileNotFound)?;
        let sector = entry.sector;
        *entry = DirectoryEntry::default();
        Ok(sector)
    }

    pub fn entries_in_use(&self) -> impl Iterator<Item = &DirectoryEntry> {
        self.entries.iter().filter(|e| e.in_use != 0)
    }

    pub fn is_empty(&self) -> bool {
        self.entries_in_use().next().is_none()
    }

    pub fn list(&self) -> Vec<String> {
        self.entries_in_use().map(|e| e.name_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_then_find_roundtrips() {
        let mut dir = Directory::new(4);
        dir.add("foo.txt", 7, false).unwrap();
        assert_eq!(dir.find("foo.txt"), Some(7));
        assert!(!dir.is_directory(7));
    }

    #[test]
    fn add_duplicate_name_fails() {
        let mut dir = Directory::new(4);
        dir.add("foo.txt", 7, false).unwrap();
        assert_eq!(dir.add("foo.txt", 8, false), Err(FsError::FileAlreadyExists));
    }

    #[test]
    fn full_directory_rejects_add() {
        let mut dir = Directory::new(1);
        dir.add("a", 1, false).unwrap();
        assert_eq!(dir.add("b", 2, false), Err(FsError::DirectoryFull));
    }

    #[test]
    fn remove_frees_the_slot() {
        let mut dir = Directory::new(1);
        dir.add("a", 1, false).unwrap();
        assert_eq!(dir.remove("a"), Ok(1));
        assert!(dir.is_empty());
    }
}
