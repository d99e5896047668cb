//! On-disk structures.
//!
//! Laid out with `zerocopy` so a `RawFileHeader` or `IndirectHeader` can be
//! read/written as a raw sector with no explicit (de)serialization step,
//! matching upstream's own approach of `memcpy`-ing a C struct straight
//! onto a sector buffer. `static_assertions::const_assert!` pins each
//! struct's size to what the on-disk format actually requires, so a
//! layout change that silently breaks the format fails to compile instead
//! of corrupting a disk image at runtime.

use static_assertions::const_assert_eq;
use zerocopy::{AsBytes, FromBytes};

use crate::machine::SECTOR_SIZE;
use crate::fs::FILE_NAME_MAX_LEN;

/// `(SECTOR_SIZE - 2 * size_of::<u32>()) / size_of::<u32>()`: the number of
/// direct block pointers that fit in a file header sector alongside the
/// byte count, sector count, and the two indirect-block pointers.
pub const NUM_DIRECT: usize = (SECTOR_SIZE - 4 * 4) / 4;
/// Number of pointers that fit in one indirect block.
pub const NUM_INDIRECT: usize = SECTOR_SIZE / 4;
/// Largest file representable with 1 level of direct blocks, 1 level of
/// single indirection, and 1 level of double indirection.
pub const MAX_FILE_SIZE: usize = (NUM_INDIRECT * NUM_INDIRECT + NUM_INDIRECT + NUM_DIRECT) * SECTOR_SIZE;

#[repr(C)]
#[derive(Debug, Clone, Copy, AsBytes, FromBytes)]
pub struct RawFileHeader {
    pub num_bytes: u32,
    pub num_sectors: u32,
    pub data_sectors: [u32; NUM_DIRECT],
    pub simple_indirect: u32,
    pub double_indirect: u32,
}

const_assert_eq!(std::mem::size_of::<RawFileHeader>(), SECTOR_SIZE);

impl Default for RawFileHeader {
    fn default() -> Self {
        RawFileHeader {
            num_bytes: 0,
            num_sectors: 0,
            data_sectors: [0; NUM_DIRECT],
            simple_indirect: 0,
            double_indirect: 0,
        }
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, AsBytes, FromBytes)]
pub struct IndirectHeader {
    pub data_sectors: [u32; NUM_INDIRECT],
}

const_assert_eq!(std::mem::size_of::<IndirectHeader>(), SECTOR_SIZE);

impl Default for IndirectHeader {
    fn default() -> Self {
        IndirectHeader {
            data_sectors: [0; NUM_INDIRECT],
        }
    }
}

#[repr(C, packed)]
#[derive(Debug, Clone, Copy, AsBytes, FromBytes)]
pub struct DirectoryEntry {
    pub in_use: u32,
    pub is_directory: u32,
    pub sector: u32,
    pub name: [u8; FILE_NAME_MAX_LEN],
}

const_assert_eq!(std::mem::size_of::<DirectoryEntry>(), 12 + FILE_NAME_MAX_LEN);

impl Default for DirectoryEntry {
    fn default() -> Self {
        DirectoryEntry {
            in_use: 0,
            is_directory: 0,
            sector: 0,
            name: [0; FILE_NAME_MAX_LEN],
        }
    }
}

impl DirectoryEntry {
    pub fn name_str(&self) -> String {
        let end = self.name.iter().position(|&b| b == 0).unwrap_or(self.name.len());
        String::from_utf8_lossy(&self.name[..end]).into_owned()
    }

    pub fn set_name(&mut self, name: &str) -> Result<(), crate::fs::FsError> {
        let bytes = name.as_bytes();
        if bytes.len() >= FILE_NAME_MAX_LEN {
            return Err(crate::fs::FsError::NameTooLong);
        }
        self.name = [0; FILE_NAME_MAX_LEN];
        self.name[..bytes.len()].copy_from_slice(bytes);
        Ok(())
    }
}
