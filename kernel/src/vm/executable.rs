//! The loadable executable image: a magic number followed by code,
//! initialized-data, and uninitialized-data segment descriptors.
//! Grounded on upstream `Executable`/`NoffHeader`, referenced throughout
//! `userprog/address_space.cc` as `exe.CheckMagic`/`GetCodeSize`/
//! `GetInitDataAddr`/`ReadCodeBlock`/`ReadDataBlock`.

use std::sync::Arc;

use zerocopy::{AsBytes, FromBytes};

use crate::fs::OpenFile;
use crate::thread::Thread;
use crate::vm::VmError;

const MAGIC: u32 = 0x0BAD_FAD0;

#[derive(Debug, Clone, Copy, Default, AsBytes, FromBytes)]
#[repr(C)]
struct RawSegment {
    virtual_addr: u32,
    file_addr: u32,
    size: u32,
}

#[derive(Debug, Clone, Copy, Default, AsBytes, FromBytes)]
#[repr(C)]
struct RawHeader {
    magic: u32,
    code: RawSegment,
    init_data: RawSegment,
    uninit_data: RawSegment,
}

/// A parsed executable image, still backed by the open file it was read
/// from — segments are read lazily, block by block, as pages fault in.
pub struct Executable {
    file: OpenFile,
    header: RawHeader,
}

impl std::fmt::Debug for Executable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executable").field("header", &self.header).finish()
    }
}

impl Executable {
    pub fn load(file: OpenFile, me: &Arc<Thread>) -> Result<Self, VmError> {
        let mut buf = [0u8; std::mem::size_of::<RawHeader>()];
        file.read_at(me, &mut buf, 0)?;
        let header = RawHeader::read_from(&buf[..]).expect("fixed-size header buffer matches layout");
        if header.magic != MAGIC {
            return Err(VmError::BadExecutable);
        }
        Ok(Executable { file, header })
    }

    pub fn code_vaddr(&self) -> u32 {
        self.header.code.virtual_addr
    }

    pub fn code_size(&self) -> u32 {
        self.header.code.size
    }

    pub fn init_data_vaddr(&self) -> u32 {
        self.header.init_data.virtual_addr
    }

    pub fn init_data_size(&self) -> u32 {
        self.header.init_data.size
    }

    pub fn uninit_data_size(&self) -> u32 {
        self.header.uninit_data.size
    }

    /// Total in-memory footprint of the loaded segments, before the stack
    /// is added on top.
    pub fn in_memory_size(&self) -> u32 {
        self.code_size() + self.init_data_size() + self.uninit_data_size()
    }

    /// Reads `buf.len()` bytes of the code segment starting
    /// `offset_in_segment` bytes into it.
    pub fn read_code_block(
        &self,
        me: &Arc<Thread>,
        buf: &mut [u8],
        offset_in_segment: u32,
    ) -> Result<(), VmError> {
        self.file
            .read_at(me, buf, self.header.code.file_addr + offset_in_segment)?;
        Ok(())
    }

    /// Reads `buf.len()` bytes of the initialized-data segment starting
    /// `offset_in_segment` bytes into it.
    pub fn read_data_block(
        &self,
        me: &Arc<Thread>,
        buf: &mut [u8],
        offset_in_segment: u32,
    ) -> Result<(), VmError> {
        self.file
            .read_at(me, buf, self.header.init_data.file_addr + offset_in_segment)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::FileSystem;
    use crate::machine::disk::SynchDisk;
    use crate::machine::stats::Statistics;
    use crate::thread::{Scheduler, Thread};

    fn write_executable(fs: &FileSystem, me: &Arc<Thread>, path: &str, code: &[u8], data: &[u8]) {
        let header = RawHeader {
            magic: MAGIC,
            code: RawSegment {
                virtual_addr: 0,
                file_addr: std::mem::size_of::<RawHeader>() as u32,
                size: code.len() as u32,
            },
            init_data: RawSegment {
                virtual_addr: code.len() as u32,
                file_addr: std::mem::size_of::<RawHeader>() as u32 + code.len() as u32,
                size: data.len() as u32,
            },
            uninit_data: RawSegment::default(),
        };
        let mut bytes = header.as_bytes().to_vec();
        bytes.extend_from_slice(code);
        bytes.extend_from_slice(data);
        fs.create(me, path, 0, false).unwrap();
        let file = fs.open(me, path).unwrap();
        file.write_at(me, &bytes, 0).unwrap();
    }

    fn setup() -> (Arc<FileSystem>, Arc<Thread>) {
        let scheduler = Scheduler::new();
        let me = Arc::new(Thread::new("t", crate::thread::thread::DEFAULT_PRIORITY));
        let dir = std::env::temp_dir().join(format!("nachos-exe-test-{:?}", std::thread::current().id()));
        let disk = Arc::new(SynchDisk::open(&dir, 64).unwrap());
        let stats = Arc::new(Statistics::new());
        let fs = Arc::new(FileSystem::new(disk, scheduler, stats, 64, true).unwrap());
        (fs, me)
    }

    #[test]
    fn loads_a_valid_header() {
        let (fs, me) = setup();
        write_executable(&fs, &me, "prog", &[1, 2, 3, 4], &[9, 9]);
        let file = fs.open(&me, "prog").unwrap();
        let exe = Executable::load(file, &me).unwrap();
        assert_eq!(exe.code_size(), 4);
        assert_eq!(exe.init_data_size(), 2);
        assert_eq!(exe.init_data_vaddr(), 4);
    }

    #[test]
    fn rejects_bad_magic() {
        let (fs, me) = setup();
        fs.create(&me, "junk", 0, false).unwrap();
        let file = fs.open(&me, "junk").unwrap();
        file.write_at(&me, &[0u8; 64], 0).unwrap();
        let file = fs.open(&me, "junk").unwrap();
        assert_eq!(Executable::load(file, &me).unwrap_err(), VmError::BadExecutable);
    }

    #[test]
    fn read_code_block_reads_the_right_bytes() {
        let (fs, me) = setup();
        write_executable(&fs, &me, "prog", &[10, 20, 30, 40], &[]);
        let file = fs.open(&me, "prog").unwrap();
        let exe = Executable::load(file, &me).unwrap();
        let mut buf = [0u8; 2];
        exe.read_code_block(&me, &mut buf, 1).unwrap();
        assert_eq!(buf, [20, 30]);
    }
}
