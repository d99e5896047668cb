//! File syscalls: `Create`, `Remove`, `Open`, `Close`, `Read`, `Write`,
//! plus the filesystem-mode extensions `Cd`/`Ls`. Grounded on upstream
//! `SyscallHandler`'s `SC_Create`/`SC_Open`/`SC_Read`/`SC_Write`/`SC_Close`
//! cases (`userprog/syscall.cc`), which read the path or buffer argument
//! out of user memory before calling into `FileSystem`/`OpenFile` exactly
//! the way these do.

use std::sync::Arc;

use super::proc_calls::{Kernel, Process};
use super::transfer;
use super::KernelError;

/// Upstream bounds path length reads at a fixed buffer size
/// (`MAX_STRING_SIZE` in `lib/utility.hh`); kept here for the same
/// reason — `ReadStringFromUser` needs a bound, and paths are never
/// meaningfully longer than this.
const MAX_PATH_LEN: usize = 256;

fn read_path(process: &Arc<Process>, path_vaddr: u32) -> Result<String, KernelError> {
    Ok(transfer::read_string_from_user(&process.address_space, &process.thread, path_vaddr, MAX_PATH_LEN)?)
}

pub fn create(kernel: &Arc<Kernel>, process: &Arc<Process>, path_vaddr: u32) -> Result<(), KernelError> {
    let path = read_path(process, path_vaddr)?;
    kernel.fs.create(&process.thread, &path, 0, false)?;
    Ok(())
}

pub fn remove(kernel: &Arc<Kernel>, process: &Arc<Process>, path_vaddr: u32) -> Result<(), KernelError> {
    let path = read_path(process, path_vaddr)?;
    kernel.fs.remove(&process.thread, &path)?;
    Ok(())
}

pub fn open(kernel: &Arc<Kernel>, process: &Arc<Process>, path_vaddr: u32) -> Result<u32, KernelError> {
    let path = read_path(process, path_vaddr)?;
    let file = kernel.fs.open(&process.thread, &path)?;
    Ok(process.insert_file(file))
}

pub fn close(process: &Arc<Process>, fd: u32) -> Result<(), KernelError> {
    process.take_file(fd).map(|_| ()).ok_or(KernelError::BadFileDescriptor)
}

/// Reads up to `count` bytes from `fd` into the user buffer at
/// `buf_vaddr`, returning the number of bytes actually read.
pub fn read(process: &Arc<Process>, buf_vaddr: u32, count: u32, fd: u32) -> Result<u32, KernelError> {
    let data = process
        .with_file(fd, |file| -> Result<Vec<u8>, KernelError> {
            let mut buf = vec![0u8; count as usize];
            let n = file.read(&process.thread, &mut buf)?;
            buf.truncate(n as usize);
            Ok(buf)
        })
        .ok_or(KernelError::BadFileDescriptor)??;
    transfer::write_buffer_to_user(&process.address_space, &process.thread, buf_vaddr, &data)?;
    Ok(data.len() as u32)
}

/// Writes `count` bytes from the user buffer at `buf_vaddr` to `fd`,
/// returning the number of bytes actually written.
pub fn write(process: &Arc<Process>, buf_vaddr: u32, count: u32, fd: u32) -> Result<u32, KernelError> {
    let data = transfer::read_buffer_from_user(&process.address_space, &process.thread, buf_vaddr, count as usize)?;
    let n = process
        .with_file(fd, |file| file.write(&process.thread, &data))
        .ok_or(KernelError::BadFileDescriptor)??;
    Ok(n)
}

/// Changes the process's current directory: resolves `path` (absolute
/// from the root, or relative to the thread's current directory) and,
/// once confirmed to name a directory, installs the resulting chain of
/// header sectors as the thread's new working-directory stack.
pub fn cd(kernel: &Arc<Kernel>, process: &Arc<Process>, path_vaddr: u32) -> Result<(), KernelError> {
    let path = read_path(process, path_vaddr)?;
    let stack = kernel.fs.resolve_cwd(&process.thread, &path)?;
    process.thread.set_cwd(stack);
    Ok(())
}

/// Lists the process's current directory.
pub fn ls(kernel: &Arc<Kernel>, process: &Arc<Process>) -> Result<Vec<String>, KernelError> {
    Ok(kernel.fs.list(&process.thread, "")?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BootConfig, Features, SwapPolicy};
    use crate::fs::FileSystem;
    use crate::machine::disk::SynchDisk;
    use crate::machine::stats::Statistics;
    use crate::syscall::transfer;
    use crate::thread::thread::DEFAULT_PRIORITY;
    use crate::thread::{Scheduler, Thread};
    use crate::vm::AddressSpace;

    fn make_kernel_and_process() -> Arc<Process> {
        let scheduler = Scheduler::new();
        let bootstrap = Arc::new(Thread::new("bootstrap", DEFAULT_PRIORITY));
        let dir = std::env::temp_dir().join(format!("nachos-fscalls-test-{:?}", std::thread::current().id()));
        let disk = Arc::new(SynchDisk::open(&dir, 64).unwrap());
        let stats = Arc::new(Statistics::new());
        let fs = Arc::new(FileSystem::new(disk, scheduler.clone(), stats.clone(), 64, true).unwrap());
        fs.create(&bootstrap, "prog", 0, false).unwrap();
        let file = fs.open(&bootstrap, "prog").unwrap();
        let mut header = [0u8; 40];
        header[0..4].copy_from_slice(&0x0BAD_FAD0u32.to_ne_bytes());
        file.write_at(&bootstrap, &header, 0).unwrap();

        let config = BootConfig {
            features: Features {
                filesys: true,
                userprog: true,
                use_tlb: true,
                demand_load: true,
                swap: true,
            },
            swap_policy: SwapPolicy::Fifo,
            num_phys_pages: 8,
            disk_path: String::new(),
            random_seed: 1,
            format: false,
            program: None,
        };
        let kernel = Kernel::new(scheduler, fs, stats, config);

        let thread = Arc::new(Thread::new("caller", DEFAULT_PRIORITY));
        let file = kernel.fs.open(&thread, "prog").unwrap();
        let space = AddressSpace::new(
            file,
            &thread,
            &kernel.config,
            kernel.coremap.clone(),
            kernel.fs.clone(),
            kernel.stats.clone(),
            kernel.scheduler.clone(),
            kernel.memory.clone(),
        )
        .unwrap();
        Process::new(thread, space)
    }

    #[test]
    fn create_open_write_read_round_trip() {
        let scheduler = Scheduler::new();
        let bootstrap = Arc::new(Thread::new("bootstrap", DEFAULT_PRIORITY));
        let dir = std::env::temp_dir().join(format!("nachos-fscalls-rw-test-{:?}", std::thread::current().id()));
        let disk = Arc::new(SynchDisk::open(&dir, 64).unwrap());
        let stats = Arc::new(Statistics::new());
        let fs = Arc::new(FileSystem::new(disk, scheduler.clone(), stats.clone(), 64, true).unwrap());
        fs.create(&bootstrap, "prog", 0, false).unwrap();
        let file = fs.open(&bootstrap, "prog").unwrap();
        let mut header = [0u8; 40];
        header[0..4].copy_from_slice(&0x0BAD_FAD0u32.to_ne_bytes());
        file.write_at(&bootstrap, &header, 0).unwrap();

        let config = BootConfig {
            features: Features {
                filesys: true,
                userprog: true,
                use_tlb: true,
                demand_load: true,
                swap: true,
            },
            swap_policy: SwapPolicy::Fifo,
            num_phys_pages: 8,
            disk_path: String::new(),
            random_seed: 1,
            format: false,
            program: None,
        };
        let kernel = Kernel::new(scheduler, fs, stats, config);

        let thread = Arc::new(Thread::new("caller", DEFAULT_PRIORITY));
        let exe_file = kernel.fs.open(&thread, "prog").unwrap();
        let space = AddressSpace::new(
            exe_file,
            &thread,
            &kernel.config,
            kernel.coremap.clone(),
            kernel.fs.clone(),
            kernel.stats.clone(),
            kernel.scheduler.clone(),
            kernel.memory.clone(),
        )
        .unwrap();
        let process = Process::new(thread, space);

        // Path name lives at vaddr 0, the write payload right after it.
        transfer::write_string_to_user(&process.address_space, &process.thread, 0, "greeting").unwrap();
        create(&kernel, &process, 0).unwrap();

        let fd = open(&kernel, &process, 0).unwrap();
        transfer::write_buffer_to_user(&process.address_space, &process.thread, 32, b"hi").unwrap();
        let written = write(&process, 32, 2, fd).unwrap();
        assert_eq!(written, 2);
        close(&process, fd).unwrap();

        let fd = open(&kernel, &process, 0).unwrap();
        let n = read(&process, 64, 2, fd).unwrap();
        assert_eq!(n, 2);
        let data = transfer::read_buffer_from_user(&process.address_space, &process.thread, 64, 2).unwrap();
        assert_eq!(data, b"hi");
        close(&process, fd).unwrap();
    }

    #[test]
    fn close_on_unknown_descriptor_fails() {
        let process = make_kernel_and_process();
        assert_eq!(close(&process, 999), Err(KernelError::BadFileDescriptor));
    }
}
