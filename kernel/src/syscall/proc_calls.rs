//! Process control: `Halt`, `Exit`, `Exec`/`Exec2`, `Join`, and the
//! `Kernel`/`Process` state they operate on. Grounded on upstream
//! `SyscallHandler`'s `SC_Halt`/`SC_Exit`/`SC_Exec`/`SC_Join` cases
//! (`userprog/syscall.cc`) and `Thread::Fork`/`Thread::Finish`
//! (`threads/thread.cc`) for how a new process actually gets scheduled.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use crate::config::BootConfig;
use crate::fs::{FileSystem, FsError, OpenFile};
use crate::machine::memory::PhysicalMemory;
use crate::machine::stats::Statistics;
use crate::sync::Channel;
use crate::thread::thread::DEFAULT_PRIORITY;
use crate::thread::{Scheduler, Thread, ThreadId};
use crate::vm::{AddressSpace, Coremap};

use super::KernelError;

/// Stands in for a compiled user binary's entry point. `Exec` still
/// loads and pages in the named file through the real address-space
/// machinery; this closure is what actually "runs" in place of
/// interpreting that image as machine code (see `syscall::mod`).
pub type UserProgram = Arc<dyn Fn(&Arc<Process>) -> i32 + Send + Sync>;

/// Maps an executable path to the [`UserProgram`] that stands in for it.
#[derive(Default)]
pub struct ProgramRegistry {
    programs: Mutex<HashMap<String, UserProgram>>,
}

impl ProgramRegistry {
    pub fn new() -> Self {
        ProgramRegistry {
            programs: Mutex::new(HashMap::new()),
        }
    }

    pub fn register(&self, path: impl Into<String>, program: UserProgram) {
        self.programs.lock().unwrap().insert(path.into(), program);
    }

    fn lookup(&self, path: &str) -> Option<UserProgram> {
        self.programs.lock().unwrap().get(path).cloned()
    }
}

/// Per-pid rendezvous for `Join`: the exiting process's `Exit` sends its
/// status, the parent's `Join` receives it. Grounded on `spec.md` §9's
/// "channel rendezvous instead of yield-loops" redesign note, using
/// [`Channel`] rather than the original's semaphore-plus-shared-int.
pub struct ProcessTable {
    channels: Mutex<HashMap<ThreadId, Arc<Channel<i64>>>>,
}

impl ProcessTable {
    pub fn new() -> Arc<Self> {
        Arc::new(ProcessTable {
            channels: Mutex::new(HashMap::new()),
        })
    }

    fn register(&self, pid: ThreadId) {
        self.channels
            .lock()
            .unwrap()
            .insert(pid, Arc::new(Channel::new(format!("join-{}", pid.0))));
    }

    /// Blocks until `pid` exits, returning its status. Fails immediately
    /// if `pid` was never spawned with `allow_join`, or has already been
    /// joined once.
    pub fn join(&self, scheduler: &Scheduler, me: &Arc<Thread>, pid: ThreadId) -> Result<i64, KernelError> {
        let channel = self
            .channels
            .lock()
            .unwrap()
            .get(&pid)
            .cloned()
            .ok_or(KernelError::BadProcessId)?;
        Ok(channel.receive(scheduler, me))
    }

    /// Delivers `status` to whoever is joining `pid`, if anyone is. A
    /// no-op (not an error) for a pid with no registered channel, so
    /// both an unjoinable process exiting and a double-exit are safe.
    fn exited(&self, scheduler: &Scheduler, me: &Arc<Thread>, pid: ThreadId, status: i64) {
        if let Some(channel) = self.channels.lock().unwrap().remove(&pid) {
            channel.send(scheduler, me, status);
        }
    }
}

/// A running process: its thread, its address space, and the open-file
/// table that sits between syscalls and the filesystem/VM subsystems.
/// The current directory lives on `thread` itself, not here.
pub struct Process {
    pub thread: Arc<Thread>,
    pub address_space: Arc<AddressSpace>,
    files: Mutex<HashMap<u32, OpenFile>>,
    next_fd: AtomicU32,
}

impl Process {
    /// Wraps a thread and address space as a freshly-loaded process with
    /// no open files. The thread starts at the root directory (its `cwd`
    /// stack is empty) until `cd` moves it. Used by `Kernel::load` for
    /// `exec`-spawned processes and by a front end (e.g. `main.rs`) for
    /// the bootstrap process that issues the first `exec`.
    pub fn new(thread: Arc<Thread>, address_space: Arc<AddressSpace>) -> Arc<Self> {
        Arc::new(Process {
            thread,
            address_space,
            files: Mutex::new(HashMap::new()),
            next_fd: AtomicU32::new(2),
        })
    }

    pub fn pid(&self) -> ThreadId {
        self.thread.id
    }

    pub(crate) fn insert_file(&self, file: OpenFile) -> u32 {
        let fd = self.next_fd.fetch_add(1, Ordering::Relaxed);
        self.files.lock().unwrap().insert(fd, file);
        fd
    }

    pub(crate) fn take_file(&self, fd: u32) -> Option<OpenFile> {
        self.files.lock().unwrap().remove(&fd)
    }

    pub(crate) fn with_file<R>(&self, fd: u32, f: impl FnOnce(&OpenFile) -> R) -> Option<R> {
        self.files.lock().unwrap().get(&fd).map(f)
    }
}

/// The subsystems every process shares: the scheduler's turn token, the
/// file system, the VM machinery's shared state, and the join/program
/// registries `Exec` needs. Built once at boot and threaded through by
/// `Arc`, standing in for the "kernel-context value instead of
/// singletons" redesign `spec.md` §9 asks for.
pub struct Kernel {
    pub scheduler: Arc<Scheduler>,
    pub fs: Arc<FileSystem>,
    pub coremap: Arc<Coremap>,
    pub memory: Arc<PhysicalMemory>,
    pub stats: Arc<Statistics>,
    pub config: BootConfig,
    pub process_table: Arc<ProcessTable>,
    pub programs: ProgramRegistry,
}

impl Kernel {
    pub fn new(scheduler: Arc<Scheduler>, fs: Arc<FileSystem>, stats: Arc<Statistics>, config: BootConfig) -> Arc<Self> {
        let coremap = Arc::new(Coremap::new(config.num_phys_pages));
        let memory = Arc::new(PhysicalMemory::new(config.num_phys_pages));
        Arc::new(Kernel {
            scheduler,
            fs,
            coremap,
            memory,
            stats,
            config,
            process_table: ProcessTable::new(),
            programs: ProgramRegistry::new(),
        })
    }

    fn load(self: &Arc<Self>, caller: &Arc<Thread>, path: &str) -> Result<Arc<Process>, KernelError> {
        let exe_file = self.fs.open(caller, path)?;
        let child_thread = Arc::new(Thread::new(path, DEFAULT_PRIORITY));
        let space = AddressSpace::new(
            exe_file,
            &child_thread,
            &self.config,
            self.coremap.clone(),
            self.fs.clone(),
            self.stats.clone(),
            self.scheduler.clone(),
            self.memory.clone(),
        )?;
        Ok(Process::new(child_thread, space))
    }
}

/// Shuts the simulated machine down entirely, after reporting final
/// statistics. Mirrors `Interrupt::Halt` — there is no return from this
/// for the calling process, same as upstream.
pub fn halt(kernel: &Arc<Kernel>) -> ! {
    log::info!("machine halting!\n{}", kernel.stats.report());
    std::process::exit(0);
}

/// Ends the calling process with `status`, waking anyone blocked in
/// `Join` on its pid. Mirrors `Thread::Finish` plus the `SC_Exit`
/// handler's status bookkeeping.
///
/// Since a [`UserProgram`] is a plain closure rather than a real
/// instruction stream there's nothing to unwind out of early: a program
/// that wants to exit mid-way calls this directly and then returns: the
/// wrap-up `Exec` performs on the closure's return value is idempotent
/// with an explicit call made first (`ProcessTable::exited` only fires
/// once, since it removes the channel on delivery).
pub fn exit(kernel: &Arc<Kernel>, process: &Arc<Process>, status: i32) {
    kernel
        .process_table
        .exited(&kernel.scheduler, &process.thread, process.pid(), status as i64);
}

/// Loads `path` and runs it as a new process, scheduled independently of
/// the caller. Returns its pid; if `allow_join` is set, the pid can
/// later be passed to `join`.
pub fn exec(kernel: &Arc<Kernel>, caller: &Arc<Process>, path: &str, allow_join: bool) -> Result<ThreadId, KernelError> {
    exec2(kernel, caller, path, &[], allow_join)
}

/// As [`exec`], but `spec.md`'s filesystem-mode extension that also
/// threads `argv` through. Argument passing onto the new process's user
/// stack isn't meaningful for a closure-based program body, so `argv`
/// is handed to the program directly rather than copied across the
/// address-space boundary.
pub fn exec2(
    kernel: &Arc<Kernel>,
    caller: &Arc<Process>,
    path: &str,
    argv: &[String],
    allow_join: bool,
) -> Result<ThreadId, KernelError> {
    let program = kernel.programs.lookup(path).ok_or(KernelError::Fs(FsError::FileNotFound))?;
    let child = kernel.load(&caller.thread, path)?;
    let pid = child.pid();
    if allow_join {
        kernel.process_table.register(pid);
    }

    if !argv.is_empty() {
        log::info!("exec2 {path}: argv {argv:?} (not copied onto a user stack; see syscall::mod)");
    }

    let scheduler = kernel.scheduler.clone();
    let process_table = kernel.process_table.clone();
    let child_thread = child.thread.clone();
    std::thread::spawn(move || {
        scheduler.fork(child_thread.clone());
        let status = program(&child) as i64;
        process_table.exited(&scheduler, &child_thread, pid, status);
        scheduler.finish(&child_thread);
    });

    Ok(pid)
}

/// Blocks the caller until `pid` exits, returning its status.
pub fn join(kernel: &Arc<Kernel>, caller: &Arc<Process>, pid: ThreadId) -> Result<i64, KernelError> {
    kernel.process_table.join(&kernel.scheduler, &caller.thread, pid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::machine::disk::SynchDisk;

    fn make_kernel() -> Arc<Kernel> {
        let scheduler = Scheduler::new();
        let bootstrap = Arc::new(Thread::new("bootstrap", DEFAULT_PRIORITY));
        let dir = std::env::temp_dir().join(format!("nachos-proc-test-{:?}", std::thread::current().id()));
        let disk = Arc::new(SynchDisk::open(&dir, 64).unwrap());
        let stats = Arc::new(Statistics::new());
        let fs = Arc::new(FileSystem::new(disk, scheduler.clone(), stats.clone(), 64, true).unwrap());
        let mut header = [0u8; 40];
        header[0..4].copy_from_slice(&0x0BAD_FAD0u32.to_ne_bytes());
        fs.create(&bootstrap, "prog", 0, false).unwrap();
        let file = fs.open(&bootstrap, "prog").unwrap();
        file.write_at(&bootstrap, &header, 0).unwrap();

        let config = BootConfig {
            features: crate::config::Features {
                filesys: true,
                userprog: true,
                use_tlb: true,
                demand_load: true,
                swap: true,
            },
            swap_policy: crate::config::SwapPolicy::Fifo,
            num_phys_pages: 4,
            disk_path: String::new(),
            random_seed: 1,
            format: false,
            program: None,
        };
        Kernel::new(scheduler, fs, stats, config)
    }

    #[test]
    fn exec_then_join_returns_the_programs_status() {
        let kernel = make_kernel();
        kernel.programs.register("prog", Arc::new(|_proc: &Arc<Process>| 42));

        let caller_thread = Arc::new(Thread::new("caller", DEFAULT_PRIORITY));
        let caller = kernel.load(&caller_thread, "prog").unwrap();

        let pid = exec(&kernel, &caller, "prog", true).unwrap();
        let status = join(&kernel, &caller, pid).unwrap();
        assert_eq!(status, 42);
    }

    #[test]
    fn join_on_unregistered_pid_fails() {
        let kernel = make_kernel();
        let caller_thread = Arc::new(Thread::new("caller", DEFAULT_PRIORITY));
        let caller = kernel.load(&caller_thread, "prog").unwrap();
        assert_eq!(join(&kernel, &caller, ThreadId(999999)), Err(KernelError::BadProcessId));
    }
}
