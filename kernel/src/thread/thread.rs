//! The thread control block.
//!
//! Corresponds to upstream's `Thread` (`threads/thread.hh`): in the
//! original, this struct also owns the saved machine registers and stack
//! used by `setjmp`/`longjmp`. Since each simulated thread here is a real
//! host thread, there is no stack to save; what remains is exactly the
//! bookkeeping the rest of the kernel actually reads — name, priority (for
//! inheritance), status, and (behind the `userprog` feature) the address
//! space and per-process file table this thread owns.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use crate::fs::DIRECTORY_SECTOR;

static NEXT_THREAD_ID: AtomicU32 = AtomicU32::new(0);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ThreadId(pub u32);

impl ThreadId {
    pub fn next() -> Self {
        ThreadId(NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Scheduling priority. Nachos uses a small integer range for its
/// multilevel ready queue; `MLFQ_LEVELS` in `scheduler` mirrors that.
pub type Priority = u8;

pub const DEFAULT_PRIORITY: Priority = 1;
pub const MAX_PRIORITY: Priority = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadStatus {
    Ready,
    Running,
    Blocked,
    Finished,
}

/// Mutable priority state, split out so `Lock::acquire`'s priority
/// inheritance can update it without taking a lock on the whole `Thread`.
#[derive(Debug)]
struct PriorityState {
    current: Priority,
    original: Priority,
}

#[derive(Debug)]
pub struct Thread {
    pub id: ThreadId,
    pub name: String,
    priority: Mutex<PriorityState>,
    status: Mutex<ThreadStatus>,
    /// The thread's current working directory, as the chain of directory
    /// header sectors from the root down to the current directory. An
    /// empty stack means the root itself; `cwd_sector()` is always the
    /// last entry, or `DIRECTORY_SECTOR` when the stack is empty.
    cwd: Mutex<Vec<u32>>,
}

impl Thread {
    pub fn new(name: impl Into<String>, priority: Priority) -> Self {
        Thread {
            id: ThreadId::next(),
            name: name.into(),
            priority: Mutex::new(PriorityState {
                current: priority,
                original: priority,
            }),
            status: Mutex::new(ThreadStatus::Ready),
            cwd: Mutex::new(Vec::new()),
        }
    }

    /// The directory sector relative paths should resolve against.
    pub fn cwd_sector(&self) -> u32 {
        self.cwd.lock().unwrap().last().copied().unwrap_or(DIRECTORY_SECTOR)
    }

    /// The full chain of directory sectors from the root to the current
    /// directory (empty if the thread is at the root).
    pub fn cwd_stack(&self) -> Vec<u32> {
        self.cwd.lock().unwrap().clone()
    }

    /// Replaces the working-directory chain wholesale, as `cd` does once
    /// it has resolved the target path to a sector stack.
    pub fn set_cwd(&self, stack: Vec<u32>) {
        *self.cwd.lock().unwrap() = stack;
    }

    pub fn priority(&self) -> Priority {
        self.priority.lock().unwrap().current
    }

    /// Raises this thread's effective priority for the duration of a lock
    /// hold, as `Thread::InheritPriority` does. Never lowers it: a thread
    /// already boosted by a higher-priority waiter keeps that boost.
    pub fn inherit_priority(&self, from: Priority) {
        let mut state = self.priority.lock().unwrap();
        if from > state.current {
            state.current = from;
        }
    }

    /// Drops back to the priority this thread was created with, as
    /// `Thread::RestorePriority` does on `Lock::Release`.
    pub fn restore_priority(&self) {
        let mut state = self.priority.lock().unwrap();
        state.current = state.original;
    }

    pub fn status(&self) -> ThreadStatus {
        *self.status.lock().unwrap()
    }

    pub fn set_status(&self, status: ThreadStatus) {
        *self.status.lock().unwrap() = status;
    }
}

impl PartialEq for Thread {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Thread {}
