//! Synchronization primitives, built up in the same order the original
//! Nachos threads package builds them: `Semaphore` is the one primitive
//! implemented directly against the scheduler's wait queues; everything
//! else (`Lock`, `Condition`, `Channel`) is implemented purely in terms of
//! semaphores, exactly as upstream's header comments insist ("please do
//! not change this interface", "implemented in terms of semaphores").

pub mod channel;
pub mod condition;
pub mod lock;
pub mod semaphore;

pub use channel::Channel;
pub use condition::Condition;
pub use lock::Lock;
pub use semaphore::Semaphore;

use std::fmt;

/// Errors a caller of a synchronization primitive can actually provoke by
/// misusing the API (as opposed to a bug inside the primitive itself).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// `Lock::release` called by a thread that does not hold the lock.
    NotOwner,
    /// `Condition::wait` called while the associated lock was not held.
    LockNotHeld,
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncError::NotOwner => write!(f, "lock released by a thread that does not own it"),
            SyncError::LockNotHeld => write!(f, "condition variable used without holding its lock"),
        }
    }
}

impl std::error::Error for SyncError {}
