//! Mutual exclusion with priority inheritance, built directly on top of
//! `Semaphore` as a binary semaphore. Grounded on upstream `Lock::Acquire`/
//! `Release` (`threads/lock.cc`): if a lower-priority thread currently
//! holds the lock, the acquirer's priority is donated to it so the holder
//! cannot be starved behind unrelated medium-priority threads while a
//! high-priority thread waits for the same lock.

use std::sync::{Arc, Mutex};

use crate::sync::semaphore::Semaphore;
use crate::sync::SyncError;
use crate::thread::{Scheduler, Thread};

pub struct Lock {
    name: String,
    sem: Semaphore,
    holder: Mutex<Option<Arc<Thread>>>,
}

impl Lock {
    pub fn new(name: impl Into<String>) -> Self {
        Lock {
            name: name.into(),
            sem: Semaphore::new("lock semaphore", 1),
            holder: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_held_by(&self, thread: &Arc<Thread>) -> bool {
        matches!(&*self.holder.lock().unwrap(), Some(h) if h.id == thread.id)
    }

    pub fn acquire(&self, scheduler: &Scheduler, me: &Arc<Thread>) {
        debug_assert!(!self.is_held_by(me), "lock already held by this thread");
        if let Some(holder) = self.holder.lock().unwrap().clone() {
            if holder.priority() < me.priority() {
                holder.inherit_priority(me.priority());
                scheduler.change_priority(&holder);
            }
        }
        self.sem.p(scheduler, me);
        *self.holder.lock().unwrap() = Some(me.clone());
    }

    pub fn release(&self, scheduler: &Scheduler, me: &Arc<Thread>) -> Result<(), SyncError> {
        if !self.is_held_by(me) {
            return Err(SyncError::NotOwner);
        }
        me.restore_priority();
        *self.holder.lock().unwrap() = None;
        self.sem.v(scheduler);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_then_release_roundtrips() {
        let scheduler = Scheduler::new();
        let me = Arc::new(Thread::new("t", 1));
        let lock = Lock::new("test");
        lock.acquire(&scheduler, &me);
        assert!(lock.is_held_by(&me));
        lock.release(&scheduler, &me).unwrap();
        assert!(!lock.is_held_by(&me));
    }

    #[test]
    fn release_by_non_owner_errors() {
        let scheduler = Scheduler::new();
        let owner = Arc::new(Thread::new("owner", 1));
        let other = Arc::new(Thread::new("other", 1));
        let lock = Lock::new("test");
        lock.acquire(&scheduler, &owner);
        assert_eq!(lock.release(&scheduler, &other), Err(SyncError::NotOwner));
    }
}
