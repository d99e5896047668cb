//! Condition variables, built on `Semaphore` plus a waiter count, exactly
//! as upstream `Condition::Wait`/`Signal`/`Broadcast`
//! (`threads/condition.cc`): the caller must already hold the associated
//! lock; `wait` releases it, blocks, and reacquires it before returning;
//! `signal` only wakes a waiter if one is actually registered, so a signal
//! with no waiters is silently lost (Mesa-style, not Hoare-style).
//!
//! Unlike upstream, a `Condition` does not store a reference to its lock:
//! the associated `Lock` is passed in at each call instead of captured at
//! construction. Upstream can get away with a stored pointer because
//! `Lock`s are heap-allocated independently; here a condition variable
//! is often embedded in the very struct that owns its lock (see
//! `fs::open_file_registry`), where a borrowed field would be
//! self-referential.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::sync::lock::Lock;
use crate::sync::semaphore::Semaphore;
use crate::sync::SyncError;
use crate::thread::{Scheduler, Thread};

pub struct Condition {
    name: String,
    waiters: AtomicUsize,
    sem: Semaphore,
}

impl Condition {
    pub fn new(name: impl Into<String>) -> Self {
        Condition {
            name: name.into(),
            waiters: AtomicUsize::new(0),
            sem: Semaphore::new("condition semaphore", 0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn wait(&self, scheduler: &Scheduler, me: &Arc<Thread>, lock: &Lock) -> Result<(), SyncError> {
        if !lock.is_held_by(me) {
            return Err(SyncError::LockNotHeld);
        }
        lock.release(scheduler, me)?;
        self.waiters.fetch_add(1, Ordering::SeqCst);
        self.sem.p(scheduler, me);
        lock.acquire(scheduler, me);
        Ok(())
    }

    pub fn signal(&self, scheduler: &Scheduler, me: &Arc<Thread>, lock: &Lock) -> Result<(), SyncError> {
        if !lock.is_held_by(me) {
            return Err(SyncError::LockNotHeld);
        }
        if self.waiters.load(Ordering::SeqCst) > 0 {
            self.sem.v(scheduler);
            self.waiters.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(())
    }

    pub fn broadcast(&self, scheduler: &Scheduler, me: &Arc<Thread>, lock: &Lock) -> Result<(), SyncError> {
        if !lock.is_held_by(me) {
            return Err(SyncError::LockNotHeld);
        }
        while self.waiters.load(Ordering::SeqCst) > 0 {
            self.sem.v(scheduler);
            self.waiters.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(())
    }
}
