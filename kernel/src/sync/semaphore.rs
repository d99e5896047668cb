//! The counting semaphore: the one primitive not implemented in terms of
//! anything else. Grounded on upstream `Semaphore::P`/`V`
//! (`threads/synch.cc`): `P` blocks while the value is zero, `V` increments
//! and wakes the longest-waiting blocked thread, FIFO, not by priority —
//! matching the original's plain queue (priority only enters at the
//! `Lock`/`Scheduler` level, never here).

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::thread::{Scheduler, Thread};

pub struct Semaphore {
    name: String,
    value: Mutex<i64>,
    waiting: Mutex<VecDeque<Arc<Thread>>>,
}

impl Semaphore {
    pub fn new(name: impl Into<String>, initial: i64) -> Self {
        Semaphore {
            name: name.into(),
            value: Mutex::new(initial),
            waiting: Mutex::new(VecDeque::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Waits until the semaphore's value is positive, then decrements it.
    pub fn p(&self, scheduler: &Scheduler, me: &Arc<Thread>) {
        loop {
            let mut value = self.value.lock().unwrap();
            if *value > 0 {
                *value -= 1;
                return;
            }
            self.waiting.lock().unwrap().push_back(me.clone());
            drop(value);
            scheduler.sleep(me);
        }
    }

    /// Increments the semaphore's value and wakes the longest-waiting
    /// blocked thread, if any.
    pub fn v(&self, scheduler: &Scheduler) {
        *self.value.lock().unwrap() += 1;
        if let Some(woken) = self.waiting.lock().unwrap().pop_front() {
            scheduler.ready_to_run(woken);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nonblocking_p_just_decrements() {
        let sched = Scheduler::new();
        let me = Arc::new(Thread::new("t", 1));
        let sem = Semaphore::new("test", 1);
        sem.p(&sched, &me);
        assert_eq!(*sem.value.lock().unwrap(), 0);
    }

    #[test]
    fn v_restores_value() {
        let sched = Scheduler::new();
        let sem = Semaphore::new("test", 0);
        sem.v(&sched);
        assert_eq!(*sem.value.lock().unwrap(), 1);
    }
}
