//! The synchronized console.
//!
//! Grounded on upstream `SynchConsole` (`machine/synch_console.cc`): the
//! raw console is single-character, interrupt-driven, and not safe for
//! concurrent use, so a read-side and write-side `Lock` serialize access
//! and a pair of semaphores turn "interrupt fired" into a blocking
//! `read_char`/`write_char` call.

use std::io::{Read, Write};
use std::sync::Arc;

use crate::machine::interrupt::{schedule_completion, CONSOLE_LATENCY};
use crate::machine::stats::Statistics;
use crate::sync::{Lock, Semaphore};
use crate::thread::{Scheduler, Thread};

pub struct SynchConsole {
    read_avail: Arc<Semaphore>,
    write_done: Arc<Semaphore>,
    read_lock: Lock,
    write_lock: Lock,
}

impl SynchConsole {
    pub fn new() -> Self {
        SynchConsole {
            read_avail: Arc::new(Semaphore::new("console read avail", 0)),
            write_done: Arc::new(Semaphore::new("console write done", 0)),
            read_lock: Lock::new("console read lock"),
            write_lock: Lock::new("console write lock"),
        }
    }

    pub fn write_char(
        &self,
        scheduler: &Arc<Scheduler>,
        me: &Arc<Thread>,
        stats: &Statistics,
        ch: u8,
    ) {
        self.write_lock.acquire(scheduler, me);
        print!("{}", ch as char);
        let _ = std::io::stdout().flush();
        schedule_completion(self.write_done.clone(), scheduler.clone(), CONSOLE_LATENCY);
        self.write_done.p(scheduler, me);
        stats.console_write();
        self.write_lock.release(scheduler, me).unwrap();
    }

    pub fn write_buffer(
        &self,
        scheduler: &Arc<Scheduler>,
        me: &Arc<Thread>,
        stats: &Statistics,
        buffer: &[u8],
    ) {
        self.write_lock.acquire(scheduler, me);
        for &ch in buffer {
            print!("{}", ch as char);
            schedule_completion(self.write_done.clone(), scheduler.clone(), CONSOLE_LATENCY);
            self.write_done.p(scheduler, me);
            stats.console_write();
        }
        let _ = std::io::stdout().flush();
        self.write_lock.release(scheduler, me).unwrap();
    }

    pub fn read_char(
        &self,
        scheduler: &Arc<Scheduler>,
        me: &Arc<Thread>,
        stats: &Statistics,
    ) -> Option<u8> {
        self.read_lock.acquire(scheduler, me);
        schedule_completion(self.read_avail.clone(), scheduler.clone(), CONSOLE_LATENCY);
        self.read_avail.p(scheduler, me);
        let mut byte = [0u8; 1];
        let result = std::io::stdin().read_exact(&mut byte);
        stats.console_read();
        self.read_lock.release(scheduler, me).unwrap();
        result.ok().map(|_| byte[0])
    }
}

impl Default for SynchConsole {
    fn default() -> Self {
        Self::new()
    }
}
