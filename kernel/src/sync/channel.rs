//! A synchronous rendezvous channel: `send` and `receive` each block until
//! the other side is also present, handing a single value across with no
//! buffering. Grounded on upstream `Channel::Send`/`Receive`
//! (`threads/channel.cc`), which pairs a send-side and a receive-side lock
//! (so multiple senders, or multiple receivers, queue safely) with two
//! semaphores that make the handoff itself block until both sides meet.

use std::sync::{Arc, Mutex};

use crate::sync::lock::Lock;
use crate::sync::semaphore::Semaphore;
use crate::thread::{Scheduler, Thread};

pub struct Channel<T> {
    name: String,
    slot: Mutex<Option<T>>,
    sender_ready: Semaphore,
    receiver_done: Semaphore,
    send_lock: Lock,
    receive_lock: Lock,
}

impl<T> Channel<T> {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Channel {
            sender_ready: Semaphore::new(format!("{name} sender ready"), 0),
            receiver_done: Semaphore::new(format!("{name} receiver done"), 0),
            send_lock: Lock::new(format!("{name} send lock")),
            receive_lock: Lock::new(format!("{name} receive lock")),
            slot: Mutex::new(None),
            name,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Blocks until a `receive` takes `message`.
    pub fn send(&self, scheduler: &Scheduler, me: &Arc<Thread>, message: T) {
        self.send_lock.acquire(scheduler, me);
        *self.slot.lock().unwrap() = Some(message);
        self.sender_ready.v(scheduler);
        self.receiver_done.p(scheduler, me);
        self.send_lock.release(scheduler, me).unwrap();
    }

    /// Blocks until a `send` hands off a value.
    pub fn receive(&self, scheduler: &Scheduler, me: &Arc<Thread>) -> T {
        self.receive_lock.acquire(scheduler, me);
        self.sender_ready.p(scheduler, me);
        let value = self
            .slot
            .lock()
            .unwrap()
            .take()
            .expect("sender_ready permit granted without a queued message");
        self.receiver_done.v(scheduler);
        self.receive_lock.release(scheduler, me).unwrap();
        value
    }
}
