//! Interrupt-completion delivery.
//!
//! Upstream Nachos models hardware latency with a simulated clock and an
//! event queue (`machine/interrupt.cc`): a disk read "completes" some fixed
//! number of simulated ticks after it is issued, delivered by an interrupt
//! handler that runs when the event queue's clock reaches that tick. This
//! port has no simulated clock to drive — the host threads here really do
//! run concurrently — so `disk` and `console` model the same
//! issue-now/complete-later shape with a short detached host thread that
//! sleeps a fixed latency and then signals the completion semaphore, in
//! place of an event-queue callback.

use std::sync::Arc;
use std::thread as os_thread;
use std::time::Duration;

use crate::sync::Semaphore;
use crate::thread::Scheduler;

/// Simulated per-operation latency. Nachos's default disk latency is tens
/// of simulated ticks; the exact value has no externally observable effect
/// here beyond making completion visibly asynchronous.
pub const DISK_LATENCY: Duration = Duration::from_micros(200);
pub const CONSOLE_LATENCY: Duration = Duration::from_micros(50);

/// Arranges for `sem.v(scheduler)` to run after `latency`, off the calling
/// thread, so the caller can go on to do something else (or block waiting
/// on `sem`) exactly as it would after issuing a real asynchronous
/// operation.
pub fn schedule_completion(sem: Arc<Semaphore>, scheduler: Arc<Scheduler>, latency: Duration) {
    os_thread::spawn(move || {
        os_thread::sleep(latency);
        sem.v(&scheduler);
    });
}
