//! Threads and the cooperative scheduler.
//!
//! Upstream Nachos threads are cooperative by construction: only one thread
//! ever executes at a time, and control only changes hands at explicit
//! `Yield`/`Sleep`/`Finish` points, implemented with `setjmp`/`longjmp`
//! stack switching on a single host thread. This port keeps the same
//! single-CPU, non-preemptive contract, but each Nachos thread is a real
//! host thread parked on a condition variable; [`scheduler::Scheduler`]'s
//! turn token is the thing that actually makes them cooperative, standing
//! in for the original's stack switch.

pub mod scheduler;
pub mod thread;

pub use scheduler::Scheduler;
pub use thread::{Priority, Thread, ThreadId, ThreadStatus};
