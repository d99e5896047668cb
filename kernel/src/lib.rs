//! nachos-rs: a hosted, Nachos-lineage teaching kernel.
//!
//! The original Nachos ran its "kernel" as a single-threaded simulator on
//! top of a host OS, using `setjmp`/`longjmp` stack switching and a manual
//! interrupt/event queue to fake preemption and I/O completion. This port
//! keeps that cooperative, single-CPU illusion but builds it out of real
//! host threads gated by [`thread::scheduler::Scheduler`]'s turn token,
//! instead of hand-rolled stack switching. Subsystems beyond that core are
//! selected at compile time by Cargo features (see `config`), matching the
//! upstream `-DFILESYS`/`-DUSER_PROGRAM`/`-DVM` build-time switches.

pub mod config;
pub mod fs;
pub mod machine;
pub mod sync;
pub mod syscall;
pub mod thread;
pub mod vm;
