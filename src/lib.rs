//! SMP preemptive scheduler core for Scarlett/Raeen OS.
//!
//! Covers per-CPU thread scheduling (priority runqueues, round-robin,
//! sleeping, load balancing, work stealing), the synchronization primitives
//! built on top of it (spinlock, yield-based mutex and semaphore, a
//! lock-free MPMC queue and stack), and the timer-tick plumbing that drives
//! preemption. Everything else — memory management, the heap, the
//! filesystem, drivers, and user-space services — is a collaborator this
//! crate only ever calls through [`hal`].
#![cfg_attr(not(test), no_std)]

#[cfg(not(test))]
extern crate alloc;
#[cfg(test)]
extern crate std as alloc;

pub mod atomic;
pub mod config;
pub mod diag;
pub mod error;
pub mod hal;
pub mod lockfree;
pub mod mutex;
pub mod runqueue;
pub mod scheduler;
pub mod semaphore;
pub mod sleepq;
pub mod spinlock;
pub mod thread;
pub mod tick;

pub use error::{SchedError, SchedResult};
pub use lockfree::{LockFreeQueue, LockFreeStack};
pub use mutex::{Mutex, MutexGuard};
pub use scheduler::{
    scheduler_check_reschedule, scheduler_tick, set_affinity, thread_block, thread_create,
    thread_current, thread_exit, thread_sleep, thread_unblock, thread_yield,
};
pub use semaphore::Semaphore;
pub use spinlock::{Spinlock, SpinlockGuard};
pub use thread::{Affinity, ThreadId, ThreadState, AFFINITY_ANY};

/// Bring the scheduler online: builds one idle thread per CPU reported by
/// [`hal::cpu_count`]. Call once during system start-up, before any of
/// [`thread_create`]/[`thread_yield`]/[`scheduler_tick`] etc. run.
pub fn init() {
    scheduler::init();
}

/// Install the periodic timer and point it at this crate's tick handler.
/// Call once, after [`init`].
pub fn install_tick_source() {
    tick::install();
}
