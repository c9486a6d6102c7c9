//! Error taxonomy for the scheduler core (`spec.md` §7).
//!
//! These are semantic, not syntactic: most paths that can fail in a kernel
//! scheduler cannot unwind (interrupt context, lock-held sections), so most
//! variants here describe conditions that are logged and degrade to a
//! documented default rather than propagated as a `Result`. Only
//! [`thread_create`](crate::thread_create) and the explicit `try_*` lock
//! operations return one of these to their caller.

use core::fmt;

/// Errors the scheduler core can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedError {
    /// Stack or thread-record allocation failed. Returned to the caller of
    /// [`thread_create`](crate::thread_create); never panics.
    OutOfMemory,
    /// A thread id was unknown, or the thread is already [`Dead`](crate::thread::ThreadState::Dead).
    /// Operations taking a thread id treat this as a silent no-op plus a
    /// diagnostic log, never a panic. Also returned by
    /// [`thread_create`](crate::thread_create) for a priority outside
    /// `0..=127`, since that argument is equally "not a valid thread to
    /// schedule".
    InvalidThread,
    /// A mutex was unlocked by a thread that does not own it. The lock
    /// remains held; this is logged and surfaced for diagnostics only.
    ForeignUnlock,
    /// A spinlock was re-entered by the CPU that already holds it. In debug
    /// builds this is fatal (the caller should panic); in release builds the
    /// spinlock instead spins forever, matching real hardware's behaviour
    /// under the same bug.
    DeadlockSuspected,
    /// A `trylock`/`trywait` lost the race. Not an error condition by
    /// itself — returned so the caller can decide what to do.
    TrylockContested,
}

impl fmt::Display for SchedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            SchedError::OutOfMemory => "out of memory",
            SchedError::InvalidThread => "invalid or dead thread id",
            SchedError::ForeignUnlock => "mutex unlocked by non-owner",
            SchedError::DeadlockSuspected => "spinlock re-entered by owning CPU",
            SchedError::TrylockContested => "trylock lost the race",
        };
        f.write_str(msg)
    }
}

pub type SchedResult<T> = Result<T, SchedError>;
