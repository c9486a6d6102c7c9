//! Tick source plumbing (`spec.md` §4.6): a monotonic tick counter
//! incremented on every CPU's timer interrupt, and the trampoline entry
//! point installed via [`hal::tick_source_install`].
//!
//! This module owns only the counter and the installation call; the
//! per-CPU accounting, sleeper wake-up, load balancing, and preemption
//! bookkeeping all live in [`crate::scheduler`], which this module's handler
//! calls into after recording the tick. The handler itself performs no I/O,
//! no heap allocation, and no blocking, matching the interrupt-context rules
//! in `spec.md` §5.

use core::sync::atomic::{AtomicU64, Ordering};

use crate::config::TICK_HZ;
use crate::hal;

static TICK_COUNT: AtomicU64 = AtomicU64::new(0);

/// The current monotonic tick count. Non-decreasing across the whole
/// system; sleepers compare their deadline against this value.
pub fn current() -> u64 {
    TICK_COUNT.load(Ordering::Acquire)
}

/// Record one tick and return the new count. Called exactly once per CPU
/// per timer interrupt.
fn record() -> u64 {
    TICK_COUNT.fetch_add(1, Ordering::AcqRel) + 1
}

/// Interrupt-context trampoline entry: records the tick, runs the
/// scheduler's tick accounting, then acknowledges the interrupt.
extern "C" fn on_tick() {
    record();
    crate::scheduler::scheduler_tick();
    hal::irq::eoi();
}

/// Program the timer at [`TICK_HZ`] and install [`on_tick`] as the handler.
/// Call once during system start-up, after [`crate::scheduler::init`].
pub fn install() {
    hal::tick_source_install(on_tick, TICK_HZ as u32);
}

/// Advance the tick counter by one, as `on_tick` would, without the
/// scheduler/IRQ coupling. Test-only: lets scheduler tests simulate the
/// passage of ticks on a single logical CPU's "main loop".
#[cfg(test)]
pub(crate) fn test_advance() -> u64 {
    record()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_is_monotonic() {
        let a = record();
        let b = record();
        assert!(b > a);
        assert_eq!(current(), b);
    }
}
