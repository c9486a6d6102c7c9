//! Atomic primitives and the memory-ordering contract the rest of this crate
//! builds on (`spec.md` §4.1).
//!
//! Per-CPU counters and tick state reach directly for `core::sync::atomic`,
//! but this module names the ordering explicitly at each call site instead
//! of defaulting everything to `SeqCst`, since the lock-free structures in
//! `lockfree.rs` need the acquire/release pairing to actually mean something.

use core::sync::atomic::{AtomicUsize, Ordering};

/// Atomic counter with saturating-free wraparound `fetch_add`/`fetch_sub`,
/// used for tick counts and per-CPU run totals. A thin, explicitly-named
/// wrapper over [`AtomicUsize`] rather than a new type per counter.
#[derive(Debug, Default)]
pub struct Counter(AtomicUsize);

impl Counter {
    pub const fn new(initial: usize) -> Self {
        Counter(AtomicUsize::new(initial))
    }

    #[inline]
    pub fn load(&self) -> usize {
        self.0.load(Ordering::Acquire)
    }

    #[inline]
    pub fn store(&self, value: usize) {
        self.0.store(value, Ordering::Release)
    }

    #[inline]
    pub fn fetch_add(&self, delta: usize) -> usize {
        self.0.fetch_add(delta, Ordering::AcqRel)
    }

    #[inline]
    pub fn fetch_sub(&self, delta: usize) -> usize {
        self.0.fetch_sub(delta, Ordering::AcqRel)
    }

    /// Compare-and-swap, reporting the value actually observed on failure.
    #[inline]
    pub fn compare_exchange(&self, current: usize, new: usize) -> Result<usize, usize> {
        self.0
            .compare_exchange(current, new, Ordering::AcqRel, Ordering::Acquire)
    }
}

/// Full fence: orders all prior loads/stores on this CPU against all
/// subsequent ones, on every CPU. Used around context switches, where a
/// thread's saved state must be visible before another CPU can observe it as
/// runnable again.
#[inline(always)]
pub fn fence_full() {
    core::sync::atomic::fence(Ordering::SeqCst);
}

/// Acquire fence: nothing after this point may be reordered before it.
/// Paired with [`fence_release`] across a lock-free structure's publish/
/// consume boundary.
#[inline(always)]
pub fn fence_acquire() {
    core::sync::atomic::fence(Ordering::Acquire);
}

/// Release fence: nothing before this point may be reordered after it.
#[inline(always)]
pub fn fence_release() {
    core::sync::atomic::fence(Ordering::Release);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_add_sub_roundtrip() {
        let c = Counter::new(5);
        assert_eq!(c.fetch_add(3), 5);
        assert_eq!(c.load(), 8);
        assert_eq!(c.fetch_sub(2), 8);
        assert_eq!(c.load(), 6);
    }

    #[test]
    fn counter_cas_reports_observed_on_failure() {
        let c = Counter::new(10);
        assert_eq!(c.compare_exchange(10, 20), Ok(10));
        assert_eq!(c.compare_exchange(10, 99), Err(20));
        assert_eq!(c.load(), 20);
    }

    #[test]
    fn counter_concurrent_fetch_add_is_exact() {
        use std::sync::Arc;
        use std::thread;

        let c = Arc::new(Counter::new(0));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let c = Arc::clone(&c);
            handles.push(thread::spawn(move || {
                for _ in 0..1000 {
                    c.fetch_add(1);
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(c.load(), 8000);
    }
}
