//! Test-and-set spinlock with owner-CPU tracking (`spec.md` §4.2).
//!
//! An `AtomicBool` lock word, an owner-CPU field kept for diagnostics, and a
//! pause-backoff spin loop — no x86 IF-save/restore or UART timeout-dump
//! machinery, both arch-specific and out of scope here. Exchange/fence/
//! owner-tracking semantics plus a debug-only re-entrancy check
//! (`DeadlockSuspected`'s failure mode, asserted rather than returned since a
//! held spinlock has no caller left to hand a `Result` back to).

use core::cell::UnsafeCell;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::diag;
use crate::hal;

const NO_OWNER: usize = usize::MAX;

/// A spinlock guarding a `T`. Must never be held across a suspension point
/// (`yield`, `sleep`, `block`, or a contended `Mutex`/`Semaphore` call).
pub struct Spinlock<T> {
    locked: AtomicBool,
    owner: AtomicUsize,
    value: UnsafeCell<T>,
}

unsafe impl<T: Send> Sync for Spinlock<T> {}
unsafe impl<T: Send> Send for Spinlock<T> {}

impl<T> Spinlock<T> {
    pub const fn new(value: T) -> Self {
        Spinlock {
            locked: AtomicBool::new(false),
            owner: AtomicUsize::new(NO_OWNER),
            value: UnsafeCell::new(value),
        }
    }

    /// Spin until the lock is acquired. Panics in debug builds if the
    /// calling CPU already holds this lock (`DeadlockSuspected`); in release
    /// builds, re-entry simply spins forever.
    pub fn lock(&self) -> SpinlockGuard<'_, T> {
        let this_cpu = hal::cpu_current_id();
        loop {
            if self
                .locked
                .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
            {
                self.owner.store(this_cpu, Ordering::Relaxed);
                crate::atomic::fence_full();
                return SpinlockGuard { lock: self };
            }
            let owner = self.owner.load(Ordering::Relaxed);
            debug_assert!(
                owner != this_cpu,
                "spinlock re-entered by owning CPU {this_cpu} (last seen in {})",
                diag::name(diag::current(owner))
            );
            hal::arch::cpu_pause();
        }
    }

    /// Single attempt. Returns `None` if contested.
    pub fn try_lock(&self) -> Option<SpinlockGuard<'_, T>> {
        let this_cpu = hal::cpu_current_id();
        if self
            .locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
        {
            self.owner.store(this_cpu, Ordering::Relaxed);
            crate::atomic::fence_full();
            Some(SpinlockGuard { lock: self })
        } else {
            None
        }
    }

    /// Advisory only — may be stale the instant it is read.
    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Relaxed)
    }

    pub fn is_held_by_cpu(&self, cpu: usize) -> bool {
        self.locked.load(Ordering::Relaxed) && self.owner.load(Ordering::Relaxed) == cpu
    }

    fn unlock(&self) {
        self.owner.store(NO_OWNER, Ordering::Relaxed);
        crate::atomic::fence_full();
        self.locked.store(false, Ordering::Release);
    }
}

/// RAII guard returned by [`Spinlock::lock`] / [`Spinlock::try_lock`].
pub struct SpinlockGuard<'a, T> {
    lock: &'a Spinlock<T>,
}

impl<T> Deref for SpinlockGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        unsafe { &*self.lock.value.get() }
    }
}

impl<T> DerefMut for SpinlockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.value.get() }
    }
}

impl<T> Drop for SpinlockGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.unlock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn trylock_then_unlock_leaves_it_free() {
        let lock = Spinlock::new(0u32);
        let guard = lock.try_lock().expect("uncontended trylock must succeed");
        assert!(lock.is_locked());
        drop(guard);
        assert!(!lock.is_locked());
    }

    #[test]
    fn contested_trylock_fails() {
        let lock = Spinlock::new(0u32);
        let _guard = lock.lock();
        assert!(lock.try_lock().is_none());
    }

    #[test]
    fn mutual_exclusion_under_contention() {
        let lock = Arc::new(Spinlock::new(0u64));
        let mut handles = Vec::new();
        for _ in 0..8 {
            let lock = Arc::clone(&lock);
            handles.push(thread::spawn(move || {
                for _ in 0..2000 {
                    let mut guard = lock.lock();
                    *guard += 1;
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(*lock.lock(), 16_000);
    }
}
