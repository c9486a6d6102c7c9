//! Yield-based mutex: an internal spinlock guards a held flag and owner id,
//! but a contended `lock()` yields to the scheduler instead of spinning,
//! using [`crate::scheduler::thread_yield`] and
//! [`crate::scheduler::thread_current`].

use crate::error::{SchedError, SchedResult};
use crate::scheduler;
use crate::spinlock::Spinlock;
use crate::thread::ThreadId;

struct MutexInner {
    held: bool,
    owner: Option<ThreadId>,
    waiters: u32,
}

/// Not fair: a waiter's progress is guaranteed only because the scheduler
/// eventually revisits every runnable thread, not by queue order.
pub struct Mutex<T> {
    state: Spinlock<MutexInner>,
    value: core::cell::UnsafeCell<T>,
}

unsafe impl<T: Send> Send for Mutex<T> {}
unsafe impl<T: Send> Sync for Mutex<T> {}

pub struct MutexGuard<'a, T> {
    mutex: &'a Mutex<T>,
}

impl<T> core::ops::Deref for MutexGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        unsafe { &*self.mutex.value.get() }
    }
}

impl<T> core::ops::DerefMut for MutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.mutex.value.get() }
    }
}

impl<T> Drop for MutexGuard<'_, T> {
    fn drop(&mut self) {
        let _ = self.mutex.unlock_as(scheduler::thread_current());
    }
}

impl<T> Mutex<T> {
    pub const fn new(value: T) -> Self {
        Mutex {
            state: Spinlock::new(MutexInner {
                held: false,
                owner: None,
                waiters: 0,
            }),
            value: core::cell::UnsafeCell::new(value),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, T> {
        let this = scheduler::thread_current();
        loop {
            {
                let mut state = self.state.lock();
                if !state.held {
                    state.held = true;
                    state.owner = Some(this);
                    return MutexGuard { mutex: self };
                }
                state.waiters += 1;
            }
            scheduler::thread_yield();
            let mut state = self.state.lock();
            state.waiters -= 1;
            drop(state);
        }
    }

    pub fn try_lock(&self) -> Option<MutexGuard<'_, T>> {
        let this = scheduler::thread_current();
        let mut state = self.state.lock();
        if state.held {
            None
        } else {
            state.held = true;
            state.owner = Some(this);
            Some(MutexGuard { mutex: self })
        }
    }

    fn unlock_as(&self, caller: ThreadId) -> SchedResult<()> {
        let mut state = self.state.lock();
        if state.owner != Some(caller) {
            log::warn!("mutex: unlock by non-owner tid={caller}");
            return Err(SchedError::ForeignUnlock);
        }
        state.held = false;
        state.owner = None;
        Ok(())
    }

    pub fn waiters(&self) -> u32 {
        self.state.lock().waiters
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trylock_then_drop_leaves_it_free() {
        let _guard = crate::scheduler::lock_for_test();
        crate::scheduler::init();
        let m = Mutex::new(0u32);
        {
            let mut guard = m.try_lock().expect("uncontended trylock must succeed");
            *guard += 1;
        }
        assert_eq!(*m.try_lock().unwrap(), 1);
    }

    #[test]
    fn contested_trylock_fails_while_held() {
        let _guard = crate::scheduler::lock_for_test();
        crate::scheduler::init();
        let m = Mutex::new(());
        let _lock = m.lock();
        assert!(m.try_lock().is_none());
    }

    #[test]
    fn foreign_unlock_is_rejected() {
        let _guard = crate::scheduler::lock_for_test();
        crate::scheduler::init();
        let m = Mutex::new(0u32);
        let guard = m.lock();
        // Simulate a different thread id attempting to release it.
        assert_eq!(m.unlock_as(999_999), Err(SchedError::ForeignUnlock));
        drop(guard);
        assert!(m.try_lock().is_some());
    }
}
