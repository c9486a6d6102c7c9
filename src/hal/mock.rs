//! Test-only `Platform` collaborator, used only under `#[cfg(test)]`.
//!
//! The scheduler core never executes a thread's entry point itself — on real
//! hardware, `context_switch` performs the actual machine jump, and this
//! crate only ever arranges the [`RegisterState`](super::RegisterState) that
//! jump resumes into. The tests in this crate exercise the scheduler's
//! bookkeeping (queue placement, priority selection, sleep deadlines,
//! affinity, load balancing) directly against `Scheduler`'s internal state,
//! so this mock's `context_switch` does not need to perform a real transfer
//! of control — it exists only so the crate links and so the bookkeeping
//! fields (`cpu_current_id`, tick accounting) behave sensibly. Tests that
//! need genuine concurrent execution (the lock-free queue/stack, the
//! spinlock, the mutex and semaphore) exercise those primitives directly
//! with real `std::thread`s; none of them depend on `context_switch`.

use core::cell::Cell;
use std::alloc::{alloc, dealloc, Layout};
use std::sync::atomic::{AtomicUsize, Ordering};

use super::RegisterState;

static MOCK_CPU_COUNT: AtomicUsize = AtomicUsize::new(4);
static LAST_TICK_HZ: AtomicUsize = AtomicUsize::new(0);

thread_local! {
    static CURRENT_CPU: Cell<usize> = Cell::new(0);
}

/// Set how many logical CPUs [`cpu_count`] reports. Test-only configuration
/// knob; has no effect once a test has already read `cpu_count`.
pub fn set_cpu_count(n: usize) {
    MOCK_CPU_COUNT.store(n.max(1), Ordering::Relaxed);
}

/// Bind the *calling* (real, host) thread to a logical CPU id for the
/// remainder of the test. Mirrors a real CPU's fixed identity.
pub fn bind_current_thread_to_cpu(cpu: usize) {
    CURRENT_CPU.with(|c| c.set(cpu));
}

pub unsafe fn context_switch(_old: *mut RegisterState, _new: *const RegisterState) {
    // Intentionally a no-op — see module docs.
}

pub unsafe fn cpu_pause() {
    std::thread::yield_now();
}

pub unsafe fn alloc_thread_stack(size: usize) -> *mut u8 {
    let layout = match Layout::from_size_align(size.max(1), 4096) {
        Ok(l) => l,
        Err(_) => return core::ptr::null_mut(),
    };
    unsafe { alloc(layout) }
}

pub unsafe fn free_thread_stack(ptr: *mut u8, size: usize) {
    if ptr.is_null() {
        return;
    }
    if let Ok(layout) = Layout::from_size_align(size.max(1), 4096) {
        unsafe { dealloc(ptr, layout) };
    }
}

pub unsafe fn cpu_count() -> usize {
    MOCK_CPU_COUNT.load(Ordering::Relaxed)
}

pub unsafe fn cpu_current_id() -> usize {
    CURRENT_CPU.with(|c| c.get())
}

pub unsafe fn cpu_is_bsp() -> bool {
    CURRENT_CPU.with(|c| c.get() == 0)
}

pub unsafe fn tick_source_install(_handler: extern "C" fn(), hz: u32) {
    LAST_TICK_HZ.store(hz as usize, Ordering::Relaxed);
}

pub unsafe fn irq_eoi() {}
