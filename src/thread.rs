//! Thread identity and the global thread table (`spec.md` §3).
//!
//! A thread record carries a monotonic `tid`, a fixed-size `name`, `state`,
//! `priority`, a boxed kernel stack, and a stack canary — nothing
//! process/FPU/capability-related, which belongs to subsystems this crate
//! treats as external collaborators.

use core::sync::atomic::{AtomicU64, Ordering};

use crate::hal::{self, RegisterState, ThreadStack};
use crate::spinlock::Spinlock;
use crate::{config, error::SchedError};

/// Magic word written past the end of a thread's stack to catch overflow.
/// Checked only by debug assertions; never load-bearing for correctness.
pub const STACK_CANARY: u64 = 0xDEAD_BEEF_CAFE_BABE;

pub type ThreadId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    Ready,
    Running,
    Blocked,
    Sleeping,
    Dead,
}

/// `< 0` means "no affinity, any CPU may run this thread". `>= 0` pins the
/// thread to that CPU id.
pub type Affinity = i32;
pub const AFFINITY_ANY: Affinity = -1;

/// A single kernel thread. Belongs to at most one intrusive list at a time;
/// `next` is that list's link and means nothing outside of it.
pub struct Thread {
    pub id: ThreadId,
    name: [u8; 32],
    pub state: ThreadState,
    pub priority: u8,
    pub affinity: Affinity,
    pub context: RegisterState,
    pub stack: Option<ThreadStack>,
    pub cpu_time: u64,
    pub wakeup_tick: u64,
    pub home_cpu: usize,
    pub next: Option<ThreadId>,
}

impl Thread {
    fn new(
        id: ThreadId,
        name: &str,
        priority: u8,
        entry: extern "C" fn(usize),
        arg: usize,
        home_cpu: usize,
    ) -> Result<Self, SchedError> {
        let stack = hal::alloc_thread_stack(config::KERNEL_STACK_SIZE).ok_or(SchedError::OutOfMemory)?;
        unsafe { (stack.base as *mut u64).write(STACK_CANARY) };
        let stack_top = unsafe { stack.base.add(stack.size) } as usize;

        let mut context = RegisterState::default();
        context.instruction_pointer = entry as usize;
        context.stack_pointer = stack_top;
        context.argument = arg;

        let mut packed_name = [0u8; 32];
        let bytes = name.as_bytes();
        let n = bytes.len().min(31);
        packed_name[..n].copy_from_slice(&bytes[..n]);

        Ok(Thread {
            id,
            name: packed_name,
            state: ThreadState::Ready,
            priority,
            affinity: AFFINITY_ANY,
            context,
            stack: Some(stack),
            cpu_time: 0,
            wakeup_tick: 0,
            home_cpu,
            next: None,
        })
    }

    pub fn name(&self) -> &str {
        let len = self.name.iter().position(|&b| b == 0).unwrap_or(self.name.len());
        core::str::from_utf8(&self.name[..len]).unwrap_or("?")
    }

    /// Checks the canary word at the bottom of this thread's stack. `true`
    /// if the thread never wrote past it (or the stack was already freed).
    fn check_stack_canary(&self) -> bool {
        match &self.stack {
            Some(stack) => unsafe { (stack.base as *const u64).read() } == STACK_CANARY,
            None => true,
        }
    }
}

impl Drop for Thread {
    fn drop(&mut self) {
        debug_assert!(
            self.check_stack_canary(),
            "stack overflow detected on thread {} ({})",
            self.id,
            self.name()
        );
        if let Some(stack) = self.stack.take() {
            unsafe { hal::free_thread_stack(stack) };
        }
    }
}

static NEXT_THREAD_ID: AtomicU64 = AtomicU64::new(1);

fn allocate_thread_id() -> ThreadId {
    NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed)
}

/// Global thread table: the single source of truth for "does this id exist,
/// and in what state". Looked up by id only — never iterated on a hot path.
pub struct ThreadTable {
    slots: Spinlock<[Option<Thread>; config::MAX_THREADS]>,
}

impl ThreadTable {
    pub const fn new() -> Self {
        const NONE: Option<Thread> = None;
        ThreadTable {
            slots: Spinlock::new([NONE; config::MAX_THREADS]),
        }
    }

    pub fn insert(
        &self,
        name: &str,
        priority: u8,
        entry: extern "C" fn(usize),
        arg: usize,
        home_cpu: usize,
    ) -> Result<ThreadId, SchedError> {
        let id = allocate_thread_id();
        let thread = Thread::new(id, name, priority, entry, arg, home_cpu)?;
        let mut slots = self.slots.lock();
        let slot = slots
            .iter_mut()
            .find(|s| s.is_none())
            .ok_or(SchedError::OutOfMemory)?;
        *slot = Some(thread);
        Ok(id)
    }

    pub fn remove(&self, id: ThreadId) -> Option<Thread> {
        let mut slots = self.slots.lock();
        for slot in slots.iter_mut() {
            if slot.as_ref().map(|t| t.id) == Some(id) {
                return slot.take();
            }
        }
        None
    }

    pub fn with<R>(&self, id: ThreadId, f: impl FnOnce(&mut Thread) -> R) -> Option<R> {
        let mut slots = self.slots.lock();
        slots
            .iter_mut()
            .flatten()
            .find(|t| t.id == id)
            .map(f)
    }

    pub fn set_affinity(&self, id: ThreadId, affinity: Affinity) -> Result<(), SchedError> {
        self.with(id, |t| t.affinity = affinity)
            .ok_or(SchedError::InvalidThread)
    }
}

impl Default for ThreadTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    extern "C" fn noop_entry(_: usize) {}

    #[test]
    fn insert_then_remove_roundtrips() {
        let table = ThreadTable::new();
        let id = table.insert("t1", 10, noop_entry, 0, 0).unwrap();
        assert!(table.with(id, |t| t.priority).is_some());
        let removed = table.remove(id);
        assert!(removed.is_some());
        assert_eq!(removed.unwrap().name(), "t1");
        assert!(table.with(id, |_| ()).is_none());
    }

    #[test]
    fn set_affinity_on_unknown_id_errors() {
        let table = ThreadTable::new();
        assert_eq!(table.set_affinity(999_999, 0), Err(SchedError::InvalidThread));
    }

    #[test]
    fn fresh_stack_canary_is_intact() {
        let thread = Thread::new(1, "t1", 10, noop_entry, 0, 0).unwrap();
        assert!(thread.check_stack_canary());
    }

    #[test]
    fn corrupted_stack_canary_is_detected() {
        let thread = Thread::new(1, "t1", 10, noop_entry, 0, 0).unwrap();
        unsafe {
            (thread.stack.as_ref().unwrap().base as *mut u64).write(0);
        }
        assert!(!thread.check_stack_canary());
    }
}
