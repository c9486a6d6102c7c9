//! Scheduler core: thread lifecycle, dispatch, sleep/wake, yield
//! (`spec.md` §4.8): a `Scheduler` with per-CPU state, a reentry guard around
//! `schedule`, and an outgoing-zombie reaper — with none of the x86
//! page-directory/FPU/process bookkeeping that belongs to other subsystems.

mod balance;

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::ptr;
use core::sync::atomic::{AtomicBool, AtomicPtr, AtomicU32, Ordering};

use crate::config;
use crate::diag;
use crate::error::{SchedError, SchedResult};
use crate::hal;
use crate::runqueue::RunQueue;
use crate::sleepq::SleepQueue;
use crate::thread::{Affinity, Thread, ThreadId, ThreadState, ThreadTable};
use crate::tick;

extern "C" fn idle_entry(_: usize) {
    loop {
        hal::arch::cpu_pause();
    }
}

pub struct Scheduler {
    table: ThreadTable,
    per_cpu: Vec<RunQueue>,
    sleepq: SleepQueue,
    need_reschedule: Vec<AtomicBool>,
    quantum: Vec<AtomicU32>,
    in_scheduler: Vec<AtomicBool>,
    zombie: Vec<crate::spinlock::Spinlock<Option<Thread>>>,
}

impl Scheduler {
    fn new() -> Self {
        let n = hal::cpu_count();
        let table = ThreadTable::new();
        let mut per_cpu = Vec::with_capacity(n);
        for cpu in 0..n {
            let idle = table
                .insert("idle", config::IDLE_PRIORITY, idle_entry, 0, cpu)
                .expect("idle thread allocation must not fail at boot");
            table.with(idle, |t| {
                t.affinity = cpu as Affinity;
                t.state = ThreadState::Running;
            });
            let rq = RunQueue::new(idle);
            rq.set_current(Some(idle));
            per_cpu.push(rq);
        }
        Scheduler {
            table,
            per_cpu,
            sleepq: SleepQueue::new(),
            need_reschedule: (0..n).map(|_| AtomicBool::new(false)).collect(),
            quantum: (0..n).map(|_| AtomicU32::new(0)).collect(),
            in_scheduler: (0..n).map(|_| AtomicBool::new(false)).collect(),
            zombie: (0..n)
                .map(|_| crate::spinlock::Spinlock::new(None))
                .collect(),
        }
    }

    fn cpu_count(&self) -> usize {
        self.per_cpu.len()
    }

    fn reap_zombie(&self, cpu: usize) {
        let mut slot = self.zombie[cpu].lock();
        if let Some(dead) = slot.take() {
            drop(dead);
        }
    }

    fn pick_next(&self, cpu: usize) -> ThreadId {
        if let Some((id, _priority)) = self.per_cpu[cpu].pop_highest_ready(&self.table) {
            return id;
        }
        if let Some(id) = self.work_steal(cpu) {
            return id;
        }
        self.per_cpu[cpu].idle_thread()
    }

    /// Re-evaluate who should run on the current CPU and, if it differs from
    /// `current_thread`, dispatch via [`hal::arch::context_switch`].
    fn schedule(&self) {
        let cpu = hal::cpu_current_id();
        if self.in_scheduler[cpu].swap(true, Ordering::AcqRel) {
            // Re-entrant call (e.g. a nested tick during dispatch bookkeeping); bail.
            return;
        }

        self.reap_zombie(cpu);
        let prev = self.per_cpu[cpu].current_thread();
        let next = self.pick_next(cpu);

        if Some(next) == prev {
            self.in_scheduler[cpu].store(false, Ordering::Release);
            return;
        }

        if let Some(prev_id) = prev {
            let still_running = self
                .table
                .with(prev_id, |t| t.state == ThreadState::Running)
                .unwrap_or(false);
            if still_running {
                let prio = self
                    .table
                    .with(prev_id, |t| {
                        t.state = ThreadState::Ready;
                        t.priority
                    })
                    .unwrap_or(config::IDLE_PRIORITY);
                self.per_cpu[cpu].add_ready(&self.table, prev_id, prio);
            }
        }

        self.table.with(next, |t| t.state = ThreadState::Running);
        self.per_cpu[cpu].set_current(Some(next));

        let mut old_ctx = prev
            .and_then(|p| self.table.with(p, |t| t.context))
            .unwrap_or_default();
        let new_ctx = self.table.with(next, |t| t.context).unwrap_or_default();

        self.in_scheduler[cpu].store(false, Ordering::Release);
        unsafe { hal::arch::context_switch(&mut old_ctx, &new_ctx) };

        if let Some(prev_id) = prev {
            self.table.with(prev_id, |t| t.context = old_ctx);
        }
    }

    fn create_thread(
        &self,
        entry: extern "C" fn(usize),
        arg: usize,
        priority: u8,
        name: &str,
    ) -> SchedResult<ThreadId> {
        let cpu = hal::cpu_current_id();
        diag::enter(cpu, diag::SECTION_THREAD_CREATE);
        let id = self.table.insert(name, priority, entry, arg, cpu)?;
        self.per_cpu[cpu].add_ready(&self.table, id, priority);
        log::debug!("thread_create: tid={id} name={name} priority={priority} cpu={cpu}");
        Ok(id)
    }

    fn exit_current(&self) -> ! {
        let cpu = hal::cpu_current_id();
        diag::enter(cpu, diag::SECTION_THREAD_EXIT);
        let id = self.per_cpu[cpu]
            .current_thread()
            .expect("current_thread is never None after init");
        if let Some(mut dead) = self.table.remove(id) {
            dead.state = ThreadState::Dead;
            let mut slot = self.zombie[cpu].lock();
            *slot = Some(dead);
        }
        log::debug!("thread_exit: tid={id} cpu={cpu}");
        self.schedule();
        unreachable!("thread_exit: schedule() returned to a dead thread")
    }

    fn yield_now(&self) {
        let cpu = hal::cpu_current_id();
        diag::enter(cpu, diag::SECTION_SCHEDULE_VOLUNTARY);
        self.schedule();
    }

    fn sleep(&self, ms: u64) {
        if ms == 0 {
            self.yield_now();
            return;
        }
        let cpu = hal::cpu_current_id();
        diag::enter(cpu, diag::SECTION_SLEEP);
        // Round up: a sleep must never wake before the requested duration
        // has elapsed, so a sub-tick remainder still costs a full tick.
        let delta_ticks = (ms * config::TICK_HZ).div_ceil(1000).max(1);
        let now = tick::current();
        let id = self.per_cpu[cpu]
            .current_thread()
            .expect("current_thread is never None after init");
        self.table.with(id, |t| {
            t.state = ThreadState::Sleeping;
            t.wakeup_tick = now + delta_ticks;
        });
        self.sleepq.push(&self.table, id);
        self.schedule();
    }

    fn block_current(&self) {
        let cpu = hal::cpu_current_id();
        diag::enter(cpu, diag::SECTION_BLOCK);
        let id = self.per_cpu[cpu]
            .current_thread()
            .expect("current_thread is never None after init");
        self.table.with(id, |t| t.state = ThreadState::Blocked);
        self.per_cpu[cpu].add_blocked(&self.table, id);
        self.schedule();
    }

    fn unblock(&self, id: ThreadId) {
        let cpu = hal::cpu_current_id();
        diag::enter(cpu, diag::SECTION_UNBLOCK);
        for peer in 0..self.cpu_count() {
            if self.per_cpu[peer].remove_blocked(&self.table, id) {
                let prio = self
                    .table
                    .with(id, |t| {
                        t.state = ThreadState::Ready;
                        t.priority
                    })
                    .unwrap_or(config::IDLE_PRIORITY);
                self.per_cpu[cpu].add_ready(&self.table, id, prio);
                return;
            }
        }
        log::debug!("unblock: tid={id} not found on any blocked list (double-unblock or dead)");
    }

    fn current_thread_id(&self) -> ThreadId {
        let cpu = hal::cpu_current_id();
        self.per_cpu[cpu]
            .current_thread()
            .expect("current_thread is never None after init")
    }

    fn set_affinity(&self, id: ThreadId, affinity: Affinity) -> SchedResult<()> {
        self.table.set_affinity(id, affinity)
    }

    /// Interrupt-context tick entry: accounting, BSP-only sleeper wake-up
    /// and load balancing, and quantum-expiry preemption flagging.
    fn tick(&self) {
        let cpu = hal::cpu_current_id();
        let current = self.per_cpu[cpu].current_thread();
        if current != Some(self.per_cpu[cpu].idle_thread()) {
            if let Some(id) = current {
                self.table.with(id, |t| t.cpu_time += 1);
            }
        }

        if hal::cpu_is_bsp() {
            diag::enter(cpu, diag::SECTION_WAKE_SLEEPERS);
            let now = tick::current();
            for id in self.sleepq.drain_due(&self.table, now) {
                let prio = self
                    .table
                    .with(id, |t| {
                        t.state = ThreadState::Ready;
                        t.priority
                    })
                    .unwrap_or(config::IDLE_PRIORITY);
                self.per_cpu[cpu].add_ready(&self.table, id, prio);
            }
            if now % config::LOAD_BALANCE_INTERVAL_TICKS == 0 {
                diag::enter(cpu, diag::SECTION_LOAD_BALANCE);
                self.load_balance();
            }
        }

        let quantum = self.quantum[cpu].fetch_add(1, Ordering::AcqRel) + 1;
        if quantum >= config::PREEMPT_QUANTUM_TICKS {
            self.quantum[cpu].store(0, Ordering::Release);
            self.need_reschedule[cpu].store(true, Ordering::Release);
        }
    }

    fn check_reschedule(&self) {
        let cpu = hal::cpu_current_id();
        if self.need_reschedule[cpu].swap(false, Ordering::AcqRel) {
            diag::enter(cpu, diag::SECTION_SCHEDULE_TIMER);
            self.schedule();
        }
    }
}

// ---------------------------------------------------------------------
// Global singleton. A CAS-initialized pointer rather than a lock: once set
// it is never replaced, so readers pay only an atomic load, and `schedule()`
// never has to re-enter a container lock around the whole dispatch.
// ---------------------------------------------------------------------

static SCHEDULER: AtomicPtr<Scheduler> = AtomicPtr::new(ptr::null_mut());

/// Build the scheduler for this system: one idle thread per CPU reported by
/// [`hal::cpu_count`]. Idempotent; the first caller wins a creation race,
/// later callers' scheduler is dropped unused.
pub fn init() {
    if !SCHEDULER.load(Ordering::Acquire).is_null() {
        return;
    }
    let boxed = Box::into_raw(Box::new(Scheduler::new()));
    if SCHEDULER
        .compare_exchange(ptr::null_mut(), boxed, Ordering::AcqRel, Ordering::Acquire)
        .is_err()
    {
        unsafe { drop(Box::from_raw(boxed)) };
    }
}

fn scheduler() -> &'static Scheduler {
    let ptr = SCHEDULER.load(Ordering::Acquire);
    assert!(!ptr.is_null(), "scheduler::init() must run before use");
    unsafe { &*ptr }
}

// ---------------------------------------------------------------------
// External interfaces (`spec.md` §6).
// ---------------------------------------------------------------------

pub fn thread_create(
    entry: extern "C" fn(usize),
    arg: usize,
    priority: u8,
    name: &str,
) -> SchedResult<ThreadId> {
    if priority == config::IDLE_PRIORITY || priority > config::MAX_PRIORITY {
        return Err(SchedError::InvalidThread);
    }
    scheduler().create_thread(entry, arg, priority, name)
}

pub fn thread_exit() -> ! {
    scheduler().exit_current()
}

pub fn thread_yield() {
    scheduler().yield_now()
}

pub fn thread_sleep(ms: u64) {
    scheduler().sleep(ms)
}

pub fn thread_current() -> ThreadId {
    scheduler().current_thread_id()
}

pub fn thread_block() {
    scheduler().block_current()
}

pub fn thread_unblock(id: ThreadId) {
    scheduler().unblock(id)
}

pub fn set_affinity(id: ThreadId, affinity: Affinity) -> SchedResult<()> {
    scheduler().set_affinity(id, affinity)
}

pub fn scheduler_tick() {
    scheduler().tick()
}

pub fn scheduler_check_reschedule() {
    scheduler().check_reschedule()
}

/// The scheduler singleton is process-wide, so every test that touches it —
/// here and in `mutex`/`semaphore` — serializes through this lock. Avoids a
/// `test_reset()` in one test racing a concurrent `thread_current()` in
/// another under the default multi-threaded test runner.
#[cfg(test)]
pub(crate) static TEST_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());

#[cfg(test)]
pub(crate) fn lock_for_test() -> std::sync::MutexGuard<'static, ()> {
    TEST_LOCK.lock().unwrap_or_else(|p| p.into_inner())
}

/// Resets the singleton. The old scheduler is intentionally leaked rather
/// than dropped: callers elsewhere may still hold `&'static Scheduler`
/// obtained before this call returns the lock in `lock_for_test`'s caller.
#[cfg(test)]
pub(crate) fn test_reset() {
    SCHEDULER.store(ptr::null_mut(), Ordering::Release);
}

#[cfg(test)]
mod tests {
    use super::*;

    extern "C" fn noop(_: usize) {}

    fn fresh() -> std::sync::MutexGuard<'static, ()> {
        let guard = lock_for_test();
        test_reset();
        crate::hal::mock::set_cpu_count(2);
        crate::hal::mock::bind_current_thread_to_cpu(0);
        init();
        guard
    }

    #[test]
    fn round_robin_alternates_same_priority() {
        let _guard = fresh();
        let t1 = thread_create(noop, 0, 64, "t1").unwrap();
        let t2 = thread_create(noop, 0, 64, "t2").unwrap();
        let s = scheduler();
        assert_eq!(s.pick_next(0), t1);
        s.per_cpu[0].add_ready(&s.table, t1, 64);
        assert_eq!(s.pick_next(0), t2);
        s.per_cpu[0].add_ready(&s.table, t2, 64);
        assert_eq!(s.pick_next(0), t1);
    }

    #[test]
    fn higher_priority_preempts() {
        let _guard = fresh();
        let low = thread_create(noop, 0, 32, "low").unwrap();
        let high = thread_create(noop, 0, 96, "high").unwrap();
        let _ = low;
        let s = scheduler();
        assert_eq!(s.pick_next(0), high);
    }

    #[test]
    fn sleep_then_tick_advance_wakes_at_deadline() {
        let _guard = fresh();
        let s = scheduler();
        let id = thread_create(noop, 0, 64, "sleeper").unwrap();
        s.per_cpu[0].remove_ready(&s.table, id, 64);
        let deadline = tick::current() + 5;
        s.table.with(id, |t| {
            t.state = ThreadState::Sleeping;
            t.wakeup_tick = deadline;
        });
        s.sleepq.push(&s.table, id);

        while tick::current() < deadline {
            tick::test_advance();
            scheduler_tick();
            assert_eq!(
                s.table.with(id, |t| t.state),
                Some(ThreadState::Sleeping),
                "must not be Ready before its deadline"
            );
        }

        tick::test_advance();
        scheduler_tick();
        assert_eq!(s.table.with(id, |t| t.state), Some(ThreadState::Ready));
    }

    #[test]
    fn sleep_rounds_ms_to_ticks_up_not_down() {
        let _guard = fresh();
        let s = scheduler();
        let id = s.per_cpu[0].current_thread().unwrap();
        let before = tick::current();
        s.sleep(15);
        // TICK_HZ=100: 15ms is 1.5 ticks, which must round up to 2, not 1.
        assert_eq!(s.table.with(id, |t| t.wakeup_tick), Some(before + 2));
    }

    #[test]
    fn unblock_reschedules_as_ready() {
        let _guard = fresh();
        let s = scheduler();
        let id = thread_create(noop, 0, 64, "blocker").unwrap();
        s.per_cpu[0].remove_ready(&s.table, id, 64);
        s.table.with(id, |t| t.state = ThreadState::Blocked);
        s.per_cpu[0].add_blocked(&s.table, id);

        thread_unblock(id);
        assert_eq!(
            s.table.with(id, |t| t.state),
            Some(ThreadState::Ready)
        );
        assert_eq!(s.pick_next(0), id);
    }
}
