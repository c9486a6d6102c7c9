//! Per-CPU "what was this CPU last doing" tracker, used only to enrich the
//! spinlock deadlock-suspected diagnostic.
//!
//! Records a phase id per CPU immediately before entering a guarded section
//! so a spin-timeout on another CPU can name what the owner was last doing.

use core::sync::atomic::{AtomicU32, Ordering};

use crate::config::MAX_CPUS;

pub const SECTION_IDLE: u32 = 0;
pub const SECTION_SCHEDULE_TIMER: u32 = 1;
pub const SECTION_SCHEDULE_VOLUNTARY: u32 = 2;
pub const SECTION_THREAD_CREATE: u32 = 3;
pub const SECTION_THREAD_EXIT: u32 = 4;
pub const SECTION_BLOCK: u32 = 5;
pub const SECTION_UNBLOCK: u32 = 6;
pub const SECTION_SLEEP: u32 = 7;
pub const SECTION_WAKE_SLEEPERS: u32 = 8;
pub const SECTION_LOAD_BALANCE: u32 = 9;
pub const SECTION_WORK_STEAL: u32 = 10;

static SECTION: [AtomicU32; MAX_CPUS] = {
    const INIT: AtomicU32 = AtomicU32::new(SECTION_IDLE);
    [INIT; MAX_CPUS]
};

/// Record which section the calling CPU is about to enter. Call immediately
/// before acquiring a lock whose hold time matters for diagnostics.
#[inline(always)]
pub fn enter(cpu: usize, section: u32) {
    if cpu < MAX_CPUS {
        SECTION[cpu].store(section, Ordering::Relaxed);
    }
}

/// Read back the section most recently entered by `cpu`. Lock-free, safe to
/// call from a spin-timeout path while another CPU holds an unrelated lock.
#[inline(always)]
pub fn current(cpu: usize) -> u32 {
    if cpu < MAX_CPUS {
        SECTION[cpu].load(Ordering::Relaxed)
    } else {
        SECTION_IDLE
    }
}

/// Short ASCII name for a section id, for lock-free diagnostic printing.
pub fn name(section: u32) -> &'static str {
    match section {
        SECTION_IDLE => "idle",
        SECTION_SCHEDULE_TIMER => "schedule/timer",
        SECTION_SCHEDULE_VOLUNTARY => "schedule/voluntary",
        SECTION_THREAD_CREATE => "thread_create",
        SECTION_THREAD_EXIT => "thread_exit",
        SECTION_BLOCK => "block",
        SECTION_UNBLOCK => "unblock",
        SECTION_SLEEP => "sleep",
        SECTION_WAKE_SLEEPERS => "wake_sleepers",
        SECTION_LOAD_BALANCE => "load_balance",
        SECTION_WORK_STEAL => "work_steal",
        _ => "?",
    }
}
