//! Compile-time tunables for the scheduler core.
//!
//! All of these are plain `const` items, hand-placed tunables rather than a
//! runtime configuration surface — this crate has none.

/// Maximum number of threads live in the global thread table at once.
pub const MAX_THREADS: usize = 256;

/// Upper bound on logical CPUs this crate's static per-CPU arrays support.
/// The actual active count comes from [`crate::hal::cpu_count`] at runtime
/// and must not exceed this.
pub const MAX_CPUS: usize = 64;

/// Timer tick frequency: one tick every 10 ms.
pub const TICK_HZ: u64 = 100;

/// Ticks a thread may run before being subject to preemption (100 ms).
pub const PREEMPT_QUANTUM_TICKS: u32 = 10;

/// BSP runs the load balancer every this many ticks (~1 s at `TICK_HZ`).
pub const LOAD_BALANCE_INTERVAL_TICKS: u64 = 100;

/// Minimum `busiest - least_loaded` ready-queue length gap that triggers a migration.
pub const LOAD_BALANCE_THRESHOLD: usize = 2;

/// Fixed kernel stack size per thread.
pub const KERNEL_STACK_SIZE: usize = 64 * 1024;

/// Number of discrete priority levels. 0 is reserved for idle threads.
pub const PRIORITY_LEVELS: usize = 128;

/// Highest priority level eligible for load-balancer migration (inclusive).
/// High-priority work never migrates involuntarily.
pub const MIGRATABLE_PRIORITY_MAX: u8 = 63;

/// Highest valid priority value (`PRIORITY_LEVELS - 1`).
pub const MAX_PRIORITY: u8 = (PRIORITY_LEVELS - 1) as u8;

/// Priority reserved exclusively for per-CPU idle threads.
pub const IDLE_PRIORITY: u8 = 0;
