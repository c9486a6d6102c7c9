//! Load balancing and work stealing (`spec.md` §4.9).

use crate::config;
use crate::diag;
use crate::thread::ThreadId;

use super::Scheduler;

impl Scheduler {
    /// Pull-based: runs synchronously inside `pick_next` when the local CPU
    /// has nothing ready. Visits peers starting from a per-CPU round-robin
    /// cursor, `trylock`-only so a busy peer is skipped rather than waited
    /// on.
    pub(super) fn work_steal(&self, thief: usize) -> Option<ThreadId> {
        let n = self.cpu_count();
        if n <= 1 {
            return None;
        }
        diag::enter(thief, diag::SECTION_WORK_STEAL);
        let start = self.per_cpu[thief].steal_cursor();
        for offset in 0..n {
            let victim = (start + offset) % n;
            if victim == thief {
                continue;
            }
            if let Some((id, priority)) = self.per_cpu[victim].try_pop_lowest_migratable(
                &self.table,
                config::MAX_PRIORITY,
                Some(thief),
            ) {
                self.table.with(id, |t| t.home_cpu = thief);
                self.per_cpu[thief].advance_steal_cursor(n);
                log::debug!(
                    "work_steal: tid={id} cpu={victim}->{thief} priority={priority}"
                );
                return Some(id);
            }
        }
        self.per_cpu[thief].advance_steal_cursor(n);
        None
    }

    /// Push-based: runs from the BSP's tick every
    /// [`config::LOAD_BALANCE_INTERVAL_TICKS`]. Moves at most one
    /// low-priority, unpinned thread from the busiest CPU to the
    /// least-loaded one.
    pub(super) fn load_balance(&self) {
        let n = self.cpu_count();
        if n <= 1 {
            return;
        }

        let mut busiest = 0usize;
        let mut busiest_len = self.per_cpu[0].ready_len();
        let mut least_loaded = 0usize;
        let mut least_len = busiest_len;
        for cpu in 1..n {
            let len = self.per_cpu[cpu].ready_len();
            if len > busiest_len {
                busiest = cpu;
                busiest_len = len;
            }
            if len < least_len {
                least_loaded = cpu;
                least_len = len;
            }
        }

        if busiest == least_loaded || busiest_len.saturating_sub(least_len) < config::LOAD_BALANCE_THRESHOLD
        {
            return;
        }

        let Some((id, priority)) = self.per_cpu[busiest].pop_lowest_migratable(
            &self.table,
            config::MIGRATABLE_PRIORITY_MAX,
            Some(least_loaded),
        ) else {
            return;
        };

        self.table.with(id, |t| t.home_cpu = least_loaded);
        self.per_cpu[least_loaded].add_ready(&self.table, id, priority);
        log::debug!(
            "load_balance: tid={id} cpu={busiest}->{least_loaded} priority={priority} \
             gap {busiest_len}->{}",
            busiest_len.saturating_sub(1)
        );
    }
}
