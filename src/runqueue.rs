//! Per-CPU runqueue: 128 intrusive priority FIFOs, a blocked list, and the
//! `current_thread`/`idle_thread` pointers (`spec.md` §3, §4.7).
//!
//! Each priority level is a per-CPU-lock-guarded FIFO, linking threads
//! intrusively through [`Thread::next`](crate::thread::Thread::next) instead
//! of a separate container, since threads here live once in the global
//! [`ThreadTable`] rather than being cloned into per-priority containers —
//! the FIFO only ever stores head/tail ids and a length, and the link itself
//! lives on the thread record. No occupancy bitmap; 128 levels is small
//! enough that `pick_next`'s "scan 127 down to 0" is a plain loop.

use crate::config::PRIORITY_LEVELS;
use crate::spinlock::Spinlock;
use crate::thread::{ThreadId, ThreadTable};

/// A FIFO of thread ids linked through each thread's own `next` field.
#[derive(Default, Clone, Copy)]
struct IntrusiveFifo {
    head: Option<ThreadId>,
    tail: Option<ThreadId>,
    len: usize,
}

impl IntrusiveFifo {
    fn push_back(&mut self, table: &ThreadTable, id: ThreadId) {
        table.with(id, |t| t.next = None);
        match self.tail {
            Some(tail) => {
                table.with(tail, |t| t.next = Some(id));
            }
            None => self.head = Some(id),
        }
        self.tail = Some(id);
        self.len += 1;
    }

    fn pop_front(&mut self, table: &ThreadTable) -> Option<ThreadId> {
        let head = self.head?;
        let next = table.with(head, |t| t.next).flatten();
        self.head = next;
        if next.is_none() {
            self.tail = None;
        }
        self.len -= 1;
        Some(head)
    }

    /// Unlink `id` wherever it sits in the chain. `O(len)`; only used on the
    /// state-transition paths `spec.md` calls out (blocking, unbinding).
    fn remove(&mut self, table: &ThreadTable, id: ThreadId) -> bool {
        let mut prev: Option<ThreadId> = None;
        let mut cursor = self.head;
        while let Some(cur) = cursor {
            let next = table.with(cur, |t| t.next).flatten();
            if cur == id {
                match prev {
                    Some(p) => {
                        table.with(p, |t| t.next = next);
                    }
                    None => self.head = next,
                }
                if self.tail == Some(cur) {
                    self.tail = prev;
                }
                self.len -= 1;
                return true;
            }
            prev = Some(cur);
            cursor = next;
        }
        false
    }

    fn is_empty(&self) -> bool {
        self.len == 0
    }
}

fn pop_lowest_migratable_locked(
    inner: &mut RunQueueInner,
    table: &ThreadTable,
    max_priority: u8,
    thief: Option<usize>,
) -> Option<(ThreadId, u8)> {
    for p in 0..=max_priority as usize {
        // Honour affinity: skip past any pinned head without disturbing order.
        let fifo = &mut inner.ready[p];
        let mut scanned = 0;
        let len = fifo.len;
        while scanned < len {
            let Some(candidate) = fifo.pop_front(table) else {
                break;
            };
            scanned += 1;
            let affinity = table.with(candidate, |t| t.affinity).unwrap_or(-1);
            let pinned_elsewhere = affinity >= 0 && Some(affinity as usize) != thief;
            if pinned_elsewhere {
                fifo.push_back(table, candidate);
                continue;
            }
            return Some((candidate, p as u8));
        }
    }
    None
}

struct RunQueueInner {
    ready: [IntrusiveFifo; PRIORITY_LEVELS],
    blocked: IntrusiveFifo,
    current: Option<ThreadId>,
    idle: ThreadId,
    steal_cursor: usize,
}

/// One per logical CPU. Owned exclusively by that CPU; mutated only under
/// its own lock, per `spec.md`'s concurrency model.
pub struct RunQueue {
    inner: Spinlock<RunQueueInner>,
}

impl RunQueue {
    pub fn new(idle: ThreadId) -> Self {
        RunQueue {
            inner: Spinlock::new(RunQueueInner {
                ready: [IntrusiveFifo::default(); PRIORITY_LEVELS],
                blocked: IntrusiveFifo::default(),
                current: None,
                idle,
                steal_cursor: 0,
            }),
        }
    }

    pub fn idle_thread(&self) -> ThreadId {
        self.inner.lock().idle
    }

    pub fn current_thread(&self) -> Option<ThreadId> {
        self.inner.lock().current
    }

    pub fn set_current(&self, id: Option<ThreadId>) {
        self.inner.lock().current = id;
    }

    pub fn add_ready(&self, table: &ThreadTable, id: ThreadId, priority: u8) {
        let mut inner = self.inner.lock();
        inner.ready[priority as usize].push_back(table, id);
    }

    pub fn add_blocked(&self, table: &ThreadTable, id: ThreadId) {
        let mut inner = self.inner.lock();
        inner.blocked.push_back(table, id);
    }

    pub fn remove_blocked(&self, table: &ThreadTable, id: ThreadId) -> bool {
        self.inner.lock().blocked.remove(table, id)
    }

    /// Remove `id` from whichever ready priority FIFO it is currently on.
    /// Used for cross-CPU unlink paths (`remove_ready`, balancing, stealing).
    pub fn remove_ready(&self, table: &ThreadTable, id: ThreadId, priority: u8) -> bool {
        self.inner.lock().ready[priority as usize].remove(table, id)
    }

    /// Total ready-thread count across all priorities. Used by the load
    /// balancer to find the busiest/least-loaded CPU.
    pub fn ready_len(&self) -> usize {
        self.inner.lock().ready.iter().map(|f| f.len).sum()
    }

    /// Highest non-empty ready priority, scanning 127 down to 0.
    pub fn pop_highest_ready(&self, table: &ThreadTable) -> Option<(ThreadId, u8)> {
        let mut inner = self.inner.lock();
        for p in (0..PRIORITY_LEVELS).rev() {
            if !inner.ready[p].is_empty() {
                let id = inner.ready[p].pop_front(table).unwrap();
                return Some((id, p as u8));
            }
        }
        None
    }

    /// Lowest non-empty migratable priority, for the load balancer
    /// (`spec.md` §4.9: "prefer cheap-to-migrate work"). Blocks for the lock,
    /// matching the balancer's documented "acquire the busiest's lock".
    pub fn pop_lowest_migratable(
        &self,
        table: &ThreadTable,
        max_priority: u8,
        thief: Option<usize>,
    ) -> Option<(ThreadId, u8)> {
        let mut inner = self.inner.lock();
        pop_lowest_migratable_locked(&mut inner, table, max_priority, thief)
    }

    /// Same as [`Self::pop_lowest_migratable`] but via `trylock`, for the
    /// work stealer, which must never block on a peer's runqueue lock.
    pub fn try_pop_lowest_migratable(
        &self,
        table: &ThreadTable,
        max_priority: u8,
        thief: Option<usize>,
    ) -> Option<(ThreadId, u8)> {
        let mut inner = self.inner.try_lock()?;
        pop_lowest_migratable_locked(&mut inner, table, max_priority, thief)
    }

    pub fn steal_cursor(&self) -> usize {
        self.inner.lock().steal_cursor
    }

    pub fn advance_steal_cursor(&self, cpu_count: usize) {
        let mut inner = self.inner.lock();
        inner.steal_cursor = (inner.steal_cursor + 1) % cpu_count.max(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_table_with(n: usize) -> (ThreadTable, Vec<ThreadId>) {
        extern "C" fn noop(_: usize) {}
        let table = ThreadTable::new();
        let mut ids = Vec::new();
        for i in 0..n {
            ids.push(table.insert(&format!("t{i}"), 64, noop, 0, 0).unwrap());
        }
        (table, ids)
    }

    #[test]
    fn fifo_order_within_one_priority() {
        let (table, ids) = make_table_with(3);
        let rq = RunQueue::new(0);
        for &id in &ids {
            rq.add_ready(&table, id, 64);
        }
        assert_eq!(rq.pop_highest_ready(&table).unwrap().0, ids[0]);
        assert_eq!(rq.pop_highest_ready(&table).unwrap().0, ids[1]);
        assert_eq!(rq.pop_highest_ready(&table).unwrap().0, ids[2]);
        assert!(rq.pop_highest_ready(&table).is_none());
    }

    #[test]
    fn higher_priority_dispatched_first() {
        let (table, ids) = make_table_with(2);
        let rq = RunQueue::new(0);
        rq.add_ready(&table, ids[0], 32);
        rq.add_ready(&table, ids[1], 96);
        let (picked, prio) = rq.pop_highest_ready(&table).unwrap();
        assert_eq!(picked, ids[1]);
        assert_eq!(prio, 96);
    }

    #[test]
    fn remove_ready_unlinks_mid_queue() {
        let (table, ids) = make_table_with(3);
        let rq = RunQueue::new(0);
        for &id in &ids {
            rq.add_ready(&table, id, 10);
        }
        assert!(rq.remove_ready(&table, ids[1], 10));
        assert_eq!(rq.pop_highest_ready(&table).unwrap().0, ids[0]);
        assert_eq!(rq.pop_highest_ready(&table).unwrap().0, ids[2]);
        assert!(rq.pop_highest_ready(&table).is_none());
    }
}
