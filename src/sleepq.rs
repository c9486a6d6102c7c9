//! Global sleeping queue: `Sleeping` threads keyed by wakeup tick
//! (`spec.md` §3). Scanned only by the BSP on each tick.

use crate::spinlock::Spinlock;
use crate::thread::{ThreadId, ThreadTable};

struct SleepQueueInner {
    head: Option<ThreadId>,
}

/// A plain singly-linked list, not a heap: `spec.md` explicitly permits this
/// ("the required contract is wake-by-deadline"), and a handful of sleepers
/// scanned once every tick is cheap enough that sorting buys nothing here.
pub struct SleepQueue {
    inner: Spinlock<SleepQueueInner>,
}

impl SleepQueue {
    pub const fn new() -> Self {
        SleepQueue {
            inner: Spinlock::new(SleepQueueInner { head: None }),
        }
    }

    pub fn push(&self, table: &ThreadTable, id: ThreadId) {
        table.with(id, |t| t.next = None);
        let mut inner = self.inner.lock();
        table.with(id, |t| t.next = inner.head);
        inner.head = Some(id);
    }

    /// Unlink and return every thread whose `wakeup_tick <= now`.
    pub fn drain_due(&self, table: &ThreadTable, now: u64) -> alloc::vec::Vec<ThreadId> {
        let mut due = alloc::vec::Vec::new();
        let mut inner = self.inner.lock();
        let mut prev: Option<ThreadId> = None;
        let mut cursor = inner.head;
        while let Some(cur) = cursor {
            let (next, wakeup_tick) = table
                .with(cur, |t| (t.next, t.wakeup_tick))
                .unwrap_or((None, u64::MAX));
            if wakeup_tick <= now {
                match prev {
                    Some(p) => {
                        table.with(p, |t| t.next = next);
                    }
                    None => inner.head = next,
                }
                due.push(cur);
            } else {
                prev = Some(cur);
            }
            cursor = next;
        }
        due
    }
}

impl Default for SleepQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drain_due_only_takes_expired_sleepers() {
        extern "C" fn noop(_: usize) {}
        let table = ThreadTable::new();
        let t1 = table.insert("t1", 1, noop, 0, 0).unwrap();
        let t2 = table.insert("t2", 1, noop, 0, 0).unwrap();
        table.with(t1, |t| t.wakeup_tick = 100).unwrap();
        table.with(t2, |t| t.wakeup_tick = 200).unwrap();

        let q = SleepQueue::new();
        q.push(&table, t1);
        q.push(&table, t2);

        let due_early = q.drain_due(&table, 50);
        assert!(due_early.is_empty());

        let due = q.drain_due(&table, 150);
        assert_eq!(due, alloc::vec![t1]);

        let due_later = q.drain_due(&table, 500);
        assert_eq!(due_later, alloc::vec![t2]);
    }
}
