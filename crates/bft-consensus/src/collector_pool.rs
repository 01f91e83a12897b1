//! `CollectorPool` (spec §4.F): a ring of `W = max_process_txn` collectors
//! indexed by `seq mod W`, avoiding per-transaction heap churn (spec §9).

use crate::collector::TransactionCollector;
use parking_lot::Mutex;
use std::sync::Arc;

struct Slot {
    seq: u64,
    collector: Arc<TransactionCollector>,
}

/// A fixed-size ring of collectors. Each slot remembers the seq it currently
/// represents so a message for a stale seq (`s' mod W == s mod W` but
/// `s' != s`) is detectable rather than silently mixed into the wrong
/// collector (spec §9).
pub struct CollectorPool {
    window: usize,
    slots: Vec<Mutex<Slot>>,
}

impl CollectorPool {
    /// Builds a pool of `window` slots, pre-populated for seqs `0..window` so
    /// each slot's seed already agrees with `index_of`'s `seq % window`.
    #[must_use]
    pub fn new(window: usize) -> Self {
        assert!(window > 0, "collector pool window must be non-zero");
        let slots = (0..window)
            .map(|i| {
                let seq = i as u64;
                Mutex::new(Slot {
                    seq,
                    collector: Arc::new(TransactionCollector::new(seq)),
                })
            })
            .collect();
        Self { window, slots }
    }

    /// The ring size `W`.
    #[must_use]
    pub fn window(&self) -> usize {
        self.window
    }

    fn index_of(&self, seq: u64) -> usize {
        (seq % self.window as u64) as usize
    }

    /// Returns the collector currently representing `seq`, lazily
    /// (re)constructing the slot if it had represented a different seq.
    pub fn get(&self, seq: u64) -> Arc<TransactionCollector> {
        let idx = self.index_of(seq);
        let mut slot = self.slots[idx].lock();
        if slot.seq != seq {
            slot.seq = seq;
            slot.collector = Arc::new(TransactionCollector::new(seq));
        }
        slot.collector.clone()
    }

    /// Peeks at the collector for `seq` without reconstructing a stale slot;
    /// returns `None` if the slot does not currently represent `seq`.
    #[must_use]
    pub fn peek(&self, seq: u64) -> Option<Arc<TransactionCollector>> {
        let idx = self.index_of(seq);
        let slot = self.slots[idx].lock();
        if slot.seq == seq {
            Some(slot.collector.clone())
        } else {
            None
        }
    }

    /// Retires the slot for `seq` after execution: frees the collector (and
    /// its `main_request`/bitmap memory) and pre-arms the slot for
    /// `seq + W`, the next seq that will land on this index (spec §4.F).
    pub fn retire(&self, seq: u64) {
        let idx = self.index_of(seq);
        let mut slot = self.slots[idx].lock();
        if slot.seq != seq {
            return;
        }
        let next = seq + self.window as u64;
        slot.seq = next;
        slot.collector = Arc::new(TransactionCollector::new(next));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::CollectorStatus;

    #[test]
    fn get_returns_stable_collector_for_same_seq() {
        let pool = CollectorPool::new(4);
        let a = pool.get(5);
        let b = pool.get(5);
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn get_detects_stale_slot_and_reconstructs() {
        let pool = CollectorPool::new(4);
        let first = pool.get(1);
        first.try_advance(CollectorStatus::None, CollectorStatus::ReadyPrepare);
        // seq 5 maps to the same index as seq 1 (5 mod 4 == 1 mod 4).
        let second = pool.get(5);
        assert_eq!(second.seq(), 5);
        assert_eq!(second.status(), CollectorStatus::None);
    }

    #[test]
    fn retire_advances_slot_by_window_and_resets_state() {
        let pool = CollectorPool::new(4);
        let collector = pool.get(2);
        collector.try_advance(CollectorStatus::None, CollectorStatus::ReadyPrepare);
        pool.retire(2);
        assert!(pool.peek(2).is_none());
        let reused = pool.get(6);
        assert_eq!(reused.seq(), 6);
        assert_eq!(reused.status(), CollectorStatus::None);
    }

    #[test]
    fn retire_on_wrong_seq_is_a_no_op() {
        let pool = CollectorPool::new(4);
        let collector = pool.get(3);
        pool.retire(7); // 7 mod 4 == 3 mod 4, but slot currently represents 3.
        assert_eq!(pool.peek(3).unwrap().seq(), 3);
        let _ = collector;
    }
}
