//! Priority index over resident transactions.
//!
//! A binary max-heap keyed on (priority, timestamp): higher priority
//! extracts first, ties go to the earlier arrival. Eviction candidates and
//! block assembly both come from here.
//!
//! Note on staleness: recheck updates a resident's priority in place
//! without re-sifting the heap, so an entry's position can lag its current
//! priority until it is removed. Extraction still reads the live value.

use crate::domain::entities::WrappedTx;
use parking_lot::Mutex;
use std::sync::Arc;

/// Thread-safe max-heap of references to resident transactions.
#[derive(Debug, Default)]
pub struct TxPriorityQueue {
    txs: Mutex<Vec<Arc<WrappedTx>>>,
}

/// True if `a` extracts before `b`.
fn outranks(a: &WrappedTx, b: &WrappedTx) -> bool {
    let (pa, pb) = (a.priority(), b.priority());
    pa > pb || (pa == pb && a.timestamp() < b.timestamp())
}

fn sift_up(txs: &mut [Arc<WrappedTx>], mut i: usize) {
    while i > 0 {
        let parent = (i - 1) / 2;
        if outranks(&txs[i], &txs[parent]) {
            txs.swap(i, parent);
            i = parent;
        } else {
            break;
        }
    }
}

fn sift_down(txs: &mut [Arc<WrappedTx>], mut i: usize) {
    loop {
        let left = 2 * i + 1;
        let right = 2 * i + 2;
        let mut best = i;
        if left < txs.len() && outranks(&txs[left], &txs[best]) {
            best = left;
        }
        if right < txs.len() && outranks(&txs[right], &txs[best]) {
            best = right;
        }
        if best == i {
            break;
        }
        txs.swap(i, best);
        i = best;
    }
}

fn heap_push(txs: &mut Vec<Arc<WrappedTx>>, wtx: Arc<WrappedTx>) {
    txs.push(wtx);
    let last = txs.len() - 1;
    sift_up(txs, last);
}

fn heap_pop(txs: &mut Vec<Arc<WrappedTx>>) -> Option<Arc<WrappedTx>> {
    if txs.is_empty() {
        return None;
    }
    let last = txs.len() - 1;
    txs.swap(0, last);
    let top = txs.pop();
    sift_down(txs, 0);
    top
}

impl TxPriorityQueue {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of indexed transactions.
    pub fn len(&self) -> usize {
        self.txs.lock().len()
    }

    /// True if no transactions are indexed.
    pub fn is_empty(&self) -> bool {
        self.txs.lock().is_empty()
    }

    /// Inserts a transaction. O(log n).
    pub fn push(&self, wtx: Arc<WrappedTx>) {
        heap_push(&mut self.txs.lock(), wtx);
    }

    /// Extracts the highest-ranked transaction. O(log n).
    pub fn pop(&self) -> Option<Arc<WrappedTx>> {
        heap_pop(&mut self.txs.lock())
    }

    /// Removes the given transaction. O(n) to locate, then a sift; removals
    /// are bounded by eviction and block size, so the scan is acceptable.
    pub fn remove(&self, wtx: &WrappedTx) {
        let mut txs = self.txs.lock();
        let Some(i) = txs.iter().position(|t| t.key() == wtx.key()) else {
            return;
        };
        txs.swap_remove(i);
        if i < txs.len() {
            sift_down(&mut txs, i);
            sift_up(&mut txs, i);
        }
    }

    /// Returns the lowest-ranked resident with priority strictly below
    /// `priority`, or `None` if every resident ranks at least that high
    /// (or the index is empty).
    pub fn get_evictable(&self, priority: i64) -> Option<Arc<WrappedTx>> {
        let txs = self.txs.lock();
        let mut worst: Option<&Arc<WrappedTx>> = None;
        for candidate in txs.iter().filter(|t| t.priority() < priority) {
            worst = match worst {
                Some(current) if !outranks(current, candidate) => Some(current),
                _ => Some(candidate),
            };
        }
        worst.cloned()
    }

    /// Selects transactions in priority order until either cap would be
    /// exceeded. Negative caps are unlimited. Destructive pops, restored
    /// before returning, so the call is idempotent and side-effect-free.
    pub fn reap_max_bytes_max_gas(&self, max_bytes: i64, max_gas: i64) -> Vec<Arc<WrappedTx>> {
        let mut txs = self.txs.lock();
        let mut popped = Vec::new();
        let mut selected = Vec::new();
        let mut total_bytes = 0i64;
        let mut total_gas = 0i64;

        while let Some(wtx) = heap_pop(&mut txs) {
            popped.push(Arc::clone(&wtx));

            let size = wtx.size() as i64;
            if max_bytes >= 0 && total_bytes + size > max_bytes {
                break;
            }
            if max_gas >= 0 && total_gas + wtx.gas_wanted() > max_gas {
                break;
            }

            total_bytes += size;
            total_gas += wtx.gas_wanted();
            selected.push(wtx);
        }

        for wtx in popped {
            heap_push(&mut txs, wtx);
        }
        selected
    }

    /// Selects up to `max` transactions in priority order. A negative
    /// `max` selects everything. Destructive pops, restored before return.
    pub fn reap_max_txs(&self, max: i64) -> Vec<Arc<WrappedTx>> {
        let mut txs = self.txs.lock();
        let limit = if max < 0 { txs.len() } else { max as usize };
        let mut popped = Vec::new();
        let mut selected = Vec::new();

        while selected.len() < limit {
            let Some(wtx) = heap_pop(&mut txs) else {
                break;
            };
            popped.push(Arc::clone(&wtx));
            selected.push(wtx);
        }

        for wtx in popped {
            heap_push(&mut txs, wtx);
        }
        selected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_types::Tx;

    fn wtx(payload: &str, priority: i64, timestamp: u64) -> Arc<WrappedTx> {
        let wrapped = WrappedTx::new(Tx::from(payload), timestamp);
        wrapped.set_priority(priority);
        Arc::new(wrapped)
    }

    fn wtx_with_gas(payload: &str, priority: i64, gas: i64) -> Arc<WrappedTx> {
        let mut wrapped = WrappedTx::new(Tx::from(payload), 0);
        wrapped.set_gas_wanted(gas);
        let wrapped = Arc::new(wrapped);
        wrapped.set_priority(priority);
        wrapped
    }

    #[test]
    fn test_pop_in_priority_order() {
        let pq = TxPriorityQueue::new();
        pq.push(wtx("low", 1, 0));
        pq.push(wtx("high", 10, 0));
        pq.push(wtx("mid", 5, 0));

        assert_eq!(pq.pop().unwrap().priority(), 10);
        assert_eq!(pq.pop().unwrap().priority(), 5);
        assert_eq!(pq.pop().unwrap().priority(), 1);
        assert!(pq.pop().is_none());
    }

    #[test]
    fn test_ties_go_to_earlier_timestamp() {
        let pq = TxPriorityQueue::new();
        pq.push(wtx("later", 5, 2_000));
        pq.push(wtx("earlier", 5, 1_000));

        assert_eq!(pq.pop().unwrap().timestamp(), 1_000);
        assert_eq!(pq.pop().unwrap().timestamp(), 2_000);
    }

    #[test]
    fn test_remove_keeps_heap_order() {
        let pq = TxPriorityQueue::new();
        let victim = wtx("b", 5, 0);
        pq.push(wtx("a", 1, 0));
        pq.push(Arc::clone(&victim));
        pq.push(wtx("c", 10, 0));
        pq.push(wtx("d", 7, 0));

        pq.remove(&victim);
        assert_eq!(pq.len(), 3);
        assert_eq!(pq.pop().unwrap().priority(), 10);
        assert_eq!(pq.pop().unwrap().priority(), 7);
        assert_eq!(pq.pop().unwrap().priority(), 1);
    }

    #[test]
    fn test_remove_absent_is_noop() {
        let pq = TxPriorityQueue::new();
        pq.push(wtx("a", 1, 0));
        pq.remove(&wtx("ghost", 3, 0));
        assert_eq!(pq.len(), 1);
    }

    // =========================================================================
    // EVICTION CANDIDATE SELECTION
    // =========================================================================

    #[test]
    fn test_get_evictable_picks_lowest_ranked() {
        let pq = TxPriorityQueue::new();
        pq.push(wtx("a", 1, 0));
        pq.push(wtx("b", 2, 0));
        pq.push(wtx("c", 9, 0));

        let victim = pq.get_evictable(5).unwrap();
        assert_eq!(victim.priority(), 1);
        // Selection does not remove.
        assert_eq!(pq.len(), 3);
    }

    #[test]
    fn test_get_evictable_requires_strictly_lower_priority() {
        let pq = TxPriorityQueue::new();
        pq.push(wtx("a", 5, 0));
        pq.push(wtx("b", 6, 0));

        assert!(pq.get_evictable(5).is_none());
        assert!(pq.get_evictable(3).is_none());
        assert!(pq.get_evictable(6).is_some());
    }

    #[test]
    fn test_get_evictable_empty() {
        let pq = TxPriorityQueue::new();
        assert!(pq.get_evictable(i64::MAX).is_none());
    }

    #[test]
    fn test_get_evictable_tie_prefers_later_arrival() {
        let pq = TxPriorityQueue::new();
        pq.push(wtx("old", 1, 1_000));
        pq.push(wtx("new", 1, 2_000));

        let victim = pq.get_evictable(5).unwrap();
        assert_eq!(victim.timestamp(), 2_000);
    }

    // =========================================================================
    // REAP
    // =========================================================================

    #[test]
    fn test_reap_respects_byte_cap_and_restores() {
        let pq = TxPriorityQueue::new();
        pq.push(wtx("aaaa", 1, 0)); // 4 bytes
        pq.push(wtx("bbbb", 2, 0));
        pq.push(wtx("cccc", 3, 0));

        let reaped = pq.reap_max_bytes_max_gas(8, -1);
        assert_eq!(reaped.len(), 2);
        assert_eq!(reaped[0].priority(), 3);
        assert_eq!(reaped[1].priority(), 2);
        assert_eq!(pq.len(), 3);

        // Idempotent.
        let again = pq.reap_max_bytes_max_gas(8, -1);
        assert_eq!(again.len(), 2);
        assert_eq!(again[0].priority(), 3);
    }

    #[test]
    fn test_reap_respects_gas_cap() {
        let pq = TxPriorityQueue::new();
        pq.push(wtx_with_gas("a", 3, 10));
        pq.push(wtx_with_gas("b", 2, 10));
        pq.push(wtx_with_gas("c", 1, 10));

        let reaped = pq.reap_max_bytes_max_gas(-1, 25);
        assert_eq!(reaped.len(), 2);
        assert_eq!(reaped[0].priority(), 3);
        assert_eq!(reaped[1].priority(), 2);
        assert_eq!(pq.len(), 3);
    }

    #[test]
    fn test_reap_unlimited_returns_everything() {
        let pq = TxPriorityQueue::new();
        for i in 0..5 {
            pq.push(wtx(&format!("tx-{i}"), i, 0));
        }
        let reaped = pq.reap_max_bytes_max_gas(-1, -1);
        assert_eq!(reaped.len(), 5);
        assert_eq!(pq.len(), 5);
    }

    #[test]
    fn test_reap_max_txs() {
        let pq = TxPriorityQueue::new();
        for i in 0..5 {
            pq.push(wtx(&format!("tx-{i}"), i, 0));
        }

        let top = pq.reap_max_txs(2);
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].priority(), 4);
        assert_eq!(top[1].priority(), 3);
        assert_eq!(pq.len(), 5);

        let all = pq.reap_max_txs(-1);
        assert_eq!(all.len(), 5);
        assert_eq!(pq.len(), 5);
    }
}
