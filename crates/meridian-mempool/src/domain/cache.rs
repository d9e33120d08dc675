//! Seen-transaction cache.
//!
//! A bounded set of recently-seen transaction keys used to short-circuit
//! duplicate admissions before they reach the validator.

use lru::LruCache;
use meridian_types::Tx;
use parking_lot::Mutex;
use std::num::NonZeroUsize;

/// Cache of recently seen transactions.
pub trait TxCache: Send + Sync {
    /// Records a transaction. Returns true if it was not already cached.
    fn push(&self, tx: &Tx) -> bool;

    /// Forgets a transaction, so a future submission is re-evaluated.
    fn remove(&self, tx: &Tx);

    /// Drops every cached entry.
    fn reset(&self);
}

/// LRU-evicting cache keyed on the transaction digest.
#[derive(Debug)]
pub struct LruTxCache {
    inner: Mutex<LruCache<meridian_types::TxKey, ()>>,
}

impl LruTxCache {
    /// Creates a cache holding at most `capacity` entries.
    ///
    /// # Panics
    /// Panics if `capacity` is zero; a zero capacity means the cache is
    /// disabled and [`NopTxCache`] should be used instead.
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).expect("cache capacity must be non-zero");
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
        }
    }
}

impl TxCache for LruTxCache {
    fn push(&self, tx: &Tx) -> bool {
        self.inner.lock().put(tx.key(), ()).is_none()
    }

    fn remove(&self, tx: &Tx) {
        self.inner.lock().pop(&tx.key());
    }

    fn reset(&self) {
        self.inner.lock().clear();
    }
}

/// Cache used when caching is disabled; every push reports a new entry.
#[derive(Debug, Clone, Copy, Default)]
pub struct NopTxCache;

impl TxCache for NopTxCache {
    fn push(&self, _tx: &Tx) -> bool {
        true
    }

    fn remove(&self, _tx: &Tx) {}

    fn reset(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_reports_newness() {
        let cache = LruTxCache::new(10);
        let tx = Tx::from("a");
        assert!(cache.push(&tx));
        assert!(!cache.push(&tx));
    }

    #[test]
    fn test_remove_forgets() {
        let cache = LruTxCache::new(10);
        let tx = Tx::from("a");
        cache.push(&tx);
        cache.remove(&tx);
        assert!(cache.push(&tx));
    }

    #[test]
    fn test_lru_eviction_at_capacity() {
        let cache = LruTxCache::new(2);
        let a = Tx::from("a");
        let b = Tx::from("b");
        let c = Tx::from("c");

        cache.push(&a);
        cache.push(&b);
        // Touch `a` so `b` becomes the least recently used entry.
        cache.push(&a);
        cache.push(&c);

        assert!(!cache.push(&a));
        assert!(!cache.push(&c));
        // `b` was evicted and reads as new again. This push evicts `a`.
        assert!(cache.push(&b));
    }

    #[test]
    fn test_reset_clears_everything() {
        let cache = LruTxCache::new(10);
        let a = Tx::from("a");
        let b = Tx::from("b");
        cache.push(&a);
        cache.push(&b);
        cache.reset();
        assert!(cache.push(&a));
        assert!(cache.push(&b));
    }

    #[test]
    fn test_nop_cache_always_new() {
        let cache = NopTxCache;
        let tx = Tx::from("a");
        assert!(cache.push(&tx));
        assert!(cache.push(&tx));
        cache.remove(&tx);
        cache.reset();
    }
}
