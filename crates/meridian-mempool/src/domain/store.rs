//! Primary transaction storage.
//!
//! The store owns every resident [`WrappedTx`]; the priority and gossip
//! indexes are built on top of it. Besides the hash map it keeps a
//! tombstone set (the hash of every transaction removed while a validator
//! callback could still be in flight) so late callbacks can detect that
//! their target is gone and no-op safely.

use crate::domain::entities::WrappedTx;
use meridian_types::TxKey;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Thread-safe store of resident transactions.
#[derive(Debug, Default)]
pub struct TxStore {
    inner: RwLock<StoreInner>,
}

#[derive(Debug, Default)]
struct StoreInner {
    /// Resident transactions by key.
    txs: HashMap<TxKey, Arc<WrappedTx>>,
    /// Validator-reported sender → resident transaction key, for senders
    /// that report a non-empty identity.
    senders: HashMap<String, TxKey>,
    /// Tombstones consulted by late-arriving callbacks.
    removed: HashSet<TxKey>,
}

impl TxStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of resident transactions.
    pub fn size(&self) -> usize {
        self.inner.read().txs.len()
    }

    /// Returns the resident transaction with the given key.
    pub fn get(&self, key: &TxKey) -> Option<Arc<WrappedTx>> {
        self.inner.read().txs.get(key).cloned()
    }

    /// Returns the resident transaction reported by the given sender.
    pub fn get_by_sender(&self, sender: &str) -> Option<Arc<WrappedTx>> {
        let inner = self.inner.read();
        let key = inner.senders.get(sender)?;
        inner.txs.get(key).cloned()
    }

    /// Stable snapshot of all resident transactions.
    pub fn get_all(&self) -> Vec<Arc<WrappedTx>> {
        self.inner.read().txs.values().cloned().collect()
    }

    /// True if a remove was issued for this key and no re-insert followed.
    pub fn is_removed(&self, key: &TxKey) -> bool {
        self.inner.read().removed.contains(key)
    }

    /// Stores a transaction as resident, clearing any tombstone for it.
    pub fn set(&self, wtx: Arc<WrappedTx>) {
        let mut inner = self.inner.write();
        let key = wtx.key();
        inner.removed.remove(&key);
        if !wtx.sender().is_empty() {
            inner.senders.insert(wtx.sender().to_string(), key);
        }
        inner.txs.insert(key, wtx);
    }

    /// Tombstones a transaction and drops it from the resident map.
    ///
    /// Returns true if the transaction was resident; false means a remove
    /// already happened (the caller must not cascade index removal twice).
    pub fn remove(&self, wtx: &WrappedTx) -> bool {
        let mut inner = self.inner.write();
        let key = wtx.key();
        let was_resident = inner.txs.remove(&key).is_some();
        if was_resident && !wtx.sender().is_empty() {
            if inner.senders.get(wtx.sender()) == Some(&key) {
                inner.senders.remove(wtx.sender());
            }
        }
        inner.removed.insert(key);
        was_resident
    }

    /// If a transaction with this key is resident, records that `peer_id`
    /// has sent it.
    ///
    /// Returns `(Some(tx), true)` when the peer was newly recorded,
    /// `(Some(tx), false)` when the peer was already known, and
    /// `(None, false)` when no such transaction is resident.
    pub fn get_or_set_peer(&self, key: &TxKey, peer_id: u16) -> (Option<Arc<WrappedTx>>, bool) {
        match self.get(key) {
            Some(wtx) => {
                let added = wtx.add_peer(peer_id);
                (Some(wtx), added)
            }
            None => (None, false),
        }
    }
}
