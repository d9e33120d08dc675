//! Core domain entities for the mempool.

use crate::domain::gossip_index::GossipNode;
use meridian_types::{NodeId, Tx, TxKey};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, OnceLock, Weak};

/// Timestamp in milliseconds since UNIX epoch.
pub type Timestamp = u64;

/// Metadata accompanying a transaction submission.
#[derive(Debug, Clone, Default)]
pub struct TxInfo {
    /// Internal identifier of the peer that sent the transaction.
    /// Zero for transactions submitted locally (e.g. via RPC).
    pub sender_id: u16,
    /// Network identity of the sending peer, when known. For diagnostics.
    pub sender_node_id: Option<NodeId>,
}

/// A transaction resident in the mempool.
///
/// Created at the first validator callback and immutable afterwards except
/// for `priority` (updated in place during recheck) and `peers` (grows as
/// more peers send us the same transaction). The store exclusively owns
/// every `WrappedTx`; the priority and gossip indexes hold references.
#[derive(Debug)]
pub struct WrappedTx {
    /// The opaque payload.
    tx: Tx,
    /// Precomputed digest of the payload; the transaction's identity.
    key: TxKey,
    /// When the validator response that created this entry arrived.
    /// Tie-breaker in the priority index: earlier wins.
    timestamp: Timestamp,
    /// Validator-assigned priority. Written during the admission callback
    /// and again on recheck; the priority index is not re-sifted on the
    /// latter, so its heap position may go stale.
    priority: AtomicI64,
    /// Validator-reported gas demand, consumed when assembling blocks.
    gas_wanted: i64,
    /// Validator-reported sender identity; may be empty.
    sender: String,
    /// Peers that have sent us this transaction.
    peers: Mutex<HashSet<u16>>,
    /// Back-reference into the gossip list, bound once at insert. Weak so
    /// the node/value references do not form a cycle.
    gossip_handle: OnceLock<Weak<GossipNode>>,
}

impl WrappedTx {
    /// Creates a new wrapped transaction with default priority and sender.
    pub fn new(tx: Tx, timestamp: Timestamp) -> Self {
        let key = tx.key();
        Self {
            tx,
            key,
            timestamp,
            priority: AtomicI64::new(0),
            gas_wanted: 0,
            sender: String::new(),
            peers: Mutex::new(HashSet::new()),
            gossip_handle: OnceLock::new(),
        }
    }

    /// The opaque payload.
    pub fn tx(&self) -> &Tx {
        &self.tx
    }

    /// The transaction's identity.
    pub fn key(&self) -> TxKey {
        self.key
    }

    /// Payload size in bytes.
    pub fn size(&self) -> usize {
        self.tx.len()
    }

    /// Creation timestamp in milliseconds.
    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    /// Current priority.
    pub fn priority(&self) -> i64 {
        self.priority.load(Ordering::Acquire)
    }

    /// Updates the priority in place.
    pub(crate) fn set_priority(&self, priority: i64) {
        self.priority.store(priority, Ordering::Release);
    }

    /// Validator-reported gas demand.
    pub fn gas_wanted(&self) -> i64 {
        self.gas_wanted
    }

    pub(crate) fn set_gas_wanted(&mut self, gas_wanted: i64) {
        self.gas_wanted = gas_wanted;
    }

    /// Validator-reported sender identity.
    pub fn sender(&self) -> &str {
        &self.sender
    }

    pub(crate) fn set_sender(&mut self, sender: String) {
        self.sender = sender;
    }

    /// Records that `peer_id` has sent us this transaction.
    ///
    /// Returns true if the peer was not known before.
    pub(crate) fn add_peer(&self, peer_id: u16) -> bool {
        self.peers.lock().insert(peer_id)
    }

    /// Number of distinct peers that have sent this transaction.
    pub fn peer_count(&self) -> usize {
        self.peers.lock().len()
    }

    /// Binds the gossip-list node owning this transaction. Called exactly
    /// once, when the transaction is inserted.
    pub(crate) fn bind_gossip_handle(&self, node: &Arc<GossipNode>) {
        let _ = self.gossip_handle.set(Arc::downgrade(node));
    }

    /// The gossip-list node owning this transaction, if still alive.
    pub(crate) fn gossip_node(&self) -> Option<Arc<GossipNode>> {
        self.gossip_handle.get().and_then(Weak::upgrade)
    }
}
