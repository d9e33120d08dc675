//! Gossip index: resident transactions in arrival order.
//!
//! A thread-safe intrusive doubly-linked list. The peer-to-peer layer
//! iterates it front-to-back to gossip transactions FIFO, and the recheck
//! driver uses it as its response cursor.
//!
//! Removal unlinks a node but deliberately leaves its forward pointer
//! intact (the "detach-prev" step): a cursor parked on a removed node can
//! still advance past it. Nodes are reclaimed by reference count once the
//! list and every cursor have dropped them.

use crate::domain::entities::WrappedTx;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::watch;

/// A node in the gossip list.
#[derive(Debug)]
pub struct GossipNode {
    value: Arc<WrappedTx>,
    links: Mutex<NodeLinks>,
}

#[derive(Debug)]
struct NodeLinks {
    prev: Option<Weak<GossipNode>>,
    next: Option<Arc<GossipNode>>,
    removed: bool,
}

impl GossipNode {
    /// The transaction this node carries.
    pub fn value(&self) -> &Arc<WrappedTx> {
        &self.value
    }

    /// The following node, if any. Valid on removed nodes too, so cursors
    /// can advance past a concurrent removal.
    pub fn next(&self) -> Option<Arc<GossipNode>> {
        self.links.lock().next.clone()
    }

    /// True if this node has been unlinked from the list.
    pub fn is_removed(&self) -> bool {
        self.links.lock().removed
    }
}

/// Thread-safe FIFO list of resident transactions.
///
/// Structural mutations serialize on the list lock; readers only touch
/// per-node locks and never block behind the mempool lock.
#[derive(Debug)]
pub struct GossipList {
    inner: Mutex<ListInner>,
    generation: watch::Sender<u64>,
    len: AtomicUsize,
}

#[derive(Debug, Default)]
struct ListInner {
    head: Option<Arc<GossipNode>>,
    tail: Option<Arc<GossipNode>>,
}

impl Default for GossipList {
    fn default() -> Self {
        Self::new()
    }
}

impl GossipList {
    /// Creates an empty list.
    pub fn new() -> Self {
        let (generation, _) = watch::channel(0);
        Self {
            inner: Mutex::new(ListInner::default()),
            generation,
            len: AtomicUsize::new(0),
        }
    }

    /// Number of linked nodes.
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    /// True if no nodes are linked.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Appends a transaction and wakes every waiter.
    pub fn push_back(&self, wtx: Arc<WrappedTx>) -> Arc<GossipNode> {
        let node = Arc::new(GossipNode {
            value: wtx,
            links: Mutex::new(NodeLinks {
                prev: None,
                next: None,
                removed: false,
            }),
        });

        {
            let mut inner = self.inner.lock();
            match inner.tail.take() {
                Some(tail) => {
                    tail.links.lock().next = Some(Arc::clone(&node));
                    node.links.lock().prev = Some(Arc::downgrade(&tail));
                    inner.tail = Some(Arc::clone(&node));
                }
                None => {
                    inner.head = Some(Arc::clone(&node));
                    inner.tail = Some(Arc::clone(&node));
                }
            }
            self.len.fetch_add(1, Ordering::AcqRel);
        }

        self.generation.send_modify(|g| *g = g.wrapping_add(1));
        node
    }

    /// Unlinks a node. O(1). No-op if already removed.
    ///
    /// The node keeps its forward pointer (detach-prev semantics) so any
    /// cursor parked on it can still advance.
    pub fn remove(&self, node: &Arc<GossipNode>) {
        let mut inner = self.inner.lock();

        let (prev, next) = {
            let mut links = node.links.lock();
            if links.removed {
                return;
            }
            links.removed = true;
            // Drop the back pointer, keep the forward pointer.
            let prev = links.prev.take().and_then(|w| w.upgrade());
            (prev, links.next.clone())
        };

        match &prev {
            Some(prev) => prev.links.lock().next = next.clone(),
            None => inner.head = next.clone(),
        }
        match &next {
            Some(next) => next.links.lock().prev = prev.as_ref().map(Arc::downgrade),
            None => inner.tail = prev,
        }

        self.len.fetch_sub(1, Ordering::AcqRel);
    }

    /// The oldest linked node.
    pub fn front(&self) -> Option<Arc<GossipNode>> {
        self.inner.lock().head.clone()
    }

    /// The newest linked node.
    pub fn back(&self) -> Option<Arc<GossipNode>> {
        self.inner.lock().tail.clone()
    }

    /// A receiver that observes a generation bump on every append.
    ///
    /// Readers wanting the next transaction subscribe, check [`front`]
    /// (or their cursor), and await a change when the list is drained.
    pub fn wait_chan(&self) -> watch::Receiver<u64> {
        self.generation.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_types::Tx;

    fn wtx(payload: &str) -> Arc<WrappedTx> {
        Arc::new(WrappedTx::new(Tx::from(payload), 0))
    }

    fn keys_front_to_back(list: &GossipList) -> Vec<String> {
        let mut out = Vec::new();
        let mut cursor = list.front();
        while let Some(node) = cursor {
            out.push(String::from_utf8(node.value().tx().as_bytes().to_vec()).unwrap());
            cursor = node.next();
        }
        out
    }

    #[test]
    fn test_push_back_preserves_fifo_order() {
        let list = GossipList::new();
        list.push_back(wtx("a"));
        list.push_back(wtx("b"));
        list.push_back(wtx("c"));

        assert_eq!(list.len(), 3);
        assert_eq!(keys_front_to_back(&list), vec!["a", "b", "c"]);
        assert_eq!(
            list.back().unwrap().value().tx().as_bytes(),
            "c".as_bytes()
        );
    }

    #[test]
    fn test_remove_middle_relinks_neighbors() {
        let list = GossipList::new();
        list.push_back(wtx("a"));
        let b = list.push_back(wtx("b"));
        list.push_back(wtx("c"));

        list.remove(&b);
        assert_eq!(list.len(), 2);
        assert_eq!(keys_front_to_back(&list), vec!["a", "c"]);
        assert!(b.is_removed());
    }

    #[test]
    fn test_remove_head_and_tail() {
        let list = GossipList::new();
        let a = list.push_back(wtx("a"));
        list.push_back(wtx("b"));
        let c = list.push_back(wtx("c"));

        list.remove(&a);
        assert_eq!(keys_front_to_back(&list), vec!["b", "c"]);

        list.remove(&c);
        assert_eq!(keys_front_to_back(&list), vec!["b"]);
        assert_eq!(
            list.back().unwrap().value().tx().as_bytes(),
            "b".as_bytes()
        );
    }

    #[test]
    fn test_remove_is_idempotent() {
        let list = GossipList::new();
        let a = list.push_back(wtx("a"));
        list.remove(&a);
        list.remove(&a);
        assert_eq!(list.len(), 0);
        assert!(list.front().is_none());
        assert!(list.back().is_none());
    }

    #[test]
    fn test_removed_node_keeps_forward_pointer() {
        let list = GossipList::new();
        list.push_back(wtx("a"));
        let b = list.push_back(wtx("b"));
        let c = list.push_back(wtx("c"));

        // A cursor parked on `b` must still reach `c` after removal.
        list.remove(&b);
        let next = b.next().unwrap();
        assert!(Arc::ptr_eq(&next, &c));
    }

    #[test]
    fn test_remove_last_empties_list() {
        let list = GossipList::new();
        let a = list.push_back(wtx("a"));
        list.remove(&a);
        assert!(list.is_empty());

        // The list is usable again afterwards.
        list.push_back(wtx("b"));
        assert_eq!(keys_front_to_back(&list), vec!["b"]);
    }

    #[tokio::test]
    async fn test_wait_chan_observes_push() {
        let list = Arc::new(GossipList::new());
        let mut rx = list.wait_chan();

        let waiter = {
            let list = Arc::clone(&list);
            tokio::spawn(async move {
                rx.changed().await.unwrap();
                list.front().is_some()
            })
        };

        // Give the waiter a chance to park.
        tokio::task::yield_now().await;
        list.push_back(wtx("a"));
        assert!(waiter.await.unwrap());
    }
}
