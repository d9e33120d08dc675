//! # Transaction Mempool - Orchestrator
//!
//! Coordinates the store, the three indexes, the seen-cache, and the
//! application connection into the admission and recheck pipelines.
//!
//! ## Data flow
//!
//! ```text
//! submitter ──check_tx──► cache/store ──dispatch──► application
//!                                                        │
//!            insert / evict / reject  ◄──callback────────┘
//!
//! consensus ──lock().update(height, committed)──► purge + recheck
//! ```
//!
//! ## Lock discipline
//!
//! One reader-writer lock guards the mempool. The read side covers
//! admission (`check_tx`) and `flush`; the write side covers `update` and
//! is represented by [`MempoolWriteGuard`], so "caller must hold the write
//! lock" is enforced by the type system rather than by convention. The
//! indexes carry their own internal synchronization, which is what allows
//! concurrent admissions under the shared read lock.
//!
//! Validator callbacks never take the mempool lock. They run on the
//! connection's driver task, strictly in dispatch order.

use crate::config::MempoolConfig;
use crate::domain::cache::{LruTxCache, NopTxCache, TxCache};
use crate::domain::entities::{TxInfo, WrappedTx};
use crate::domain::errors::MempoolError;
use crate::domain::gossip_index::{GossipList, GossipNode};
use crate::domain::priority_index::TxPriorityQueue;
use crate::domain::store::TxStore;
use crate::metrics::MempoolMetrics;
use crate::ports::{AppConn, RequestCallback, SystemTimeSource, TimeSource};
use meridian_types::{CheckTxRequest, CheckTxResponse, DeliverTxResponse, Tx};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, OnceLock};
use tokio::sync::{watch, Notify, RwLock, RwLockWriteGuard};
use tracing::{debug, error};

/// Filter applied to a transaction before it is dispatched to the
/// application. Rejection fails admission with `PreCheckFailed`.
pub type PreCheckFn = Arc<dyn Fn(&Tx) -> anyhow::Result<()> + Send + Sync>;

/// Filter applied to a transaction together with the application's
/// response. Rejection discards the transaction like a non-OK code.
pub type PostCheckFn = Arc<dyn Fn(&Tx, &CheckTxResponse) -> anyhow::Result<()> + Send + Sync>;

/// State of an in-progress recheck sweep.
///
/// The gossip list doubles as the response cursor: responses must arrive
/// in dispatch order, so each one corresponds to the node under `cursor`.
#[derive(Default)]
struct RecheckState {
    /// Node the next response corresponds to. `None` when idle.
    cursor: Option<Arc<GossipNode>>,
    /// Node at which re-checking stops.
    end: Option<Arc<GossipNode>>,
}

/// Prioritized transaction mempool.
///
/// Thread-safe; construct once via [`Mempool::builder`] and share the
/// returned `Arc` between the gossip reactor, RPC handlers, and the
/// consensus engine.
pub struct Mempool {
    config: MempoolConfig,
    app_conn: Arc<dyn AppConn>,
    metrics: MempoolMetrics,
    time: Arc<dyn TimeSource>,

    /// Last block height processed by `update`.
    height: AtomicI64,

    /// Aggregate payload bytes of resident transactions. Readable without
    /// any lock.
    size_bytes: AtomicI64,

    /// Recently-seen transactions; short-circuits duplicate admissions
    /// before they reach the application.
    cache: Box<dyn TxCache>,

    /// Main storage of resident transactions. The indexes below are built
    /// on top of it.
    tx_store: TxStore,

    /// FIFO index used for gossip and as the recheck cursor.
    gossip_index: GossipList,

    /// Priority index used for eviction and block assembly.
    priority_index: TxPriorityQueue,

    recheck: Mutex<RecheckState>,

    /// Primary reader-writer lock; see the module docs.
    mtx: RwLock<()>,

    pre_check: Mutex<Option<PreCheckFn>>,
    post_check: Mutex<Option<PostCheckFn>>,

    /// Allocated iff availability signaling was enabled at startup.
    txs_available: OnceLock<Notify>,
    notified_txs_available: AtomicBool,
}

/// Builder for [`Mempool`].
pub struct MempoolBuilder {
    config: MempoolConfig,
    app_conn: Arc<dyn AppConn>,
    height: i64,
    metrics: MempoolMetrics,
    time: Arc<dyn TimeSource>,
    pre_check: Option<PreCheckFn>,
    post_check: Option<PostCheckFn>,
}

impl MempoolBuilder {
    /// Sets the pre-check filter. Applies until `update` replaces it.
    pub fn with_pre_check(mut self, f: PreCheckFn) -> Self {
        self.pre_check = Some(f);
        self
    }

    /// Sets the post-check filter. Applies until `update` replaces it.
    pub fn with_post_check(mut self, f: PostCheckFn) -> Self {
        self.post_check = Some(f);
        self
    }

    /// Sets the metrics sink.
    pub fn with_metrics(mut self, metrics: MempoolMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    /// Sets the time source.
    pub fn with_time_source(mut self, time: Arc<dyn TimeSource>) -> Self {
        self.time = time;
        self
    }

    /// Sets the starting block height.
    pub fn with_height(mut self, height: i64) -> Self {
        self.height = height;
        self
    }

    /// Builds the mempool and registers its global response callback on
    /// the application connection.
    pub fn build(self) -> Arc<Mempool> {
        let cache: Box<dyn TxCache> = if self.config.cache_size > 0 {
            Box::new(LruTxCache::new(self.config.cache_size))
        } else {
            Box::new(NopTxCache)
        };

        let mempool = Arc::new(Mempool {
            config: self.config,
            app_conn: self.app_conn,
            metrics: self.metrics,
            time: self.time,
            height: AtomicI64::new(self.height),
            size_bytes: AtomicI64::new(0),
            cache,
            tx_store: TxStore::new(),
            gossip_index: GossipList::new(),
            priority_index: TxPriorityQueue::new(),
            recheck: Mutex::new(RecheckState::default()),
            mtx: RwLock::new(()),
            pre_check: Mutex::new(self.pre_check),
            post_check: Mutex::new(self.post_check),
            txs_available: OnceLock::new(),
            notified_txs_available: AtomicBool::new(false),
        });

        let weak = Arc::downgrade(&mempool);
        mempool
            .app_conn
            .set_response_callback(Box::new(move |req, res| {
                if let Some(mempool) = weak.upgrade() {
                    mempool.default_tx_callback(req, res);
                }
            }));

        mempool
    }
}

impl Mempool {
    /// Starts building a mempool over the given application connection.
    pub fn builder(config: MempoolConfig, app_conn: Arc<dyn AppConn>) -> MempoolBuilder {
        MempoolBuilder {
            config,
            app_conn,
            height: 0,
            metrics: MempoolMetrics::unregistered(),
            time: Arc::new(SystemTimeSource),
            pre_check: None,
            post_check: None,
        }
    }

    /// Creates a mempool with default collaborators.
    pub fn new(config: MempoolConfig, app_conn: Arc<dyn AppConn>) -> Arc<Self> {
        Self::builder(config, app_conn).build()
    }

    /// Number of resident transactions. Thread-safe; derived from the
    /// gossip index.
    pub fn size(&self) -> usize {
        self.gossip_index.len()
    }

    /// Aggregate payload bytes of resident transactions. Thread-safe.
    pub fn size_bytes(&self) -> i64 {
        self.size_bytes.load(Ordering::Acquire)
    }

    /// Last block height processed by `update`.
    pub fn height(&self) -> i64 {
        self.height.load(Ordering::Acquire)
    }

    /// Acquires the write lock, returning a guard exposing the operations
    /// that require it. The consensus engine brackets its
    /// reap → flush → update critical section with one guard.
    pub async fn lock(&self) -> MempoolWriteGuard<'_> {
        MempoolWriteGuard {
            mempool: self,
            _guard: self.mtx.write().await,
        }
    }

    /// A receiver signalled whenever a transaction becomes available to
    /// gossip. Thread-safe.
    pub fn wait_for_next_tx(&self) -> watch::Receiver<u64> {
        self.gossip_index.wait_chan()
    }

    /// The next transaction to gossip, in FIFO order. Callers should wait
    /// on [`wait_for_next_tx`](Self::wait_for_next_tx) first. Thread-safe.
    pub fn next_gossip_tx(&self) -> Option<Arc<WrappedTx>> {
        self.gossip_index.front().map(|node| Arc::clone(node.value()))
    }

    /// Enables the per-height availability signal.
    ///
    /// Call once on startup, before transactions flow.
    pub fn enable_txs_available(&self) {
        let _ = self.txs_available.set(Notify::new());
    }

    /// The availability signal: fires at most once per height, and only
    /// when the mempool is non-empty. `None` unless
    /// [`enable_txs_available`](Self::enable_txs_available) was called.
    pub fn txs_available(&self) -> Option<&Notify> {
        self.txs_available.get()
    }

    /// Submits a transaction for admission.
    ///
    /// Acquires the read lock and dispatches to the application without
    /// waiting for the verdict; the insert-or-reject decision happens in
    /// the response callback. `on_done`, when given, runs after that
    /// decision with the application's response.
    ///
    /// Errors surface only for conditions knowable before dispatch:
    ///
    /// - the payload exceeds `max_tx_bytes`,
    /// - the pre-check filter rejects,
    /// - the application connection is unhealthy or its buffer is full,
    /// - the transaction is already known and `tx_info.sender_id` already
    ///   re-sent it.
    ///
    /// A full mempool is NOT an error here: the transaction is still
    /// evaluated, and admission may evict a lower-priority resident.
    pub async fn check_tx(
        self: &Arc<Self>,
        tx: Tx,
        on_done: Option<RequestCallback>,
        tx_info: TxInfo,
    ) -> Result<(), MempoolError> {
        let _guard = self.mtx.read().await;

        let tx_size = tx.len();
        if tx_size > self.config.max_tx_bytes {
            return Err(MempoolError::TxTooLarge {
                max: self.config.max_tx_bytes,
                actual: tx_size,
            });
        }

        if let Some(err) = self.run_pre_check(&tx) {
            return Err(MempoolError::PreCheckFailed {
                reason: err.to_string(),
            });
        }

        self.app_conn.error()?;

        // A false push means the transaction is already in the cache. If
        // it is also resident, a peer re-sending it points at an
        // anti-entropy bug upstream: the first re-send from each peer
        // errors, later ones are dropped silently.
        if !self.cache.push(&tx) {
            let (wtx, added) = self.tx_store.get_or_set_peer(&tx.key(), tx_info.sender_id);
            if wtx.is_some() && added {
                return Err(MempoolError::TxInCache);
            }
            debug!(tx = %tx.key(), "transaction exists already in cache");
            return Ok(());
        }

        let reqres = match self.app_conn.check_tx_async(CheckTxRequest::new(tx.clone())) {
            Ok(reqres) => reqres,
            Err(err) => {
                // We never got a verdict; forget the hash so a future
                // submission is evaluated.
                self.cache.remove(&tx);
                return Err(err.into());
            }
        };

        let mempool = Arc::clone(self);
        reqres.set_callback(Box::new(move |res| {
            assert!(
                mempool.recheck.lock().cursor.is_none(),
                "recheck cursor is active during an admission callback"
            );

            let wtx = WrappedTx::new(tx, mempool.time.now());
            mempool.init_tx_callback(wtx, res, &tx_info);

            if let Some(on_done) = on_done {
                on_done(res);
            }
        }));

        Ok(())
    }

    /// Empties the mempool and resets the cache.
    ///
    /// May leave in-flight admissions to land in an empty pool; intended
    /// for operator use.
    pub async fn flush(&self) {
        let _guard = self.mtx.read().await;

        for wtx in self.tx_store.get_all() {
            if self.tx_store.remove(&wtx) {
                self.priority_index.remove(&wtx);
                if let Some(node) = wtx.gossip_node() {
                    self.gossip_index.remove(&node);
                }
            }
        }

        self.size_bytes.store(0, Ordering::Release);
        self.cache.reset();
    }

    /// First callback for a never-before-admitted transaction, after the
    /// application has evaluated it.
    ///
    /// On an OK code (and a passing post-check) the transaction is
    /// inserted, evicting strictly-lower-priority residents if capacity
    /// demands and such residents exist; otherwise it is discarded and the
    /// outcome recorded in metrics. Runs without the mempool lock.
    fn init_tx_callback(&self, mut wtx: WrappedTx, res: &CheckTxResponse, tx_info: &TxInfo) {
        let post_check_err = self.run_post_check(wtx.tx(), res);

        if res.is_ok() && post_check_err.is_none() {
            // The application reports at most one resident transaction per
            // non-empty sender identity.
            if !res.sender.is_empty() {
                if let Some(existing) = self.tx_store.get_by_sender(&res.sender) {
                    debug!(
                        sender = %res.sender,
                        tx = %wtx.key(),
                        existing = %existing.key(),
                        "received duplicate transaction from the same sender"
                    );
                    return;
                }
            }

            while let Err(err) = self.can_add(&wtx) {
                let Some(victim) = self.priority_index.get_evictable(res.priority) else {
                    // No lower-priority resident to make room; drop the
                    // newcomer and forget it so it can be resubmitted.
                    self.cache.remove(wtx.tx());
                    error!(tx = %wtx.key(), %err, "rejected valid transaction; mempool full");
                    self.metrics.rejected_txs.inc();
                    return;
                };

                self.remove_tx(&victim, true);
                debug!(
                    old_tx = %victim.key(),
                    new_tx = %wtx.key(),
                    "evicted lower-priority transaction; mempool full"
                );
                self.metrics.evicted_txs.inc();
            }

            wtx.set_priority(res.priority);
            wtx.set_sender(res.sender.clone());
            wtx.set_gas_wanted(res.gas_wanted);

            self.metrics.tx_size_bytes.observe(wtx.size() as f64);
            let key = wtx.key();
            self.insert_tx(wtx);
            debug!(
                tx = %key,
                height = self.height(),
                num_txs = self.size(),
                "inserted valid transaction"
            );
            self.metrics.size.set(self.size() as i64);
            self.metrics.size_bytes.set(self.size_bytes());
            self.notify_txs_available();
        } else {
            debug!(
                tx = %wtx.key(),
                peer = ?tx_info.sender_node_id,
                code = res.code,
                post_check_err = ?post_check_err.map(|e| e.to_string()),
                "rejected invalid transaction"
            );
            self.metrics.failed_txs.inc();

            if !self.config.keep_invalid_txs_in_cache {
                self.cache.remove(wtx.tx());
            }
        }
    }

    /// Global response callback; handles recheck responses only.
    ///
    /// Responses must arrive in dispatch order: each one is matched
    /// against the transaction under the recheck cursor, and a payload
    /// mismatch means the validator broke the ordering contract.
    fn default_tx_callback(&self, req: &CheckTxRequest, res: &CheckTxResponse) {
        let cursor = {
            let recheck = self.recheck.lock();
            match &recheck.cursor {
                Some(cursor) => Arc::clone(cursor),
                None => return,
            }
        };

        self.metrics.recheck_times.inc();

        let wtx = Arc::clone(cursor.value());
        if req.tx != *wtx.tx() {
            panic!(
                "recheck transaction mismatch: got {}, expected {}",
                req.tx.key(),
                wtx.key()
            );
        }

        // Skip evaluation if the cursor's transaction was removed while
        // this response was in flight; the cursor still advances so the
        // remaining responses stay aligned.
        if !self.tx_store.is_removed(&wtx.key()) {
            let post_check_err = self.run_post_check(&req.tx, res);

            if res.is_ok() && post_check_err.is_none() {
                // The heap is intentionally not re-sifted; the entry keeps
                // its position until removed.
                wtx.set_priority(res.priority);
            } else {
                debug!(
                    tx = %wtx.key(),
                    code = res.code,
                    post_check_err = ?post_check_err.map(|e| e.to_string()),
                    "resident transaction no longer valid; removing"
                );

                let handle_matches = wtx
                    .gossip_node()
                    .map(|node| Arc::ptr_eq(&node, &cursor))
                    .unwrap_or(false);
                if !handle_matches {
                    panic!("corrupted recheck cursor");
                }

                self.remove_tx(&wtx, !self.config.keep_invalid_txs_in_cache);
            }
        }

        let finished = {
            let mut recheck = self.recheck.lock();
            let at_end = match &recheck.end {
                Some(end) => Arc::ptr_eq(&cursor, end),
                None => true,
            };
            if at_end {
                recheck.cursor = None;
                recheck.end = None;
                true
            } else {
                recheck.cursor = cursor.next();
                recheck.cursor.is_none()
            }
        };

        if finished {
            debug!("finished rechecking transactions");
            if self.size() > 0 {
                self.notify_txs_available();
            }
        }

        self.metrics.size.set(self.size() as i64);
        self.metrics.size_bytes.set(self.size_bytes());
    }

    /// Dispatches a recheck for every resident transaction, front to back.
    ///
    /// Write lock required (guaranteed by the caller, `MempoolWriteGuard`).
    fn update_recheck_txs(&self) {
        assert!(
            self.size() > 0,
            "attempted to recheck transactions on an empty mempool"
        );

        {
            let mut recheck = self.recheck.lock();
            recheck.cursor = self.gossip_index.front();
            recheck.end = self.gossip_index.back();
        }

        let mut next = self.gossip_index.front();
        while let Some(node) = next {
            let wtx = node.value();
            if !self.tx_store.is_removed(&wtx.key()) {
                if let Err(err) = self
                    .app_conn
                    .check_tx_async(CheckTxRequest::recheck(wtx.tx().clone()))
                {
                    // No retry; the transaction is rechecked again after
                    // the next block.
                    error!(tx = %wtx.key(), %err, "failed to dispatch recheck");
                }
            }
            next = node.next();
        }

        if let Err(err) = self.app_conn.flush_async() {
            error!(%err, "failed to flush application connection during recheck");
        }
    }

    /// Runs the configured pre-check filter, returning its rejection.
    fn run_pre_check(&self, tx: &Tx) -> Option<anyhow::Error> {
        let pre_check = self.pre_check.lock().clone();
        pre_check.and_then(|f| (*f)(tx).err())
    }

    /// Runs the configured post-check filter, returning its rejection.
    fn run_post_check(&self, tx: &Tx, res: &CheckTxResponse) -> Option<anyhow::Error> {
        let post_check = self.post_check.lock().clone();
        post_check.and_then(|f| (*f)(tx, res).err())
    }

    /// Checks configured capacity limits for an incoming transaction.
    fn can_add(&self, wtx: &WrappedTx) -> Result<(), MempoolError> {
        let num_txs = self.size();
        let size_bytes = self.size_bytes();

        if num_txs >= self.config.size
            || wtx.size() as i64 + size_bytes > self.config.max_txs_bytes
        {
            return Err(MempoolError::MempoolFull {
                num_txs,
                max_txs: self.config.size,
                txs_bytes: size_bytes,
                max_txs_bytes: self.config.max_txs_bytes,
            });
        }

        Ok(())
    }

    /// Makes a transaction fully present: store, priority index, gossip
    /// index, byte accounting.
    fn insert_tx(&self, wtx: WrappedTx) {
        let size = wtx.size() as i64;
        let wtx = Arc::new(wtx);

        let node = self.gossip_index.push_back(Arc::clone(&wtx));
        wtx.bind_gossip_handle(&node);

        self.tx_store.set(Arc::clone(&wtx));
        self.priority_index.push(wtx);

        self.size_bytes.fetch_add(size, Ordering::AcqRel);
    }

    /// Makes a transaction fully absent. No-op if a remove already
    /// happened (the store's tombstone arbitrates concurrent removals).
    fn remove_tx(&self, wtx: &Arc<WrappedTx>, remove_from_cache: bool) {
        if !self.tx_store.remove(wtx) {
            return;
        }

        self.priority_index.remove(wtx);
        if let Some(node) = wtx.gossip_node() {
            // Unlink; the node keeps its forward pointer for any cursor
            // still parked on it.
            self.gossip_index.remove(&node);
        }

        self.size_bytes.fetch_sub(wtx.size() as i64, Ordering::AcqRel);

        if remove_from_cache {
            self.cache.remove(wtx.tx());
        }
    }

    /// Fires the availability signal, at most once per height.
    fn notify_txs_available(&self) {
        assert!(
            self.size() > 0,
            "attempted to notify txs available on an empty mempool"
        );

        if let Some(notify) = self.txs_available.get() {
            if !self.notified_txs_available.swap(true, Ordering::AcqRel) {
                notify.notify_one();
            }
        }
    }
}

impl std::fmt::Debug for Mempool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mempool")
            .field("height", &self.height())
            .field("size", &self.size())
            .field("size_bytes", &self.size_bytes())
            .finish()
    }
}

/// Write-side view of the mempool.
///
/// Holding this guard is holding the mempool's write lock: admissions and
/// flushes are excluded until it drops. The consensus engine takes one
/// guard around its whole propose/commit critical section.
pub struct MempoolWriteGuard<'a> {
    mempool: &'a Mempool,
    _guard: RwLockWriteGuard<'a, ()>,
}

impl MempoolWriteGuard<'_> {
    /// Applies a committed block.
    ///
    /// Purges committed transactions (their hashes stay in the seen-cache
    /// so peers re-gossiping them are short-circuited; committed-but-
    /// invalid ones are dropped from the cache unless configured
    /// otherwise), installs replacement filters, and, when residents
    /// remain, either replays them through the application (recheck
    /// enabled) or fires the availability signal directly.
    ///
    /// Call [`flush_app_conn`](Self::flush_app_conn) first so no admission
    /// callbacks are in flight when recheck dispatch begins.
    pub fn update(
        &self,
        block_height: i64,
        committed_txs: &[Tx],
        deliver_responses: &[DeliverTxResponse],
        new_pre_check: Option<PreCheckFn>,
        new_post_check: Option<PostCheckFn>,
    ) {
        let mempool = self.mempool;

        mempool.height.store(block_height, Ordering::Release);
        mempool
            .notified_txs_available
            .store(false, Ordering::Release);

        if let Some(pre_check) = new_pre_check {
            *mempool.pre_check.lock() = Some(pre_check);
        }
        if let Some(post_check) = new_post_check {
            *mempool.post_check.lock() = Some(post_check);
        }

        for (i, tx) in committed_txs.iter().enumerate() {
            mempool.cache.push(tx);

            let delivered_ok = deliver_responses
                .get(i)
                .map(DeliverTxResponse::is_ok)
                .unwrap_or(true);
            if !delivered_ok && !mempool.config.keep_invalid_txs_in_cache {
                // Executed and failed; let a corrected resubmission be
                // evaluated afresh.
                mempool.cache.remove(tx);
            }

            if let Some(wtx) = mempool.tx_store.get(&tx.key()) {
                mempool.remove_tx(&wtx, false);
            }
        }

        mempool.metrics.size.set(mempool.size() as i64);
        mempool.metrics.size_bytes.set(mempool.size_bytes());

        if mempool.size() > 0 {
            if mempool.config.recheck {
                debug!(
                    height = block_height,
                    num_txs = mempool.size(),
                    "rechecking resident transactions"
                );
                mempool.update_recheck_txs();
            } else {
                mempool.notify_txs_available();
            }
        }
    }

    /// Synchronously flushes the application connection, waiting until
    /// every previously dispatched request has been answered.
    pub async fn flush_app_conn(&self) -> Result<(), MempoolError> {
        self.mempool.app_conn.flush_sync().await.map_err(Into::into)
    }

    /// Returns the highest-priority transactions whose cumulative payload
    /// and gas fit the caps. Negative caps are unlimited. Idempotent and
    /// side-effect-free.
    pub fn reap_max_bytes_max_gas(&self, max_bytes: i64, max_gas: i64) -> Vec<Tx> {
        self.mempool
            .priority_index
            .reap_max_bytes_max_gas(max_bytes, max_gas)
            .into_iter()
            .map(|wtx| wtx.tx().clone())
            .collect()
    }

    /// Returns up to `max` transactions in priority order; a negative
    /// `max` returns everything. Idempotent and side-effect-free.
    pub fn reap_max_txs(&self, max: i64) -> Vec<Tx> {
        self.mempool
            .priority_index
            .reap_max_txs(max)
            .into_iter()
            .map(|wtx| wtx.tx().clone())
            .collect()
    }
}
