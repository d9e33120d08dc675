//! Mempool error types.

use crate::ports::AppConnError;
use thiserror::Error;

/// Errors surfaced from transaction admission.
///
/// Everything else that can go wrong inside the mempool is resolved
/// locally: callback-path failures remove the transaction and bump a
/// metric, and protocol violations panic.
#[derive(Debug, Error)]
pub enum MempoolError {
    /// Transaction payload exceeds the per-transaction size cap.
    #[error("transaction size {actual} exceeds maximum {max}")]
    TxTooLarge {
        /// Configured per-transaction cap in bytes.
        max: usize,
        /// Actual payload size in bytes.
        actual: usize,
    },

    /// The pre-check filter rejected the transaction.
    #[error("pre-check rejected transaction: {reason}")]
    PreCheckFailed {
        /// The filter's rejection reason.
        reason: String,
    },

    /// The transaction is already known and the same peer re-sent it.
    #[error("transaction already received from this peer")]
    TxInCache,

    /// Capacity limits reached and no lower-priority resident to evict.
    ///
    /// Never returned from `check_tx`; admission is asynchronous, so this
    /// surfaces as a log line and a `rejected_txs` metric increment inside
    /// the validator callback.
    #[error(
        "mempool is full: {num_txs} txs (max {max_txs}), {txs_bytes} bytes (max {max_txs_bytes})"
    )]
    MempoolFull {
        /// Current resident transaction count.
        num_txs: usize,
        /// Configured transaction count cap.
        max_txs: usize,
        /// Current aggregate payload bytes.
        txs_bytes: i64,
        /// Configured aggregate byte cap.
        max_txs_bytes: i64,
    },

    /// The validator connection is unhealthy or the dispatch failed.
    #[error(transparent)]
    AppConn(#[from] AppConnError),
}
