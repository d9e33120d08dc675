//! # Application Validator Wire Contract
//!
//! Request and response types exchanged with the external application that
//! validates candidate transactions.
//!
//! The mempool sends a [`CheckTxRequest`] for every never-before-seen
//! transaction (`kind = New`) and replays resident transactions after each
//! committed block (`kind = Recheck`). The application answers with a
//! [`CheckTxResponse`] carrying the admission verdict and the opaque
//! priority used for eviction ordering.

use crate::entities::Tx;
use serde::{Deserialize, Serialize};

/// Response code signalling a valid transaction.
pub const CODE_TYPE_OK: u32 = 0;

/// Why a `CheckTx` request is being issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CheckTxKind {
    /// First evaluation of a transaction the mempool has never admitted.
    #[default]
    New,
    /// Re-evaluation of a resident transaction after a block commit.
    Recheck,
}

/// A transaction validation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckTxRequest {
    /// The transaction to evaluate.
    pub tx: Tx,
    /// Whether this is a first-time check or a post-commit recheck.
    pub kind: CheckTxKind,
}

impl CheckTxRequest {
    /// Creates a first-time validation request.
    pub fn new(tx: Tx) -> Self {
        Self {
            tx,
            kind: CheckTxKind::New,
        }
    }

    /// Creates a post-commit revalidation request.
    pub fn recheck(tx: Tx) -> Self {
        Self {
            tx,
            kind: CheckTxKind::Recheck,
        }
    }
}

/// The application's verdict on a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CheckTxResponse {
    /// `CODE_TYPE_OK` accepts the transaction; anything else rejects it.
    pub code: u32,
    /// Opaque priority assigned by the application; higher is preferred.
    pub priority: i64,
    /// Opaque sender identity; may be empty.
    pub sender: String,
    /// Gas the transaction would consume, used when assembling blocks.
    pub gas_wanted: i64,
    /// Human-readable detail, for operators only.
    pub log: String,
}

impl CheckTxResponse {
    /// Returns true if the application accepted the transaction.
    pub fn is_ok(&self) -> bool {
        self.code == CODE_TYPE_OK
    }
}

/// The execution result of a transaction included in a committed block.
///
/// Produced by the consensus engine and handed to the mempool during
/// `update` so committed-but-invalid transactions can be dropped from the
/// seen-cache.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DeliverTxResponse {
    /// `CODE_TYPE_OK` means the transaction executed successfully.
    pub code: u32,
    /// Human-readable detail, for operators only.
    pub log: String,
}

impl DeliverTxResponse {
    /// Returns true if the transaction executed successfully.
    pub fn is_ok(&self) -> bool {
        self.code == CODE_TYPE_OK
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_tx_request_kinds() {
        let tx = Tx::from("payload");
        assert_eq!(CheckTxRequest::new(tx.clone()).kind, CheckTxKind::New);
        assert_eq!(CheckTxRequest::recheck(tx).kind, CheckTxKind::Recheck);
    }

    #[test]
    fn test_response_ok_code() {
        let ok = CheckTxResponse::default();
        assert!(ok.is_ok());

        let rejected = CheckTxResponse {
            code: 1,
            ..Default::default()
        };
        assert!(!rejected.is_ok());
    }
}
