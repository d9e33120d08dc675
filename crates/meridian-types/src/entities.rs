//! # Core Chain Entities
//!
//! Transaction payloads and their identities as exchanged between the
//! mempool, the peer-to-peer layer, and the consensus engine.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// A 32-byte hash.
pub type Hash = [u8; 32];

/// Unique identifier for a node in the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct NodeId(pub [u8; 32]);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.0[..8]))
    }
}

/// The fixed-width digest of a transaction payload.
///
/// A transaction's key is its unique identity everywhere in the mempool:
/// the store, the caches, and the validator exchange are all keyed on it.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TxKey(pub Hash);

impl TxKey {
    /// Returns the raw digest bytes.
    pub fn as_bytes(&self) -> &Hash {
        &self.0
    }
}

impl fmt::Display for TxKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for TxKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxKey({})", hex::encode(&self.0[..8]))
    }
}

/// An opaque transaction payload.
///
/// The mempool never interprets the bytes; only the application validator
/// assigns them meaning (and a priority).
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Tx(pub Vec<u8>);

impl Tx {
    /// Creates a transaction from raw bytes.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Computes the transaction key (SHA-256 of the payload).
    pub fn key(&self) -> TxKey {
        let mut hasher = Sha256::new();
        hasher.update(&self.0);
        TxKey(hasher.finalize().into())
    }

    /// Returns the payload length in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the raw payload bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for Tx {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl From<&[u8]> for Tx {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

impl From<&str> for Tx {
    fn from(s: &str) -> Self {
        Self(s.as_bytes().to_vec())
    }
}

impl fmt::Debug for Tx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tx({} bytes, {})", self.0.len(), self.key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tx_key_is_stable() {
        let a = Tx::from("hello");
        let b = Tx::from("hello");
        assert_eq!(a.key(), b.key());
    }

    #[test]
    fn test_tx_key_differs_per_payload() {
        assert_ne!(Tx::from("a").key(), Tx::from("b").key());
    }

    #[test]
    fn test_tx_len() {
        let tx = Tx::from("abc");
        assert_eq!(tx.len(), 3);
        assert!(!tx.is_empty());
        assert!(Tx::default().is_empty());
    }

    #[test]
    fn test_tx_key_display_is_hex() {
        let key = Tx::from("abc").key();
        let rendered = key.to_string();
        assert_eq!(rendered.len(), 64);
        assert!(rendered.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
