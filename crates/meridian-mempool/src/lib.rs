//! # Transaction Mempool Subsystem
//!
//! **Status:** Production-Ready
//!
//! ## Purpose
//!
//! Stages candidate transactions between submission and block inclusion.
//! Every transaction is judged by the external application validator
//! through an asynchronous, callback-driven pipeline; admitted
//! transactions are indexed three ways and kept mutually consistent:
//!
//! | Index | Order | Consumer |
//! |-------|-------|----------|
//! | `TxStore` | by hash | lookups, tombstones for late callbacks |
//! | `TxPriorityQueue` | by (priority, arrival) | eviction, block assembly |
//! | `GossipList` | FIFO | peer gossip, recheck cursor |
//!
//! ## Admission
//!
//! `check_tx` consults the seen-cache and the store, then dispatches to
//! the application without waiting. The response callback inserts the
//! transaction (evicting strictly-lower-priority residents when capacity
//! demands) or discards it. A full mempool is therefore never an
//! admission error, only a possible callback outcome.
//!
//! ## Recheck
//!
//! After each committed block, `update` purges committed transactions and
//! replays the survivors through the application in gossip order. The
//! connection delivers responses in dispatch order, and the gossip list
//! doubles as the response cursor.
//!
//! ## Module Structure (Hexagonal Architecture)
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │  adapters/ - in-process application connection               │
//! └──────────────────────────────────────────────────────────────┘
//!                        ↑ implements ↑
//! ┌──────────────────────────────────────────────────────────────┐
//! │  ports/outbound.rs - AppConn, Application, TimeSource        │
//! └──────────────────────────────────────────────────────────────┘
//!                        ↑ uses ↑
//! ┌──────────────────────────────────────────────────────────────┐
//! │  domain/pool.rs           - Mempool orchestrator             │
//! │  domain/store.rs          - hash index + tombstones          │
//! │  domain/priority_index.rs - eviction / reap ordering         │
//! │  domain/gossip_index.rs   - FIFO list + wait channel         │
//! │  domain/cache.rs          - seen-transaction cache           │
//! │  domain/entities.rs       - WrappedTx, TxInfo                │
//! │  domain/errors.rs         - MempoolError                     │
//! └──────────────────────────────────────────────────────────────┘
//! ```

pub mod adapters;
pub mod config;
pub mod domain;
pub mod metrics;
pub mod ports;

pub use adapters::*;
pub use config::MempoolConfig;
pub use domain::*;
pub use metrics::MempoolMetrics;
pub use ports::*;
