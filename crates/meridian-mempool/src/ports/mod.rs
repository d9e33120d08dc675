//! Ports layer for the mempool subsystem.
//!
//! Outbound (driven) ports: the application validator connection and the
//! time source. The mempool's own public surface is the concrete
//! [`Mempool`](crate::domain::Mempool) type, consumed in-process by the
//! gossip reactor and the consensus engine.

pub mod outbound;

pub use outbound::*;
