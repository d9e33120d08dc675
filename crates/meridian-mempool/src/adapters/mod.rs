//! Adapters layer for the mempool subsystem.
//!
//! Concrete implementations of the outbound ports.

pub mod app_conn;

pub use app_conn::LocalAppConn;
