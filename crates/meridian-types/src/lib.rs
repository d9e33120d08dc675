//! # Meridian Shared Types
//!
//! Core types shared between the mempool subsystem and its collaborators:
//!
//! - **Chain**: [`Tx`], [`TxKey`], [`NodeId`]
//! - **Validator contract**: [`CheckTxRequest`], [`CheckTxResponse`],
//!   [`CheckTxKind`], [`DeliverTxResponse`]
//!
//! The validator contract types describe the request/response exchange
//! between the mempool and the external application that judges candidate
//! transactions. They are wire types only; the connection traits live in
//! the mempool crate.

pub mod app;
pub mod entities;

pub use app::*;
pub use entities::*;
