//! Optimist State Engine - speculative mutations with snapshot/replay reconciliation
//!
//! This crate implements the optimistic reconciliation engine:
//! - State store (canonical state, in-place mutation, deep snapshots)
//! - Optimistic ledger (snapshot capture, pending queue, replay on close)
//! - Mutation dispatcher (single serialization point for all actions)

pub mod store;
pub mod ledger;
pub mod dispatch;

pub use store::*;
pub use ledger::*;
pub use dispatch::*;
