//! Optimist Core - Fundamental types and primitives
//!
//! This crate defines the core types shared by the optimistic state engine:
//! - Transaction identifiers and their generator
//! - Actions and optimistic metadata (BEGIN / COMMIT / REVERT)
//! - Error taxonomy
//! - Ledger invariants

pub mod id;
pub mod action;
pub mod error;
pub mod invariants;

pub use id::*;
pub use action::*;
pub use error::*;
pub use invariants::*;
