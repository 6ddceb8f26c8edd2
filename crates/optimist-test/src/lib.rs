//! Optimist Test Harness - Ledger fuzzing and interleaving simulation
//!
//! This crate provides:
//! - A non-commutative journal state and a log-based reference model
//! - Seeded ledger fuzzing against the reference model
//! - Async interleaving simulation on a paused tokio clock

pub mod journal;
pub mod ledger_fuzzer;
pub mod simulator;

pub use journal::*;
pub use ledger_fuzzer::*;
pub use simulator::*;
