//! Optimist Runtime - async orchestration around the optimistic state engine
//!
//! This crate provides:
//! - The async operation coordinator (BEGIN, await, COMMIT or REVERT)
//! - Runtime configuration (defaults, presets, environment overrides)
//! - Tracing subscriber setup
//! - A simulated remote API
//! - The items/form application store

pub mod config;
pub mod telemetry;
pub mod coordinator;
pub mod api;
pub mod items;

pub use config::*;
pub use telemetry::*;
pub use coordinator::*;
pub use api::*;
pub use items::*;
