//! Ledger Invariants
//!
//! These hold at every quiescent point (no dispatch in progress).
//! A ledger that breaks any of them can no longer guarantee that the
//! visible state matches its own bookkeeping.
//!
//! # The Four Invariants
//!
//! 1. **Snapshot/Queue Coupling** - a snapshot exists iff the queue is non-empty
//! 2. **Unique Open Ids** - each open transaction id appears once in the queue
//! 3. **Arrival Order** - the queue keeps the arrival order of open BEGINs
//! 4. **Replay Equivalence** - visible state equals snapshot + queue replayed in order
//!
//! ```rust
//! use optimist_core::invariants::{assert_invariant, LedgerInvariant};
//!
//! let snapshot: Option<u32> = None;
//! let queue: Vec<u32> = Vec::new();
//! assert_invariant(LedgerInvariant::SnapshotQueueCoupling, "idle ledger", || {
//!     snapshot.is_some() == !queue.is_empty()
//! });
//! ```

use std::fmt;

/// The invariants of the optimistic ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum LedgerInvariant {
    /// The snapshot is present if and only if the queue is non-empty, and
    /// the head of the queue is a transaction that is still open.
    SnapshotQueueCoupling = 1,

    /// Every transaction id in the queue is unique within the queue.
    UniqueOpenIds = 2,

    /// Queue order is the arrival order of still-open BEGIN actions.
    ///
    /// Closing a transaction never reorders the entries around it.
    ArrivalOrder = 3,

    /// The canonical state equals the snapshot (or the prior state when
    /// no window is open) with every queued action re-applied in order.
    ReplayEquivalence = 4,
}

impl LedgerInvariant {
    /// Get the invariant code (e.g., "LEDGER-1")
    pub fn code(&self) -> &'static str {
        match self {
            LedgerInvariant::SnapshotQueueCoupling => "LEDGER-1",
            LedgerInvariant::UniqueOpenIds => "LEDGER-2",
            LedgerInvariant::ArrivalOrder => "LEDGER-3",
            LedgerInvariant::ReplayEquivalence => "LEDGER-4",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            LedgerInvariant::SnapshotQueueCoupling => "Snapshot/Queue Coupling",
            LedgerInvariant::UniqueOpenIds => "Unique Open Ids",
            LedgerInvariant::ArrivalOrder => "Arrival Order",
            LedgerInvariant::ReplayEquivalence => "Replay Equivalence",
        }
    }

    pub fn all() -> &'static [LedgerInvariant] {
        &[
            LedgerInvariant::SnapshotQueueCoupling,
            LedgerInvariant::UniqueOpenIds,
            LedgerInvariant::ArrivalOrder,
            LedgerInvariant::ReplayEquivalence,
        ]
    }
}

impl fmt::Display for LedgerInvariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code(), self.name())
    }
}

/// Invariant violation report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvariantViolation {
    pub invariant: LedgerInvariant,
    pub context: String,
}

impl InvariantViolation {
    pub fn new(invariant: LedgerInvariant, context: impl Into<String>) -> Self {
        InvariantViolation {
            invariant,
            context: context.into(),
        }
    }
}

impl fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Ledger Invariant Violation: {} - {}",
            self.invariant, self.context
        )
    }
}

impl std::error::Error for InvariantViolation {}

/// Assert that an invariant is satisfied, panicking if violated.
///
/// Intended for tests and harnesses; the ledger itself reports violations
/// as errors.
///
/// # Panics
///
/// Panics if the invariant check returns `false`.
#[track_caller]
pub fn assert_invariant<F>(invariant: LedgerInvariant, context: &str, check: F)
where
    F: FnOnce() -> bool,
{
    if !check() {
        panic!(
            "{}",
            InvariantViolation {
                invariant,
                context: context.to_string(),
            }
        );
    }
}

/// Run `checker` for every invariant and collect the violations.
pub fn check_all_invariants<F>(mut checker: F) -> Vec<InvariantViolation>
where
    F: FnMut(LedgerInvariant) -> Result<(), String>,
{
    let mut violations = Vec::new();

    for &invariant in LedgerInvariant::all() {
        if let Err(context) = checker(invariant) {
            violations.push(InvariantViolation { invariant, context });
        }
    }

    violations
}
