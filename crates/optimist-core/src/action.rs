//! Action definitions
//!
//! An action is a unit of intended state change: a mutation value (whose
//! variant names the transition and whose data is its payload) plus optional
//! optimistic metadata tying it to a transaction.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::TransactionId;

/// Lifecycle phase of an optimistic action
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    /// Opens a transaction; applied speculatively
    Begin,
    /// Closes a transaction whose operation succeeded
    Commit,
    /// Closes a transaction whose operation failed
    Revert,
}

impl Phase {
    /// COMMIT and REVERT share one close algorithm
    #[inline]
    pub fn is_closing(self) -> bool {
        matches!(self, Phase::Commit | Phase::Revert)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Begin => "BEGIN",
            Phase::Commit => "COMMIT",
            Phase::Revert => "REVERT",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Optimistic metadata attached to an action
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OptimisticMeta {
    pub phase: Phase,
    pub transaction_id: TransactionId,
}

impl OptimisticMeta {
    pub fn new(phase: Phase, transaction_id: TransactionId) -> Self {
        OptimisticMeta {
            phase,
            transaction_id,
        }
    }
}

/// A unit of intended state change
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Action<M> {
    /// Transition to apply, with its payload
    pub mutation: M,
    /// Present for actions that take part in an optimistic transaction
    pub optimistic: Option<OptimisticMeta>,
}

impl<M> Action<M> {
    /// Ordinary action with no pending semantics
    pub fn plain(mutation: M) -> Self {
        Action {
            mutation,
            optimistic: None,
        }
    }

    pub fn begin(id: TransactionId, mutation: M) -> Self {
        Self::with_phase(Phase::Begin, id, mutation)
    }

    pub fn commit(id: TransactionId, mutation: M) -> Self {
        Self::with_phase(Phase::Commit, id, mutation)
    }

    pub fn revert(id: TransactionId, mutation: M) -> Self {
        Self::with_phase(Phase::Revert, id, mutation)
    }

    pub fn with_phase(phase: Phase, id: TransactionId, mutation: M) -> Self {
        Action {
            mutation,
            optimistic: Some(OptimisticMeta::new(phase, id)),
        }
    }

    #[inline]
    pub fn is_optimistic(&self) -> bool {
        self.optimistic.is_some()
    }

    #[inline]
    pub fn phase(&self) -> Option<Phase> {
        self.optimistic.map(|meta| meta.phase)
    }

    #[inline]
    pub fn transaction_id(&self) -> Option<TransactionId> {
        self.optimistic.map(|meta| meta.transaction_id)
    }
}
