//! State store - the canonical state tree

use optimist_core::OptimistResult;

/// A deterministic state transition.
///
/// The variant of the implementing type names the transition and its data
/// is the payload. The ledger may apply the same mutation more than once
/// (speculatively, then again during replay), so `apply` must depend on
/// nothing but `self` and `state`.
pub trait Mutation<S>: Clone {
    /// Name of the transition, for diagnostics
    fn kind(&self) -> &'static str;

    /// Apply the transition in place
    fn apply(&self, state: &mut S);

    /// Reject a payload before anything is applied.
    ///
    /// A rejected payload is a protocol violation, never a recoverable
    /// condition.
    fn validate(&self, _state: &S) -> OptimistResult<()> {
        Ok(())
    }
}

/// Canonical, exclusively owned state tree
#[derive(Debug, Clone, Default)]
pub struct StateStore<S> {
    state: S,
    /// Total mutations applied, replays included
    applied: u64,
}

impl<S: Clone> StateStore<S> {
    pub fn new(initial: S) -> Self {
        StateStore {
            state: initial,
            applied: 0,
        }
    }

    /// Current canonical state
    pub fn state(&self) -> &S {
        &self.state
    }

    /// Apply a mutation to the canonical state
    pub fn apply<M: Mutation<S>>(&mut self, mutation: &M) {
        mutation.apply(&mut self.state);
        self.applied += 1;
    }

    /// Deep, structurally independent copy of the canonical state
    pub fn snapshot_state(&self) -> S {
        self.state.clone()
    }

    /// Replace the canonical state wholesale
    pub fn restore_state(&mut self, copy: S) {
        self.state = copy;
    }

    pub fn applied(&self) -> u64 {
        self.applied
    }

    pub fn into_inner(self) -> S {
        self.state
    }
}
