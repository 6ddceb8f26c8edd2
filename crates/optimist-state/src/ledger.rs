//! Optimistic ledger - snapshot capture and replay on close
//!
//! The ledger owns the snapshot of the canonical state taken when the first
//! speculative transaction of a window opens, and the ordered queue of BEGIN
//! actions whose transactions are still open. Every COMMIT or REVERT rolls
//! the store back to the snapshot and replays the queue, substituting the
//! closing transaction's final mutation for its stale BEGIN.
//!
//! A transaction that closes while an earlier one is still open keeps its
//! slot in the queue, now holding the final mutation. Settled entries at the
//! head of the queue are folded into the snapshot, so the store always
//! equals the snapshot with the queue replayed.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use optimist_core::{
    check_all_invariants, Action, InvariantViolation, LedgerInvariant, OptimistError,
    OptimistResult, Phase, TransactionId,
};

use crate::{Mutation, StateStore};

/// What the dispatcher does with a plain action while a window is open
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlainActionPolicy {
    /// Apply to the store only. The next close restores the snapshot and
    /// the plain mutation is lost.
    #[default]
    Bypass,
    /// Fold into the snapshot and replay, so the plain mutation is ordered
    /// before every open transaction and survives later closes.
    Rebase,
}

/// Ledger configuration
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Maximum queued transactions (`None` = unbounded)
    pub max_open_transactions: Option<usize>,
    /// Check ledger bookkeeping after every handled action
    pub verify_invariants: bool,
    pub plain_action_policy: PlainActionPolicy,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        LedgerConfig {
            max_open_transactions: None,
            verify_invariants: cfg!(debug_assertions),
            plain_action_policy: PlainActionPolicy::Bypass,
        }
    }
}

impl LedgerConfig {
    /// Bounded queue, invariants checked on every action
    pub fn strict() -> Self {
        LedgerConfig {
            max_open_transactions: Some(256),
            verify_invariants: true,
            plain_action_policy: PlainActionPolicy::Bypass,
        }
    }

    /// Unbounded, no verification, plain actions rebased
    pub fn relaxed() -> Self {
        LedgerConfig {
            max_open_transactions: None,
            verify_invariants: false,
            plain_action_policy: PlainActionPolicy::Rebase,
        }
    }
}

/// A queued optimistic transaction.
///
/// While open, `mutation` is the speculative BEGIN mutation. Once closed it
/// holds the final COMMIT/REVERT mutation and `settled` is set; the entry
/// stays queued until every transaction ahead of it has settled too, then it
/// is folded into the snapshot.
#[derive(Clone, Debug, PartialEq)]
pub struct PendingAction<M> {
    pub id: TransactionId,
    pub mutation: M,
    /// Arrival sequence number, strictly increasing along the queue
    pub arrival: u64,
    pub settled: bool,
}

/// Result of handling one optimistic action
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LedgerOutcome {
    Opened {
        id: TransactionId,
        /// A snapshot was captured for this BEGIN
        window_opened: bool,
    },
    Closed {
        id: TransactionId,
        phase: Phase,
        /// Mutations re-applied during the replay, the final one included
        replayed: usize,
        /// No transaction remains open; snapshot and queue were cleared
        window_closed: bool,
    },
}

/// Ledger counters
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LedgerStats {
    pub opened: u64,
    pub committed: u64,
    pub reverted: u64,
    pub replayed_mutations: u64,
    pub windows_opened: u64,
    pub windows_closed: u64,
    pub rebased: u64,
    pub rejected: u64,
}

/// Optimistic transaction ledger
#[derive(Debug)]
pub struct OptimisticLedger<S, M> {
    /// State before the first open transaction's speculative effect
    snapshot: Option<S>,
    /// Queued transactions in arrival order; the head is always open
    queue: Vec<PendingAction<M>>,
    next_arrival: u64,
    config: LedgerConfig,
    stats: LedgerStats,
}

impl<S, M> OptimisticLedger<S, M>
where
    S: Clone,
    M: Mutation<S>,
{
    pub fn new() -> Self {
        Self::with_config(LedgerConfig::default())
    }

    pub fn with_config(config: LedgerConfig) -> Self {
        OptimisticLedger {
            snapshot: None,
            queue: Vec::new(),
            next_arrival: 0,
            config,
            stats: LedgerStats::default(),
        }
    }

    /// Handle an action carrying optimistic metadata
    pub fn handle(
        &mut self,
        store: &mut StateStore<S>,
        action: Action<M>,
    ) -> OptimistResult<LedgerOutcome> {
        let Some(meta) = action.optimistic else {
            self.stats.rejected += 1;
            return Err(OptimistError::NotOptimistic);
        };

        let result = match meta.phase {
            Phase::Begin => self.begin(store, meta.transaction_id, action.mutation),
            Phase::Commit | Phase::Revert => {
                self.close(store, meta.phase, meta.transaction_id, action.mutation)
            }
        };

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(err) => {
                self.stats.rejected += 1;
                return Err(err);
            }
        };

        if self.config.verify_invariants {
            let violations = self.check_invariants();
            if let Some(first) = violations.first() {
                for violation in &violations {
                    error!(%violation, "ledger invariant broken");
                }
                return Err(OptimistError::Invariant(first.to_string()));
            }
        }

        Ok(outcome)
    }

    fn begin(
        &mut self,
        store: &mut StateStore<S>,
        id: TransactionId,
        mutation: M,
    ) -> OptimistResult<LedgerOutcome> {
        // Settled entries still queued count too: ids are never reused
        if self.queue.iter().any(|p| p.id == id) {
            return Err(OptimistError::DuplicateTransaction(id));
        }
        if let Some(limit) = self.config.max_open_transactions {
            if self.queue.len() >= limit {
                return Err(OptimistError::CapacityExceeded { limit });
            }
        }

        let window_opened = self.snapshot.is_none();
        if window_opened {
            self.snapshot = Some(store.snapshot_state());
            self.stats.windows_opened += 1;
            info!(%id, "speculative window opened");
        }

        store.apply(&mutation);
        self.queue.push(PendingAction {
            id,
            mutation,
            arrival: self.next_arrival,
            settled: false,
        });
        self.next_arrival += 1;
        self.stats.opened += 1;

        debug!(%id, open = self.queue.len(), "transaction opened");
        Ok(LedgerOutcome::Opened { id, window_opened })
    }

    fn close(
        &mut self,
        store: &mut StateStore<S>,
        phase: Phase,
        id: TransactionId,
        final_mutation: M,
    ) -> OptimistResult<LedgerOutcome> {
        // Both checks run before anything is touched
        if self.snapshot.is_none() {
            return Err(OptimistError::NoOpenWindow(id));
        }
        let Some(position) = self.queue.iter().position(|p| p.id == id && !p.settled) else {
            return Err(OptimistError::UnknownTransaction(id));
        };
        let Some(baseline) = self.snapshot.take() else {
            return Err(OptimistError::NoOpenWindow(id));
        };

        let closing = &mut self.queue[position];
        closing.mutation = final_mutation;
        closing.settled = true;

        // Replay from the snapshot. The settled prefix becomes the new
        // snapshot, everything behind the first open entry stays queued.
        store.restore_state(baseline);
        let folded = self.queue.iter().take_while(|p| p.settled).count();
        let mut replayed = 0;
        for pending in self.queue.drain(..folded) {
            store.apply(&pending.mutation);
            replayed += 1;
        }

        let window_closed = self.queue.is_empty();
        if window_closed {
            self.stats.windows_closed += 1;
            info!(%id, "speculative window closed");
        } else {
            self.snapshot = Some(store.snapshot_state());
            for pending in &self.queue {
                store.apply(&pending.mutation);
                replayed += 1;
            }
        }

        match phase {
            Phase::Revert => self.stats.reverted += 1,
            _ => self.stats.committed += 1,
        }
        self.stats.replayed_mutations += replayed as u64;

        debug!(%id, %phase, replayed, folded, queued = self.queue.len(), "transaction closed");
        Ok(LedgerOutcome::Closed {
            id,
            phase,
            replayed,
            window_closed,
        })
    }

    /// Fold a plain mutation into the open window.
    ///
    /// The mutation is applied to the snapshot and the queue is replayed on
    /// top, so it takes effect as if it had arrived before every open
    /// transaction. Without an open window it is applied directly.
    pub fn rebase(&mut self, store: &mut StateStore<S>, mutation: &M) -> usize {
        let Some(snapshot) = self.snapshot.as_mut() else {
            store.apply(mutation);
            return 1;
        };

        mutation.apply(snapshot);
        store.restore_state(snapshot.clone());
        for pending in &self.queue {
            store.apply(&pending.mutation);
        }
        self.stats.rebased += 1;
        self.stats.replayed_mutations += self.queue.len() as u64;

        debug!(kind = mutation.kind(), open = self.queue.len(), "plain mutation rebased");
        self.queue.len() + 1
    }

    /// Check coupling, id uniqueness and arrival order of the queue
    pub fn check_invariants(&self) -> Vec<InvariantViolation> {
        check_all_invariants(|invariant| match invariant {
            LedgerInvariant::SnapshotQueueCoupling => {
                if self.snapshot.is_some() != !self.queue.is_empty() {
                    return Err(format!(
                        "snapshot present: {}, queue length: {}",
                        self.snapshot.is_some(),
                        self.queue.len()
                    ));
                }
                match self.queue.first() {
                    Some(head) if head.settled => {
                        Err(format!("settled {} left at the queue head", head.id))
                    }
                    _ => Ok(()),
                }
            }
            LedgerInvariant::UniqueOpenIds => {
                let mut seen = HashSet::with_capacity(self.queue.len());
                match self.queue.iter().find(|p| !seen.insert(p.id)) {
                    Some(pending) => Err(format!("{} queued twice", pending.id)),
                    None => Ok(()),
                }
            }
            LedgerInvariant::ArrivalOrder => {
                match self
                    .queue
                    .windows(2)
                    .find(|pair| pair[0].arrival >= pair[1].arrival)
                {
                    Some(pair) => Err(format!("{} queued before {}", pair[0].id, pair[1].id)),
                    None => Ok(()),
                }
            }
            // Needs the store; see `check_replay`
            LedgerInvariant::ReplayEquivalence => Ok(()),
        })
    }

    /// Whether `id` is currently open
    pub fn is_open(&self, id: TransactionId) -> bool {
        self.queue.iter().any(|p| p.id == id && !p.settled)
    }

    /// Open transaction ids in arrival order
    pub fn open_transactions(&self) -> Vec<TransactionId> {
        self.queue
            .iter()
            .filter(|p| !p.settled)
            .map(|p| p.id)
            .collect()
    }

    /// Longest-open transaction, if any
    pub fn oldest_open(&self) -> Option<TransactionId> {
        self.queue.iter().find(|p| !p.settled).map(|p| p.id)
    }

    /// Number of open transactions
    pub fn open_count(&self) -> usize {
        self.queue.iter().filter(|p| !p.settled).count()
    }

    pub fn pending(&self) -> &[PendingAction<M>] {
        &self.queue
    }

    pub fn snapshot(&self) -> Option<&S> {
        self.snapshot.as_ref()
    }

    pub fn is_window_open(&self) -> bool {
        self.snapshot.is_some()
    }

    /// Queued entries, settled ones waiting behind an open transaction included
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn stats(&self) -> &LedgerStats {
        &self.stats
    }
}

impl<S, M> OptimisticLedger<S, M>
where
    S: Clone + PartialEq,
    M: Mutation<S>,
{
    /// Check replay equivalence: the store equals the snapshot with the queue replayed.
    ///
    /// With no open window there is nothing to compare against and the
    /// check passes.
    pub fn check_replay(&self, store: &StateStore<S>) -> Result<(), InvariantViolation> {
        let Some(snapshot) = self.snapshot.as_ref() else {
            return Ok(());
        };

        let mut expected = snapshot.clone();
        for pending in &self.queue {
            pending.mutation.apply(&mut expected);
        }

        if &expected == store.state() {
            Ok(())
        } else {
            Err(InvariantViolation::new(
                LedgerInvariant::ReplayEquivalence,
                format!(
                    "store diverged from snapshot + {} queued actions",
                    self.queue.len()
                ),
            ))
        }
    }
}

impl<S, M> Default for OptimisticLedger<S, M>
where
    S: Clone,
    M: Mutation<S>,
{
    fn default() -> Self {
        Self::new()
    }
}
