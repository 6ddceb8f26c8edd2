//! Mutation dispatcher - the single entry point for actions
//!
//! Owns the state store, the ledger and the transaction id generator. Each
//! call to [`Dispatcher::dispatch`] runs to completion before the next one
//! starts, which is what lets the ledger's snapshot/replay run without locks.

use tracing::{debug, warn};

use optimist_core::{Action, IdGenerator, OptimistResult, TransactionId};

use crate::{
    LedgerConfig, LedgerOutcome, Mutation, OptimisticLedger, PlainActionPolicy, StateStore,
};

/// How a dispatched action was handled
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dispatched {
    /// Plain action applied directly to the store
    Applied,
    /// Plain action folded into an open window
    Rebased { replayed: usize },
    /// Optimistic action handled by the ledger
    Ledger(LedgerOutcome),
}

/// Dispatch counters
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub dispatched: u64,
    pub plain: u64,
    pub optimistic: u64,
    pub rejected: u64,
    /// Plain actions applied while a window was open under `Bypass`
    pub bypassed_open_window: u64,
}

/// Mutation dispatcher
#[derive(Debug)]
pub struct Dispatcher<S, M> {
    store: StateStore<S>,
    ledger: OptimisticLedger<S, M>,
    ids: IdGenerator,
    stats: DispatchStats,
}

impl<S, M> Dispatcher<S, M>
where
    S: Clone,
    M: Mutation<S>,
{
    pub fn new(initial: S) -> Self {
        Self::with_config(initial, LedgerConfig::default())
    }

    pub fn with_config(initial: S, config: LedgerConfig) -> Self {
        Dispatcher {
            store: StateStore::new(initial),
            ledger: OptimisticLedger::with_config(config),
            ids: IdGenerator::new(),
            stats: DispatchStats::default(),
        }
    }

    /// Issue a fresh transaction id
    pub fn next_transaction_id(&mut self) -> OptimistResult<TransactionId> {
        self.ids.next()
    }

    /// Dispatch one action and process it fully
    pub fn dispatch(&mut self, action: Action<M>) -> OptimistResult<Dispatched> {
        self.stats.dispatched += 1;
        let kind = action.mutation.kind();

        if let Err(err) = action.mutation.validate(self.store.state()) {
            self.stats.rejected += 1;
            warn!(kind, error = %err, "mutation rejected");
            return Err(err);
        }

        let Some(meta) = action.optimistic else {
            self.stats.plain += 1;
            return Ok(self.dispatch_plain(&action.mutation));
        };

        self.stats.optimistic += 1;
        debug!(kind, phase = %meta.phase, id = %meta.transaction_id, "dispatch");

        match self.ledger.handle(&mut self.store, action) {
            Ok(outcome) => Ok(Dispatched::Ledger(outcome)),
            Err(err) => {
                self.stats.rejected += 1;
                warn!(
                    kind,
                    phase = %meta.phase,
                    id = %meta.transaction_id,
                    error = %err,
                    "optimistic action rejected"
                );
                Err(err)
            }
        }
    }

    fn dispatch_plain(&mut self, mutation: &M) -> Dispatched {
        let kind = mutation.kind();
        if !self.ledger.is_window_open() {
            debug!(kind, "dispatch");
            self.store.apply(mutation);
            return Dispatched::Applied;
        }

        match self.ledger.config().plain_action_policy {
            PlainActionPolicy::Rebase => {
                let replayed = self.ledger.rebase(&mut self.store, mutation);
                Dispatched::Rebased { replayed }
            }
            PlainActionPolicy::Bypass => {
                self.stats.bypassed_open_window += 1;
                warn!(
                    kind,
                    open = self.ledger.open_count(),
                    "plain action applied inside an open window; the next close discards it"
                );
                self.store.apply(mutation);
                Dispatched::Applied
            }
        }
    }

    /// Current canonical state
    pub fn state(&self) -> &S {
        self.store.state()
    }

    pub fn store(&self) -> &StateStore<S> {
        &self.store
    }

    pub fn ledger(&self) -> &OptimisticLedger<S, M> {
        &self.ledger
    }

    pub fn stats(&self) -> &DispatchStats {
        &self.stats
    }

    pub fn into_state(self) -> S {
        self.store.into_inner()
    }
}

impl<S, M> Default for Dispatcher<S, M>
where
    S: Clone + Default,
    M: Mutation<S>,
{
    fn default() -> Self {
        Self::new(S::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use optimist_core::{OptimistError, Phase};

    #[derive(Clone, Debug, PartialEq)]
    struct Item {
        item: &'static str,
        pending: bool,
        error: bool,
    }

    #[derive(Clone, Debug, Default, PartialEq)]
    struct State {
        items: Vec<Item>,
    }

    #[derive(Clone, Debug)]
    struct AddItem(Item);

    impl Mutation<State> for AddItem {
        fn kind(&self) -> &'static str {
            "ADD_ITEM"
        }

        fn apply(&self, state: &mut State) {
            state.items.push(self.0.clone());
        }

        fn validate(&self, _state: &State) -> OptimistResult<()> {
            if self.0.item.is_empty() {
                return Err(OptimistError::InvalidPayload {
                    kind: self.kind(),
                    reason: "item name is empty".into(),
                });
            }
            Ok(())
        }
    }

    fn add(item: &'static str, pending: bool, error: bool) -> AddItem {
        AddItem(Item {
            item,
            pending,
            error,
        })
    }

    fn dispatcher() -> Dispatcher<State, AddItem> {
        Dispatcher::with_config(State::default(), LedgerConfig::strict())
    }

    #[test]
    fn test_scenario_begin_commit() {
        let mut d = dispatcher();
        let id = d.next_transaction_id().unwrap();
        assert_eq!(id, TransactionId::new(0));

        d.dispatch(Action::begin(id, add("x", true, false))).unwrap();
        assert_eq!(d.state().items, vec![add("x", true, false).0]);

        d.dispatch(Action::commit(id, add("x", false, false))).unwrap();
        assert_eq!(d.state().items, vec![add("x", false, false).0]);
    }

    #[test]
    fn test_scenario_revert_one_of_two() {
        let mut d = dispatcher();
        let a = d.next_transaction_id().unwrap();
        let b = d.next_transaction_id().unwrap();

        d.dispatch(Action::begin(a, add("a", true, false))).unwrap();
        d.dispatch(Action::begin(b, add("b", true, false))).unwrap();
        assert!(d.state().items.iter().all(|i| i.pending));

        d.dispatch(Action::revert(a, add("a", false, true))).unwrap();
        assert_eq!(
            d.state().items,
            vec![add("a", false, true).0, add("b", true, false).0]
        );
        assert_eq!(d.ledger().open_transactions(), vec![b]);
        assert!(d.ledger().snapshot().is_some());
    }

    #[test]
    fn test_scenario_double_commit_rejected() {
        let mut d = dispatcher();
        let id = d.next_transaction_id().unwrap();

        d.dispatch(Action::begin(id, add("x", true, false))).unwrap();
        d.dispatch(Action::commit(id, add("x", false, false))).unwrap();
        assert!(d.ledger().is_empty());
        assert!(d.ledger().snapshot().is_none());

        let err = d
            .dispatch(Action::commit(id, add("x", false, false)))
            .unwrap_err();
        assert!(err.is_protocol_violation());
        assert_eq!(d.state().items.len(), 1);
        assert_eq!(d.stats().rejected, 1);
    }

    #[test]
    fn test_plain_action_applied_directly() {
        let mut d = dispatcher();
        let outcome = d.dispatch(Action::plain(add("p", false, false))).unwrap();
        assert_eq!(outcome, Dispatched::Applied);
        assert_eq!(d.state().items.len(), 1);
        assert!(d.ledger().snapshot().is_none());
        assert_eq!(d.stats().plain, 1);
    }

    #[test]
    fn test_bypass_plain_action_lost_on_close() {
        let mut d = dispatcher();
        let id = d.next_transaction_id().unwrap();

        d.dispatch(Action::begin(id, add("x", true, false))).unwrap();
        d.dispatch(Action::plain(add("p", false, false))).unwrap();
        assert_eq!(d.state().items.len(), 2);
        assert_eq!(d.stats().bypassed_open_window, 1);

        d.dispatch(Action::commit(id, add("x", false, false))).unwrap();
        assert_eq!(d.state().items, vec![add("x", false, false).0]);
    }

    #[test]
    fn test_rebase_plain_action_kept_on_close() {
        let config = LedgerConfig {
            plain_action_policy: PlainActionPolicy::Rebase,
            ..LedgerConfig::strict()
        };
        let mut d: Dispatcher<State, AddItem> = Dispatcher::with_config(State::default(), config);
        let id = d.next_transaction_id().unwrap();

        d.dispatch(Action::begin(id, add("x", true, false))).unwrap();
        let outcome = d.dispatch(Action::plain(add("p", false, false))).unwrap();
        assert_eq!(outcome, Dispatched::Rebased { replayed: 2 });

        d.dispatch(Action::commit(id, add("x", false, false))).unwrap();
        assert_eq!(
            d.state().items,
            vec![add("p", false, false).0, add("x", false, false).0]
        );
    }

    #[test]
    fn test_invalid_payload_rejected_before_apply() {
        let mut d = dispatcher();
        let id = d.next_transaction_id().unwrap();

        let err = d.dispatch(Action::begin(id, add("", true, false))).unwrap_err();
        assert!(matches!(err, OptimistError::InvalidPayload { .. }));
        assert!(d.state().items.is_empty());
        assert!(d.ledger().snapshot().is_none());
    }

    #[test]
    fn test_ledger_outcome_reported() {
        let mut d = dispatcher();
        let id = d.next_transaction_id().unwrap();
        d.dispatch(Action::begin(id, add("x", true, false))).unwrap();
        let outcome = d
            .dispatch(Action::revert(id, add("x", false, true)))
            .unwrap();
        assert_eq!(
            outcome,
            Dispatched::Ledger(LedgerOutcome::Closed {
                id,
                phase: Phase::Revert,
                replayed: 1,
                window_closed: true,
            })
        );
    }
}
