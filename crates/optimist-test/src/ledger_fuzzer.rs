//! Ledger fuzzer - randomized dispatch sequences checked against a model
//!
//! Tests:
//! - Snapshot/queue coupling after every dispatch
//! - Store equals the reference model after every dispatch
//! - Open transactions keep their arrival order
//! - Protocol violations are rejected without side effects
//! - Quiescence: once everything closed, nothing changes

use std::fmt;

use optimist_core::{Action, LedgerInvariant, TransactionId};
use optimist_state::{Dispatcher, LedgerConfig, PlainActionPolicy};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::{Journal, JournalOp, ReferenceModel};

/// Fuzzer configuration
#[derive(Clone, Debug)]
pub struct FuzzerConfig {
    /// Number of transactions to open
    pub transaction_count: usize,
    /// Upper bound of simultaneously open transactions
    pub max_concurrent: usize,
    /// Probability that a close is a COMMIT (0.0 - 1.0)
    pub commit_prob: f64,
    /// Probability of a plain action per step
    pub plain_prob: f64,
    /// Probability of a deliberate protocol violation per step
    pub violation_prob: f64,
    /// Probability that a BEGIN forgets an earlier tag instead of recording
    pub forget_prob: f64,
    pub plain_action_policy: PlainActionPolicy,
    /// Random seed
    pub seed: u64,
}

impl Default for FuzzerConfig {
    fn default() -> Self {
        FuzzerConfig {
            transaction_count: 500,
            max_concurrent: 8,
            commit_prob: 0.7,
            plain_prob: 0.1,
            violation_prob: 0.05,
            forget_prob: 0.1,
            plain_action_policy: PlainActionPolicy::Rebase,
            seed: 42,
        }
    }
}

impl FuzzerConfig {
    /// Light fuzzing for quick tests
    pub fn light() -> Self {
        FuzzerConfig {
            transaction_count: 50,
            max_concurrent: 3,
            commit_prob: 0.8,
            plain_prob: 0.05,
            violation_prob: 0.0,
            forget_prob: 0.0,
            plain_action_policy: PlainActionPolicy::Rebase,
            seed: 42,
        }
    }

    /// Heavy fuzzing for thorough testing
    pub fn heavy() -> Self {
        FuzzerConfig {
            transaction_count: 5000,
            max_concurrent: 32,
            commit_prob: 0.6,
            plain_prob: 0.15,
            violation_prob: 0.05,
            forget_prob: 0.2,
            plain_action_policy: PlainActionPolicy::Rebase,
            seed: 42,
        }
    }

    /// Misuse-heavy scenario
    pub fn adversarial() -> Self {
        FuzzerConfig {
            transaction_count: 2000,
            max_concurrent: 64,
            commit_prob: 0.5,
            plain_prob: 0.2,
            violation_prob: 0.3,
            forget_prob: 0.3,
            plain_action_policy: PlainActionPolicy::Bypass,
            seed: 42,
        }
    }
}

/// What a failed check was about
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Check {
    Invariant(LedgerInvariant),
    /// Store differs from the reference model
    ModelDivergence,
    /// Open transactions differ from the model's, in content or order
    OpenOrder,
    /// A protocol violation was accepted
    ViolationAccepted,
    /// A rejected dispatch changed state or bookkeeping
    RejectionSideEffect,
    /// State changed after quiescence
    Quiescence,
}

/// One failed check
#[derive(Clone, Debug)]
pub struct CheckFailure {
    pub step: usize,
    pub check: Check,
    pub detail: String,
}

impl fmt::Display for CheckFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "step {}: {:?}: {}", self.step, self.check, self.detail)
    }
}

/// Fuzzing result
#[derive(Debug, Default)]
pub struct FuzzReport {
    pub dispatched: usize,
    pub opened: usize,
    pub committed: usize,
    pub reverted: usize,
    pub plain: usize,
    pub violations_injected: usize,
    pub failures: Vec<CheckFailure>,
}

impl FuzzReport {
    pub fn is_valid(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Ledger fuzzer
pub struct LedgerFuzzer {
    config: FuzzerConfig,
    dispatcher: Dispatcher<Journal, JournalOp>,
    model: ReferenceModel,
    rng: StdRng,
    /// Ids that have been opened and closed
    closed: Vec<TransactionId>,
    report: FuzzReport,
    step: usize,
}

impl LedgerFuzzer {
    /// Create a new fuzzer
    pub fn new(config: FuzzerConfig) -> Self {
        let ledger = LedgerConfig {
            max_open_transactions: None,
            verify_invariants: true,
            plain_action_policy: config.plain_action_policy,
        };
        LedgerFuzzer {
            rng: StdRng::seed_from_u64(config.seed),
            dispatcher: Dispatcher::with_config(Journal::default(), ledger),
            model: ReferenceModel::new(Journal::default()),
            config,
            closed: Vec::new(),
            report: FuzzReport::default(),
            step: 0,
        }
    }

    /// Run the fuzzer
    pub fn run(mut self) -> FuzzReport {
        while self.report.opened < self.config.transaction_count {
            self.step += 1;
            let open = self.model.open_transactions().len();

            if self.rng.gen::<f64>() < self.config.violation_prob {
                self.inject_violation();
            } else if self.rng.gen::<f64>() < self.config.plain_prob {
                self.plain();
            } else if open < self.config.max_concurrent && (open == 0 || self.rng.gen_bool(0.5)) {
                self.begin();
            } else {
                self.close_random();
            }
        }

        // Drain in random order
        while !self.model.open_transactions().is_empty() {
            self.step += 1;
            self.close_random();
        }

        self.check_quiescence();
        self.report
    }

    fn begin(&mut self) {
        let id = match self.dispatcher.next_transaction_id() {
            Ok(id) => id,
            Err(err) => return self.fail(Check::ModelDivergence, err.to_string()),
        };

        let op = if self.rng.gen::<f64>() < self.config.forget_prob && id.get() > 0 {
            JournalOp::Forget {
                tag: self.rng.gen_range(0..id.get()),
            }
        } else {
            JournalOp::pending(id.get())
        };

        self.model.begin(id, op.clone());
        self.dispatch(Action::begin(id, op));
        self.report.opened += 1;
    }

    fn close_random(&mut self) {
        let open = self.model.open_transactions();
        if open.is_empty() {
            return;
        }
        let id = open[self.rng.gen_range(0..open.len())];

        let action = if self.rng.gen::<f64>() < self.config.commit_prob {
            self.report.committed += 1;
            Action::commit(id, JournalOp::done(id.get()))
        } else {
            self.report.reverted += 1;
            Action::revert(id, JournalOp::failed(id.get()))
        };

        self.model.close(id, action.mutation.clone());
        self.closed.push(id);
        self.dispatch(action);
    }

    fn plain(&mut self) {
        let window_open = !self.model.is_quiescent();
        // Bypassed mutations vanish on the next close; the model has no
        // notion of that, so only plain actions outside a window are issued.
        if window_open && self.config.plain_action_policy == PlainActionPolicy::Bypass {
            return;
        }

        let op = JournalOp::done(1_000_000 + self.step as u64);
        self.model.rebase(op.clone());
        self.dispatch(Action::plain(op));
        self.report.plain += 1;
    }

    fn inject_violation(&mut self) {
        let open = self.model.open_transactions();
        let action = match self.rng.gen_range(0..4) {
            // BEGIN reusing an open id
            0 if !open.is_empty() => {
                let id = open[self.rng.gen_range(0..open.len())];
                Action::begin(id, JournalOp::pending(id.get()))
            }
            // Close of an id that already closed
            1 if !self.closed.is_empty() => {
                let id = self.closed[self.rng.gen_range(0..self.closed.len())];
                Action::commit(id, JournalOp::done(id.get()))
            }
            // Reserved payload
            2 => {
                let id = TransactionId::new(u64::MAX - 1);
                Action::begin(id, JournalOp::pending(u64::MAX))
            }
            // Close of an id never issued
            _ => {
                let id = TransactionId::new(u64::MAX);
                Action::revert(id, JournalOp::failed(0))
            }
        };
        self.report.violations_injected += 1;

        let state_before = self.dispatcher.state().clone();
        let open_before = self.dispatcher.ledger().open_transactions();
        let snapshot_before = self.dispatcher.ledger().snapshot().cloned();

        self.report.dispatched += 1;
        match self.dispatcher.dispatch(action) {
            Ok(_) => self.fail(Check::ViolationAccepted, "dispatch succeeded".to_string()),
            Err(err) if !err.is_protocol_violation() => {
                self.fail(Check::ViolationAccepted, format!("unexpected error: {err}"))
            }
            Err(_) => {}
        }

        let ledger = self.dispatcher.ledger();
        if self.dispatcher.state() != &state_before
            || ledger.open_transactions() != open_before
            || ledger.snapshot().cloned() != snapshot_before
        {
            self.fail(Check::RejectionSideEffect, "rejected dispatch left a trace".to_string());
        }
    }

    fn dispatch(&mut self, action: Action<JournalOp>) {
        self.report.dispatched += 1;
        if let Err(err) = self.dispatcher.dispatch(action) {
            self.fail(Check::ModelDivergence, format!("dispatch rejected: {err}"));
        }
        self.check_after_dispatch();
    }

    /// Check all properties that must hold between dispatches
    fn check_after_dispatch(&mut self) {
        let ledger = self.dispatcher.ledger();

        let mut failures: Vec<(Check, String)> = ledger
            .check_invariants()
            .into_iter()
            .map(|v| (Check::Invariant(v.invariant), v.context))
            .collect();

        if let Err(v) = ledger.check_replay(self.dispatcher.store()) {
            failures.push((Check::Invariant(v.invariant), v.context));
        }

        if !properties::snapshot_coupled(&self.dispatcher) {
            failures.push((
                Check::Invariant(LedgerInvariant::SnapshotQueueCoupling),
                "snapshot and queue disagree".to_string(),
            ));
        }

        let expected = self.model.expected();
        if self.dispatcher.state() != &expected {
            failures.push((
                Check::ModelDivergence,
                format!(
                    "store has {} entries, model expects {}",
                    self.dispatcher.state().entries.len(),
                    expected.entries.len()
                ),
            ));
        }

        let open = ledger.open_transactions();
        if open != self.model.open_transactions() || !properties::arrival_ordered(&open) {
            failures.push((Check::OpenOrder, format!("ledger reports {open:?}")));
        }

        for (check, detail) in failures {
            self.fail(check, detail);
        }
    }

    fn check_quiescence(&mut self) {
        if !properties::quiescent(&self.dispatcher) {
            self.fail(Check::Quiescence, "window still open after drain".to_string());
            return;
        }

        let before = self.dispatcher.state().clone();
        // Reconciling again is a rejected no-op
        let last_closed = self.closed.last().copied();
        if let Some(id) = last_closed {
            let result = self
                .dispatcher
                .dispatch(Action::commit(id, JournalOp::done(id.get())));
            if result.is_ok() {
                self.fail(Check::Quiescence, format!("{id} closed twice"));
            }
        }
        if self.dispatcher.state() != &before || self.dispatcher.state() != &self.model.expected() {
            self.fail(Check::Quiescence, "state moved after quiescence".to_string());
        }
    }

    fn fail(&mut self, check: Check, detail: String) {
        self.report.failures.push(CheckFailure {
            step: self.step,
            check,
            detail,
        });
    }
}

/// Property helpers shared with the property tests
pub mod properties {
    use super::*;

    /// A snapshot exists exactly while the queue is non-empty
    pub fn snapshot_coupled(dispatcher: &Dispatcher<Journal, JournalOp>) -> bool {
        let ledger = dispatcher.ledger();
        ledger.snapshot().is_some() == !ledger.is_empty()
    }

    /// Ids are issued in increasing order, so arrival order is id order
    pub fn arrival_ordered(open: &[TransactionId]) -> bool {
        open.windows(2).all(|pair| pair[0] < pair[1])
    }

    /// No window open, nothing queued
    pub fn quiescent(dispatcher: &Dispatcher<Journal, JournalOp>) -> bool {
        let ledger = dispatcher.ledger();
        ledger.is_empty() && ledger.snapshot().is_none() && ledger.open_transactions().is_empty()
    }
}
