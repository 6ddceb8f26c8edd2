//! Arbitrary BEGIN/COMMIT/REVERT/plain sequences, including misuse.
//!
//! Accepted dispatches must keep the store equal to the reference model;
//! rejected ones must be protocol violations that leave no trace.

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use optimist_core::{Action, TransactionId};
use optimist_state::{Dispatcher, LedgerConfig, PlainActionPolicy};
use optimist_test::{properties, Journal, JournalOp, ReferenceModel};

#[derive(Arbitrary, Debug)]
enum Step {
    Begin { forget: Option<u8> },
    Commit { id: u8 },
    Revert { id: u8 },
    Plain { tag: u16 },
}

#[derive(Arbitrary, Debug)]
struct Input {
    rebase: bool,
    steps: Vec<Step>,
}

fuzz_target!(|input: Input| {
    let policy = if input.rebase {
        PlainActionPolicy::Rebase
    } else {
        PlainActionPolicy::Bypass
    };
    let mut d: Dispatcher<Journal, JournalOp> = Dispatcher::with_config(
        Journal::default(),
        LedgerConfig {
            max_open_transactions: None,
            verify_invariants: true,
            plain_action_policy: policy,
        },
    );
    let mut model = ReferenceModel::default();

    for step in input.steps {
        // Bypassed plain actions inside a window are not modeled
        if let Step::Plain { .. } = step {
            if policy == PlainActionPolicy::Bypass && !model.is_quiescent() {
                continue;
            }
        }

        let (action, expect_ok) = match step {
            Step::Begin { forget } => {
                let id = d.next_transaction_id().unwrap();
                let op = match forget {
                    Some(tag) => JournalOp::Forget { tag: u64::from(tag) },
                    None => JournalOp::pending(id.get()),
                };
                model.begin(id, op.clone());
                (Action::begin(id, op), true)
            }
            Step::Commit { id } | Step::Revert { id } => {
                let id = TransactionId::new(u64::from(id));
                let commit = matches!(step, Step::Commit { .. });
                let op = if commit {
                    JournalOp::done(id.get())
                } else {
                    JournalOp::failed(id.get())
                };
                let expect_ok = model.close(id, op.clone());
                let action = if commit {
                    Action::commit(id, op)
                } else {
                    Action::revert(id, op)
                };
                (action, expect_ok)
            }
            Step::Plain { tag } => {
                let op = JournalOp::done(1_000_000 + u64::from(tag));
                model.rebase(op.clone());
                (Action::plain(op), true)
            }
        };

        let before = d.state().clone();
        match d.dispatch(action) {
            Ok(_) => assert!(expect_ok, "protocol violation accepted"),
            Err(err) => {
                assert!(!expect_ok, "valid action rejected: {err}");
                assert!(err.is_protocol_violation());
                assert_eq!(d.state(), &before);
            }
        }

        assert!(properties::snapshot_coupled(&d));
        assert!(d.ledger().check_invariants().is_empty());
        d.ledger().check_replay(d.store()).unwrap();
        assert_eq!(d.state(), &model.expected());
        assert_eq!(d.ledger().open_transactions(), model.open_transactions());
    }
});
