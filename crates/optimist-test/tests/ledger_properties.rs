//! Property tests for the optimistic ledger

use optimist_core::{Action, OptimistError, TransactionId};
use optimist_state::{Dispatcher, LedgerConfig, PlainActionPolicy};
use optimist_test::{properties, Journal, JournalOp, ReferenceModel, Status};
use proptest::prelude::*;

#[derive(Clone, Debug)]
enum Command {
    Begin { forget: Option<u8> },
    Close { slot: usize, commit: bool },
    Plain,
}

fn command() -> impl Strategy<Value = Command> {
    prop_oneof![
        4 => proptest::option::weighted(0.2, any::<u8>()).prop_map(|forget| Command::Begin { forget }),
        4 => (any::<usize>(), any::<bool>()).prop_map(|(slot, commit)| Command::Close { slot, commit }),
        1 => Just(Command::Plain),
    ]
}

fn dispatcher(policy: PlainActionPolicy) -> Dispatcher<Journal, JournalOp> {
    Dispatcher::with_config(
        Journal::default(),
        LedgerConfig {
            max_open_transactions: None,
            verify_invariants: true,
            plain_action_policy: policy,
        },
    )
}

/// Drive `commands` through a dispatcher and the model, checking after
/// every dispatch. Returns the dispatcher and model at the end.
fn drive(commands: &[Command]) -> (Dispatcher<Journal, JournalOp>, ReferenceModel) {
    let mut d = dispatcher(PlainActionPolicy::Rebase);
    let mut model = ReferenceModel::default();

    for (step, command) in commands.iter().enumerate() {
        let action = match command {
            Command::Begin { forget } => {
                let id = d.next_transaction_id().unwrap();
                let op = match forget {
                    Some(tag) => JournalOp::Forget { tag: u64::from(*tag) },
                    None => JournalOp::pending(id.get()),
                };
                model.begin(id, op.clone());
                Action::begin(id, op)
            }
            Command::Close { slot, commit } => {
                let open = model.open_transactions();
                if open.is_empty() {
                    continue;
                }
                let id = open[slot % open.len()];
                let op = if *commit {
                    JournalOp::done(id.get())
                } else {
                    JournalOp::failed(id.get())
                };
                assert!(model.close(id, op.clone()));
                if *commit {
                    Action::commit(id, op)
                } else {
                    Action::revert(id, op)
                }
            }
            Command::Plain => {
                let op = JournalOp::done(10_000 + step as u64);
                model.rebase(op.clone());
                Action::plain(op)
            }
        };

        d.dispatch(action).unwrap();

        assert!(properties::snapshot_coupled(&d), "step {step}");
        assert_eq!(d.state(), &model.expected(), "step {step}");
        d.ledger().check_replay(d.store()).unwrap();
        let open = d.ledger().open_transactions();
        assert_eq!(open, model.open_transactions(), "step {step}");
        assert!(properties::arrival_ordered(&open));
    }

    (d, model)
}

fn settle_all(d: &mut Dispatcher<Journal, JournalOp>, model: &mut ReferenceModel) {
    for id in model.open_transactions() {
        model.close(id, JournalOp::done(id.get()));
        d.dispatch(Action::commit(id, JournalOp::done(id.get()))).unwrap();
    }
}

proptest! {
    #[test]
    fn prop_store_matches_model(commands in proptest::collection::vec(command(), 0..120)) {
        drive(&commands);
    }

    #[test]
    fn prop_quiescence_is_stable(commands in proptest::collection::vec(command(), 0..60)) {
        let (mut d, mut model) = drive(&commands);
        settle_all(&mut d, &mut model);

        prop_assert!(properties::quiescent(&d));
        let settled = d.state().clone();
        prop_assert_eq!(&settled, &model.expected());
        prop_assert!(settled.entries.iter().all(|(_, s)| *s != Status::Pending));

        // Reconciling again changes nothing
        if let Some(last) = d.next_transaction_id().unwrap().get().checked_sub(1) {
            let id = TransactionId::new(last);
            let err = d.dispatch(Action::commit(id, JournalOp::done(last))).unwrap_err();
            prop_assert_eq!(err, OptimistError::NoOpenWindow(id));
        }
        prop_assert_eq!(d.state(), &settled);
    }

    #[test]
    fn prop_out_of_order_close(n in 2usize..12, order in any::<u64>(), commit in any::<bool>()) {
        let mut d = dispatcher(PlainActionPolicy::Bypass);
        let ids: Vec<_> = (0..n).map(|_| d.next_transaction_id().unwrap()).collect();
        for id in &ids {
            d.dispatch(Action::begin(*id, JournalOp::pending(id.get()))).unwrap();
        }

        // Close all but one, newest first
        let skip = (order as usize) % n;
        for id in ids.iter().rev().filter(|id| id.get() as usize != skip) {
            d.dispatch(Action::commit(*id, JournalOp::done(id.get()))).unwrap();
        }
        prop_assert_eq!(d.ledger().open_transactions(), vec![ids[skip]]);
        prop_assert_eq!(d.state().status_of(ids[skip].get()), Some(Status::Pending));
        d.ledger().check_replay(d.store()).unwrap();

        let last = if commit {
            Action::commit(ids[skip], JournalOp::done(ids[skip].get()))
        } else {
            Action::revert(ids[skip], JournalOp::failed(ids[skip].get()))
        };
        d.dispatch(last).unwrap();
        prop_assert!(properties::quiescent(&d));
        prop_assert_eq!(d.state().entries.len(), n);
        let tags: Vec<u64> = d.state().entries.iter().map(|(t, _)| *t).collect();
        prop_assert_eq!(tags, (0..n as u64).collect::<Vec<_>>());
    }

    #[test]
    fn prop_rejections_leave_no_trace(commands in proptest::collection::vec(command(), 1..40), probe in any::<u64>()) {
        let (mut d, _model) = drive(&commands);
        let before = d.state().clone();
        let open = d.ledger().open_transactions();
        let snapshot = d.ledger().snapshot().cloned();

        let unknown = TransactionId::new(u64::MAX - (probe % 1000));
        let result = match open.first() {
            Some(&id) if probe % 2 == 0 => d.dispatch(Action::begin(id, JournalOp::pending(0))),
            _ => d.dispatch(Action::revert(unknown, JournalOp::failed(0))),
        };

        prop_assert!(result.unwrap_err().is_protocol_violation());
        prop_assert_eq!(d.state(), &before);
        prop_assert_eq!(d.ledger().open_transactions(), open);
        prop_assert_eq!(d.ledger().snapshot().cloned(), snapshot);
    }
}

#[test]
fn test_snapshot_queue_coupling_through_scenarios() {
    let commands = [
        Command::Begin { forget: None },
        Command::Begin { forget: None },
        Command::Close { slot: 1, commit: true },
        Command::Plain,
        Command::Close { slot: 0, commit: false },
    ];
    let (d, model) = drive(&commands);
    assert!(model.is_quiescent());
    assert!(properties::quiescent(&d));
    assert_eq!(
        d.state().entries,
        vec![(10_003, Status::Done), (0, Status::Failed), (1, Status::Done)]
    );
}
