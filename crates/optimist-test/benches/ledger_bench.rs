//! Benchmarks for optimistic ledger operations

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use optimist_core::{Action, TransactionId};
use optimist_state::{Dispatcher, LedgerConfig};
use optimist_test::{Journal, JournalOp};

fn dispatcher() -> Dispatcher<Journal, JournalOp> {
    Dispatcher::with_config(
        Journal::default(),
        LedgerConfig {
            max_open_transactions: None,
            verify_invariants: false,
            ..LedgerConfig::default()
        },
    )
}

/// Dispatcher with `open` transactions already begun
fn with_open(open: u64) -> Dispatcher<Journal, JournalOp> {
    let mut d = dispatcher();
    for _ in 0..open {
        let id = d.next_transaction_id().unwrap();
        d.dispatch(Action::begin(id, JournalOp::pending(id.get())))
            .unwrap();
    }
    d
}

fn bench_plain_dispatch(c: &mut Criterion) {
    c.bench_function("plain_dispatch", |b| {
        let mut d = dispatcher();
        let mut tag = 0;
        b.iter(|| {
            tag += 1;
            d.dispatch(black_box(Action::plain(JournalOp::done(tag))))
                .unwrap();
        })
    });
}

fn bench_begin_commit(c: &mut Criterion) {
    c.bench_function("begin_commit", |b| {
        let mut d = dispatcher();
        b.iter(|| {
            let id = d.next_transaction_id().unwrap();
            d.dispatch(Action::begin(id, JournalOp::pending(id.get())))
                .unwrap();
            d.dispatch(Action::commit(id, JournalOp::done(id.get())))
                .unwrap();
        })
    });
}

fn bench_close_with_open_window(c: &mut Criterion) {
    let mut group = c.benchmark_group("close_replay");
    for open in [1u64, 8, 64, 256] {
        group.bench_with_input(BenchmarkId::from_parameter(open), &open, |b, &open| {
            b.iter_batched(
                || with_open(open),
                |mut d| {
                    // Newest first: nothing folds, the whole queue replays
                    let id = TransactionId::new(open - 1);
                    d.dispatch(Action::commit(id, JournalOp::done(id.get())))
                        .unwrap();
                    black_box(d)
                },
                criterion::BatchSize::SmallInput,
            )
        });
    }
    group.finish();
}

fn bench_invariant_check(c: &mut Criterion) {
    let d = with_open(256);
    c.bench_function("check_invariants_256", |b| {
        b.iter(|| black_box(d.ledger().check_invariants()))
    });
    c.bench_function("check_replay_256", |b| {
        b.iter(|| black_box(d.ledger().check_replay(d.store())))
    });
}

criterion_group!(
    benches,
    bench_plain_dispatch,
    bench_begin_commit,
    bench_close_with_open_window,
    bench_invariant_check,
);
criterion_main!(benches);
