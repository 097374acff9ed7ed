mod common;
use common::*;
use criterion::{BatchSize, Criterion, Throughput, criterion_group, criterion_main};
use matching_core::prelude::*;

const BOOK_SIDE: u64 = 5_000;
const OWNERS: u64 = 8;

/// A synthetic book with `BOOK_SIDE` resting sells undercutting
/// `BOOK_SIDE` resting buys, split across `OWNERS` distinct owners so
/// self-trade prevention never suppresses a crossing pair.
fn build_crossing_book() -> CoreFacade<EscrowLedger, NullLedger> {
    let mut facade = new_bench_core(OWNERS);
    for i in 0..BOOK_SIDE {
        let owner = (i % (OWNERS / 2)) + 1;
        facade
            .submit(make_order(i, owner, Side::Sell, 100 + (i % 10), 10, 10, i))
            .unwrap();
    }
    for i in BOOK_SIDE..2 * BOOK_SIDE {
        let owner = (i % (OWNERS / 2)) + (OWNERS / 2) + 1;
        facade
            .submit(make_order(i, owner, Side::Buy, 100, 60, 10, i))
            .unwrap();
    }
    facade
}

fn bench_scan_and_match(c: &mut Criterion) {
    let mut group = c.benchmark_group("scan_and_match over a 10k-order book");
    group.throughput(Throughput::Elements(2 * BOOK_SIDE));
    group.bench_function("scan_and_match budget=1000", |b| {
        b.iter_batched(
            build_crossing_book,
            |mut facade| {
                facade.scan_and_match(PAIR_ID, 1, 1000).unwrap();
            },
            BatchSize::LargeInput,
        );
    });
    group.finish();
}

fn bench_submit_cancel_churn(c: &mut Criterion) {
    let mut group = c.benchmark_group("submit/cancel churn");
    group.throughput(Throughput::Elements(1));
    group.bench_function("submit then cancel, non-crossing", |b| {
        let mut facade = new_bench_core(1);
        let mut next_id: OrderId = 1;
        b.iter(|| {
            let id = next_id;
            next_id += 1;
            facade
                .submit(make_order(id, 1, Side::Buy, 0, 10, 10, id))
                .unwrap();
            facade.cancel(id, 1).unwrap();
        });
    });
    group.finish();
}

criterion_group!(benches, bench_scan_and_match, bench_submit_cancel_churn);
criterion_main!(benches);
