//! Property-based check that the universal invariants hold after any
//! sequence of `submit`/`cancel`/`update`/`scan_and_match`/
//! `poll_settlements` calls, not just the hand-picked scenarios in
//! `scenarios.rs`.

use crossbeam::epoch;
use matching_core::prelude::*;
use proptest::prelude::*;
use std::collections::HashMap;

const PAIR_ID: PairId = 1;
const BASE: TokenId = 1;
const QUOTE: TokenId = 2;
const TICK_SIZE: u64 = 10;
const MAX_TICK_RANGE: u64 = 20;
const OWNERS: [Owner; 3] = [1, 2, 3];

#[derive(Debug, Clone)]
enum Op {
    Submit {
        owner_idx: usize,
        buy: bool,
        tick_lower: u64,
        width: u64,
        price_offset: u64,
        qty: u64,
    },
    Cancel {
        pick: usize,
    },
    Update {
        pick: usize,
        tick_lower: u64,
        width: u64,
        price_offset: u64,
        qty: u64,
    },
    Scan,
    Poll,
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (
            0..OWNERS.len(),
            any::<bool>(),
            0u64..80,
            1u64..20,
            0u64..200,
            1u64..500,
        )
            .prop_map(|(owner_idx, buy, tick_lower, width, price_offset, qty)| Op::Submit {
                owner_idx,
                buy,
                tick_lower,
                width,
                price_offset,
                qty,
            }),
        1 => (0usize..64).prop_map(|pick| Op::Cancel { pick }),
        1 => (0usize..64, 0u64..80, 1u64..20, 0u64..200, 1u64..500).prop_map(
            |(pick, tick_lower, width, price_offset, qty)| Op::Update {
                pick,
                tick_lower,
                width,
                price_offset,
                qty,
            }
        ),
        2 => Just(Op::Scan),
        2 => Just(Op::Poll),
    ]
}

/// Clamps a raw `(tick_lower, width, price_offset)` triple generated by
/// proptest into a tick range/price that `check_submission` accepts for
/// this test's fixed pair.
fn clamp_submission(tick_lower: u64, width: u64, price_offset: u64, qty: u64) -> (Tick, Tick, BasisPoints, Quantity) {
    let width = width.clamp(1, MAX_TICK_RANGE);
    let tick_upper = tick_lower + width;
    let lower_price = tick_lower * TICK_SIZE;
    let upper_price = tick_upper * TICK_SIZE;
    let price = lower_price + (price_offset % (upper_price - lower_price + 1));
    (tick_lower, tick_upper, price, qty.max(1))
}

fn bucket_contains(index: &TickIndex, pair_id: PairId, tick: Tick, side: Side, order_id: OrderId, created_at: Timestamp) -> bool {
    let Some(bucket) = index.bucket(pair_id, tick) else {
        return false;
    };
    let guard = &epoch::pin();
    let list = match side {
        Side::Buy => &bucket.buy_ids,
        Side::Sell => &bucket.sell_ids,
    };
    list.iter(guard)
        .any(|e| *e.value() == order_id && e.key().created_at == created_at)
}

fn check_invariants(facade: &CoreFacade<EscrowLedger, NullLedger>, known_ids: &[OrderId]) {
    let mut expected_escrow: HashMap<(Owner, TokenId), u64> = HashMap::new();

    for &id in known_ids {
        let Ok(order) = facade.orders().get(id) else {
            continue;
        };

        assert!(order.filled <= order.quantity, "order {id} overfilled");
        match order.status {
            OrderStatus::Filled => assert_eq!(order.filled, order.quantity),
            OrderStatus::Cancelled => {}
            OrderStatus::PartiallyFilled => {
                assert!(order.filled > 0 && order.filled < order.quantity)
            }
            OrderStatus::Active => assert_eq!(order.filled, 0),
        }

        if order.is_live() {
            for tick in order.tick_lower..order.tick_upper {
                assert!(
                    bucket_contains(facade.index(), PAIR_ID, tick, order.side, order.id, order.created_at),
                    "live order {id} missing from tick {tick}"
                );
            }
            let token = match order.side {
                Side::Buy => QUOTE,
                Side::Sell => BASE,
            };
            *expected_escrow.entry((order.owner, token)).or_insert(0) += order.residual_escrow();
        }
    }

    for &owner in &OWNERS {
        for token in [BASE, QUOTE] {
            let expected = expected_escrow.get(&(owner, token)).copied().unwrap_or(0);
            assert_eq!(
                facade.escrow().committed(owner, token),
                expected,
                "escrow drift for owner {owner} token {token}"
            );
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn invariants_hold_after_any_op_sequence(ops in proptest::collection::vec(op_strategy(), 1..40)) {
        let mut facade = CoreFacade::new(EscrowLedger::new(), NullLedger);
        facade
            .apply_ledger_event(LedgerEvent::PairRegistered {
                sequence: 1,
                pair_id: PAIR_ID,
                base_token_id: BASE,
                quote_token_id: QUOTE,
                tick_size: TICK_SIZE,
                max_tick_range: MAX_TICK_RANGE,
            })
            .unwrap();

        let mut known_ids: Vec<(OrderId, Owner)> = Vec::new();
        let mut next_id: OrderId = 1;
        let mut now: Timestamp = 0;

        for op in ops {
            now += 1;
            match op {
                Op::Submit {
                    owner_idx,
                    buy,
                    tick_lower,
                    width,
                    price_offset,
                    qty,
                } => {
                    let owner = OWNERS[owner_idx];
                    let (tick_lower, tick_upper, price, qty) =
                        clamp_submission(tick_lower, width, price_offset, qty);
                    let side = if buy { Side::Buy } else { Side::Sell };
                    let order_id = next_id;
                    next_id += 1;
                    let cmd = SubmitOrder {
                        order_id,
                        owner,
                        pair_id: PAIR_ID,
                        side,
                        tick_lower,
                        tick_upper,
                        limit_price: price,
                        quantity: qty,
                        created_at: now,
                    };
                    if facade.submit(cmd).is_ok() {
                        known_ids.push((order_id, owner));
                    }
                }
                Op::Cancel { pick } => {
                    if !known_ids.is_empty() {
                        let (order_id, owner) = known_ids[pick % known_ids.len()];
                        let _ = facade.cancel(order_id, owner);
                    }
                }
                Op::Update {
                    pick,
                    tick_lower,
                    width,
                    price_offset,
                    qty,
                } => {
                    if !known_ids.is_empty() {
                        let (order_id, owner) = known_ids[pick % known_ids.len()];
                        let (tick_lower, tick_upper, price, qty) =
                            clamp_submission(tick_lower, width, price_offset, qty);
                        let _ = facade.update(order_id, owner, tick_lower, tick_upper, price, qty);
                    }
                }
                Op::Scan => {
                    facade.scan_and_match(PAIR_ID, now, 8).unwrap();
                }
                Op::Poll => {
                    facade.poll_settlements(now).unwrap();
                }
            }

            let ids: Vec<OrderId> = known_ids.iter().map(|(id, _)| *id).collect();
            check_invariants(&facade, &ids);
        }
    }
}
