use matching_core::prelude::*;

pub const PAIR_ID: PairId = 1;
pub const BASE_TOKEN: TokenId = 1;
pub const QUOTE_TOKEN: TokenId = 2;
pub const TICK_SIZE: u64 = 10;
pub const MAX_TICK_RANGE: u64 = 200;

/// A freshly registered single-pair core with both sides amply funded.
pub fn new_bench_core(owners: u64) -> CoreFacade<EscrowLedger, NullLedger> {
    let mut facade = CoreFacade::new(EscrowLedger::new(), NullLedger);
    facade
        .apply_ledger_event(LedgerEvent::PairRegistered {
            sequence: 1,
            pair_id: PAIR_ID,
            base_token_id: BASE_TOKEN,
            quote_token_id: QUOTE_TOKEN,
            tick_size: TICK_SIZE,
            max_tick_range: MAX_TICK_RANGE,
        })
        .unwrap();
    for owner in 1..=owners {
        facade.escrow().commit(owner, QUOTE_TOKEN, u64::MAX / 4);
        facade.escrow().commit(owner, BASE_TOKEN, u64::MAX / 4);
    }
    facade
}

/// Quickly build a limit order command resting at `tick..tick+width`.
pub fn make_order(id: OrderId, owner: Owner, side: Side, tick: Tick, width: u64, qty: u64, ts: u64) -> SubmitOrder {
    let tick_lower = tick;
    let tick_upper = tick + width;
    let limit_price = tick_lower * TICK_SIZE + (width * TICK_SIZE) / 2;
    SubmitOrder {
        order_id: id,
        owner,
        pair_id: PAIR_ID,
        side,
        tick_lower,
        tick_upper,
        limit_price,
        quantity: qty,
        created_at: ts,
    }
}
