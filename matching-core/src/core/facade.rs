use crate::core::error::{CoreError, CoreResult, InputError};
use crate::core::escrow::EscrowAuthority;
use crate::core::ledger::{Ledger, LedgerEvent, PendingSettlement, SettlementDecision, Sequence};
use crate::core::order::OrderStore;
use crate::core::pair::PairRegistry;
use crate::core::scanner::MatchScanner;
use crate::core::settlement::{RetryOutcome, SettlementEngine};
use crate::core::tick_index::TickIndex;
use crate::core::types::{
    BasisPoints, Order, OrderId, OrderStatus, Owner, Pair, PairId, Quantity, Side, Tick,
    Timestamp,
};
use crate::core::validator::check_submission;
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, error, info, instrument, trace, warn};

/// A caller-submitted order, prior to validation.
#[derive(Debug, Clone)]
pub struct SubmitOrder {
    pub order_id: OrderId,
    pub owner: Owner,
    pub pair_id: PairId,
    pub side: Side,
    pub tick_lower: Tick,
    pub tick_upper: Tick,
    pub limit_price: BasisPoints,
    pub quantity: Quantity,
    pub created_at: Timestamp,
}

/// Emitted by [`CoreFacade::poll_settlements`] for the host to forward to
/// whatever observes this matching core instance (metrics, an audit log,
/// a UI push channel). The facade itself has no opinion on delivery.
#[derive(Debug, Clone)]
pub enum CoreEvent {
    SettlementCommitted {
        buy_id: OrderId,
        sell_id: OrderId,
        fill_qty: Quantity,
    },
    SettlementReleasedBack { buy_id: OrderId, sell_id: OrderId },
}

/// Single-threaded-cooperative entry point for one matching core
/// instance (§5). Owns `PairRegistry`, `OrderStore`, `TickIndex`, the
/// injected `EscrowAuthority`, and `SettlementEngine`'s
/// pending-reservation bookkeeping, and serialises every
/// state-mutating call through `&mut self`.
///
/// Sharding by `pair_id` across several `CoreFacade` instances is safe
/// except for `EscrowAuthority`: an owner holding orders on two pairs
/// quoted in the same token needs one shared authority across both
/// facades, which is exactly what `EscrowLedgerActor` (see
/// `crate::core::escrow`) is for.
pub struct CoreFacade<E: EscrowAuthority, L: Ledger> {
    pairs: PairRegistry,
    orders: OrderStore,
    index: TickIndex,
    escrow: E,
    ledger: L,
    settlement: SettlementEngine,
    pending: HashMap<(OrderId, OrderId), PendingSettlement>,
    applied_sequences: BTreeSet<Sequence>,
    halted: bool,
}

impl<E: EscrowAuthority, L: Ledger> CoreFacade<E, L> {
    pub fn new(escrow: E, ledger: L) -> Self {
        Self {
            pairs: PairRegistry::new(),
            orders: OrderStore::new(),
            index: TickIndex::new(),
            escrow,
            ledger,
            settlement: SettlementEngine::default(),
            pending: HashMap::new(),
            applied_sequences: BTreeSet::new(),
            halted: false,
        }
    }

    fn require_running(&self) -> CoreResult<()> {
        if self.halted {
            return Err(CoreError::CoreHalted);
        }
        Ok(())
    }

    fn trip_halt(&mut self, err: CoreError) -> CoreError {
        if err.is_fatal() {
            error!(?err, "matching core halted on fatal error");
            self.halted = true;
        }
        err
    }

    /// Clears the sticky halt flag. Callers are expected to have
    /// resynchronised whatever external state caused the original fatal
    /// error before calling this.
    pub fn reset_after_desync(&mut self) {
        info!("matching core reset after desync");
        self.halted = false;
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// Validates and accepts a new order, committing the required
    /// escrow atomically with the OrderStore/TickIndex insertion.
    #[instrument(skip(self, cmd), fields(pair_id = cmd.pair_id, order_id = cmd.order_id))]
    pub fn submit(&mut self, cmd: SubmitOrder) -> CoreResult<OrderId> {
        self.require_running()?;
        let pair = self.pairs.require_active(cmd.pair_id)?;
        check_submission(
            &pair,
            cmd.side,
            cmd.tick_lower,
            cmd.tick_upper,
            cmd.limit_price,
            cmd.quantity,
        )?;

        let escrow_amount = Order::required_escrow(cmd.side, cmd.limit_price, cmd.quantity)
            .ok_or(InputError::InsufficientEscrow)?;
        let token = self.escrow_token(cmd.side, &pair);

        let order = Order {
            id: cmd.order_id,
            owner: cmd.owner,
            pair_id: cmd.pair_id,
            side: cmd.side,
            tick_lower: cmd.tick_lower,
            tick_upper: cmd.tick_upper,
            limit_price: cmd.limit_price,
            quantity: cmd.quantity,
            filled: 0,
            escrow_amount,
            escrow_released: 0,
            created_at: cmd.created_at,
            status: OrderStatus::Active,
        };

        self.orders.insert(order.clone())?;
        self.index.insert_order(&order);
        self.escrow.commit(cmd.owner, token, escrow_amount);
        debug!(order_id = cmd.order_id, pair_id = cmd.pair_id, "order accepted");
        Ok(cmd.order_id)
    }

    /// Cancels a live order, releasing its residual escrow.
    #[instrument(skip(self))]
    pub fn cancel(&mut self, order_id: OrderId, caller: Owner) -> CoreResult<()> {
        self.require_running()?;
        let order = self.orders.get(order_id)?.clone();
        if order.owner != caller {
            return Err(InputError::NotOwner(order_id).into());
        }
        if order.status.is_terminal() {
            return Err(InputError::AlreadyTerminal(order_id).into());
        }
        let pair = self.pairs.require_active(order.pair_id).or_else(|_| {
            self.pairs
                .get(order.pair_id)
                .ok_or(InputError::PairNotFound(order.pair_id))
        })?;

        let token = self.escrow_token(order.side, &pair);
        let leftover = order.residual_escrow();
        if leftover > 0 {
            self.escrow
                .release(order.owner, token, leftover)
                .map_err(CoreError::from)?;
        }

        // Any fallible step runs before the index is touched, so a
        // rejected release leaves the resting order exactly as it was.
        self.index.remove_order(&order);
        self.orders.mutate(order_id, |o| o.status = OrderStatus::Cancelled)?;
        self.orders.remove(order_id)?;
        debug!(order_id, "order cancelled");
        Ok(())
    }

    /// In-place replacement of a live order's tick range, limit price
    /// and quantity. `new_quantity` must not fall below `filled` plus
    /// whatever this order currently has reserved in an in-flight
    /// settlement. On any validation failure the existing order is left
    /// untouched.
    #[instrument(skip(self))]
    pub fn update(
        &mut self,
        order_id: OrderId,
        caller: Owner,
        new_tick_lower: Tick,
        new_tick_upper: Tick,
        new_limit_price: BasisPoints,
        new_quantity: Quantity,
    ) -> CoreResult<()> {
        self.require_running()?;
        let order = self.orders.get(order_id)?.clone();
        if order.owner != caller {
            return Err(InputError::NotOwner(order_id).into());
        }
        if order.status.is_terminal() {
            return Err(InputError::AlreadyTerminal(order_id).into());
        }
        let already_spoken_for = order.filled + self.settlement.reserved_amount(order_id);
        if new_quantity < already_spoken_for {
            return Err(InputError::NonPositiveQuantity.into());
        }
        let pair = self.pairs.require_active(order.pair_id)?;
        check_submission(
            &pair,
            order.side,
            new_tick_lower,
            new_tick_upper,
            new_limit_price,
            new_quantity,
        )?;

        let new_escrow = Order::required_escrow(order.side, new_limit_price, new_quantity)
            .ok_or(InputError::InsufficientEscrow)?;
        let token = self.escrow_token(order.side, &pair);

        // Any fallible step runs before the index is touched, so a
        // rejected release leaves the resting order exactly as it was.
        if new_escrow > order.escrow_amount {
            self.escrow.commit(order.owner, token, new_escrow - order.escrow_amount);
        } else if new_escrow < order.escrow_amount {
            self.escrow
                .release(order.owner, token, order.escrow_amount - new_escrow)
                .map_err(CoreError::from)?;
        }

        self.index.remove_order(&order);
        self.orders.mutate(order_id, |o| {
            o.tick_lower = new_tick_lower;
            o.tick_upper = new_tick_upper;
            o.limit_price = new_limit_price;
            o.quantity = new_quantity;
            o.escrow_amount = new_escrow;
        })?;
        let updated = self.orders.get(order_id)?.clone();
        self.index.insert_order(&updated);
        debug!(order_id, "order updated");
        Ok(())
    }

    /// Reconciles with a single ledger event. Idempotent for
    /// naturally-idempotent event kinds; returns `DuplicateLedgerEvent`
    /// (fatal) if a settlement-finality event's sequence is replayed.
    #[instrument(skip(self, event), fields(sequence = event.sequence()))]
    pub fn apply_ledger_event(&mut self, event: LedgerEvent) -> CoreResult<()> {
        self.require_running()?;
        let sequence = event.sequence();
        let already_seen = self.applied_sequences.contains(&sequence);
        if already_seen && matches!(
            event,
            LedgerEvent::SettlementCommitted { .. } | LedgerEvent::SettlementRejected { .. }
        ) {
            let err = self.trip_halt(CoreError::DuplicateLedgerEvent);
            return Err(err);
        }
        self.applied_sequences.insert(sequence);
        if already_seen {
            return Ok(());
        }

        match event {
            LedgerEvent::PairRegistered {
                pair_id,
                base_token_id,
                quote_token_id,
                tick_size,
                max_tick_range,
                ..
            } => {
                self.pairs.upsert(Pair {
                    pair_id,
                    base_token_id,
                    quote_token_id,
                    tick_size,
                    max_tick_range,
                    active: true,
                })?;
            }
            LedgerEvent::PairDeactivated { pair_id, .. } => {
                self.pairs.set_active(pair_id, false)?;
            }
            LedgerEvent::PairReactivated { pair_id, .. } => {
                self.pairs.set_active(pair_id, true)?;
            }
            LedgerEvent::OrderObserved {
                order_id,
                owner,
                pair_id,
                side,
                tick_lower,
                tick_upper,
                limit_price,
                quantity,
                escrow_amount,
                created_at,
                ..
            } => {
                if !self.orders.contains(order_id) {
                    let order = Order {
                        id: order_id,
                        owner,
                        pair_id,
                        side,
                        tick_lower,
                        tick_upper,
                        limit_price,
                        quantity,
                        filled: 0,
                        escrow_amount,
                        escrow_released: 0,
                        created_at,
                        status: OrderStatus::Active,
                    };
                    self.index.insert_order(&order);
                    self.orders.insert(order)?;
                }
            }
            LedgerEvent::OrderCancelledOnChain { order_id, .. } => {
                if let Ok(order) = self.orders.get(order_id).map(|o| o.clone()) {
                    self.index.remove_order(&order);
                    let _ = self.orders.remove(order_id);
                }
            }
            LedgerEvent::SettlementCommitted {
                buy_id, sell_id, ..
            } => {
                self.finalize_ack(buy_id, sell_id)?;
            }
            LedgerEvent::SettlementRejected {
                buy_id,
                sell_id,
                reason,
                ..
            } => {
                self.finalize_nack(buy_id, sell_id, reason);
            }
            LedgerEvent::EscrowSync {
                owner,
                token_id,
                external_committed,
                ..
            } => {
                if self.escrow.committed(owner, token_id) != external_committed {
                    let err = self.trip_halt(CoreError::EscrowDesync);
                    return Err(err);
                }
            }
        }
        Ok(())
    }

    /// Scans `pair_id` for crossing candidates, reserves each in turn
    /// against current state, and submits up to `budget` proposals to
    /// the ledger. Returns the number of proposals submitted; the
    /// ledger's decisions arrive asynchronously via `poll_settlements`
    /// or `apply_ledger_event`.
    #[instrument(skip(self))]
    pub fn scan_and_match(&mut self, pair_id: PairId, now: Timestamp, budget: usize) -> CoreResult<usize> {
        self.require_running()?;
        let pair = self.pairs.require_active(pair_id)?;
        let candidates = MatchScanner::scan_capped(&pair, &self.orders, &self.index, budget);

        let mut submitted = 0;
        for candidate in &candidates {
            match self
                .settlement
                .propose(candidate, &self.orders, &self.escrow, &pair, now)
            {
                Ok(proposal) => {
                    info!(
                        buy_id = proposal.buy_id,
                        sell_id = proposal.sell_id,
                        fill_qty = proposal.fill_qty,
                        "settlement proposed"
                    );
                    let rx = self.ledger.submit_proposal(proposal);
                    self.pending.insert((proposal.buy_id, proposal.sell_id), rx);
                    submitted += 1;
                }
                Err(rejection) => {
                    trace!(
                        buy_id = candidate.buy_id,
                        sell_id = candidate.sell_id,
                        %rejection,
                        "candidate not reserved"
                    );
                }
            }
        }
        Ok(submitted)
    }

    /// Drains any settlement decisions that have arrived without
    /// blocking, applying commits/retries as they resolve. Also expires
    /// reservations that have outlived `ACK_TIMEOUT`.
    pub fn poll_settlements(&mut self, now: Timestamp) -> CoreResult<Vec<CoreEvent>> {
        self.require_running()?;
        let mut events = Vec::new();

        let ready: Vec<(OrderId, OrderId)> = self
            .pending
            .iter()
            .filter(|(_, rx)| !rx.is_empty())
            .map(|(k, _)| *k)
            .collect();
        for key in ready {
            let Some(rx) = self.pending.remove(&key) else {
                continue;
            };
            match rx.try_recv() {
                Ok(SettlementDecision::Ack) => {
                    let fill_qty = self.finalize_ack(key.0, key.1)?;
                    events.push(CoreEvent::SettlementCommitted {
                        buy_id: key.0,
                        sell_id: key.1,
                        fill_qty,
                    });
                }
                Ok(SettlementDecision::Nack { reason }) => {
                    self.finalize_nack(key.0, key.1, reason);
                    events.push(CoreEvent::SettlementReleasedBack {
                        buy_id: key.0,
                        sell_id: key.1,
                    });
                }
                Err(_) => {}
            }
        }

        for (key, outcome) in self.settlement.expire_timeouts(now) {
            self.pending.remove(&key);
            warn!(buy_id = key.0, sell_id = key.1, ?outcome, "settlement ack timed out");
            events.push(CoreEvent::SettlementReleasedBack {
                buy_id: key.0,
                sell_id: key.1,
            });
        }

        Ok(events)
    }

    fn finalize_ack(&mut self, buy_id: OrderId, sell_id: OrderId) -> CoreResult<Quantity> {
        let pair_id = self
            .orders
            .get(buy_id)
            .or_else(|_| self.orders.get(sell_id))
            .map(|o| o.pair_id)
            .unwrap_or_default();
        let Some(pair) = self.pairs.get(pair_id) else {
            let err = self.trip_halt(CoreError::IndexInvariantViolated);
            return Err(err);
        };
        let outcome = self
            .settlement
            .ack(buy_id, sell_id, &mut self.orders, &mut self.index, &self.escrow, &pair);
        match outcome {
            Ok(result) => {
                info!(buy_id, sell_id, fill_qty = result.proposal.fill_qty, "settlement committed");
                Ok(result.proposal.fill_qty)
            }
            Err(_) => {
                let err = self.trip_halt(CoreError::IndexInvariantViolated);
                Err(err)
            }
        }
    }

    fn finalize_nack(&mut self, buy_id: OrderId, sell_id: OrderId, reason: String) {
        match self.settlement.nack(buy_id, sell_id, 0) {
            Ok(RetryOutcome::Retry { attempt }) => {
                debug!(buy_id, sell_id, attempt, reason, "settlement nacked, will retry");
            }
            Ok(RetryOutcome::Suppressed) => {
                warn!(buy_id, sell_id, reason, "settlement pair suppressed after repeated nacks");
            }
            Err(_) => {}
        }
    }

    fn escrow_token(&self, side: Side, pair: &Pair) -> crate::core::types::TokenId {
        match side {
            Side::Buy => pair.quote_token_id,
            Side::Sell => pair.base_token_id,
        }
    }

    pub fn pairs(&self) -> &PairRegistry {
        &self.pairs
    }

    pub fn orders(&self) -> &OrderStore {
        &self.orders
    }

    pub fn index(&self) -> &TickIndex {
        &self.index
    }

    pub fn escrow(&self) -> &E {
        &self.escrow
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::escrow::EscrowLedger;
    use crate::core::ledger::NullLedger;

    fn facade() -> CoreFacade<EscrowLedger, NullLedger> {
        let mut facade = CoreFacade::new(EscrowLedger::new(), NullLedger);
        facade
            .apply_ledger_event(LedgerEvent::PairRegistered {
                sequence: 1,
                pair_id: 1,
                base_token_id: 1,
                quote_token_id: 2,
                tick_size: 100,
                max_tick_range: 50,
            })
            .unwrap();
        facade
    }

    fn submit(owner: Owner, side: Side, id: OrderId, tick_lower: Tick, tick_upper: Tick, price: u64, qty: u64, ts: u64) -> SubmitOrder {
        SubmitOrder {
            order_id: id,
            owner,
            pair_id: 1,
            side,
            tick_lower,
            tick_upper,
            limit_price: price,
            quantity: qty,
            created_at: ts,
        }
    }

    #[test]
    fn submit_then_cancel_releases_escrow() {
        let mut facade = facade();
        facade.escrow.commit(1, 2, 1_000_000);
        facade
            .submit(submit(1, Side::Buy, 1, 1490, 1510, 150_000, 1000, 10))
            .unwrap();
        assert!(facade.orders.contains(1));
        facade.cancel(1, 1).unwrap();
        assert!(!facade.orders.contains(1));
        assert_eq!(facade.escrow.committed(1, 2), 1_000_000 - 15_000 + 15_000);
    }

    #[test]
    fn cancel_by_non_owner_rejected() {
        let mut facade = facade();
        facade.escrow.commit(1, 2, 1_000_000);
        facade
            .submit(submit(1, Side::Buy, 1, 1490, 1510, 150_000, 1000, 10))
            .unwrap();
        assert!(matches!(
            facade.cancel(1, 99),
            Err(CoreError::Input(InputError::NotOwner(1)))
        ));
    }

    #[test]
    fn full_cycle_submits_and_commits_settlement() {
        let mut facade = facade();
        facade.escrow.commit(1, 2, 15_000);
        facade.escrow.commit(2, 1, 1000);
        facade
            .submit(submit(1, Side::Buy, 1, 1490, 1510, 150_000, 1000, 10))
            .unwrap();
        facade
            .submit(submit(2, Side::Sell, 2, 1495, 1505, 149_500, 1000, 20))
            .unwrap();

        let submitted = facade.scan_and_match(1, 100, 10).unwrap();
        assert_eq!(submitted, 1);
        let events = facade.poll_settlements(101).unwrap();
        assert_eq!(events.len(), 1);
        assert!(!facade.orders.contains(1));
        assert!(!facade.orders.contains(2));
    }

    #[test]
    fn duplicate_settlement_sequence_halts_core() {
        let mut facade = facade();
        let event = LedgerEvent::SettlementCommitted {
            sequence: 5,
            buy_id: 1,
            sell_id: 2,
            fill_qty: 1,
            exec_price: 100,
            block_height: 1,
        };
        let _ = facade.apply_ledger_event(event.clone());
        assert!(facade.apply_ledger_event(event).is_err());
        assert!(facade.is_halted());
        facade.reset_after_desync();
        assert!(!facade.is_halted());
    }

    #[test]
    fn halted_core_rejects_new_submissions() {
        let mut facade = facade();
        facade.halted = true;
        assert!(matches!(
            facade.submit(submit(1, Side::Buy, 1, 1490, 1510, 150_000, 1000, 10)),
            Err(CoreError::CoreHalted)
        ));
    }
}
