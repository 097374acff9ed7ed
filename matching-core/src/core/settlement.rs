use crate::core::error::{MatchRejection, SettlementRejection};
use crate::core::escrow::EscrowAuthority;
use crate::core::order::OrderStore;
use crate::core::tick_index::TickIndex;
use crate::core::types::{
    DEFAULT_MATCHER_FEE_BPS, MatchCandidate, Order, OrderId, Pair, Quantity, SettlementProposal,
    Timestamp, midpoint_price,
};
use crate::core::validator::check_match;
use std::collections::HashMap;

pub const DEFAULT_ACK_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_SUPPRESS_WINDOW_SECS: u64 = 30;

#[derive(Debug, Clone, Copy)]
struct Reservation {
    fill_qty: Quantity,
    quote_amount: u64,
    matcher_fee: u64,
    exec_price: u64,
    reserved_at: Timestamp,
}

/// Result of applying a ledger acknowledgement to both crossing orders.
/// Either side may have just reached a terminal status and been evicted
/// from the working set; the facade is responsible for emitting events
/// for whichever of these came back `Some`.
#[derive(Debug)]
pub struct SettlementOutcome {
    pub proposal: SettlementProposal,
    pub buy_terminal: Option<Order>,
    pub sell_terminal: Option<Order>,
}

/// What happened after a nack or an ack timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryOutcome {
    Retry { attempt: u32 },
    Suppressed,
}

/// Drives each candidate crossing through `Proposed -> Reserved ->
/// AwaitingAck -> {Committed, ReleasedBack}`.
///
/// Takes no ownership of `OrderStore`/`TickIndex`/`EscrowAuthority`: the
/// facade passes them in on every call. The engine's own state is just
/// the bookkeeping a plain `OrderStore` cannot express on its own —
/// which (buy, sell) pairs are currently AwaitingAck, how much of each
/// order's `remaining()` those pairs have provisionally spoken for, and
/// which pairs are sitting out a post-nack suppression window.
pub struct SettlementEngine {
    matcher_fee_bps: u64,
    ack_timeout_secs: u64,
    max_retries: u32,
    suppress_window_secs: u64,
    reservations: HashMap<(OrderId, OrderId), Reservation>,
    shadow_reserved: HashMap<OrderId, Quantity>,
    retry_counts: HashMap<(OrderId, OrderId), u32>,
    suppressed_until: HashMap<(OrderId, OrderId), Timestamp>,
}

impl SettlementEngine {
    pub fn new(
        matcher_fee_bps: u64,
        ack_timeout_secs: u64,
        max_retries: u32,
        suppress_window_secs: u64,
    ) -> Self {
        Self {
            matcher_fee_bps,
            ack_timeout_secs,
            max_retries,
            suppress_window_secs,
            reservations: HashMap::new(),
            shadow_reserved: HashMap::new(),
            retry_counts: HashMap::new(),
            suppressed_until: HashMap::new(),
        }
    }

    fn effective_remaining(&self, order: &Order) -> Quantity {
        let reserved = self.shadow_reserved.get(&order.id).copied().unwrap_or(0);
        order.remaining().saturating_sub(reserved)
    }

    fn is_suppressed(&mut self, key: (OrderId, OrderId), now: Timestamp) -> bool {
        match self.suppressed_until.get(&key) {
            Some(&until) if now < until => true,
            Some(_) => {
                self.suppressed_until.remove(&key);
                false
            }
            None => false,
        }
    }

    /// Proposed -> Reserved -> AwaitingAck.
    ///
    /// Re-validates the candidate against the live orders rather than
    /// trusting the scanner's snapshot, recomputes `fill_qty` against
    /// each order's *effective* remaining quantity (actual remaining
    /// minus whatever other in-flight reservations have already spoken
    /// for), and checks that both sides still have enough committed
    /// escrow to cover it. On success the reservation moves into
    /// `AwaitingAck` and the built proposal is handed back for the
    /// caller to submit to the ledger.
    pub fn propose(
        &mut self,
        candidate: &MatchCandidate,
        orders: &OrderStore,
        escrow: &dyn EscrowAuthority,
        pair: &Pair,
        now: Timestamp,
    ) -> Result<SettlementProposal, SettlementRejection> {
        let key = (candidate.buy_id, candidate.sell_id);
        if self.is_suppressed(key, now) {
            return Err(SettlementRejection::Suppressed);
        }
        if self.reservations.contains_key(&key) {
            return Err(MatchRejection::EitherAlreadyFilled.into());
        }

        let already_filled = || SettlementRejection::from(MatchRejection::EitherAlreadyFilled);
        let buy = orders.get(candidate.buy_id).map_err(|_| already_filled())?;
        let sell = orders.get(candidate.sell_id).map_err(|_| already_filled())?;
        check_match(buy, sell, pair)?;

        let buy_eff = self.effective_remaining(buy);
        let sell_eff = self.effective_remaining(sell);
        if buy_eff == 0 || sell_eff == 0 {
            return Err(already_filled());
        }
        let fill_qty = buy_eff.min(sell_eff);
        let exec_price = midpoint_price(buy.limit_price, sell.limit_price);

        let proposal =
            SettlementProposal::build(buy.id, sell.id, fill_qty, exec_price, self.matcher_fee_bps, now)
                .ok_or(SettlementRejection::InsufficientEscrow)?;

        if escrow.committed(sell.owner, pair.base_token_id) < proposal.base_amount
            || escrow.committed(buy.owner, pair.quote_token_id) < proposal.quote_amount
        {
            return Err(SettlementRejection::InsufficientEscrow);
        }

        *self.shadow_reserved.entry(buy.id).or_insert(0) += fill_qty;
        *self.shadow_reserved.entry(sell.id).or_insert(0) += fill_qty;
        self.reservations.insert(
            key,
            Reservation {
                fill_qty,
                quote_amount: proposal.quote_amount,
                matcher_fee: proposal.matcher_fee,
                exec_price,
                reserved_at: now,
            },
        );
        Ok(proposal)
    }

    fn release_shadow(&mut self, buy_id: OrderId, sell_id: OrderId, fill_qty: Quantity) {
        for id in [buy_id, sell_id] {
            if let Some(v) = self.shadow_reserved.get_mut(&id) {
                *v = v.saturating_sub(fill_qty);
                if *v == 0 {
                    self.shadow_reserved.remove(&id);
                }
            }
        }
    }

    /// AwaitingAck -> Committed.
    ///
    /// Applies `fill_qty` to both orders' real `filled` counters,
    /// releases the matching escrow, and evicts from `OrderStore`/
    /// `TickIndex` any order that just reached `Filled`. Any escrow
    /// still committed beyond what this fill consumed is released too,
    /// covering dust left behind by the settlement proposal's truncating
    /// division.
    pub fn ack(
        &mut self,
        buy_id: OrderId,
        sell_id: OrderId,
        orders: &mut OrderStore,
        index: &mut TickIndex,
        escrow: &dyn EscrowAuthority,
        pair: &Pair,
    ) -> Result<SettlementOutcome, SettlementRejection> {
        let key = (buy_id, sell_id);
        let reservation = self
            .reservations
            .remove(&key)
            .ok_or(SettlementRejection::UnknownReservation)?;
        self.retry_counts.remove(&key);
        self.release_shadow(buy_id, sell_id, reservation.fill_qty);

        let unknown = || SettlementRejection::UnknownReservation;
        let buy_owner = orders.get(buy_id).map_err(|_| unknown())?.owner;
        let sell_owner = orders.get(sell_id).map_err(|_| unknown())?.owner;

        orders
            .mutate(buy_id, |o| {
                o.filled += reservation.fill_qty;
                o.escrow_released += reservation.quote_amount;
            })
            .map_err(|_| unknown())?;
        orders
            .mutate(sell_id, |o| {
                o.filled += reservation.fill_qty;
                o.escrow_released += reservation.fill_qty;
            })
            .map_err(|_| unknown())?;

        // Both amounts were checked committed during `propose`; this
        // engine is the only writer between then and now, so these
        // releases cannot underflow.
        let _ = escrow.release(sell_owner, pair.base_token_id, reservation.fill_qty);
        let _ = escrow.release(buy_owner, pair.quote_token_id, reservation.quote_amount);

        let buy_terminal = self.evict_if_terminal(buy_id, orders, index, escrow, pair.quote_token_id);
        let sell_terminal = self.evict_if_terminal(sell_id, orders, index, escrow, pair.base_token_id);

        let proposal = SettlementProposal {
            buy_id,
            sell_id,
            fill_qty: reservation.fill_qty,
            exec_price: reservation.exec_price,
            base_amount: reservation.fill_qty,
            quote_amount: reservation.quote_amount,
            matcher_fee: reservation.matcher_fee,
            proposed_at: reservation.reserved_at,
        };

        Ok(SettlementOutcome {
            proposal,
            buy_terminal,
            sell_terminal,
        })
    }

    fn evict_if_terminal(
        &self,
        order_id: OrderId,
        orders: &mut OrderStore,
        index: &mut TickIndex,
        escrow: &dyn EscrowAuthority,
        token: crate::core::types::TokenId,
    ) -> Option<Order> {
        if !orders.get(order_id).map(|o| !o.is_live()).unwrap_or(false) {
            return None;
        }
        let order = orders.remove(order_id).ok()?;
        index.remove_order(&order);
        let leftover = order.residual_escrow();
        if leftover > 0 {
            let _ = escrow.release(order.owner, token, leftover);
        }
        Some(order)
    }

    /// AwaitingAck -> ReleasedBack on an explicit ledger nack.
    pub fn nack(
        &mut self,
        buy_id: OrderId,
        sell_id: OrderId,
        now: Timestamp,
    ) -> Result<RetryOutcome, SettlementRejection> {
        let key = (buy_id, sell_id);
        let reservation = self
            .reservations
            .remove(&key)
            .ok_or(SettlementRejection::UnknownReservation)?;
        self.release_shadow(buy_id, sell_id, reservation.fill_qty);
        Ok(self.record_failure(key, now))
    }

    /// Releases back any reservation that has sat in `AwaitingAck` longer
    /// than `ack_timeout_secs`, treating the timeout as a retriable
    /// failure exactly like an explicit nack.
    pub fn expire_timeouts(&mut self, now: Timestamp) -> Vec<((OrderId, OrderId), RetryOutcome)> {
        let expired: Vec<(OrderId, OrderId)> = self
            .reservations
            .iter()
            .filter(|(_, r)| now.saturating_sub(r.reserved_at) >= self.ack_timeout_secs)
            .map(|(k, _)| *k)
            .collect();
        let mut outcomes = Vec::with_capacity(expired.len());
        for key in expired {
            if let Some(reservation) = self.reservations.remove(&key) {
                self.release_shadow(key.0, key.1, reservation.fill_qty);
                outcomes.push((key, self.record_failure(key, now)));
            }
        }
        outcomes
    }

    fn record_failure(&mut self, key: (OrderId, OrderId), now: Timestamp) -> RetryOutcome {
        let attempt = {
            let counter = self.retry_counts.entry(key).or_insert(0);
            *counter += 1;
            *counter
        };
        if attempt >= self.max_retries {
            self.retry_counts.remove(&key);
            self.suppressed_until
                .insert(key, now + self.suppress_window_secs);
            RetryOutcome::Suppressed
        } else {
            RetryOutcome::Retry { attempt }
        }
    }

    pub fn pending_count(&self) -> usize {
        self.reservations.len()
    }

    /// Quantity of `order_id` currently spoken for by an `AwaitingAck`
    /// reservation. The facade adds this to `filled` when deciding
    /// whether an in-place `update` may shrink `quantity` (§4.8 Scenario
    /// E): a reservation is a promise already made to the ledger, so it
    /// must not be undercut from underneath it.
    pub fn reserved_amount(&self, order_id: OrderId) -> Quantity {
        self.shadow_reserved.get(&order_id).copied().unwrap_or(0)
    }

    pub fn is_pair_suppressed(&self, buy_id: OrderId, sell_id: OrderId, now: Timestamp) -> bool {
        matches!(self.suppressed_until.get(&(buy_id, sell_id)), Some(&until) if now < until)
    }
}

impl Default for SettlementEngine {
    fn default() -> Self {
        Self::new(
            DEFAULT_MATCHER_FEE_BPS,
            DEFAULT_ACK_TIMEOUT_SECS,
            DEFAULT_MAX_RETRIES,
            DEFAULT_SUPPRESS_WINDOW_SECS,
        )
    }
}
