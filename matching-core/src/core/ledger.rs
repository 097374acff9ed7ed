use crate::core::types::{
    BasisPoints, OrderId, Owner, PairId, Quantity, SettlementProposal, Side, Tick, TokenId,
};
use crossbeam::channel::Receiver;

/// Outcome of a submitted [`SettlementProposal`], as decided by the
/// ledger collaborator (on-chain proof generation, wallet signing,
/// broadcast — all of it happens on the far side of this boundary, not
/// inside the core).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettlementDecision {
    Ack,
    Nack { reason: String },
}

/// A submitted proposal's decision arrives later on this channel. The
/// core never blocks waiting on it: `CoreFacade::scan_and_match` submits
/// a proposal and moves on to the next pair, polling outstanding
/// receivers (or letting `SettlementEngine::expire_timeouts` reclaim
/// them) on a later tick.
pub type PendingSettlement = Receiver<SettlementDecision>;

/// Monotonic position in [`Ledger::event_stream`], used to resume a
/// restarted core from where it left off (§6.3).
pub type Sequence = u64;

/// Events the ledger collaborator replays to the core to reconstruct
/// `PairRegistry`, `OrderStore`, `TickIndex` and `EscrowLedger` state, or
/// to notify the core of something that happened outside it (an order
/// observed directly on-chain, an external escrow balance change).
///
/// Applying the same `(sequence)` twice must be a no-op for every
/// variant here except ones the ledger collaborator guarantees are
/// naturally idempotent; the facade is the one that enforces this by
/// tracking the highest applied sequence per pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerEvent {
    PairRegistered {
        sequence: Sequence,
        pair_id: PairId,
        base_token_id: TokenId,
        quote_token_id: TokenId,
        tick_size: BasisPoints,
        max_tick_range: u64,
    },
    PairDeactivated {
        sequence: Sequence,
        pair_id: PairId,
    },
    PairReactivated {
        sequence: Sequence,
        pair_id: PairId,
    },
    OrderObserved {
        sequence: Sequence,
        order_id: OrderId,
        owner: Owner,
        pair_id: PairId,
        side: Side,
        tick_lower: Tick,
        tick_upper: Tick,
        limit_price: BasisPoints,
        quantity: Quantity,
        escrow_amount: u64,
        created_at: u64,
    },
    OrderCancelledOnChain {
        sequence: Sequence,
        order_id: OrderId,
    },
    SettlementCommitted {
        sequence: Sequence,
        buy_id: OrderId,
        sell_id: OrderId,
        fill_qty: Quantity,
        exec_price: BasisPoints,
        block_height: u64,
    },
    SettlementRejected {
        sequence: Sequence,
        buy_id: OrderId,
        sell_id: OrderId,
        reason: String,
    },
    EscrowSync {
        sequence: Sequence,
        owner: Owner,
        token_id: TokenId,
        external_committed: u64,
    },
}

impl LedgerEvent {
    pub fn sequence(&self) -> Sequence {
        match self {
            LedgerEvent::PairRegistered { sequence, .. }
            | LedgerEvent::PairDeactivated { sequence, .. }
            | LedgerEvent::PairReactivated { sequence, .. }
            | LedgerEvent::OrderObserved { sequence, .. }
            | LedgerEvent::OrderCancelledOnChain { sequence, .. }
            | LedgerEvent::SettlementCommitted { sequence, .. }
            | LedgerEvent::SettlementRejected { sequence, .. }
            | LedgerEvent::EscrowSync { sequence, .. } => *sequence,
        }
    }
}

/// The one external capability the matching core depends on: a place to
/// send settlement proposals and a restartable feed of everything that
/// happened outside the core (on-chain order observations, settlement
/// finality, escrow resynchronisation). Proof generation, wallet
/// signing and broadcast all live behind this boundary; the core itself
/// never suspends inside a critical section.
pub trait Ledger: Send + Sync {
    /// Submits a proposal and returns immediately with a handle to its
    /// eventual decision. At most one submission may be in flight per
    /// `(buy_id, sell_id)`; the facade enforces this via
    /// `SettlementEngine`'s `AwaitingAck` bookkeeping, not this trait.
    fn submit_proposal(&self, proposal: SettlementProposal) -> PendingSettlement;

    /// A restartable, logically infinite sequence of events, resumed
    /// from `from`. Returns the events available right now; the caller
    /// polls again for more.
    fn poll_events(&self, from: Sequence) -> Vec<LedgerEvent>;
}

/// A `Ledger` that never produces events and acks every proposal
/// immediately. Useful for tests and for running a pair-core with
/// settlement disabled.
pub struct NullLedger;

impl Ledger for NullLedger {
    fn submit_proposal(&self, _proposal: SettlementProposal) -> PendingSettlement {
        let (tx, rx) = crossbeam::channel::bounded(1);
        let _ = tx.send(SettlementDecision::Ack);
        rx
    }

    fn poll_events(&self, _from: Sequence) -> Vec<LedgerEvent> {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_ledger_acks_immediately() {
        let ledger = NullLedger;
        let proposal = SettlementProposal::build(1, 2, 10, 100, 5, 0).unwrap();
        let rx = ledger.submit_proposal(proposal);
        assert_eq!(rx.recv().unwrap(), SettlementDecision::Ack);
    }

    #[test]
    fn null_ledger_has_no_events() {
        let ledger = NullLedger;
        assert!(ledger.poll_events(0).is_empty());
    }

    #[test]
    fn event_sequence_accessor_covers_every_variant() {
        let e = LedgerEvent::PairDeactivated {
            sequence: 7,
            pair_id: 1,
        };
        assert_eq!(e.sequence(), 7);
    }
}
