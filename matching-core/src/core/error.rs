use crate::core::types::{OrderId, PairId};
use thiserror::Error;

/// Input errors: recoverable at the caller, surfaced as the return value
/// of the `CoreFacade` operation that produced them.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum InputError {
    #[error("tick range [{tick_lower}, {tick_upper}) is invalid")]
    InvalidTickRange { tick_lower: u64, tick_upper: u64 },
    #[error("tick range width exceeds the pair's max_tick_range")]
    TickRangeExceedsMax,
    #[error("limit_price falls outside the declared tick range")]
    PriceOutsideTicks,
    #[error("quantity must be positive")]
    NonPositiveQuantity,
    #[error("order id {0} already exists")]
    DuplicateOrder(OrderId),
    #[error("order id {0} is unknown")]
    UnknownOrder(OrderId),
    #[error("caller does not own order {0}")]
    NotOwner(OrderId),
    #[error("order {0} is already in a terminal state")]
    AlreadyTerminal(OrderId),
    #[error("pair {0} is not registered")]
    PairNotFound(PairId),
    #[error("pair {0} has an invalid tick_size or max_tick_range")]
    InvalidPair(PairId),
    #[error("pair {0} is registered but inactive")]
    PairInactive(PairId),
    #[error("insufficient escrow to cover this order")]
    InsufficientEscrow,
}

/// Match rejections: non-fatal reasons a candidate pair cannot cross
/// right now. Logged, not returned to any external caller.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum MatchRejection {
    #[error("orders belong to different pairs")]
    DifferentPairs,
    #[error("buy and sell orders share the same owner")]
    SameOwner,
    #[error("buy.limit_price < sell.limit_price")]
    PricesDoNotCross,
    #[error("tick ranges do not overlap")]
    NoTickOverlap,
    #[error("one or both orders are already filled")]
    EitherAlreadyFilled,
    #[error("midpoint execution price falls outside the overlap tick range")]
    OverlapPriceOutOfBounds,
}

/// Reasons `SettlementEngine` refused to reserve or acknowledge a
/// candidate crossing.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SettlementRejection {
    #[error(transparent)]
    Match(#[from] MatchRejection),
    #[error("insufficient escrow reserved for this candidate")]
    InsufficientEscrow,
    #[error("pair suppressed after repeated ledger nacks")]
    Suppressed,
    #[error("no pending reservation for this (buy, sell) pair")]
    UnknownReservation,
}

impl MatchRejection {
    /// Terminal rejections mean the candidate can never cross, no matter
    /// how many times it is re-scanned, so it should be evicted rather
    /// than retried.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            MatchRejection::SameOwner | MatchRejection::PricesDoNotCross
        )
    }
}

/// Reasons the EscrowLedger refused a commit/release.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum EscrowError {
    #[error("release of {amount} exceeds committed balance {committed}")]
    Underflow { amount: u64, committed: u64 },
}

/// Top-level error type returned by `CoreFacade` operations.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CoreError {
    #[error(transparent)]
    Input(#[from] InputError),
    #[error(transparent)]
    Escrow(#[from] EscrowError),

    /// The core's accounting view of escrow has diverged from the
    /// ledger's on-chain view. Fatal: the affected owner is frozen
    /// until `reset_after_desync` is called.
    #[error("escrow desync detected for this owner/token")]
    EscrowDesync,
    /// An internal invariant (§8) was violated. Fatal.
    #[error("an internal index invariant was violated")]
    IndexInvariantViolated,
    /// The same ledger event sequence number was observed twice for a
    /// non-idempotent event kind. Fatal.
    #[error("duplicate ledger event observed for a non-idempotent sequence")]
    DuplicateLedgerEvent,
    /// The core has tripped its sticky halt flag and refuses all
    /// commands until `reset_after_desync` runs.
    #[error("the core has halted after a fatal error and is awaiting reset")]
    CoreHalted,
}

impl CoreError {
    /// Fatal errors trip the facade's sticky `CoreHalted` flag; everything
    /// else is a plain recoverable failure.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CoreError::EscrowDesync
                | CoreError::IndexInvariantViolated
                | CoreError::DuplicateLedgerEvent
        )
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
