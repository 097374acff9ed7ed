use mimalloc::MiMalloc;

/// Global allocator.
///
/// Requires the `mimalloc` feature to be enabled in the `Cargo.toml` file.
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// OrderId is the opaque, submitter-supplied identifier for an order.
pub type OrderId = u64;

/// Owner is an opaque principal identifier (an account/wallet handle).
pub type Owner = u64;

/// TokenId is an opaque identifier for a base or quote token.
pub type TokenId = u64;

/// PairId identifies a registered token pair.
pub type PairId = u64;

/// Tick is an integer index into a pair's price lattice.
pub type Tick = u64;

/// Price is expressed in basis points of the quote currency
/// (1 quote unit = 10,000 bp).
pub type BasisPoints = u64;

/// Quantity is expressed in base-token smallest units.
pub type Quantity = u64;

/// Monotonic microsecond timestamp, supplied by the host.
pub type Timestamp = u64;

/// One quote unit, in basis points.
pub const BP_DENOMINATOR: u64 = 10_000;

/// Default matcher fee, in basis points of the quote amount.
pub const DEFAULT_MATCHER_FEE_BPS: u64 = 5;

/// Default trading fee, in basis points. Accounted for here only as a
/// documented constant: the ledger collaborator is solely responsible
/// for deducting it.
pub const DEFAULT_TRADING_FEE_BPS: u64 = 10;

/// Side indicates the direction of an order.
#[derive(PartialEq, Eq, Default, Copy, Clone, Debug, Hash)]
pub enum Side {
    /// Buy means the user wants to acquire the base asset.
    #[default]
    Buy,
    /// Sell means the user wants to dispose of the base asset.
    Sell,
}

impl Side {
    /// The side that must be walked to find counterparties for `self`.
    #[inline(always)]
    pub fn opposite(self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

/// OrderStatus represents the current lifecycle state of an order.
#[derive(PartialEq, Eq, Default, Clone, Copy, Debug)]
pub enum OrderStatus {
    /// No quantity has been filled yet.
    #[default]
    Active,
    /// Some, but not all, quantity has been filled.
    PartiallyFilled,
    /// `filled == quantity`; terminal.
    Filled,
    /// Cancelled by the owner or by the facade; terminal.
    Cancelled,
}

impl OrderStatus {
    /// Terminal statuses are never re-indexed or matched again.
    #[inline(always)]
    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Filled | OrderStatus::Cancelled)
    }
}

/// Checked `a * b / denom`, widened to `u128` to avoid overflow on the
/// multiplication and checked on narrowing back to `u64`.
///
/// Returns `None` if `denom == 0` or if the result does not fit in a `u64`.
#[inline]
pub fn mul_div_u64(a: u64, b: u64, denom: u64) -> Option<u64> {
    if denom == 0 {
        return None;
    }
    let wide = (a as u128) * (b as u128) / (denom as u128);
    u64::try_from(wide).ok()
}

/// A registered token pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pair {
    pub pair_id: PairId,
    pub base_token_id: TokenId,
    pub quote_token_id: TokenId,
    pub tick_size: BasisPoints,
    pub max_tick_range: u64,
    pub active: bool,
}

impl Pair {
    /// Lower-bound price, in basis points, of the given tick.
    #[inline(always)]
    pub fn tick_lower_price(&self, tick: Tick) -> BasisPoints {
        tick * self.tick_size
    }

    /// Upper-bound (exclusive) price, in basis points, of the given tick.
    #[inline(always)]
    pub fn tick_upper_price(&self, tick: Tick) -> BasisPoints {
        (tick + 1) * self.tick_size
    }
}

/// A single order resting in, or passing through, the matching core.
#[derive(Debug, Clone)]
pub struct Order {
    pub id: OrderId,
    pub owner: Owner,
    pub pair_id: PairId,
    pub side: Side,
    pub tick_lower: Tick,
    pub tick_upper: Tick,
    pub limit_price: BasisPoints,
    pub quantity: Quantity,
    pub filled: Quantity,
    pub escrow_amount: u64,
    /// Cumulative amount already released from `EscrowLedger` across all
    /// fills so far. Kept distinct from `escrow_amount` (the original
    /// commitment) so a terminal order's final leftover release is
    /// `escrow_amount - escrow_released`, correct even after several
    /// partial fills each releasing a different amount.
    pub escrow_released: u64,
    pub created_at: Timestamp,
    pub status: OrderStatus,
}

impl Order {
    /// Quantity not yet filled.
    #[inline(always)]
    pub fn remaining(&self) -> Quantity {
        self.quantity - self.filled
    }

    /// True if the order is still eligible to rest in the book or be matched.
    #[inline(always)]
    pub fn is_live(&self) -> bool {
        !self.status.is_terminal()
    }

    /// Recomputes `status` from `filled`/`quantity`, preserving `Cancelled`.
    pub(crate) fn refresh_status(&mut self) {
        if self.status == OrderStatus::Cancelled {
            return;
        }
        self.status = if self.filled == self.quantity {
            OrderStatus::Filled
        } else if self.filled == 0 {
            OrderStatus::Active
        } else {
            OrderStatus::PartiallyFilled
        };
    }

    /// Escrow committed for this order that has not yet been released
    /// against a fill.
    #[inline(always)]
    pub fn residual_escrow(&self) -> u64 {
        self.escrow_amount.saturating_sub(self.escrow_released)
    }

    /// The escrow amount owed for a would-be order with these parameters,
    /// per side (buy escrows quote, sell escrows base).
    pub fn required_escrow(
        side: Side,
        limit_price: BasisPoints,
        quantity: Quantity,
    ) -> Option<u64> {
        match side {
            Side::Buy => mul_div_u64(quantity, limit_price, BP_DENOMINATOR),
            Side::Sell => Some(quantity),
        }
    }
}

/// Ordering key used inside a [`crate::core::tick_index::TickBucket`]'s
/// per-side skip list: ascending `created_at`, tie-broken by ascending
/// `order_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BucketKey {
    pub created_at: Timestamp,
    pub order_id: OrderId,
}

/// A settlement proposal, speculative until acknowledged by the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettlementProposal {
    pub buy_id: OrderId,
    pub sell_id: OrderId,
    pub fill_qty: Quantity,
    pub exec_price: BasisPoints,
    pub base_amount: Quantity,
    pub quote_amount: u64,
    pub matcher_fee: u64,
    pub proposed_at: Timestamp,
}

impl SettlementProposal {
    /// Builds a proposal from the two crossing orders, a tentative fill
    /// quantity and the midpoint execution price.
    pub fn build(
        buy_id: OrderId,
        sell_id: OrderId,
        fill_qty: Quantity,
        exec_price: BasisPoints,
        matcher_fee_bps: u64,
        proposed_at: Timestamp,
    ) -> Option<SettlementProposal> {
        let quote_amount = mul_div_u64(fill_qty, exec_price, BP_DENOMINATOR)?;
        let matcher_fee = mul_div_u64(quote_amount, matcher_fee_bps, BP_DENOMINATOR)?;
        Some(SettlementProposal {
            buy_id,
            sell_id,
            fill_qty,
            exec_price,
            base_amount: fill_qty,
            quote_amount,
            matcher_fee,
            proposed_at,
        })
    }
}

/// Truncating midpoint of two crossing limit prices.
#[inline(always)]
pub fn midpoint_price(buy_price: BasisPoints, sell_price: BasisPoints) -> BasisPoints {
    (buy_price + sell_price) / 2
}

/// A candidate crossing pair discovered by the scanner, not yet
/// re-validated by the settlement engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchCandidate {
    pub buy_id: OrderId,
    pub sell_id: OrderId,
    pub overlap_low: Tick,
    pub overlap_high: Tick,
    pub projected_fill: Quantity,
    pub projected_price: BasisPoints,
    pub score: u128,
}
