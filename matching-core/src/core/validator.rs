use crate::core::error::{InputError, MatchRejection};
use crate::core::types::{BasisPoints, Order, Pair, Quantity, Side, Tick, midpoint_price};

/// Pure, side-effect-free order submission checks.
///
/// `side` is accepted (rather than inferred) so the caller never has to
/// construct a throwaway `Order` just to validate one.
pub fn check_submission(
    pair: &Pair,
    _side: Side,
    tick_lower: Tick,
    tick_upper: Tick,
    limit_price: BasisPoints,
    quantity: Quantity,
) -> Result<(), InputError> {
    if tick_lower >= tick_upper {
        return Err(InputError::InvalidTickRange {
            tick_lower,
            tick_upper,
        });
    }
    if tick_upper - tick_lower > pair.max_tick_range {
        return Err(InputError::TickRangeExceedsMax);
    }
    if limit_price < pair.tick_lower_price(tick_lower) || limit_price > pair.tick_upper_price(tick_upper) {
        return Err(InputError::PriceOutsideTicks);
    }
    if quantity == 0 {
        return Err(InputError::NonPositiveQuantity);
    }
    if !pair.active {
        return Err(InputError::PairInactive(pair.pair_id));
    }
    Ok(())
}

/// The tick interval in which both orders' ranges overlap, or `None` if
/// they do not overlap at all.
pub fn overlap_range(buy: &Order, sell: &Order) -> Option<(Tick, Tick)> {
    let low = buy.tick_lower.max(sell.tick_lower);
    let high = buy.tick_upper.min(sell.tick_upper);
    if low < high { Some((low, high)) } else { None }
}

/// Checks whether `buy` and `sell` may legally cross right now.
///
/// Pure: does not mutate either order or consult external state beyond
/// the two orders and their shared pair.
pub fn check_match(buy: &Order, sell: &Order, pair: &Pair) -> Result<(), MatchRejection> {
    if buy.pair_id != pair.pair_id || sell.pair_id != pair.pair_id || buy.pair_id != sell.pair_id {
        return Err(MatchRejection::DifferentPairs);
    }
    if buy.owner == sell.owner {
        return Err(MatchRejection::SameOwner);
    }
    if buy.limit_price < sell.limit_price {
        return Err(MatchRejection::PricesDoNotCross);
    }
    if !buy.is_live() || !sell.is_live() || buy.remaining() == 0 || sell.remaining() == 0 {
        return Err(MatchRejection::EitherAlreadyFilled);
    }
    let Some((low, high)) = overlap_range(buy, sell) else {
        return Err(MatchRejection::NoTickOverlap);
    };
    let exec_price = midpoint_price(buy.limit_price, sell.limit_price);
    let low_price = pair.tick_lower_price(low);
    let high_price = pair.tick_upper_price(high - 1);
    if exec_price < low_price || exec_price > high_price {
        return Err(MatchRejection::OverlapPriceOutOfBounds);
    }
    Ok(())
}
