use crate::core::order::OrderStore;
use crate::core::tick_index::TickIndex;
use crate::core::types::{MatchCandidate, Pair};
use crate::core::validator::{check_match, overlap_range};
use crossbeam::epoch;
use std::collections::HashSet;

/// Traverses the [`TickIndex`] for one pair and produces a finite,
/// restartable, profitability-ordered sequence of candidate crossings.
///
/// A scan never mutates `OrderStore`/`TickIndex`; it only reads them, so
/// cancelling between scans (or even mid-scan, since each call to
/// [`MatchScanner::scan`] completes in one pass) never leaves either
/// structure in an inconsistent state.
pub struct MatchScanner;

impl MatchScanner {
    /// Produces candidates for `pair_id`, in descending `score` order,
    /// ties broken by ascending `(buy.created_at, sell.created_at)`.
    ///
    /// Each `(buy_id, sell_id)` pair is emitted at most once even though
    /// it may be discoverable through several overlapping buckets.
    pub fn scan(pair: &Pair, orders: &OrderStore, index: &TickIndex) -> Vec<MatchCandidate> {
        let mut visited: HashSet<(u64, u64)> = HashSet::new();
        let mut candidates = Vec::new();

        for (_, bucket) in index.iter_buckets(pair.pair_id) {
            if bucket.buy_count() == 0 || bucket.sell_count() == 0 {
                continue;
            }
            let guard = &epoch::pin();
            let buy_ids: Vec<u64> = bucket.buy_ids.iter(guard).map(|e| *e.value()).collect();
            let sell_ids: Vec<u64> = bucket.sell_ids.iter(guard).map(|e| *e.value()).collect();
            for &buy_id in &buy_ids {
                for &sell_id in &sell_ids {
                    if !visited.insert((buy_id, sell_id)) {
                        continue;
                    }
                    let (Ok(buy), Ok(sell)) = (orders.get(buy_id), orders.get(sell_id)) else {
                        continue;
                    };
                    if check_match(buy, sell, pair).is_err() {
                        continue;
                    }
                    let Some((overlap_low, overlap_high)) = overlap_range(buy, sell) else {
                        continue;
                    };
                    let projected_fill = buy.remaining().min(sell.remaining());
                    let projected_price =
                        crate::core::types::midpoint_price(buy.limit_price, sell.limit_price);
                    let score = (buy.limit_price as u128 - sell.limit_price as u128)
                        * projected_fill as u128;
                    candidates.push(MatchCandidate {
                        buy_id,
                        sell_id,
                        overlap_low,
                        overlap_high,
                        projected_fill,
                        projected_price,
                        score,
                    });
                }
            }
        }

        candidates.sort_by(|a, b| {
            b.score.cmp(&a.score).then_with(|| {
                let a_created = orders.get(a.buy_id).map(|o| o.created_at).unwrap_or(0);
                let b_created = orders.get(b.buy_id).map(|o| o.created_at).unwrap_or(0);
                a_created.cmp(&b_created).then_with(|| {
                    let a_sell = orders.get(a.sell_id).map(|o| o.created_at).unwrap_or(0);
                    let b_sell = orders.get(b.sell_id).map(|o| o.created_at).unwrap_or(0);
                    a_sell.cmp(&b_sell)
                })
            })
        });

        candidates
    }

    /// Convenience used by the facade: scan and immediately cap to
    /// `budget` candidates.
    pub fn scan_capped(
        pair: &Pair,
        orders: &OrderStore,
        index: &TickIndex,
        budget: usize,
    ) -> Vec<MatchCandidate> {
        let mut candidates = Self::scan(pair, orders, index);
        candidates.truncate(budget);
        candidates
    }
}
