use crate::core::types::{BucketKey, Order, OrderId, PairId, Side, Tick};
use crossbeam::epoch;
use crossbeam::epoch::default_collector;
use crossbeam_skiplist::SkipList;
use std::collections::{BTreeMap, BTreeSet};

/// For a single `(pair_id, tick)`, the live buy/sell order ids resting at
/// that tick, each kept in ascending `(created_at, order_id)` order.
///
/// A skip list is used for the same reason the matching engine this core
/// descends from uses one for its price-ordered book: cheap ordered
/// insertion/removal and restartable forward iteration, without needing
/// to re-sort on every mutation.
pub struct TickBucket {
    pub buy_ids: SkipList<BucketKey, OrderId>,
    pub sell_ids: SkipList<BucketKey, OrderId>,
    buy_count: usize,
    sell_count: usize,
}

impl TickBucket {
    fn new() -> Self {
        let collector = default_collector().clone();
        Self {
            buy_ids: SkipList::new(collector.clone()),
            sell_ids: SkipList::new(collector),
            buy_count: 0,
            sell_count: 0,
        }
    }

    fn side_list(&self, side: Side) -> &SkipList<BucketKey, OrderId> {
        match side {
            Side::Buy => &self.buy_ids,
            Side::Sell => &self.sell_ids,
        }
    }

    fn insert(&mut self, side: Side, key: BucketKey) {
        let guard = &epoch::pin();
        self.side_list(side).get_or_insert(key, key.order_id, guard);
        match side {
            Side::Buy => self.buy_count += 1,
            Side::Sell => self.sell_count += 1,
        }
    }

    /// Returns `true` if the key was present and removed.
    fn remove(&mut self, side: Side, key: BucketKey) -> bool {
        let guard = &epoch::pin();
        let removed = self.side_list(side).remove(&key, guard).is_some();
        if removed {
            match side {
                Side::Buy => self.buy_count -= 1,
                Side::Sell => self.sell_count -= 1,
            }
        }
        removed
    }

    pub fn buy_count(&self) -> usize {
        self.buy_count
    }

    pub fn sell_count(&self) -> usize {
        self.sell_count
    }

    pub fn is_empty(&self) -> bool {
        self.buy_count == 0 && self.sell_count == 0
    }
}

/// Secondary index mapping `(pair, tick)` to buy/sell order-id sets.
///
/// Structured as a two-level map (`pair_id -> tick -> TickBucket`) rather
/// than a single map keyed by a hash of `(pair, tick)`: the core never
/// folds the pair and tick into one opaque key, which removes an entire
/// class of hash-collision bugs the contract this core descends from had
/// to audit for.
#[derive(Default)]
pub struct TickIndex {
    pairs: BTreeMap<PairId, BTreeMap<Tick, TickBucket>>,
}

impl TickIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Indexes a live order under every tick in `[tick_lower, tick_upper)`.
    pub fn insert_order(&mut self, order: &Order) {
        let key = BucketKey {
            created_at: order.created_at,
            order_id: order.id,
        };
        let buckets = self.pairs.entry(order.pair_id).or_default();
        for tick in order.tick_lower..order.tick_upper {
            buckets.entry(tick).or_insert_with(TickBucket::new).insert(order.side, key);
        }
    }

    /// Removes an order from every tick in its range, pruning any bucket
    /// left empty on both sides.
    pub fn remove_order(&mut self, order: &Order) {
        let key = BucketKey {
            created_at: order.created_at,
            order_id: order.id,
        };
        let Some(buckets) = self.pairs.get_mut(&order.pair_id) else {
            return;
        };
        for tick in order.tick_lower..order.tick_upper {
            if let Some(bucket) = buckets.get_mut(&tick) {
                bucket.remove(order.side, key);
                if bucket.is_empty() {
                    buckets.remove(&tick);
                }
            }
        }
        if buckets.is_empty() {
            self.pairs.remove(&order.pair_id);
        }
    }

    /// Ascending-tick iterator over the buckets of one pair.
    pub fn iter_buckets(&self, pair_id: PairId) -> impl Iterator<Item = (Tick, &TickBucket)> {
        self.pairs
            .get(&pair_id)
            .into_iter()
            .flat_map(|buckets| buckets.iter().map(|(tick, bucket)| (*tick, bucket)))
    }

    pub fn bucket(&self, pair_id: PairId, tick: Tick) -> Option<&TickBucket> {
        self.pairs.get(&pair_id)?.get(&tick)
    }

    /// Live buy order ids whose tick range intersects `[tick_lower,
    /// tick_upper)`, visited at most once, ascending `(created_at,
    /// order_id)`.
    pub fn buy_orders_overlapping(
        &self,
        pair_id: PairId,
        tick_lower: Tick,
        tick_upper: Tick,
    ) -> Vec<OrderId> {
        self.overlapping(pair_id, tick_lower, tick_upper, Side::Buy)
    }

    /// Symmetric to [`Self::buy_orders_overlapping`] for sell orders.
    pub fn sell_orders_overlapping(
        &self,
        pair_id: PairId,
        tick_lower: Tick,
        tick_upper: Tick,
    ) -> Vec<OrderId> {
        self.overlapping(pair_id, tick_lower, tick_upper, Side::Sell)
    }

    fn overlapping(
        &self,
        pair_id: PairId,
        tick_lower: Tick,
        tick_upper: Tick,
        side: Side,
    ) -> Vec<OrderId> {
        let mut seen: BTreeSet<BucketKey> = BTreeSet::new();
        if let Some(buckets) = self.pairs.get(&pair_id) {
            let guard = &epoch::pin();
            for (_, bucket) in buckets.range(tick_lower..tick_upper) {
                let list = bucket.side_list(side);
                for entry in list.iter(guard) {
                    seen.insert(*entry.key());
                }
            }
        }
        seen.into_iter().map(|key| key.order_id).collect()
    }
}
