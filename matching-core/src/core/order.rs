use crate::core::error::InputError;
use crate::core::types::{Order, OrderId};
use std::collections::HashMap;

/// Content-addressable store of active orders, keyed by order id.
///
/// Mutated only through the single-threaded `CoreFacade` (§5), so a plain
/// `HashMap` under `&mut self` is sufficient; no interior mutability or
/// atomics are required the way they would be for a book shared across
/// matching threads.
#[derive(Default)]
pub struct OrderStore {
    orders: HashMap<OrderId, Order>,
}

impl OrderStore {
    pub fn new() -> Self {
        Self {
            orders: HashMap::new(),
        }
    }

    /// Inserts a brand-new order. Fails if `order.id` is already present.
    pub fn insert(&mut self, order: Order) -> Result<(), InputError> {
        if self.orders.contains_key(&order.id) {
            return Err(InputError::DuplicateOrder(order.id));
        }
        self.orders.insert(order.id, order);
        Ok(())
    }

    pub fn get(&self, order_id: OrderId) -> Result<&Order, InputError> {
        self.orders
            .get(&order_id)
            .ok_or(InputError::UnknownOrder(order_id))
    }

    pub fn get_mut(&mut self, order_id: OrderId) -> Result<&mut Order, InputError> {
        self.orders
            .get_mut(&order_id)
            .ok_or(InputError::UnknownOrder(order_id))
    }

    pub fn contains(&self, order_id: OrderId) -> bool {
        self.orders.contains_key(&order_id)
    }

    /// Applies a checked mutation, then recomputes `status` from
    /// `filled`/`quantity` so invariants (1)-(2) of the data model always
    /// hold after a successful call.
    pub fn mutate<F, R>(&mut self, order_id: OrderId, f: F) -> Result<R, InputError>
    where
        F: FnOnce(&mut Order) -> R,
    {
        let order = self.get_mut(order_id)?;
        let result = f(order);
        order.refresh_status();
        debug_assert!(order.filled <= order.quantity);
        Ok(result)
    }

    /// Removes and returns the order, for terminal (Filled/Cancelled)
    /// records about to be dropped from the working set.
    pub fn remove(&mut self, order_id: OrderId) -> Result<Order, InputError> {
        self.orders
            .remove(&order_id)
            .ok_or(InputError::UnknownOrder(order_id))
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    /// Snapshot iteration over every order currently held, live or
    /// terminal-but-not-yet-evicted. Used by auditors and property tests
    /// that need to check a whole-store invariant rather than a single
    /// order's.
    pub fn iter(&self) -> impl Iterator<Item = &Order> {
        self.orders.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{OrderStatus, Side};

    fn order(id: OrderId, quantity: u64) -> Order {
        Order {
            id,
            owner: 1,
            pair_id: 1,
            side: Side::Buy,
            tick_lower: 0,
            tick_upper: 10,
            limit_price: 100,
            quantity,
            filled: 0,
            escrow_amount: 0,
            escrow_released: 0,
            created_at: 1,
            status: OrderStatus::Active,
        }
    }

    #[test]
    fn insert_then_get() {
        let mut store = OrderStore::new();
        store.insert(order(1, 10)).unwrap();
        assert_eq!(store.get(1).unwrap().quantity, 10);
    }

    #[test]
    fn duplicate_insert_fails() {
        let mut store = OrderStore::new();
        store.insert(order(1, 10)).unwrap();
        assert!(matches!(
            store.insert(order(1, 5)),
            Err(InputError::DuplicateOrder(1))
        ));
    }

    #[test]
    fn mutate_recomputes_status() {
        let mut store = OrderStore::new();
        store.insert(order(1, 10)).unwrap();
        store
            .mutate(1, |o| {
                o.filled = 10;
            })
            .unwrap();
        assert_eq!(store.get(1).unwrap().status, OrderStatus::Filled);
    }

    #[test]
    fn unknown_order_errors() {
        let store = OrderStore::new();
        assert!(matches!(
            store.get(42),
            Err(InputError::UnknownOrder(42))
        ));
    }

    #[test]
    fn remove_returns_terminal_record() {
        let mut store = OrderStore::new();
        store.insert(order(1, 10)).unwrap();
        let removed = store.remove(1).unwrap();
        assert_eq!(removed.id, 1);
        assert!(!store.contains(1));
    }
}
