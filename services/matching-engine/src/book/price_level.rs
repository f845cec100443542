//! Price level with a FIFO queue
//!
//! A price level holds every resting order at one price point, in strict
//! arrival order. Because the engine is a single writer, arrival order and
//! ascending order id coincide, which is exactly the tie-break the matching
//! algorithm requires.

use std::collections::VecDeque;
use types::ids::{AccountId, OrderId};
use types::numeric::Quantity;

/// Entry in the price level queue
#[derive(Debug, Clone)]
pub struct LevelEntry {
    pub order_id: OrderId,
    pub account_id: AccountId,
    pub remaining: Quantity,
}

/// All orders resting at one price, FIFO
#[derive(Debug, Clone, Default)]
pub struct PriceLevel {
    orders: VecDeque<LevelEntry>,
    total: Quantity,
}

impl PriceLevel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an order at the back of the queue (time priority)
    pub fn push_back(&mut self, order_id: OrderId, account_id: AccountId, remaining: Quantity) {
        self.orders.push_back(LevelEntry {
            order_id,
            account_id,
            remaining,
        });
        self.total = self.total + remaining;
    }

    /// Remove an order by id, returning its remaining quantity
    pub fn remove(&mut self, order_id: OrderId) -> Option<Quantity> {
        let position = self.orders.iter().position(|e| e.order_id == order_id)?;
        let entry = self.orders.remove(position)?;
        self.total = self.total.saturating_sub(entry.remaining);
        Some(entry.remaining)
    }

    /// Front of the queue without removing it
    pub fn front(&self) -> Option<&LevelEntry> {
        self.orders.front()
    }

    /// Reduce the front order's remaining by `qty`, popping it when it
    /// reaches zero. Returns the front order id and whether it was popped.
    ///
    /// # Panics
    /// Panics if the level is empty or `qty` exceeds the front remaining.
    pub fn reduce_front(&mut self, qty: Quantity) -> (OrderId, bool) {
        let entry = self.orders.front_mut().expect("reduce_front on empty level");
        assert!(
            qty.as_decimal() <= entry.remaining.as_decimal(),
            "reduce_front exceeds front remaining"
        );
        entry.remaining = entry.remaining - qty;
        self.total = self.total.saturating_sub(qty);
        let order_id = entry.order_id;
        if entry.remaining.is_zero() {
            self.orders.pop_front();
            (order_id, true)
        } else {
            (order_id, false)
        }
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    /// Total resting quantity at this level
    pub fn total_quantity(&self) -> Quantity {
        self.total
    }

    pub fn order_count(&self) -> usize {
        self.orders.len()
    }
}
