//! Stop-order trigger table
//!
//! Armed stops are keyed by (direction, stop price). After every trade the
//! engine drains the entries whose trigger condition is met by the last
//! trade price:
//!
//! - buy-stops fire when `last ≥ stop_price`, activated ascending by stop
//!   price
//! - sell-stops fire when `last ≤ stop_price`, activated descending by stop
//!   price
//!
//! Ties within a stop price activate by ascending order id.

use std::collections::{BTreeMap, BTreeSet};

use types::ids::OrderId;
use types::numeric::Price;
use types::order::Side;

#[derive(Debug, Clone, Default)]
pub struct StopBook {
    buy: BTreeMap<Price, BTreeSet<OrderId>>,
    sell: BTreeMap<Price, BTreeSet<OrderId>>,
}

impl StopBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm a stop order
    pub fn insert(&mut self, side: Side, stop_price: Price, order_id: OrderId) {
        let table = match side {
            Side::Buy => &mut self.buy,
            Side::Sell => &mut self.sell,
        };
        table.entry(stop_price).or_default().insert(order_id);
    }

    /// Disarm a stop order; true if it was armed
    pub fn remove(&mut self, side: Side, stop_price: Price, order_id: OrderId) -> bool {
        let table = match side {
            Side::Buy => &mut self.buy,
            Side::Sell => &mut self.sell,
        };
        let Some(ids) = table.get_mut(&stop_price) else {
            return false;
        };
        let removed = ids.remove(&order_id);
        if ids.is_empty() {
            table.remove(&stop_price);
        }
        removed
    }

    /// Drain every stop triggered by `last`, in activation order: buy-stops
    /// ascending then sell-stops descending, ids ascending within a price.
    pub fn take_triggered(&mut self, last: Price) -> Vec<OrderId> {
        let mut triggered = Vec::new();

        let buy_prices: Vec<Price> = self
            .buy
            .range(..=last)
            .map(|(price, _)| *price)
            .collect();
        for price in buy_prices {
            if let Some(ids) = self.buy.remove(&price) {
                triggered.extend(ids);
            }
        }

        let sell_prices: Vec<Price> = self
            .sell
            .range(last..)
            .map(|(price, _)| *price)
            .rev()
            .collect();
        for price in sell_prices {
            if let Some(ids) = self.sell.remove(&price) {
                triggered.extend(ids);
            }
        }

        triggered
    }

    /// Number of armed stops across both directions
    pub fn len(&self) -> usize {
        self.buy.values().map(BTreeSet::len).sum::<usize>()
            + self.sell.values().map(BTreeSet::len).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.buy.is_empty() && self.sell.is_empty()
    }
}
