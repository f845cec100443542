//! Ask (sell-side) book: price levels matched lowest price first
//!
//! Backed by a `BTreeMap` so iteration order is deterministic.

use std::collections::BTreeMap;
use types::ids::{AccountId, OrderId};
use types::numeric::{Price, Quantity};

use super::price_level::PriceLevel;

#[derive(Debug, Clone, Default)]
pub struct AskBook {
    levels: BTreeMap<Price, PriceLevel>,
}

impl AskBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, price: Price, order_id: OrderId, account_id: AccountId, remaining: Quantity) {
        self.levels
            .entry(price)
            .or_default()
            .push_back(order_id, account_id, remaining);
    }

    /// Remove an order resting at `price`, returning its remaining quantity
    pub fn remove(&mut self, order_id: OrderId, price: Price) -> Option<Quantity> {
        let level = self.levels.get_mut(&price)?;
        let remaining = level.remove(order_id)?;
        if level.is_empty() {
            self.levels.remove(&price);
        }
        Some(remaining)
    }

    /// Lowest ask price and its resting quantity
    pub fn best(&self) -> Option<(Price, Quantity)> {
        self.levels
            .iter()
            .next()
            .map(|(price, level)| (*price, level.total_quantity()))
    }

    /// Mutable access to the best level
    pub(crate) fn best_level_mut(&mut self) -> Option<(Price, &mut PriceLevel)> {
        self.levels
            .iter_mut()
            .next()
            .map(|(price, level)| (*price, level))
    }

    /// Drop the best level if it has emptied out
    pub(crate) fn prune_best(&mut self) {
        if let Some((price, level)) = self.levels.iter().next() {
            if level.is_empty() {
                let price = *price;
                self.levels.remove(&price);
            }
        }
    }

    /// Levels in matching priority order (lowest price first)
    pub fn levels(&self) -> impl Iterator<Item = (Price, &PriceLevel)> {
        self.levels.iter().map(|(price, level)| (*price, level))
    }

    /// Top-N aggregated levels, best first
    pub fn depth(&self, depth: usize) -> Vec<(Price, Quantity)> {
        self.levels()
            .take(depth)
            .map(|(price, level)| (price, level.total_quantity()))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }
}
