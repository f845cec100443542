//! Per-market order book
//!
//! Two price-ordered sides plus an `order_id → (side, price)` index so
//! cancellation does not scan levels. The index and the sides must agree at
//! all times; a disagreement is book corruption and fatal to the engine.

mod ask_book;
mod bid_book;
mod price_level;

pub use ask_book::AskBook;
pub use bid_book::BidBook;
pub use price_level::{LevelEntry, PriceLevel};

use std::collections::HashMap;

use types::errors::FatalError;
use types::ids::OrderId;
use types::numeric::{Price, Quantity};
use types::order::{Order, Side};

use crate::matching::crossing;

/// Aggregated top-of-book view for market data
#[derive(Debug, Clone, PartialEq)]
pub struct BookSnapshot {
    /// Best bid first
    pub bids: Vec<(Price, Quantity)>,
    /// Best ask first
    pub asks: Vec<(Price, Quantity)>,
}

/// Resting-order store for one market
#[derive(Debug, Clone, Default)]
pub struct OrderBook {
    bids: BidBook,
    asks: AskBook,
    index: HashMap<OrderId, (Side, Price)>,
}

impl OrderBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rest an order on its side
    ///
    /// # Panics
    /// Panics if the order has no price (market orders never rest)
    pub fn insert(&mut self, order: &Order) {
        let price = order.price.expect("resting order requires a price");
        match order.side {
            Side::Buy => self.bids.insert(price, order.id, order.account_id, order.remaining()),
            Side::Sell => self.asks.insert(price, order.id, order.account_id, order.remaining()),
        }
        self.index.insert(order.id, (order.side, price));
    }

    /// Remove a resting order via the index.
    ///
    /// Returns the removed remaining quantity, `None` if the order is not
    /// resting, or a fatal error if the index and the sides disagree.
    pub fn remove(&mut self, order_id: OrderId) -> Result<Option<Quantity>, FatalError> {
        let Some((side, price)) = self.index.remove(&order_id) else {
            return Ok(None);
        };
        let removed = match side {
            Side::Buy => self.bids.remove(order_id, price),
            Side::Sell => self.asks.remove(order_id, price),
        };
        match removed {
            Some(remaining) => Ok(Some(remaining)),
            None => Err(FatalError::BookIndexCorruption { order_id }),
        }
    }

    /// Whether the order is currently resting
    pub fn contains(&self, order_id: OrderId) -> bool {
        self.index.contains_key(&order_id)
    }

    /// Best bid (highest buy price)
    pub fn best_bid(&self) -> Option<(Price, Quantity)> {
        self.bids.best()
    }

    /// Best ask (lowest sell price)
    pub fn best_ask(&self) -> Option<(Price, Quantity)> {
        self.asks.best()
    }

    /// Front order of the best level on the side opposing `taker_side`
    pub fn peek_opposite(&self, taker_side: Side) -> Option<(Price, LevelEntry)> {
        let mut levels: Box<dyn Iterator<Item = (Price, &PriceLevel)>> = match taker_side {
            Side::Buy => Box::new(self.asks.levels()),
            Side::Sell => Box::new(self.bids.levels()),
        };
        levels
            .next()
            .and_then(|(price, level)| level.front().cloned().map(|e| (price, e)))
    }

    /// Reduce the front order of the best opposing level by `qty` after a
    /// fill, pruning the level and the index when the maker is exhausted.
    ///
    /// Returns the maker order id and whether it left the book.
    pub fn reduce_opposite_front(&mut self, taker_side: Side, qty: Quantity) -> (OrderId, bool) {
        let (order_id, popped) = match taker_side {
            Side::Buy => {
                let (_, level) = self.asks.best_level_mut().expect("no opposing level");
                let result = level.reduce_front(qty);
                self.asks.prune_best();
                result
            }
            Side::Sell => {
                let (_, level) = self.bids.best_level_mut().expect("no opposing level");
                let result = level.reduce_front(qty);
                self.bids.prune_best();
                result
            }
        };
        if popped {
            self.index.remove(&order_id);
        }
        (order_id, popped)
    }

    /// Quantity fillable for a taker at `limit` (None = market), capped at
    /// `target`. Used by the fill-or-kill pre-scan.
    pub fn fillable(&self, taker_side: Side, limit: Option<Price>, target: Quantity) -> Quantity {
        let mut filled = Quantity::zero();
        let levels: Box<dyn Iterator<Item = (Price, &PriceLevel)>> = match taker_side {
            Side::Buy => Box::new(self.asks.levels()),
            Side::Sell => Box::new(self.bids.levels()),
        };
        for (price, level) in levels {
            if !crossing::crosses(taker_side, limit, price) {
                break;
            }
            filled = filled + level.total_quantity();
            if filled.as_decimal() >= target.as_decimal() {
                return target;
            }
        }
        filled
    }

    /// Aggregated top-N levels per side
    pub fn snapshot(&self, depth: usize) -> BookSnapshot {
        BookSnapshot {
            bids: self.bids.depth(depth),
            asks: self.asks.depth(depth),
        }
    }
}
