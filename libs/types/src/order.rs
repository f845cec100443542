//! Order lifecycle types
//!
//! An order is created by the account service in `Pending` status, admitted
//! to the matching engine, and then owned by the engine until it reaches a
//! terminal status. Status transitions are monotonic:
//!
//! `pending → open → (partial)* → filled | canceled | rejected`
//!
//! Stop and stop-limit orders additionally visit `triggered` between `open`
//! and their post-activation states.

use crate::ids::{AccountId, LinkId, MarketId, OrderId, UserId};
use crate::numeric::{Price, Quantity};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Order side (buyer or seller)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// Get the opposite side
    pub fn opposite(&self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

/// Order kind. Composite behavior (OCO) is expressed through `link_id`,
/// not through a kind variant, so matching logic dispatches on kind alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderKind {
    Limit,
    Market,
    /// Becomes a market order when the stop price triggers
    Stop,
    /// Becomes a limit order at the configured price when triggered
    StopLimit,
}

impl OrderKind {
    /// Whether this kind requires a limit price
    pub fn requires_price(&self) -> bool {
        matches!(self, OrderKind::Limit | OrderKind::StopLimit)
    }

    /// Whether this kind requires a stop price
    pub fn requires_stop_price(&self) -> bool {
        matches!(self, OrderKind::Stop | OrderKind::StopLimit)
    }
}

/// Time-in-force policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeInForce {
    /// Good-Till-Cancel: rests until filled or explicitly canceled
    GTC,
    /// Immediate-Or-Cancel: match immediately, cancel the remainder
    IOC,
    /// Fill-Or-Kill: full match or reject entirely
    FOK,
}

/// Reasons an order was canceled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelReason {
    UserRequested,
    IocResidue,
    MarketNoLiquidity,
    /// The linked OCO leg filled (fully or partially)
    OcoLinkedFill,
    /// The linked OCO leg was canceled
    OcoLinkedCancel,
    AdminCancel,
}

/// Reasons an order was rejected at admission or by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    FokUnfillable,
    SizeBounds,
    TickViolation,
    MarketUnknown,
    AccountNotActive,
    InsufficientBalance,
    InvalidOrder,
}

/// Order status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum OrderStatus {
    /// Created and admitted, not yet processed by the engine
    Pending,
    /// Resting on the book (or armed, for stops) with no fills
    Open,
    /// Partially matched
    Partial,
    /// Stop trigger fired; transient state during activation
    Triggered,
    /// Completely matched (terminal)
    Filled,
    /// Canceled by user or system (terminal)
    Canceled(CancelReason),
    /// Failed validation or FOK pre-scan (terminal)
    Rejected(RejectReason),
}

impl OrderStatus {
    /// Check if status is terminal (no further transitions possible)
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Canceled(_) | OrderStatus::Rejected(_)
        )
    }

    /// Whether an order in this status can still rest on the book
    pub fn is_live(&self) -> bool {
        matches!(
            self,
            OrderStatus::Pending | OrderStatus::Open | OrderStatus::Partial | OrderStatus::Triggered
        )
    }
}

/// Parameters supplied by the caller when placing an order.
///
/// The account service validates these, assigns ids, and turns them into an
/// [`Order`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub market: MarketId,
    pub side: Side,
    pub kind: OrderKind,
    pub time_in_force: TimeInForce,
    pub price: Option<Price>,
    pub stop_price: Option<Price>,
    pub amount: Quantity,
    /// Quote budget for market buys, which have no limit price to size the
    /// reservation from. Required for `kind == Market && side == Buy`.
    pub max_quote: Option<Decimal>,
}

impl OrderRequest {
    /// Plain GTC limit order
    pub fn limit(market: MarketId, side: Side, price: Price, amount: Quantity) -> Self {
        Self {
            market,
            side,
            kind: OrderKind::Limit,
            time_in_force: TimeInForce::GTC,
            price: Some(price),
            stop_price: None,
            amount,
            max_quote: None,
        }
    }

    /// Limit order with an explicit time-in-force
    pub fn limit_with_tif(
        market: MarketId,
        side: Side,
        price: Price,
        amount: Quantity,
        time_in_force: TimeInForce,
    ) -> Self {
        Self {
            time_in_force,
            ..Self::limit(market, side, price, amount)
        }
    }

    /// Market order. Buys must provide `max_quote`.
    pub fn market(market: MarketId, side: Side, amount: Quantity, max_quote: Option<Decimal>) -> Self {
        Self {
            market,
            side,
            kind: OrderKind::Market,
            time_in_force: TimeInForce::IOC,
            price: None,
            stop_price: None,
            amount,
            max_quote,
        }
    }

    /// Stop order: market order armed at `stop_price`
    pub fn stop(
        market: MarketId,
        side: Side,
        stop_price: Price,
        amount: Quantity,
        max_quote: Option<Decimal>,
    ) -> Self {
        Self {
            market,
            side,
            kind: OrderKind::Stop,
            time_in_force: TimeInForce::GTC,
            price: None,
            stop_price: Some(stop_price),
            amount,
            max_quote,
        }
    }

    /// Stop-limit order: limit order at `price` armed at `stop_price`
    pub fn stop_limit(
        market: MarketId,
        side: Side,
        stop_price: Price,
        price: Price,
        amount: Quantity,
    ) -> Self {
        Self {
            market,
            side,
            kind: OrderKind::StopLimit,
            time_in_force: TimeInForce::GTC,
            price: Some(price),
            stop_price: Some(stop_price),
            amount,
            max_quote: None,
        }
    }
}

/// Complete order record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub account_id: AccountId,
    pub market: MarketId,
    pub side: Side,
    pub kind: OrderKind,
    pub time_in_force: TimeInForce,
    pub price: Option<Price>,
    pub stop_price: Option<Price>,
    pub amount: Quantity,
    pub filled: Quantity,
    pub max_quote: Option<Decimal>,
    pub link_id: Option<LinkId>,
    pub status: OrderStatus,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Order {
    /// Build a pending order from validated request parameters
    pub fn from_request(
        id: OrderId,
        user_id: UserId,
        account_id: AccountId,
        request: &OrderRequest,
        timestamp: i64,
    ) -> Self {
        Self {
            id,
            user_id,
            account_id,
            market: request.market.clone(),
            side: request.side,
            kind: request.kind,
            time_in_force: request.time_in_force,
            price: request.price,
            stop_price: request.stop_price,
            amount: request.amount,
            filled: Quantity::zero(),
            max_quote: request.max_quote,
            link_id: None,
            status: OrderStatus::Pending,
            created_at: timestamp,
            updated_at: timestamp,
        }
    }

    /// Unfilled quantity
    pub fn remaining(&self) -> Quantity {
        self.amount.saturating_sub(self.filled)
    }

    /// Check if order is completely filled
    pub fn is_filled(&self) -> bool {
        self.filled == self.amount
    }

    /// Check if order has any fills
    pub fn has_fills(&self) -> bool {
        !self.filled.is_zero()
    }

    /// Record a fill and advance status
    ///
    /// # Panics
    /// Panics if the fill would exceed the order amount
    pub fn fill(&mut self, quantity: Quantity, timestamp: i64) {
        let new_filled = self.filled + quantity;
        assert!(
            new_filled.as_decimal() <= self.amount.as_decimal(),
            "fill would exceed order amount"
        );
        self.filled = new_filled;
        self.status = if self.is_filled() {
            OrderStatus::Filled
        } else {
            OrderStatus::Partial
        };
        self.updated_at = timestamp;
    }

    /// Mark the order as resting on the book
    pub fn open(&mut self, timestamp: i64) {
        if !self.has_fills() {
            self.status = OrderStatus::Open;
        }
        self.updated_at = timestamp;
    }

    /// Activate a triggered stop: the order converts to the kind it was
    /// armed for and re-enters matching.
    ///
    /// # Panics
    /// Panics if the order is not a stop or stop-limit
    pub fn activate(&mut self, timestamp: i64) {
        self.kind = match self.kind {
            OrderKind::Stop => OrderKind::Market,
            OrderKind::StopLimit => OrderKind::Limit,
            other => panic!("cannot activate non-stop order kind {other:?}"),
        };
        self.status = OrderStatus::Triggered;
        self.updated_at = timestamp;
    }

    /// Cancel the order
    ///
    /// # Panics
    /// Panics if the order is already in a terminal state
    pub fn cancel(&mut self, reason: CancelReason, timestamp: i64) {
        assert!(!self.status.is_terminal(), "cannot cancel terminal order");
        self.status = OrderStatus::Canceled(reason);
        self.updated_at = timestamp;
    }

    /// Reject the order
    pub fn reject(&mut self, reason: RejectReason, timestamp: i64) {
        self.status = OrderStatus::Rejected(reason);
        self.updated_at = timestamp;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn limit_order(amount: Quantity) -> Order {
        let request = OrderRequest::limit(
            MarketId::new("ALT/USDT"),
            Side::Buy,
            Price::from_u64(100),
            amount,
        );
        Order::from_request(OrderId(1), UserId(1), AccountId(1), &request, 1_700_000_000)
    }

    #[test]
    fn test_side_opposite() {
        assert_eq!(Side::Buy.opposite(), Side::Sell);
        assert_eq!(Side::Sell.opposite(), Side::Buy);
    }

    #[test]
    fn test_kind_price_requirements() {
        assert!(OrderKind::Limit.requires_price());
        assert!(OrderKind::StopLimit.requires_price());
        assert!(!OrderKind::Market.requires_price());
        assert!(OrderKind::Stop.requires_stop_price());
        assert!(!OrderKind::Limit.requires_stop_price());
    }

    #[test]
    fn test_order_fill_progression() {
        let mut order = limit_order(Quantity::new(dec!(1.0)));
        assert_eq!(order.status, OrderStatus::Pending);

        order.fill(Quantity::new(dec!(0.3)), 2);
        assert_eq!(order.status, OrderStatus::Partial);
        assert_eq!(order.remaining().as_decimal(), dec!(0.7));

        order.fill(Quantity::new(dec!(0.7)), 3);
        assert_eq!(order.status, OrderStatus::Filled);
        assert!(order.status.is_terminal());
    }

    #[test]
    #[should_panic(expected = "fill would exceed order amount")]
    fn test_order_overfill_panics() {
        let mut order = limit_order(Quantity::new(dec!(1.0)));
        order.fill(Quantity::new(dec!(1.5)), 2);
    }

    #[test]
    fn test_cancel_preserves_fills() {
        let mut order = limit_order(Quantity::new(dec!(2.0)));
        order.fill(Quantity::new(dec!(0.5)), 2);
        order.cancel(CancelReason::UserRequested, 3);
        assert_eq!(order.status, OrderStatus::Canceled(CancelReason::UserRequested));
        assert_eq!(order.filled.as_decimal(), dec!(0.5));
    }

    #[test]
    #[should_panic(expected = "cannot cancel terminal order")]
    fn test_cancel_terminal_panics() {
        let mut order = limit_order(Quantity::new(dec!(1.0)));
        order.fill(Quantity::new(dec!(1.0)), 2);
        order.cancel(CancelReason::UserRequested, 3);
    }

    #[test]
    fn test_stop_activation_converts_kind() {
        let request = OrderRequest::stop(
            MarketId::new("ALT/USDT"),
            Side::Buy,
            Price::from_u64(105),
            Quantity::from_u64(1),
            Some(dec!(200)),
        );
        let mut order =
            Order::from_request(OrderId(2), UserId(1), AccountId(1), &request, 1_700_000_000);
        order.open(1_700_000_001);
        order.activate(1_700_000_002);
        assert_eq!(order.kind, OrderKind::Market);
        assert_eq!(order.status, OrderStatus::Triggered);
    }

    #[test]
    fn test_status_serialization_carries_reason() {
        let status = OrderStatus::Canceled(CancelReason::IocResidue);
        let json = serde_json::to_string(&status).unwrap();
        assert!(json.contains("canceled"));
        assert!(json.contains("ioc_residue"));
    }
}
