//! Trade types
//!
//! A trade is the append-only record of one match between a resting maker
//! order and an incoming taker order. The execution price is always the
//! maker's price; price improvement accrues to the taker.

use crate::ids::{AccountId, MarketId, OrderId, TradeId};
use crate::numeric::{Price, Quantity};
use crate::order::Side;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One executed match. Fees are denominated in the asset each party
/// received: base for the buyer, quote for the seller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub id: TradeId,
    pub market: MarketId,
    pub maker_order_id: OrderId,
    pub taker_order_id: OrderId,
    pub maker_account_id: AccountId,
    pub taker_account_id: AccountId,
    /// Side of the incoming (taker) order
    pub taker_side: Side,
    pub price: Price,
    pub amount: Quantity,
    pub maker_fee: Decimal,
    pub taker_fee: Decimal,
    pub executed_at: i64,
}

impl Trade {
    /// Quote-asset value of the trade (price × amount)
    pub fn notional(&self) -> Decimal {
        self.amount * self.price
    }

    /// Account that bought the base asset
    pub fn buyer_account_id(&self) -> AccountId {
        match self.taker_side {
            Side::Buy => self.taker_account_id,
            Side::Sell => self.maker_account_id,
        }
    }

    /// Account that sold the base asset
    pub fn seller_account_id(&self) -> AccountId {
        match self.taker_side {
            Side::Buy => self.maker_account_id,
            Side::Sell => self.taker_account_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn trade(taker_side: Side) -> Trade {
        Trade {
            id: TradeId(1),
            market: MarketId::new("ALT/USDT"),
            maker_order_id: OrderId(10),
            taker_order_id: OrderId(11),
            maker_account_id: AccountId(1),
            taker_account_id: AccountId(2),
            taker_side,
            price: Price::from_u64(100),
            amount: Quantity::new(dec!(2.5)),
            maker_fee: dec!(0.25),
            taker_fee: dec!(0.5),
            executed_at: 1_700_000_000,
        }
    }

    #[test]
    fn test_notional() {
        assert_eq!(trade(Side::Buy).notional(), dec!(250));
    }

    #[test]
    fn test_buyer_seller_resolution() {
        let t = trade(Side::Buy);
        assert_eq!(t.buyer_account_id(), AccountId(2));
        assert_eq!(t.seller_account_id(), AccountId(1));

        let t = trade(Side::Sell);
        assert_eq!(t.buyer_account_id(), AccountId(1));
        assert_eq!(t.seller_account_id(), AccountId(2));
    }
}
