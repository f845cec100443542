//! Balance storage and compound postings

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use bus::{Event, EventBus};
use rust_decimal::Decimal;
use tracing::debug;
use types::account::Balance;
use types::errors::LedgerError;
use types::ids::{AccountId, Asset};
use types::numeric::{Price, Quantity};
use types::order::Side;

/// Description of one trade's settlement legs.
///
/// Fees are denominated in the asset each party received: the buyer's fee in
/// base, the seller's fee in quote. `maker_fee`/`taker_fee` are mapped onto
/// those legs from `taker_side`.
#[derive(Debug, Clone)]
pub struct TradeSettlement {
    pub maker: AccountId,
    pub taker: AccountId,
    pub taker_side: Side,
    pub base: Asset,
    pub quote: Asset,
    pub price: Price,
    pub quantity: Quantity,
    pub maker_fee: Decimal,
    pub taker_fee: Decimal,
}

impl TradeSettlement {
    fn buyer(&self) -> AccountId {
        match self.taker_side {
            Side::Buy => self.taker,
            Side::Sell => self.maker,
        }
    }

    fn seller(&self) -> AccountId {
        match self.taker_side {
            Side::Buy => self.maker,
            Side::Sell => self.taker,
        }
    }

    /// Fee charged to the buyer, in base
    fn buyer_fee(&self) -> Decimal {
        match self.taker_side {
            Side::Buy => self.taker_fee,
            Side::Sell => self.maker_fee,
        }
    }

    /// Fee charged to the seller, in quote
    fn seller_fee(&self) -> Decimal {
        match self.taker_side {
            Side::Buy => self.maker_fee,
            Side::Sell => self.taker_fee,
        }
    }
}

/// The account ledger. One mutex over the balance table serializes compound
/// postings and gives readers consistent snapshots.
pub struct AccountLedger {
    balances: Mutex<BTreeMap<(AccountId, Asset), Balance>>,
    bus: Arc<EventBus>,
}

type Balances = BTreeMap<(AccountId, Asset), Balance>;

fn entry<'a>(
    balances: &'a mut MutexGuard<'_, Balances>,
    account_id: AccountId,
    asset: &Asset,
) -> &'a mut Balance {
    balances
        .entry((account_id, asset.clone()))
        .or_insert_with(|| Balance::empty(account_id, asset.clone()))
}

impl AccountLedger {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self {
            balances: Mutex::new(BTreeMap::new()),
            bus,
        }
    }

    fn guard(&self) -> MutexGuard<'_, Balances> {
        self.balances.lock().expect("balance table poisoned")
    }

    fn publish_change(&self, balance: &Balance, reason: &str, timestamp: i64) {
        self.bus.publish(
            Event::BalanceChanged {
                account_id: balance.account_id,
                asset: balance.asset.clone(),
                available: balance.available,
                locked: balance.locked,
                reason: reason.to_string(),
            },
            timestamp,
        );
    }

    /// Read the balance for (account, asset), creating a zero row on first
    /// reference
    pub fn get_balance(&self, account_id: AccountId, asset: &Asset) -> Balance {
        let mut balances = self.guard();
        entry(&mut balances, account_id, asset).clone()
    }

    /// All balance rows for an account
    pub fn balances_for_account(&self, account_id: AccountId) -> Vec<Balance> {
        self.guard()
            .range((account_id, Asset::new(""))..)
            .take_while(|((id, _), _)| *id == account_id)
            .map(|(_, b)| b.clone())
            .collect()
    }

    /// Move `qty` from available to locked
    pub fn lock(
        &self,
        account_id: AccountId,
        asset: &Asset,
        qty: Decimal,
        reason: &str,
        timestamp: i64,
    ) -> Result<(), LedgerError> {
        let mut balances = self.guard();
        let balance = entry(&mut balances, account_id, asset);
        balance.lock(qty)?;
        let snapshot = balance.clone();
        self.publish_change(&snapshot, reason, timestamp);
        Ok(())
    }

    /// Move `qty` from locked back to available
    pub fn unlock(
        &self,
        account_id: AccountId,
        asset: &Asset,
        qty: Decimal,
        reason: &str,
        timestamp: i64,
    ) -> Result<(), LedgerError> {
        if qty.is_zero() {
            return Ok(());
        }
        let mut balances = self.guard();
        let balance = entry(&mut balances, account_id, asset);
        balance.unlock(qty)?;
        let snapshot = balance.clone();
        self.publish_change(&snapshot, reason, timestamp);
        Ok(())
    }

    /// Increase available (deposits, manual credits)
    pub fn credit(
        &self,
        account_id: AccountId,
        asset: &Asset,
        qty: Decimal,
        reason: &str,
        timestamp: i64,
    ) {
        let mut balances = self.guard();
        let balance = entry(&mut balances, account_id, asset);
        balance.credit(qty);
        let snapshot = balance.clone();
        self.publish_change(&snapshot, reason, timestamp);
    }

    /// Decrease locked: outflow after a withdrawal broadcast
    pub fn debit_locked(
        &self,
        account_id: AccountId,
        asset: &Asset,
        qty: Decimal,
        reason: &str,
        timestamp: i64,
    ) -> Result<(), LedgerError> {
        let mut balances = self.guard();
        let balance = entry(&mut balances, account_id, asset);
        balance.debit_locked(qty)?;
        let snapshot = balance.clone();
        self.publish_change(&snapshot, reason, timestamp);
        Ok(())
    }

    /// Compound posting for one trade: base moves seller → buyer, quote
    /// moves buyer → seller, fees are carved from each received leg into the
    /// fee account. All legs are validated before any is applied, so a
    /// failure has no partial effect.
    pub fn settle_trade(
        &self,
        settlement: &TradeSettlement,
        timestamp: i64,
    ) -> Result<(), LedgerError> {
        let notional = settlement.quantity * settlement.price;
        let base_qty = settlement.quantity.as_decimal();
        let buyer = settlement.buyer();
        let seller = settlement.seller();

        let mut balances = self.guard();

        // Validate both debit legs before touching anything
        {
            let seller_base = entry(&mut balances, seller, &settlement.base);
            if seller_base.locked < base_qty {
                return Err(LedgerError::InsufficientLocked {
                    account_id: seller,
                    asset: settlement.base.clone(),
                    required: base_qty,
                    locked: seller_base.locked,
                });
            }
        }
        {
            let buyer_quote = entry(&mut balances, buyer, &settlement.quote);
            if buyer_quote.locked < notional {
                return Err(LedgerError::InsufficientLocked {
                    account_id: buyer,
                    asset: settlement.quote.clone(),
                    required: notional,
                    locked: buyer_quote.locked,
                });
            }
        }

        // Apply. The earlier validation makes these debits infallible.
        let seller_base = entry(&mut balances, seller, &settlement.base);
        seller_base.debit_locked(base_qty).expect("validated leg");
        let seller_base_snapshot = seller_base.clone();

        let buyer_base = entry(&mut balances, buyer, &settlement.base);
        buyer_base.credit(base_qty - settlement.buyer_fee());
        let buyer_base_snapshot = buyer_base.clone();

        let buyer_quote = entry(&mut balances, buyer, &settlement.quote);
        buyer_quote.debit_locked(notional).expect("validated leg");
        let buyer_quote_snapshot = buyer_quote.clone();

        let seller_quote = entry(&mut balances, seller, &settlement.quote);
        seller_quote.credit(notional - settlement.seller_fee());
        let seller_quote_snapshot = seller_quote.clone();

        let fee_base = entry(&mut balances, AccountId::FEE, &settlement.base);
        fee_base.credit(settlement.buyer_fee());
        let fee_quote = entry(&mut balances, AccountId::FEE, &settlement.quote);
        fee_quote.credit(settlement.seller_fee());

        debug!(
            buyer = buyer.value(),
            seller = seller.value(),
            %notional,
            "trade settled"
        );

        for snapshot in [
            &seller_base_snapshot,
            &buyer_base_snapshot,
            &buyer_quote_snapshot,
            &seller_quote_snapshot,
        ] {
            self.publish_change(snapshot, "trade_settlement", timestamp);
        }
        drop(balances);
        Ok(())
    }

    /// Sum of available + locked across every account for one asset,
    /// including the fee account. Conservation checks compare this against
    /// confirmed deposits minus confirmed withdrawals.
    pub fn total_for_asset(&self, asset: &Asset) -> Decimal {
        self.guard()
            .iter()
            .filter(|((_, a), _)| a == asset)
            .map(|(_, b)| b.total())
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn ledger() -> (AccountLedger, Arc<EventBus>) {
        let bus = Arc::new(EventBus::new());
        (AccountLedger::new(Arc::clone(&bus)), bus)
    }

    fn settlement(qty: Decimal, price: u64) -> TradeSettlement {
        TradeSettlement {
            maker: AccountId(1),
            taker: AccountId(2),
            taker_side: Side::Buy,
            base: Asset::new("ALT"),
            quote: Asset::new("USDT"),
            price: Price::from_u64(price),
            quantity: Quantity::new(qty),
            maker_fee: dec!(1),
            taker_fee: dec!(0.02),
        }
    }

    #[test]
    fn test_zero_row_created_on_first_read() {
        let (ledger, _bus) = ledger();
        let balance = ledger.get_balance(AccountId(5), &Asset::new("ALT"));
        assert_eq!(balance.available, Decimal::ZERO);
        assert_eq!(balance.locked, Decimal::ZERO);
    }

    #[test]
    fn test_lock_then_unlock_restores_exactly() {
        let (ledger, _bus) = ledger();
        let alt = Asset::new("ALT");
        ledger.credit(AccountId(1), &alt, dec!(10), "deposit", 1);
        ledger.lock(AccountId(1), &alt, dec!(4), "order_lock", 2).unwrap();
        ledger.unlock(AccountId(1), &alt, dec!(4), "order_unlock", 3).unwrap();
        let balance = ledger.get_balance(AccountId(1), &alt);
        assert_eq!(balance.available, dec!(10));
        assert_eq!(balance.locked, dec!(0));
    }

    #[test]
    fn test_lock_insufficient_fails_clean() {
        let (ledger, _bus) = ledger();
        let err = ledger
            .lock(AccountId(1), &Asset::new("ALT"), dec!(1), "order_lock", 1)
            .unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientAvailable { .. }));
    }

    #[test]
    fn test_settle_trade_moves_both_legs_and_fees() {
        let (ledger, _bus) = ledger();
        let alt = Asset::new("ALT");
        let usdt = Asset::new("USDT");
        // Maker (1) sells 10 ALT; taker (2) buys with 1000 USDT locked
        ledger.credit(AccountId(1), &alt, dec!(10), "deposit", 1);
        ledger.lock(AccountId(1), &alt, dec!(10), "order_lock", 1).unwrap();
        ledger.credit(AccountId(2), &usdt, dec!(1000), "deposit", 1);
        ledger.lock(AccountId(2), &usdt, dec!(1000), "order_lock", 1).unwrap();

        ledger.settle_trade(&settlement(dec!(10), 100), 2).unwrap();

        // Buyer got 10 ALT minus its 0.02 ALT fee
        assert_eq!(
            ledger.get_balance(AccountId(2), &alt).available,
            dec!(9.98)
        );
        // Seller got 1000 USDT minus its 1 USDT fee
        assert_eq!(
            ledger.get_balance(AccountId(1), &usdt).available,
            dec!(999)
        );
        // Locked legs fully consumed
        assert_eq!(ledger.get_balance(AccountId(1), &alt).locked, dec!(0));
        assert_eq!(ledger.get_balance(AccountId(2), &usdt).locked, dec!(0));
        // Fees landed in the fee account
        assert_eq!(
            ledger.get_balance(AccountId::FEE, &alt).available,
            dec!(0.02)
        );
        assert_eq!(
            ledger.get_balance(AccountId::FEE, &usdt).available,
            dec!(1)
        );
    }

    #[test]
    fn test_settle_trade_conserves_assets() {
        let (ledger, _bus) = ledger();
        let alt = Asset::new("ALT");
        let usdt = Asset::new("USDT");
        ledger.credit(AccountId(1), &alt, dec!(10), "deposit", 1);
        ledger.lock(AccountId(1), &alt, dec!(10), "order_lock", 1).unwrap();
        ledger.credit(AccountId(2), &usdt, dec!(1000), "deposit", 1);
        ledger.lock(AccountId(2), &usdt, dec!(1000), "order_lock", 1).unwrap();

        ledger.settle_trade(&settlement(dec!(10), 100), 2).unwrap();

        assert_eq!(ledger.total_for_asset(&alt), dec!(10));
        assert_eq!(ledger.total_for_asset(&usdt), dec!(1000));
    }

    #[test]
    fn test_settle_trade_failure_has_no_partial_effect() {
        let (ledger, _bus) = ledger();
        let alt = Asset::new("ALT");
        let usdt = Asset::new("USDT");
        // Seller has base locked but buyer has nothing locked
        ledger.credit(AccountId(1), &alt, dec!(10), "deposit", 1);
        ledger.lock(AccountId(1), &alt, dec!(10), "order_lock", 1).unwrap();

        let err = ledger.settle_trade(&settlement(dec!(10), 100), 2).unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientLocked { .. }));

        // Seller's leg untouched
        assert_eq!(ledger.get_balance(AccountId(1), &alt).locked, dec!(10));
        assert_eq!(ledger.get_balance(AccountId(2), &alt).available, dec!(0));
    }

    #[test]
    fn test_balance_events_published() {
        let bus = Arc::new(EventBus::new());
        let sub = bus.subscribe("balance.*");
        let ledger = AccountLedger::new(Arc::clone(&bus));
        ledger.credit(AccountId(1), &Asset::new("ALT"), dec!(5), "deposit", 1);
        let events = sub.drain();
        assert_eq!(events.len(), 1);
        match &events[0].event {
            Event::BalanceChanged { available, reason, .. } => {
                assert_eq!(*available, dec!(5));
                assert_eq!(reason, "deposit");
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_concurrent_credits_serialize() {
        let (ledger, _bus) = ledger();
        let ledger = Arc::new(ledger);
        let mut handles = Vec::new();
        for _ in 0..8 {
            let ledger = Arc::clone(&ledger);
            handles.push(std::thread::spawn(move || {
                for _ in 0..100 {
                    ledger.credit(AccountId(1), &Asset::new("ALT"), dec!(1), "deposit", 1);
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(ledger.total_for_asset(&Asset::new("ALT")), dec!(800));
    }
}
