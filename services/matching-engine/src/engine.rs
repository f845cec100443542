//! Matching engine for a single market
//!
//! Single logical writer: every command for the market runs to completion
//! before the next one starts, so no command observes another's intermediate
//! state. Each command is one atomic state transition; events are emitted in
//! commit order.
//!
//! The engine owns `Order.filled` / `Order.status` after admission, the
//! stop trigger table, the OCO linkage map, and a per-order lock table that
//! mirrors what the ledger holds for each live order. After every command
//! the lock table is reconciled against what the surviving orders still
//! need, releasing any excess (price improvement, market-buy envelope
//! residue, canceled remainders) back to available.
//!
//! Ledger failures during settlement mean admission-validated balances went
//! missing: the engine emits a system alert, halts, and leaves state for
//! inspection.

use std::collections::HashMap;
use std::sync::Arc;

use bus::{Event, EventBus};
use ledger::{AccountLedger, TradeSettlement};
use rust_decimal::Decimal;
use store::{Sequence, Store};
use tracing::{debug, error, info};
use types::config::MarketConfig;
use types::errors::{AdmissionError, EngineError, FatalError, StoreError};
use types::ids::{AccountId, Asset, LinkId, OrderId, TradeId};
use types::numeric::{Price, Quantity};
use types::order::{CancelReason, Order, OrderKind, RejectReason, Side, TimeInForce};
use types::trade::Trade;

use crate::book::{BookSnapshot, OrderBook};
use crate::matching::crossing;
use crate::stops::StopBook;

/// Safety bound on stop activations per command; exceeding it is fatal
const STOP_CASCADE_BOUND: usize = 1024;

/// Key into the engine's lock table: one reservation per order, shared
/// between the legs of an OCO pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum LockKey {
    Solo(OrderId),
    Group(LinkId),
}

/// One ledger reservation tracked by the engine
#[derive(Debug, Clone)]
struct LockState {
    account_id: AccountId,
    asset: Asset,
    /// Quantity currently locked in the ledger for this reservation
    amount: Decimal,
    /// Orders drawing on the reservation (two for an OCO pair)
    orders: Vec<OrderId>,
}

#[derive(Debug, Clone, Copy)]
struct OcoPair {
    limit: OrderId,
    stop: OrderId,
}

/// Price-time priority matching engine for one market
pub struct MatchingEngine {
    market: MarketConfig,
    book: OrderBook,
    stops: StopBook,
    oco: HashMap<LinkId, OcoPair>,
    locks: HashMap<LockKey, LockState>,
    last_trade_price: Option<Price>,
    last_trade_ts: i64,
    halted: Option<String>,
    store: Arc<dyn Store>,
    ledger: Arc<AccountLedger>,
    bus: Arc<EventBus>,
}

impl MatchingEngine {
    pub fn new(
        market: MarketConfig,
        store: Arc<dyn Store>,
        ledger: Arc<AccountLedger>,
        bus: Arc<EventBus>,
    ) -> Self {
        Self {
            market,
            book: OrderBook::new(),
            stops: StopBook::new(),
            oco: HashMap::new(),
            locks: HashMap::new(),
            last_trade_price: None,
            last_trade_ts: 0,
            halted: None,
            store,
            ledger,
            bus,
        }
    }

    pub fn market(&self) -> &MarketConfig {
        &self.market
    }

    /// Why the engine halted, if it did
    pub fn halted(&self) -> Option<&str> {
        self.halted.as_deref()
    }

    /// Last executed trade price, the stop-trigger reference
    pub fn last_trade_price(&self) -> Option<Price> {
        self.last_trade_price
    }

    /// Aggregated top-N book levels
    pub fn snapshot(&self, depth: usize) -> BookSnapshot {
        self.book.snapshot(depth)
    }

    // ── command entry points ───────────────────────────────────────────

    /// Submit an admitted order. The caller must already hold the admission
    /// lock in the ledger; the engine takes over lock accounting from here.
    pub fn submit(&mut self, mut order: Order, now: i64) -> Result<Vec<Trade>, EngineError> {
        self.guard_halted()?;
        let mut touched = Vec::new();
        self.register_lock(&order, None);
        touched.push(self.key_for(&order));

        let result = self.run_submission(&mut order, now, &mut touched);
        self.seal(result, touched, now)
    }

    /// Submit an OCO pair sharing one reservation. The limit leg is
    /// processed first; if both legs could activate in the same step the
    /// limit leg wins and the stop leg is canceled.
    pub fn submit_oco(
        &mut self,
        mut limit_leg: Order,
        mut stop_leg: Order,
        now: i64,
    ) -> Result<Vec<Trade>, EngineError> {
        self.guard_halted()?;
        let link_id = match (limit_leg.link_id, stop_leg.link_id) {
            (Some(a), Some(b)) if a == b => a,
            _ => {
                return Err(AdmissionError::InvalidOrder {
                    reason: "OCO legs must share a link id".into(),
                }
                .into())
            }
        };
        self.oco.insert(
            link_id,
            OcoPair {
                limit: limit_leg.id,
                stop: stop_leg.id,
            },
        );
        self.register_lock(&limit_leg, Some(&stop_leg));
        let mut touched = vec![LockKey::Group(link_id)];

        let result = (|| {
            let mut trades = self.process_order(&mut limit_leg, now, &mut touched)?;
            if limit_leg.has_fills() {
                // Any fill on one leg cancels the other before it arms
                self.cancel_linked_leg(&limit_leg, CancelReason::OcoLinkedFill, now, &mut touched)?;
            } else if limit_leg.status.is_terminal() {
                self.cancel_linked_leg(&limit_leg, CancelReason::OcoLinkedCancel, now, &mut touched)?;
            } else {
                self.arm_stop(&mut stop_leg, now)?;
            }
            if !trades.is_empty() {
                trades.extend(self.run_cascade(now, &mut touched)?);
            }
            Ok(trades)
        })();
        self.seal(result, touched, now)
    }

    /// Cancel a resting or armed order. Returns false when there is nothing
    /// cancellable (unknown id or already terminal).
    pub fn cancel(&mut self, order_id: OrderId, now: i64) -> Result<bool, EngineError> {
        self.guard_halted()?;
        let Ok(mut order) = self.store.get_order(order_id) else {
            return Ok(false);
        };
        if order.market != self.market.symbol || !order.status.is_live() {
            return Ok(false);
        }
        let mut touched = vec![self.key_for(&order)];

        let result = (|| {
            self.remove_from_structures(&order)?;
            order.cancel(CancelReason::UserRequested, now);
            self.persist_order(&order)?;
            self.emit_canceled(&order, CancelReason::UserRequested, now);
            self.cancel_linked_leg(&order, CancelReason::OcoLinkedCancel, now, &mut touched)?;
            Ok(Vec::new())
        })();
        self.seal(result, touched, now).map(|_| true)
    }

    // ── submission pipeline ────────────────────────────────────────────

    fn run_submission(
        &mut self,
        order: &mut Order,
        now: i64,
        touched: &mut Vec<LockKey>,
    ) -> Result<Vec<Trade>, EngineError> {
        let mut trades = self.process_order(order, now, touched)?;
        if order.has_fills() {
            self.cancel_linked_leg(order, CancelReason::OcoLinkedFill, now, touched)?;
        }
        if !trades.is_empty() {
            trades.extend(self.run_cascade(now, touched)?);
        }
        Ok(trades)
    }

    fn process_order(
        &mut self,
        order: &mut Order,
        now: i64,
        touched: &mut Vec<LockKey>,
    ) -> Result<Vec<Trade>, EngineError> {
        match order.kind {
            OrderKind::Limit => self.process_limit(order, now, touched),
            OrderKind::Market => self.process_market(order, now, touched),
            OrderKind::Stop | OrderKind::StopLimit => {
                self.arm_stop(order, now)?;
                Ok(Vec::new())
            }
        }
    }

    fn process_limit(
        &mut self,
        order: &mut Order,
        now: i64,
        touched: &mut Vec<LockKey>,
    ) -> Result<Vec<Trade>, EngineError> {
        if order.time_in_force == TimeInForce::FOK {
            let fillable = self
                .book
                .fillable(order.side, order.price, order.remaining());
            if fillable.as_decimal() < order.remaining().as_decimal() {
                order.reject(RejectReason::FokUnfillable, now);
                self.persist_order(order)?;
                self.bus.publish(
                    Event::OrderRejected {
                        order_id: order.id,
                        market: self.market.symbol.clone(),
                        reason: RejectReason::FokUnfillable,
                    },
                    now,
                );
                return Err(AdmissionError::FokUnfillable.into());
            }
        }

        let trades = self.match_against_book(order, now, touched)?;

        if !order.remaining().is_zero() {
            match order.time_in_force {
                TimeInForce::GTC => {
                    order.open(now);
                    self.book.insert(order);
                    self.persist_order(order)?;
                    self.bus.publish(
                        Event::OrderAccepted {
                            order_id: order.id,
                            market: self.market.symbol.clone(),
                            side: order.side,
                            remaining: order.remaining(),
                        },
                        now,
                    );
                }
                TimeInForce::IOC | TimeInForce::FOK => {
                    order.cancel(CancelReason::IocResidue, now);
                    self.persist_order(order)?;
                    self.emit_canceled(order, CancelReason::IocResidue, now);
                }
            }
        } else {
            self.persist_order(order)?;
        }
        Ok(trades)
    }

    fn process_market(
        &mut self,
        order: &mut Order,
        now: i64,
        touched: &mut Vec<LockKey>,
    ) -> Result<Vec<Trade>, EngineError> {
        let trades = self.match_against_book(order, now, touched)?;
        if !order.remaining().is_zero() {
            order.cancel(CancelReason::MarketNoLiquidity, now);
            self.persist_order(order)?;
            self.emit_canceled(order, CancelReason::MarketNoLiquidity, now);
        } else {
            self.persist_order(order)?;
        }
        Ok(trades)
    }

    fn arm_stop(&mut self, order: &mut Order, now: i64) -> Result<(), EngineError> {
        let stop_price = order.stop_price.ok_or_else(|| {
            EngineError::Admission(AdmissionError::InvalidOrder {
                reason: "stop order requires a stop price".into(),
            })
        })?;
        order.open(now);
        self.persist_order(order)?;
        self.stops.insert(order.side, stop_price, order.id);
        self.bus.publish(
            Event::OrderAccepted {
                order_id: order.id,
                market: self.market.symbol.clone(),
                side: order.side,
                remaining: order.remaining(),
            },
            now,
        );
        Ok(())
    }

    /// Core match loop: consume the opposing side in price-time priority
    /// until the taker is exhausted or the best price stops crossing.
    fn match_against_book(
        &mut self,
        order: &mut Order,
        now: i64,
        touched: &mut Vec<LockKey>,
    ) -> Result<Vec<Trade>, EngineError> {
        let taker_limit = order.price;
        let taker_key = self.key_for(order);
        let mut trades = Vec::new();

        while !order.remaining().is_zero() {
            let Some((maker_price, maker_entry)) = self.book.peek_opposite(order.side) else {
                break;
            };
            if !crossing::crosses(order.side, taker_limit, maker_price) {
                break;
            }

            let mut quantity = order.remaining().min(maker_entry.remaining);
            if order.side == Side::Buy && order.price.is_none() {
                // Market buy spends from its quote envelope
                quantity = quantity.min(self.affordable(taker_key, maker_price));
                if quantity.is_zero() {
                    break;
                }
            }

            let mut maker = self
                .store
                .get_order(maker_entry.order_id)
                .map_err(|e| self.fatal_store(e, maker_entry.order_id))?;

            let notional = quantity * maker_price;
            let maker_received = match maker.side {
                Side::Buy => quantity.as_decimal(),
                Side::Sell => notional,
            };
            let taker_received = match order.side {
                Side::Buy => quantity.as_decimal(),
                Side::Sell => notional,
            };
            let maker_fee = self.market.fees.fee_on(maker_received, true);
            let taker_fee = self.market.fees.fee_on(taker_received, false);

            let settlement = TradeSettlement {
                maker: maker.account_id,
                taker: order.account_id,
                taker_side: order.side,
                base: self.market.base.clone(),
                quote: self.market.quote.clone(),
                price: maker_price,
                quantity,
                maker_fee,
                taker_fee,
            };
            let executed_at = now.max(self.last_trade_ts);
            self.ledger
                .settle_trade(&settlement, executed_at)
                .map_err(|e| {
                    EngineError::Fatal(FatalError::LedgerInconsistency {
                        detail: e.to_string(),
                    })
                })?;
            self.last_trade_ts = executed_at;

            // Mirror the settled legs in the engine's lock table
            let maker_key = self.key_for(&maker);
            let (buyer_key, seller_key) = match order.side {
                Side::Buy => (taker_key, maker_key),
                Side::Sell => (maker_key, taker_key),
            };
            self.debit_lock(buyer_key, notional)?;
            self.debit_lock(seller_key, quantity.as_decimal())?;
            touched.push(maker_key);

            maker.fill(quantity, executed_at);
            order.fill(quantity, executed_at);
            let (reduced_id, _popped) = self.book.reduce_opposite_front(order.side, quantity);
            debug_assert_eq!(reduced_id, maker.id);

            self.persist_order(&maker)?;

            let trade = Trade {
                id: TradeId(self.store.next_id(Sequence::Trades)),
                market: self.market.symbol.clone(),
                maker_order_id: maker.id,
                taker_order_id: order.id,
                maker_account_id: maker.account_id,
                taker_account_id: order.account_id,
                taker_side: order.side,
                price: maker_price,
                amount: quantity,
                maker_fee,
                taker_fee,
                executed_at,
            };
            self.store
                .insert_trade(trade.clone())
                .map_err(|e| self.fatal_store(e, order.id))?;

            self.last_trade_price = Some(maker_price);
            self.bus.publish(
                Event::TradeExecuted {
                    trade_id: trade.id,
                    market: self.market.symbol.clone(),
                    price: maker_price,
                    amount: quantity,
                    maker_order_id: maker.id,
                    taker_order_id: order.id,
                    taker_side: order.side,
                    executed_at,
                },
                executed_at,
            );
            info!(
                market = %self.market.symbol,
                trade_id = trade.id.value(),
                price = %maker_price,
                amount = %quantity,
                "trade executed"
            );

            // A fill on an OCO leg cancels its sibling
            self.cancel_linked_leg(&maker, CancelReason::OcoLinkedFill, now, touched)?;

            trades.push(trade);
        }
        Ok(trades)
    }

    /// Stop cascade: after trades move the last price, activate every
    /// triggered stop in order; activations may trade and trigger more.
    /// Each activation consumes a trigger-table entry, and a safety bound
    /// turns runaway loops into a fatal halt.
    fn run_cascade(
        &mut self,
        now: i64,
        touched: &mut Vec<LockKey>,
    ) -> Result<Vec<Trade>, EngineError> {
        let mut all_trades = Vec::new();
        let mut activations = 0usize;

        loop {
            let Some(last) = self.last_trade_price else {
                break;
            };
            let batch = self.stops.take_triggered(last);
            if batch.is_empty() {
                break;
            }
            for order_id in batch {
                activations += 1;
                if activations > STOP_CASCADE_BOUND {
                    return Err(FatalError::StopTriggerLoop {
                        bound: STOP_CASCADE_BOUND,
                    }
                    .into());
                }
                let mut order = self
                    .store
                    .get_order(order_id)
                    .map_err(|e| self.fatal_store(e, order_id))?;
                if !order.status.is_live() {
                    continue;
                }
                let stop_price = order.stop_price.unwrap_or(last);
                order.activate(now);
                self.persist_order(&order)?;
                self.bus.publish(
                    Event::OrderTriggered {
                        order_id: order.id,
                        market: self.market.symbol.clone(),
                        stop_price,
                        last_price: last,
                    },
                    now,
                );
                debug!(
                    market = %self.market.symbol,
                    order_id = order.id.value(),
                    %stop_price,
                    "stop activated"
                );
                touched.push(self.key_for(&order));

                let trades = self.process_order(&mut order, now, touched)?;
                if order.has_fills() {
                    self.cancel_linked_leg(&order, CancelReason::OcoLinkedFill, now, touched)?;
                }
                all_trades.extend(trades);
            }
        }
        Ok(all_trades)
    }

    // ── OCO linkage ────────────────────────────────────────────────────

    /// Cancel the sibling of an OCO leg, if one is still live. The linkage
    /// map entry is consumed so the rule fires exactly once per pair.
    fn cancel_linked_leg(
        &mut self,
        leg: &Order,
        reason: CancelReason,
        now: i64,
        touched: &mut Vec<LockKey>,
    ) -> Result<(), EngineError> {
        let Some(link_id) = leg.link_id else {
            return Ok(());
        };
        let Some(pair) = self.oco.remove(&link_id) else {
            return Ok(());
        };
        let other_id = if pair.limit == leg.id {
            pair.stop
        } else {
            pair.limit
        };
        let mut other = self
            .store
            .get_order(other_id)
            .map_err(|e| self.fatal_store(e, other_id))?;
        if other.status.is_live() {
            self.remove_from_structures(&other)?;
            other.cancel(reason, now);
            self.persist_order(&other)?;
            self.emit_canceled(&other, reason, now);
            touched.push(LockKey::Group(link_id));
        }
        Ok(())
    }

    /// Remove an order from whichever structure holds it (book or stop
    /// table). Orders that are live but in neither (pending OCO legs) are
    /// fine to leave alone.
    fn remove_from_structures(&mut self, order: &Order) -> Result<(), EngineError> {
        if self.book.contains(order.id) {
            self.book.remove(order.id).map_err(EngineError::Fatal)?;
            return Ok(());
        }
        if let Some(stop_price) = order.stop_price {
            if matches!(order.kind, OrderKind::Stop | OrderKind::StopLimit) {
                self.stops.remove(order.side, stop_price, order.id);
            }
        }
        Ok(())
    }

    // ── lock accounting ────────────────────────────────────────────────

    fn key_for(&self, order: &Order) -> LockKey {
        match order.link_id {
            Some(link_id) => LockKey::Group(link_id),
            None => LockKey::Solo(order.id),
        }
    }

    /// Quantity the admission path locked for this order (or pair)
    fn lock_requirement(&self, order: &Order) -> Decimal {
        match order.side {
            Side::Sell => order.remaining().as_decimal(),
            Side::Buy => match order.price {
                Some(price) => order.remaining() * price,
                None => order.max_quote.unwrap_or(Decimal::ZERO),
            },
        }
    }

    fn lock_asset(&self, order: &Order) -> Asset {
        match order.side {
            Side::Buy => self.market.quote.clone(),
            Side::Sell => self.market.base.clone(),
        }
    }

    /// Record the reservation the admission path made. For an OCO pair the
    /// reservation is shared and sized for the worse leg.
    fn register_lock(&mut self, order: &Order, oco_sibling: Option<&Order>) {
        let mut amount = self.lock_requirement(order);
        let mut orders = vec![order.id];
        if let Some(sibling) = oco_sibling {
            amount = amount.max(self.lock_requirement(sibling));
            orders.push(sibling.id);
        }
        self.locks.insert(
            self.key_for(order),
            LockState {
                account_id: order.account_id,
                asset: self.lock_asset(order),
                amount,
                orders,
            },
        );
    }

    /// Mirror a settled leg: the ledger already debited the locked funds
    fn debit_lock(&mut self, key: LockKey, amount: Decimal) -> Result<(), EngineError> {
        let state = self.locks.get_mut(&key).ok_or_else(|| {
            EngineError::Fatal(FatalError::LedgerInconsistency {
                detail: "settled order has no lock entry".into(),
            })
        })?;
        if state.amount < amount {
            return Err(EngineError::Fatal(FatalError::LedgerInconsistency {
                detail: format!(
                    "lock underflow: tracked {} < settled {}",
                    state.amount, amount
                ),
            }));
        }
        state.amount -= amount;
        Ok(())
    }

    /// Quantity a market buy can still spend from its envelope, expressed
    /// in base units at `price` and floored to the size tick
    fn affordable(&self, key: LockKey, price: Price) -> Quantity {
        let Some(state) = self.locks.get(&key) else {
            return Quantity::zero();
        };
        let raw = state.amount / price.as_decimal();
        let tick = self.market.size_tick;
        let ticks = (raw / tick).floor();
        Quantity::try_new(ticks * tick).unwrap_or_else(Quantity::zero)
    }

    /// What a live order still needs reserved
    fn leg_need(&self, order: &Order, current: Decimal) -> Decimal {
        if !order.status.is_live() {
            return Decimal::ZERO;
        }
        match order.side {
            Side::Sell => order.remaining().as_decimal(),
            Side::Buy => match order.price {
                Some(price) => order.remaining() * price,
                // Market/armed-stop buys hold their whole envelope
                None => current,
            },
        }
    }

    /// Release whatever the reservation holds beyond what its surviving
    /// orders still need. Exactness here is what makes submit-then-cancel
    /// restore balances bit-for-bit.
    fn reconcile_lock(&mut self, key: LockKey, now: i64) -> Result<(), EngineError> {
        let Some(state) = self.locks.get(&key) else {
            return Ok(());
        };
        let state = state.clone();
        let mut needed = Decimal::ZERO;
        let mut any_live = false;
        for order_id in &state.orders {
            let order = self
                .store
                .get_order(*order_id)
                .map_err(|e| self.fatal_store(e, *order_id))?;
            any_live |= order.status.is_live();
            needed = needed.max(self.leg_need(&order, state.amount));
        }
        let excess = state.amount - needed;
        if excess < Decimal::ZERO {
            return Err(EngineError::Fatal(FatalError::LedgerInconsistency {
                detail: format!("lock below requirement: {} < {}", state.amount, needed),
            }));
        }
        if excess > Decimal::ZERO {
            self.ledger
                .unlock(state.account_id, &state.asset, excess, "lock_release", now)
                .map_err(|e| {
                    EngineError::Fatal(FatalError::LedgerInconsistency {
                        detail: e.to_string(),
                    })
                })?;
        }
        if !any_live {
            self.locks.remove(&key);
        } else if let Some(state) = self.locks.get_mut(&key) {
            state.amount = needed;
        }
        Ok(())
    }

    // ── command epilogue and failure handling ──────────────────────────

    /// Close out a command: reconcile touched reservations on success or
    /// admission failure, halt on fatal errors.
    fn seal(
        &mut self,
        result: Result<Vec<Trade>, EngineError>,
        mut touched: Vec<LockKey>,
        now: i64,
    ) -> Result<Vec<Trade>, EngineError> {
        match result {
            Err(EngineError::Fatal(fatal)) => {
                self.halt(&fatal, now);
                Err(EngineError::Fatal(fatal))
            }
            other => {
                touched.sort_by_key(|k| match k {
                    LockKey::Solo(id) => (0u8, id.value()),
                    LockKey::Group(id) => (1u8, id.value()),
                });
                touched.dedup();
                for key in touched {
                    if let Err(err) = self.reconcile_lock(key, now) {
                        if let EngineError::Fatal(fatal) = &err {
                            self.halt(&fatal.clone(), now);
                        }
                        return Err(err);
                    }
                }
                other
            }
        }
    }

    fn guard_halted(&self) -> Result<(), EngineError> {
        if self.halted.is_some() {
            return Err(EngineError::Halted);
        }
        Ok(())
    }

    fn halt(&mut self, fatal: &FatalError, now: i64) {
        let detail = fatal.to_string();
        error!(market = %self.market.symbol, %detail, "engine halted");
        self.halted = Some(detail.clone());
        self.bus.publish(
            Event::SystemAlert {
                market: Some(self.market.symbol.clone()),
                detail,
            },
            now,
        );
    }

    fn fatal_store(&self, err: StoreError, order_id: OrderId) -> EngineError {
        match err {
            StoreError::NotFound { .. } => {
                EngineError::Fatal(FatalError::BookIndexCorruption { order_id })
            }
            other => EngineError::Fatal(FatalError::LedgerInconsistency {
                detail: other.to_string(),
            }),
        }
    }

    fn persist_order(&self, order: &Order) -> Result<(), EngineError> {
        self.store
            .update_order(order.clone())
            .map_err(|e| self.fatal_store(e, order.id))
    }

    fn emit_canceled(&self, order: &Order, reason: CancelReason, now: i64) {
        self.bus.publish(
            Event::OrderCanceled {
                order_id: order.id,
                market: self.market.symbol.clone(),
                reason,
                filled: order.filled,
                remaining: order.remaining(),
            },
            now,
        );
    }
}
