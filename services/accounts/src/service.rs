//! Account service: user lifecycle, order entry, and cancellation
//!
//! The only caller of the matching engine for order submissions. Admission
//! runs here: validate, lock the required balance, persist the pending
//! order, then hand it to the market's engine.

use std::sync::Arc;

use bus::{Event, EventBus};
use ledger::AccountLedger;
use matching_engine::EngineRouter;
use rust_decimal::Decimal;
use sha2::{Digest, Sha256};
use store::{Sequence, Store};
use tracing::debug;
use types::account::{Account, Balance, User};
use types::config::ExchangeConfig;
use types::errors::{AdmissionError, EngineError, FatalError, StoreError};
use types::ids::{Asset, LinkId, MarketId, OrderId, UserId};
use types::numeric::{Price, Quantity};
use types::order::{Order, OrderRequest, Side};
use types::time::unix_nanos;
use types::trade::Trade;

use crate::admission;

/// Parameters for a one-cancels-other pair: a limit leg and a stop leg on
/// the same side for the same amount, drawing on one shared reservation.
#[derive(Debug, Clone)]
pub struct OcoParams {
    pub market: MarketId,
    pub side: Side,
    pub amount: Quantity,
    pub limit_price: Price,
    pub stop_price: Price,
    /// Limit price for the stop leg; `None` arms a stop-market leg
    pub stop_limit_price: Option<Price>,
    /// Quote budget for a stop-market buy leg
    pub max_quote: Option<Decimal>,
}

pub struct AccountService {
    config: Arc<ExchangeConfig>,
    store: Arc<dyn Store>,
    ledger: Arc<AccountLedger>,
    engines: Arc<EngineRouter>,
    bus: Arc<EventBus>,
}

impl AccountService {
    pub fn new(
        config: Arc<ExchangeConfig>,
        store: Arc<dyn Store>,
        ledger: Arc<AccountLedger>,
        engines: Arc<EngineRouter>,
        bus: Arc<EventBus>,
    ) -> Self {
        Self {
            config,
            store,
            ledger,
            engines,
            bus,
        }
    }

    // ── user & account lifecycle ───────────────────────────────────────

    /// Register a user and their trading account. Emails are case-folded
    /// and unique.
    pub fn create_user(&self, email: &str, password: &str) -> Result<User, StoreError> {
        let now = unix_nanos();
        let user = User {
            id: UserId(self.store.next_id(Sequence::Users)),
            email: email.to_lowercase(),
            password_hash: password_hash(password),
            created_at: now,
        };
        let account = Account::new(
            types::ids::AccountId(self.store.next_id(Sequence::Accounts)),
            user.id,
        );

        let uow = self.store.begin();
        self.store.insert_user(user.clone())?;
        self.store.insert_account(account)?;
        uow.commit();
        debug!(user_id = user.id.value(), "user registered");
        Ok(user)
    }

    /// Trading account for a user
    pub fn account(&self, user_id: UserId) -> Result<Account, AdmissionError> {
        self.store
            .account_for_user(user_id)
            .ok_or(AdmissionError::AccountNotFound { user_id })
    }

    /// Balance for one asset (zero row on first reference)
    pub fn balance(&self, user_id: UserId, asset: &Asset) -> Result<Balance, AdmissionError> {
        let account = self.account(user_id)?;
        Ok(self.ledger.get_balance(account.id, asset))
    }

    /// All balance rows for a user
    pub fn balances(&self, user_id: UserId) -> Result<Vec<Balance>, AdmissionError> {
        let account = self.account(user_id)?;
        Ok(self.ledger.balances_for_account(account.id))
    }

    // ── order entry ────────────────────────────────────────────────────

    /// Validate, lock, persist, and submit an order
    pub fn place_order(
        &self,
        user_id: UserId,
        request: OrderRequest,
    ) -> Result<Order, EngineError> {
        let now = unix_nanos();
        let account = self.account(user_id)?;
        let market = admission::validate(&self.config, &account, &request)?;
        let (asset, required) = admission::lock_requirement(market, &request);

        self.ledger
            .lock(account.id, &asset, required, "order_lock", now)
            .map_err(|e| EngineError::Admission(e.into()))?;

        let order = Order::from_request(
            OrderId(self.store.next_id(Sequence::Orders)),
            user_id,
            account.id,
            &request,
            now,
        );
        if let Err(err) = self.store.insert_order(order.clone()) {
            // Roll the admission lock back before surfacing the failure
            let _ = self
                .ledger
                .unlock(account.id, &asset, required, "order_unlock", now);
            return Err(store_fatal(err));
        }
        self.publish_submitted(&order, now);

        self.engines
            .with_engine(&order.market, |engine| engine.submit(order.clone(), now))??;
        self.store.get_order(order.id).map_err(store_fatal)
    }

    /// Place an OCO pair sharing one reservation sized for the worse leg
    pub fn place_oco(
        &self,
        user_id: UserId,
        params: OcoParams,
    ) -> Result<(Order, Order), EngineError> {
        let now = unix_nanos();
        let account = self.account(user_id)?;

        let limit_request = OrderRequest::limit(
            params.market.clone(),
            params.side,
            params.limit_price,
            params.amount,
        );
        let stop_request = match params.stop_limit_price {
            Some(price) => OrderRequest::stop_limit(
                params.market.clone(),
                params.side,
                params.stop_price,
                price,
                params.amount,
            ),
            None => OrderRequest::stop(
                params.market.clone(),
                params.side,
                params.stop_price,
                params.amount,
                params.max_quote,
            ),
        };
        let market = admission::validate(&self.config, &account, &limit_request)?;
        admission::validate(&self.config, &account, &stop_request)?;

        let (asset, limit_required) = admission::lock_requirement(market, &limit_request);
        let (_, stop_required) = admission::lock_requirement(market, &stop_request);
        let required = limit_required.max(stop_required);

        self.ledger
            .lock(account.id, &asset, required, "order_lock", now)
            .map_err(|e| EngineError::Admission(e.into()))?;

        let link_id = LinkId(self.store.next_id(Sequence::Links));
        let mut limit_leg = Order::from_request(
            OrderId(self.store.next_id(Sequence::Orders)),
            user_id,
            account.id,
            &limit_request,
            now,
        );
        limit_leg.link_id = Some(link_id);
        let mut stop_leg = Order::from_request(
            OrderId(self.store.next_id(Sequence::Orders)),
            user_id,
            account.id,
            &stop_request,
            now,
        );
        stop_leg.link_id = Some(link_id);

        let inserted = (|| {
            let uow = self.store.begin();
            self.store.insert_order(limit_leg.clone())?;
            self.store.insert_order(stop_leg.clone())?;
            uow.commit();
            Ok(())
        })();
        if let Err(err) = inserted {
            let _ = self
                .ledger
                .unlock(account.id, &asset, required, "order_unlock", now);
            return Err(store_fatal(err));
        }
        self.publish_submitted(&limit_leg, now);
        self.publish_submitted(&stop_leg, now);

        self.engines.with_engine(&params.market, |engine| {
            engine.submit_oco(limit_leg.clone(), stop_leg.clone(), now)
        })??;

        Ok((
            self.store.get_order(limit_leg.id).map_err(store_fatal)?,
            self.store.get_order(stop_leg.id).map_err(store_fatal)?,
        ))
    }

    /// Cancel an order the user owns. Returns false when there is nothing
    /// cancellable.
    pub fn cancel_order(&self, user_id: UserId, order_id: OrderId) -> Result<bool, EngineError> {
        let now = unix_nanos();
        let Ok(order) = self.store.get_order(order_id) else {
            return Ok(false);
        };
        if order.user_id != user_id {
            return Ok(false);
        }
        self.engines
            .with_engine(&order.market, |engine| engine.cancel(order_id, now))?
    }

    // ── queries ────────────────────────────────────────────────────────

    /// Live orders for a user, newest first
    pub fn open_orders(&self, user_id: UserId) -> Vec<Order> {
        self.store.open_orders_for_user(user_id)
    }

    /// Full order history for a user, newest first
    pub fn order_history(&self, user_id: UserId) -> Vec<Order> {
        self.store.orders_for_user(user_id)
    }

    /// Trades the user participated in, newest first
    pub fn trades(&self, user_id: UserId, limit: usize) -> Result<Vec<Trade>, AdmissionError> {
        let account = self.account(user_id)?;
        Ok(self.store.trades_for_account(account.id, limit))
    }

    fn publish_submitted(&self, order: &Order, now: i64) {
        self.bus.publish(
            Event::OrderSubmitted {
                order_id: order.id,
                account_id: order.account_id,
                market: order.market.clone(),
                side: order.side,
                kind: order.kind,
                time_in_force: order.time_in_force,
                price: order.price,
                amount: order.amount,
            },
            now,
        );
    }
}

/// SHA-256 hex digest, the password hashing scheme of the account store
fn password_hash(password: &str) -> String {
    let digest = Sha256::digest(password.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Persistence failures after admission follow the fatal-alert path
fn store_fatal(err: StoreError) -> EngineError {
    EngineError::Fatal(FatalError::LedgerInconsistency {
        detail: err.to_string(),
    })
}
