//! Domain events published on the bus
//!
//! Each variant maps onto one dotted topic. Events for a market are
//! published in the order the engine committed the underlying state
//! transitions; the envelope adds a global sequence and an event id.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use types::ids::{AccountId, ApprovalId, Asset, MarketId, OrderId, TradeId, TxId, UserId};
use types::numeric::{Price, Quantity};
use types::order::{CancelReason, OrderKind, RejectReason, Side, TimeInForce};
use uuid::Uuid;

/// Event payloads, one per topic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum Event {
    /// An order passed admission and was handed to the engine
    OrderSubmitted {
        order_id: OrderId,
        account_id: AccountId,
        market: MarketId,
        side: Side,
        kind: OrderKind,
        time_in_force: TimeInForce,
        price: Option<Price>,
        amount: Quantity,
    },

    /// An order (or its residue) is resting on the book or armed as a stop
    OrderAccepted {
        order_id: OrderId,
        market: MarketId,
        side: Side,
        remaining: Quantity,
    },

    /// An order was rejected; no balance effect remains
    OrderRejected {
        order_id: OrderId,
        market: MarketId,
        reason: RejectReason,
    },

    /// An order was canceled by the user or the system
    OrderCanceled {
        order_id: OrderId,
        market: MarketId,
        reason: CancelReason,
        filled: Quantity,
        remaining: Quantity,
    },

    /// A stop order's trigger fired and it re-entered matching
    OrderTriggered {
        order_id: OrderId,
        market: MarketId,
        stop_price: Price,
        last_price: Price,
    },

    /// A maker/taker match executed
    TradeExecuted {
        trade_id: TradeId,
        market: MarketId,
        price: Price,
        amount: Quantity,
        maker_order_id: OrderId,
        taker_order_id: OrderId,
        taker_side: Side,
        executed_at: i64,
    },

    /// A balance row changed; emitted by the ledger after the posting commits
    BalanceChanged {
        account_id: AccountId,
        asset: Asset,
        available: Decimal,
        locked: Decimal,
        reason: String,
    },

    /// A deposit reached its confirmation threshold and was credited
    DepositConfirmed {
        tx_id: TxId,
        user_id: UserId,
        asset: Asset,
        amount: Decimal,
        tx_hash: String,
    },

    /// A withdrawal collected an approval (first or second)
    WithdrawalApproved {
        tx_id: TxId,
        approval_id: ApprovalId,
        approver: u64,
        /// 1 for the first approval, 2 for the completing one
        stage: u8,
    },

    /// A withdrawal was broadcast and the locked funds were debited
    WithdrawalConfirmed {
        tx_id: TxId,
        tx_hash: String,
        asset: Asset,
        amount: Decimal,
        network_fee: Decimal,
    },

    /// An admin action was appended to the audit log
    AdminAudit {
        actor: String,
        action: String,
        entity: String,
    },

    /// Fatal engine condition; the engine halted
    SystemAlert {
        market: Option<MarketId>,
        detail: String,
    },
}

impl Event {
    /// Dotted topic this event publishes under
    pub fn topic(&self) -> &'static str {
        match self {
            Event::OrderSubmitted { .. } => "order.submitted",
            Event::OrderAccepted { .. } => "order.accepted",
            Event::OrderRejected { .. } => "order.rejected",
            Event::OrderCanceled { .. } => "order.canceled",
            Event::OrderTriggered { .. } => "order.triggered",
            Event::TradeExecuted { .. } => "trade.executed",
            Event::BalanceChanged { .. } => "balance.changed",
            Event::DepositConfirmed { .. } => "deposit.confirmed",
            Event::WithdrawalApproved { .. } => "withdrawal.approved",
            Event::WithdrawalConfirmed { .. } => "withdrawal.confirmed",
            Event::AdminAudit { .. } => "admin.audit",
            Event::SystemAlert { .. } => "system.alert",
        }
    }
}

/// Envelope added at publish time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub event_id: Uuid,
    /// Global monotonic publish sequence
    pub sequence: u64,
    /// Unix nanos at the commit point of the underlying transition
    pub timestamp: i64,
    pub event: Event,
}
