//! Error taxonomy for the trading core
//!
//! Four families with different recovery semantics:
//! - admission errors: recovered at the API boundary, no state change
//! - fatal engine errors: promoted to a system alert and an engine halt
//! - external-integration errors: retried with bounded backoff, surfaced
//!   after exhaustion
//! - authorization errors: surfaced to the acting admin

use crate::ids::{AccountId, Asset, MarketId, OrderId, TxId, UserId};
use rust_decimal::Decimal;
use thiserror::Error;

/// Configuration errors (exit code 1)
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("no markets configured")]
    NoMarkets,

    #[error("market {market} symbol does not match its base/quote assets")]
    SymbolAssetMismatch { market: MarketId },

    #[error("market {market} has a non-positive price or size tick")]
    NonPositiveTick { market: MarketId },

    #[error("market {market} has invalid order size bounds")]
    InvalidSizeBounds { market: MarketId },

    #[error("negative network fee configured for {asset}")]
    NegativeNetworkFee { asset: Asset },
}

/// Ledger posting errors
///
/// At admission these surface as [`AdmissionError::InsufficientBalance`];
/// during settlement they indicate state corruption and are fatal.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LedgerError {
    #[error(
        "insufficient available balance: account {account_id} {asset}, required {required}, available {available}"
    )]
    InsufficientAvailable {
        account_id: AccountId,
        asset: Asset,
        required: Decimal,
        available: Decimal,
    },

    #[error(
        "insufficient locked balance: account {account_id} {asset}, required {required}, locked {locked}"
    )]
    InsufficientLocked {
        account_id: AccountId,
        asset: Asset,
        required: Decimal,
        locked: Decimal,
    },
}

/// Admission errors: rejected before any state change
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AdmissionError {
    #[error("account not found for user {user_id}")]
    AccountNotFound { user_id: UserId },

    #[error("account {account_id} is not active")]
    AccountNotActive { account_id: AccountId },

    #[error(
        "insufficient balance: account {account_id} {asset}, required {required}, available {available}"
    )]
    InsufficientBalance {
        account_id: AccountId,
        asset: Asset,
        required: Decimal,
        available: Decimal,
    },

    #[error("invalid order: {reason}")]
    InvalidOrder { reason: String },

    #[error("unknown market: {market}")]
    MarketUnknown { market: MarketId },

    #[error("order size {amount} outside bounds [{min}, {max}] for {market}")]
    SizeBounds {
        market: MarketId,
        amount: Decimal,
        min: Decimal,
        max: Decimal,
    },

    #[error("value {value} is off the {tick} tick grid for {market}")]
    TickViolation {
        market: MarketId,
        value: Decimal,
        tick: Decimal,
    },

    #[error("fill-or-kill order cannot be fully filled")]
    FokUnfillable,
}

impl From<LedgerError> for AdmissionError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::InsufficientAvailable {
                account_id,
                asset,
                required,
                available,
            } => AdmissionError::InsufficientBalance {
                account_id,
                asset,
                required,
                available,
            },
            LedgerError::InsufficientLocked {
                account_id,
                asset,
                required,
                locked,
            } => AdmissionError::InsufficientBalance {
                account_id,
                asset,
                required,
                available: locked,
            },
        }
    }
}

/// Fatal engine conditions. The engine halts and emits a system alert;
/// it never attempts self-repair.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FatalError {
    #[error("ledger inconsistency during settlement: {detail}")]
    LedgerInconsistency { detail: String },

    #[error("order book index corruption for order {order_id}")]
    BookIndexCorruption { order_id: OrderId },

    #[error("stop trigger cascade exceeded safety bound of {bound}")]
    StopTriggerLoop { bound: usize },
}

/// Errors returned from an engine command
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("engine halted on a prior fatal alert")]
    Halted,

    #[error(transparent)]
    Admission(#[from] AdmissionError),

    #[error("fatal: {0}")]
    Fatal(#[from] FatalError),
}

/// Store access errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: u64 },

    #[error("email already registered: {email}")]
    DuplicateEmail { email: String },

    #[error("persistence backend unavailable: {reason}")]
    Unavailable { reason: String },
}

/// Wallet and withdrawal-lifecycle errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WalletError {
    #[error("transaction {tx_id} not found")]
    TxNotFound { tx_id: TxId },

    #[error("transaction {tx_id} is not a withdrawal")]
    NotAWithdrawal { tx_id: TxId },

    #[error("withdrawal {tx_id} is not in a state that allows this action")]
    InvalidStage { tx_id: TxId },

    #[error("deposit amount must be positive")]
    InvalidAmount,

    #[error("withdrawal broadcast failed after {attempts} attempts: {last_error}")]
    BroadcastFailed { attempts: u32, last_error: String },

    #[error(transparent)]
    Admission(#[from] AdmissionError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Authorization errors for admin operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AdminError {
    #[error("approval requires a different admin: {admin_id} already approved")]
    SameApprover { admin_id: u64 },

    #[error("admin {admin_id} lacks the required role")]
    InsufficientRole { admin_id: u64 },

    #[error("approval request {approval_id} not found")]
    ApprovalNotFound { approval_id: u64 },

    #[error("approval request {approval_id} is not pending")]
    NotPending { approval_id: u64 },

    #[error(transparent)]
    Wallet(#[from] WalletError),
}
