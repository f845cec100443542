//! Deposit and withdrawal transaction types
//!
//! Deposits move `pending → confirmed` once the per-asset confirmation
//! threshold is reached; `tx_hash` uniqueness makes re-delivery idempotent.
//! Withdrawals walk the two-eyes workflow before broadcast:
//!
//! `pending → approved_pending_second → approved → confirmed`
//!
//! with `rejected` reachable from any pre-broadcast stage.

use crate::ids::{Asset, TxId, UserId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Transaction direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Deposit,
    Withdrawal,
}

/// Coarse transaction status. `confirmed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Confirmed,
    Failed,
}

/// Fine-grained stage of the two-eyes withdrawal workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WithdrawalStage {
    PendingApproval,
    ApprovedPendingSecond,
    /// Both approvals collected; broadcast enqueued
    Approved,
    /// Broadcast succeeded, locked funds debited (terminal)
    Confirmed,
    /// Rejected by an admin at a pre-broadcast stage (terminal)
    Rejected,
}

impl WithdrawalStage {
    /// Whether an admin can still reject at this stage
    pub fn rejectable(&self) -> bool {
        matches!(
            self,
            WithdrawalStage::PendingApproval
                | WithdrawalStage::ApprovedPendingSecond
                | WithdrawalStage::Approved
        )
    }
}

/// A deposit or withdrawal record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TxId,
    pub user_id: UserId,
    pub asset: Asset,
    pub tx_type: TransactionType,
    pub status: TransactionStatus,
    /// Strictly positive
    pub amount: Decimal,
    /// Network fee locked alongside the amount (withdrawals only)
    pub network_fee: Decimal,
    pub address: Option<String>,
    /// Unique when present; idempotency key for deposits
    pub tx_hash: Option<String>,
    pub confirmations: u32,
    /// Last external-integration failure, kept until the next operator action
    pub last_error: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Transaction {
    /// New pending deposit observed on chain
    pub fn deposit(
        id: TxId,
        user_id: UserId,
        asset: Asset,
        amount: Decimal,
        tx_hash: String,
        confirmations: u32,
        timestamp: i64,
    ) -> Self {
        Self {
            id,
            user_id,
            asset,
            tx_type: TransactionType::Deposit,
            status: TransactionStatus::Pending,
            amount,
            network_fee: Decimal::ZERO,
            address: None,
            tx_hash: Some(tx_hash),
            confirmations,
            last_error: None,
            created_at: timestamp,
            updated_at: timestamp,
        }
    }

    /// New pending withdrawal request
    pub fn withdrawal(
        id: TxId,
        user_id: UserId,
        asset: Asset,
        amount: Decimal,
        network_fee: Decimal,
        address: String,
        timestamp: i64,
    ) -> Self {
        Self {
            id,
            user_id,
            asset,
            tx_type: TransactionType::Withdrawal,
            status: TransactionStatus::Pending,
            amount,
            network_fee,
            address: Some(address),
            tx_hash: None,
            confirmations: 0,
            last_error: None,
            created_at: timestamp,
            updated_at: timestamp,
        }
    }

    /// Amount plus network fee; the quantity locked for a withdrawal
    pub fn gross_amount(&self) -> Decimal {
        self.amount + self.network_fee
    }
}
