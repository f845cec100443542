//! User, account, and balance types

use crate::errors::LedgerError;
use crate::ids::{AccountId, Asset, UserId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A registered user. Users are created once and never destroyed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    /// Case-folded, unique
    pub email: String,
    pub password_hash: String,
    pub created_at: i64,
}

/// Account status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Active,
    Frozen,
    Closed,
}

/// A trading account, one-to-many with [`User`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub user_id: UserId,
    pub status: AccountStatus,
    pub kyc_level: u8,
}

impl Account {
    pub fn new(id: AccountId, user_id: UserId) -> Self {
        Self {
            id,
            user_id,
            status: AccountStatus::Active,
            kyc_level: 0,
        }
    }

    /// Check if account can trade and withdraw
    pub fn is_active(&self) -> bool {
        matches!(self.status, AccountStatus::Active)
    }
}

/// Balance for one (account, asset) pair
///
/// Invariant: `available ≥ 0 ∧ locked ≥ 0` at every observable point. All
/// mutations are checked; callers receive a structured error instead of a
/// partially applied change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub account_id: AccountId,
    pub asset: Asset,
    pub available: Decimal,
    pub locked: Decimal,
}

impl Balance {
    /// Zero balance row, created on first reference to the pair
    pub fn empty(account_id: AccountId, asset: Asset) -> Self {
        Self {
            account_id,
            asset,
            available: Decimal::ZERO,
            locked: Decimal::ZERO,
        }
    }

    /// Total holdings (available + locked)
    pub fn total(&self) -> Decimal {
        self.available + self.locked
    }

    /// Move `qty` from available to locked
    pub fn lock(&mut self, qty: Decimal) -> Result<(), LedgerError> {
        if self.available < qty {
            return Err(LedgerError::InsufficientAvailable {
                account_id: self.account_id,
                asset: self.asset.clone(),
                required: qty,
                available: self.available,
            });
        }
        self.available -= qty;
        self.locked += qty;
        Ok(())
    }

    /// Move `qty` from locked back to available
    pub fn unlock(&mut self, qty: Decimal) -> Result<(), LedgerError> {
        if self.locked < qty {
            return Err(LedgerError::InsufficientLocked {
                account_id: self.account_id,
                asset: self.asset.clone(),
                required: qty,
                locked: self.locked,
            });
        }
        self.locked -= qty;
        self.available += qty;
        Ok(())
    }

    /// Increase available (deposits, trade proceeds)
    pub fn credit(&mut self, qty: Decimal) {
        self.available += qty;
    }

    /// Decrease locked (outflow after a trade or withdrawal broadcast)
    pub fn debit_locked(&mut self, qty: Decimal) -> Result<(), LedgerError> {
        if self.locked < qty {
            return Err(LedgerError::InsufficientLocked {
                account_id: self.account_id,
                asset: self.asset.clone(),
                required: qty,
                locked: self.locked,
            });
        }
        self.locked -= qty;
        Ok(())
    }
}
