//! Withdrawal mechanics
//!
//! The wallet owns the ledger side of a withdrawal: locking at request
//! time, debiting locked funds after a successful broadcast, and restoring
//! them on rejection. The two-eyes approval sequencing lives in the admin
//! service, which calls into these operations.

use std::thread;
use std::time::Duration;

use rust_decimal::Decimal;
use tracing::{info, warn};
use types::errors::{StoreError, WalletError};
use types::ids::{Asset, TxId, UserId};
use types::transaction::{Transaction, TransactionStatus, TransactionType};

use crate::WalletService;
use bus::Event;
use store::{Sequence, Store};

/// Attempts before a broadcast failure is surfaced
const MAX_BROADCAST_ATTEMPTS: u32 = 3;
/// Base delay between broadcast retries
const BROADCAST_BACKOFF: Duration = Duration::from_millis(50);

/// Outbound transfer integration. Implementations submit the transaction
/// to the network and return its hash.
pub trait Broadcaster: Send + Sync {
    fn broadcast(&self, tx: &Transaction) -> Result<String, String>;
}

/// Broadcaster that always succeeds with a synthetic hash, for tests and
/// local runs without a chain connection
pub struct NullBroadcaster;

impl Broadcaster for NullBroadcaster {
    fn broadcast(&self, tx: &Transaction) -> Result<String, String> {
        Ok(format!("0xbroadcast{:016x}", tx.id.value()))
    }
}

impl WalletService {
    /// Lock `amount + network_fee` and record a pending withdrawal
    pub fn request_withdrawal(
        &self,
        user_id: UserId,
        asset: Asset,
        amount: Decimal,
        address: String,
        now: i64,
    ) -> Result<Transaction, WalletError> {
        if amount <= Decimal::ZERO {
            return Err(WalletError::InvalidAmount);
        }
        let account = self
            .store
            .account_for_user(user_id)
            .ok_or(StoreError::NotFound {
                entity: "account",
                id: user_id.value(),
            })?;

        let fee = self.config.network_fee(&asset);
        let tx = Transaction::withdrawal(
            TxId(self.store.next_id(Sequence::Transactions)),
            user_id,
            asset.clone(),
            amount,
            fee,
            address,
            now,
        );

        self.ledger
            .lock(account.id, &asset, tx.gross_amount(), "withdrawal_lock", now)
            .map_err(|e| WalletError::Admission(e.into()))?;

        let uow = self.store.begin();
        if let Err(err) = self.store.insert_transaction(tx.clone()) {
            let _ = self.ledger.unlock(
                account.id,
                &asset,
                tx.gross_amount(),
                "withdrawal_release",
                now,
            );
            return Err(err.into());
        }
        uow.commit();
        info!(tx_id = tx.id.value(), asset = %asset, %amount, "withdrawal requested");
        Ok(tx)
    }

    /// Broadcast an approved withdrawal with bounded retries. On success
    /// the locked funds leave the ledger and the transaction confirms; on
    /// exhaustion the transaction keeps its state with `last_error` set for
    /// the next operator action.
    pub fn complete_withdrawal(&self, tx_id: TxId, now: i64) -> Result<Transaction, WalletError> {
        let mut tx = self.withdrawal(tx_id)?;
        if tx.status != TransactionStatus::Pending {
            return Err(WalletError::InvalidStage { tx_id });
        }
        let account = self
            .store
            .account_for_user(tx.user_id)
            .ok_or(StoreError::NotFound {
                entity: "account",
                id: tx.user_id.value(),
            })?;

        let mut last_error = String::new();
        let mut tx_hash = None;
        for attempt in 1..=MAX_BROADCAST_ATTEMPTS {
            match self.broadcaster.broadcast(&tx) {
                Ok(hash) => {
                    tx_hash = Some(hash);
                    break;
                }
                Err(err) => {
                    warn!(tx_id = tx_id.value(), attempt, error = %err, "broadcast failed");
                    last_error = err;
                    if attempt < MAX_BROADCAST_ATTEMPTS {
                        thread::sleep(BROADCAST_BACKOFF * attempt);
                    }
                }
            }
        }

        let Some(tx_hash) = tx_hash else {
            tx.last_error = Some(last_error.clone());
            tx.updated_at = now;
            self.store.update_transaction(tx)?;
            return Err(WalletError::BroadcastFailed {
                attempts: MAX_BROADCAST_ATTEMPTS,
                last_error,
            });
        };

        self.ledger
            .debit_locked(
                account.id,
                &tx.asset,
                tx.gross_amount(),
                "withdrawal_confirmed",
                now,
            )
            .map_err(|e| WalletError::Admission(e.into()))?;

        tx.status = TransactionStatus::Confirmed;
        tx.tx_hash = Some(tx_hash.clone());
        tx.last_error = None;
        tx.updated_at = now;
        let uow = self.store.begin();
        self.store.update_transaction(tx.clone())?;
        uow.commit();

        self.bus.publish(
            Event::WithdrawalConfirmed {
                tx_id: tx.id,
                tx_hash,
                asset: tx.asset.clone(),
                amount: tx.amount,
                network_fee: tx.network_fee,
            },
            now,
        );
        info!(tx_id = tx.id.value(), "withdrawal confirmed");
        Ok(tx)
    }

    /// Restore the locked funds of a rejected withdrawal exactly
    pub fn release_withdrawal(&self, tx_id: TxId, now: i64) -> Result<Transaction, WalletError> {
        let mut tx = self.withdrawal(tx_id)?;
        if tx.status != TransactionStatus::Pending {
            return Err(WalletError::InvalidStage { tx_id });
        }
        let account = self
            .store
            .account_for_user(tx.user_id)
            .ok_or(StoreError::NotFound {
                entity: "account",
                id: tx.user_id.value(),
            })?;

        self.ledger
            .unlock(
                account.id,
                &tx.asset,
                tx.gross_amount(),
                "withdrawal_release",
                now,
            )
            .map_err(|e| WalletError::Admission(e.into()))?;

        tx.status = TransactionStatus::Failed;
        tx.updated_at = now;
        let uow = self.store.begin();
        self.store.update_transaction(tx.clone())?;
        uow.commit();
        Ok(tx)
    }

    /// Withdrawals awaiting the approval workflow
    pub fn pending_withdrawals(&self) -> Vec<Transaction> {
        self.store.pending_withdrawals()
    }

    fn withdrawal(&self, tx_id: TxId) -> Result<Transaction, WalletError> {
        let tx = self
            .store
            .get_transaction(tx_id)
            .map_err(|_| WalletError::TxNotFound { tx_id })?;
        if tx.tx_type != TransactionType::Withdrawal {
            return Err(WalletError::NotAWithdrawal { tx_id });
        }
        Ok(tx)
    }
}
