//! Deposit crediting
//!
//! The external chain watcher delivers `DepositObserved` values; this side
//! of the wallet records them, waits for the per-asset confirmation
//! threshold, and credits the ledger exactly once per `tx_hash`.

use rust_decimal::Decimal;
use tracing::{debug, info};
use types::errors::{StoreError, WalletError};
use types::ids::{Asset, TxId, UserId};
use types::transaction::{Transaction, TransactionStatus, TransactionType};

use crate::WalletService;
use bus::Event;
use store::{Sequence, Store};

/// One observation from the chain watcher. Re-delivery of the same
/// `tx_hash` is expected and must be idempotent.
#[derive(Debug, Clone)]
pub struct DepositObserved {
    pub user_id: UserId,
    pub asset: Asset,
    pub amount: Decimal,
    pub tx_hash: String,
    pub confirmations: u32,
}

impl WalletService {
    /// Deterministic deposit address for a user
    pub fn allocate_deposit_address(&self, user_id: UserId) -> String {
        format!("0xdeadbeef{:08x}", user_id.value())
    }

    /// Record a chain observation, crediting the ledger once the per-asset
    /// confirmation threshold is reached.
    pub fn on_deposit_observed(
        &self,
        observed: DepositObserved,
        now: i64,
    ) -> Result<Transaction, WalletError> {
        if observed.amount <= Decimal::ZERO {
            return Err(WalletError::InvalidAmount);
        }
        let account =
            self.store
                .account_for_user(observed.user_id)
                .ok_or(StoreError::NotFound {
                    entity: "account",
                    id: observed.user_id.value(),
                })?;

        let mut tx = match self.store.find_transaction_by_hash(&observed.tx_hash) {
            // Already credited: replay is a no-op
            Some(tx) if tx.status == TransactionStatus::Confirmed => return Ok(tx),
            Some(mut tx) => {
                tx.confirmations = tx.confirmations.max(observed.confirmations);
                tx.updated_at = now;
                tx
            }
            None => Transaction::deposit(
                TxId(self.store.next_id(Sequence::Transactions)),
                observed.user_id,
                observed.asset.clone(),
                observed.amount,
                observed.tx_hash.clone(),
                observed.confirmations,
                now,
            ),
        };

        let threshold = self.config.confirmation_threshold(&observed.asset);
        let confirmed = tx.confirmations >= threshold;
        if confirmed {
            tx.status = TransactionStatus::Confirmed;
        }

        let uow = self.store.begin();
        if self.store.get_transaction(tx.id).is_ok() {
            self.store.update_transaction(tx.clone())?;
        } else {
            self.store.insert_transaction(tx.clone())?;
        }
        uow.commit();

        if confirmed {
            self.ledger
                .credit(account.id, &tx.asset, tx.amount, "deposit", now);
            self.bus.publish(
                Event::DepositConfirmed {
                    tx_id: tx.id,
                    user_id: tx.user_id,
                    asset: tx.asset.clone(),
                    amount: tx.amount,
                    tx_hash: observed.tx_hash,
                },
                now,
            );
            info!(
                tx_id = tx.id.value(),
                asset = %tx.asset,
                amount = %tx.amount,
                "deposit confirmed"
            );
        } else {
            debug!(
                tx_id = tx.id.value(),
                confirmations = tx.confirmations,
                threshold,
                "deposit pending confirmations"
            );
        }
        debug_assert_eq!(tx.tx_type, TransactionType::Deposit);
        Ok(tx)
    }
}
