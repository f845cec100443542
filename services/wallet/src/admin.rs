//! Admin service
//!
//! Two-eyes withdrawal approvals, account freezes, and the audit surface.
//! Every admin action appends an audit record and publishes an
//! `admin.audit` event. The same admin cannot fill both approval slots.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde_json::json;
use tracing::info;
use types::account::AccountStatus;
use types::audit::AuditRecord;
use types::errors::{AdminError, StoreError, WalletError};
use types::ids::{AccountId, AdminId, ApprovalId, TxId};
use types::transaction::{Transaction, WithdrawalStage};

use crate::WalletService;
use bus::{Event, EventBus};
use store::{Sequence, Store, StoreMetrics};

/// Approval workflow state for one withdrawal
#[derive(Debug, Clone)]
pub struct ApprovalState {
    pub approval_id: ApprovalId,
    pub stage: WithdrawalStage,
    pub first_approver: Option<AdminId>,
    pub second_approver: Option<AdminId>,
    pub reason: Option<String>,
}

/// Counts surfaced on the admin dashboard
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SystemMetrics {
    pub users: usize,
    pub orders: usize,
    pub trades: usize,
    pub pending_withdrawals: usize,
}

pub struct AdminService {
    store: Arc<dyn Store>,
    bus: Arc<EventBus>,
    wallet: Arc<WalletService>,
    approvals: Mutex<HashMap<TxId, ApprovalState>>,
}

impl AdminService {
    pub fn new(store: Arc<dyn Store>, bus: Arc<EventBus>, wallet: Arc<WalletService>) -> Self {
        Self {
            store,
            bus,
            wallet,
            approvals: Mutex::new(HashMap::new()),
        }
    }

    // ── two-eyes withdrawal approvals ──────────────────────────────────

    /// Record one approval. The first approval parks the withdrawal in
    /// `approved_pending_second`; a second approval by a *different* admin
    /// moves it to `approved` and hands it to the broadcaster.
    pub fn approve_withdrawal(
        &self,
        tx_id: TxId,
        admin_id: AdminId,
        reason: Option<&str>,
        now: i64,
    ) -> Result<WithdrawalStage, AdminError> {
        // Validate the transaction exists and is still pending
        self.pending_withdrawal(tx_id)?;

        let mut approvals = self.approvals.lock().expect("approval table poisoned");
        let state = approvals.entry(tx_id).or_insert_with(|| ApprovalState {
            approval_id: ApprovalId(self.store.next_id(Sequence::Approvals)),
            stage: WithdrawalStage::PendingApproval,
            first_approver: None,
            second_approver: None,
            reason: None,
        });

        match state.stage {
            WithdrawalStage::PendingApproval => {
                state.first_approver = Some(admin_id);
                state.stage = WithdrawalStage::ApprovedPendingSecond;
                state.reason = reason.map(str::to_string);
                let approval_id = state.approval_id;
                drop(approvals);

                self.audit(
                    &format!("admin:{admin_id}"),
                    "withdrawal_first_approval",
                    &format!("withdrawal:{tx_id}"),
                    json!({ "approval_id": approval_id.value(), "reason": reason }),
                    now,
                );
                self.bus.publish(
                    Event::WithdrawalApproved {
                        tx_id,
                        approval_id,
                        approver: admin_id.value(),
                        stage: 1,
                    },
                    now,
                );
                Ok(WithdrawalStage::ApprovedPendingSecond)
            }
            WithdrawalStage::ApprovedPendingSecond => {
                if state.first_approver == Some(admin_id) {
                    return Err(AdminError::SameApprover {
                        admin_id: admin_id.value(),
                    });
                }
                state.second_approver = Some(admin_id);
                state.stage = WithdrawalStage::Approved;
                let approval_id = state.approval_id;
                drop(approvals);

                self.audit(
                    &format!("admin:{admin_id}"),
                    "withdrawal_second_approval",
                    &format!("withdrawal:{tx_id}"),
                    json!({ "approval_id": approval_id.value(), "reason": reason }),
                    now,
                );
                self.bus.publish(
                    Event::WithdrawalApproved {
                        tx_id,
                        approval_id,
                        approver: admin_id.value(),
                        stage: 2,
                    },
                    now,
                );

                // Broadcast enqueued; failures leave the stage at Approved
                // with last_error recorded for the next operator action
                match self.wallet.complete_withdrawal(tx_id, now) {
                    Ok(_) => {
                        self.set_stage(tx_id, WithdrawalStage::Confirmed);
                        info!(tx_id = tx_id.value(), "withdrawal completed");
                        Ok(WithdrawalStage::Confirmed)
                    }
                    Err(err) => Err(AdminError::Wallet(err)),
                }
            }
            _ => Err(AdminError::NotPending {
                approval_id: state.approval_id.value(),
            }),
        }
    }

    /// Retry the broadcast of a fully approved withdrawal whose previous
    /// attempt exhausted its retries
    pub fn retry_broadcast(
        &self,
        tx_id: TxId,
        admin_id: AdminId,
        now: i64,
    ) -> Result<WithdrawalStage, AdminError> {
        let stage = self.approval_state(tx_id).map(|s| s.stage);
        if stage != Some(WithdrawalStage::Approved) {
            return Err(AdminError::Wallet(WalletError::InvalidStage { tx_id }));
        }
        self.audit(
            &format!("admin:{admin_id}"),
            "withdrawal_broadcast_retry",
            &format!("withdrawal:{tx_id}"),
            json!({}),
            now,
        );
        self.wallet.complete_withdrawal(tx_id, now)?;
        self.set_stage(tx_id, WithdrawalStage::Confirmed);
        Ok(WithdrawalStage::Confirmed)
    }

    /// Reject at any pre-broadcast stage, restoring the locked funds
    pub fn reject_withdrawal(
        &self,
        tx_id: TxId,
        admin_id: AdminId,
        reason: &str,
        now: i64,
    ) -> Result<(), AdminError> {
        self.pending_withdrawal(tx_id)?;
        {
            let approvals = self.approvals.lock().expect("approval table poisoned");
            if let Some(state) = approvals.get(&tx_id) {
                if !state.stage.rejectable() {
                    return Err(AdminError::NotPending {
                        approval_id: state.approval_id.value(),
                    });
                }
            }
        }

        self.wallet.release_withdrawal(tx_id, now)?;
        self.set_stage(tx_id, WithdrawalStage::Rejected);
        self.audit(
            &format!("admin:{admin_id}"),
            "withdrawal_rejected",
            &format!("withdrawal:{tx_id}"),
            json!({ "reason": reason }),
            now,
        );
        Ok(())
    }

    /// Workflow state for a withdrawal, if any approvals were recorded
    pub fn approval_state(&self, tx_id: TxId) -> Option<ApprovalState> {
        self.approvals
            .lock()
            .expect("approval table poisoned")
            .get(&tx_id)
            .cloned()
    }

    /// Withdrawals awaiting approval or broadcast
    pub fn pending_withdrawals(&self) -> Vec<Transaction> {
        self.wallet.pending_withdrawals()
    }

    /// Every recorded approval workflow, most recent first
    pub fn approval_history(&self) -> Vec<(TxId, ApprovalState)> {
        let mut history: Vec<(TxId, ApprovalState)> = self
            .approvals
            .lock()
            .expect("approval table poisoned")
            .iter()
            .map(|(tx_id, state)| (*tx_id, state.clone()))
            .collect();
        history.sort_by_key(|(_, state)| std::cmp::Reverse(state.approval_id));
        history
    }

    // ── account controls ───────────────────────────────────────────────

    /// Freeze an account: admission rejects its orders and withdrawals
    pub fn freeze_account(
        &self,
        account_id: AccountId,
        admin_id: AdminId,
        reason: &str,
        now: i64,
    ) -> Result<(), AdminError> {
        self.set_account_status(account_id, AccountStatus::Frozen)?;
        self.audit(
            &format!("admin:{admin_id}"),
            "account_frozen",
            &format!("account:{account_id}"),
            json!({ "reason": reason }),
            now,
        );
        Ok(())
    }

    /// Restore a frozen account to active
    pub fn unfreeze_account(
        &self,
        account_id: AccountId,
        admin_id: AdminId,
        now: i64,
    ) -> Result<(), AdminError> {
        self.set_account_status(account_id, AccountStatus::Active)?;
        self.audit(
            &format!("admin:{admin_id}"),
            "account_unfrozen",
            &format!("account:{account_id}"),
            json!({}),
            now,
        );
        Ok(())
    }

    // ── audit & metrics ────────────────────────────────────────────────

    /// Most recent audit entries, newest first
    pub fn audit_records(&self, limit: usize) -> Vec<AuditRecord> {
        self.store.audit_records(limit)
    }

    /// Dashboard counters
    pub fn system_metrics(&self) -> SystemMetrics {
        let StoreMetrics {
            users,
            orders,
            trades,
            ..
        } = self.store.metrics();
        SystemMetrics {
            users,
            orders,
            trades,
            pending_withdrawals: self.pending_withdrawals().len(),
        }
    }

    // ── internals ──────────────────────────────────────────────────────

    fn pending_withdrawal(&self, tx_id: TxId) -> Result<Transaction, AdminError> {
        let tx = self
            .store
            .get_transaction(tx_id)
            .map_err(|_| AdminError::Wallet(WalletError::TxNotFound { tx_id }))?;
        if tx.tx_type != types::transaction::TransactionType::Withdrawal {
            return Err(AdminError::Wallet(WalletError::NotAWithdrawal { tx_id }));
        }
        if tx.status != types::transaction::TransactionStatus::Pending {
            return Err(AdminError::Wallet(WalletError::InvalidStage { tx_id }));
        }
        Ok(tx)
    }

    fn set_stage(&self, tx_id: TxId, stage: WithdrawalStage) {
        if let Some(state) = self
            .approvals
            .lock()
            .expect("approval table poisoned")
            .get_mut(&tx_id)
        {
            state.stage = stage;
        }
    }

    fn set_account_status(
        &self,
        account_id: AccountId,
        status: AccountStatus,
    ) -> Result<(), AdminError> {
        let mut account = self
            .store
            .get_account(account_id)
            .map_err(|e| AdminError::Wallet(WalletError::Store(e)))?;
        account.status = status;
        self.store
            .update_account(account)
            .map_err(|e: StoreError| AdminError::Wallet(WalletError::Store(e)))?;
        Ok(())
    }

    fn audit(
        &self,
        actor: &str,
        action: &str,
        entity: &str,
        metadata: serde_json::Value,
        now: i64,
    ) {
        let record = AuditRecord::new(
            self.store.next_id(Sequence::Audit),
            actor,
            action,
            entity,
            metadata,
            now,
        );
        let _ = self.store.append_audit(record);
        self.bus.publish(
            Event::AdminAudit {
                actor: actor.to_string(),
                action: action.to_string(),
                entity: entity.to_string(),
            },
            now,
        );
    }
}
