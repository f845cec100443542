//! Wallet and admin services
//!
//! Deposit crediting (confirmation thresholds, idempotent re-delivery by
//! `tx_hash`), the two-eyes withdrawal lifecycle, account freezes, and the
//! audit surface. These are the only components besides the matching
//! engine that post to the ledger.

pub mod admin;
pub mod deposits;
pub mod withdrawals;

pub use admin::{AdminService, ApprovalState, SystemMetrics};
pub use deposits::DepositObserved;
pub use withdrawals::{Broadcaster, NullBroadcaster};

use std::sync::Arc;

use bus::EventBus;
use ledger::AccountLedger;
use store::Store;
use types::config::ExchangeConfig;

/// Ledger-facing wallet operations shared by the deposit and withdrawal
/// flows. The admin service drives the approval side.
pub struct WalletService {
    config: Arc<ExchangeConfig>,
    store: Arc<dyn Store>,
    ledger: Arc<AccountLedger>,
    bus: Arc<EventBus>,
    broadcaster: Arc<dyn Broadcaster>,
}

impl WalletService {
    pub fn new(
        config: Arc<ExchangeConfig>,
        store: Arc<dyn Store>,
        ledger: Arc<AccountLedger>,
        bus: Arc<EventBus>,
        broadcaster: Arc<dyn Broadcaster>,
    ) -> Self {
        Self {
            config,
            store,
            ledger,
            bus,
            broadcaster,
        }
    }
}
