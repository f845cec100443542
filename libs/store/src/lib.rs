//! Repository and unit-of-work contract
//!
//! The trading core accesses orders, users, transactions, and audit records
//! through the [`Store`] trait; balances live in the ledger, which owns
//! their mutation exclusively. A backend is chosen once at process
//! initialization and never mixed within a unit of work.
//!
//! [`Store::begin`] opens a unit of work with all-or-nothing semantics: the
//! guard rolls the store back to its pre-begin state unless `commit` is
//! called. The bundled [`memory::InMemoryStore`] implements the contract
//! with snapshot/restore; a SQL backend would map it onto transactions.

pub mod memory;

pub use memory::InMemoryStore;

use types::account::{Account, User};
use types::audit::AuditRecord;
use types::errors::StoreError;
use types::ids::{AccountId, OrderId, TradeId, TxId, UserId};
use types::order::Order;
use types::trade::Trade;
use types::transaction::Transaction;

/// Id sequences issued by the store. Ids are monotonically assigned 64-bit
/// integers, so creation order is encoded in the id itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Sequence {
    Users,
    Accounts,
    Orders,
    Trades,
    Transactions,
    Links,
    Approvals,
    Audit,
}

/// A unit of work with serializable, all-or-nothing semantics.
///
/// Dropping the guard without calling [`UnitOfWork::commit`] rolls every
/// mutation made since [`Store::begin`] back.
pub trait UnitOfWork {
    /// Make all mutations since `begin` durable
    fn commit(self: Box<Self>);
}

/// Abstract repository over the trading core's entity stores.
///
/// Operations are the usual insert / update / get-by-id / query-by-indexed-
/// predicate set. Implementations must serialize concurrent mutations so a
/// reader always observes a consistent snapshot.
pub trait Store: Send + Sync {
    /// Issue the next id from a sequence
    fn next_id(&self, sequence: Sequence) -> u64;

    /// Open a unit of work
    fn begin(&self) -> Box<dyn UnitOfWork + '_>;

    // ── users ──────────────────────────────────────────────────────────
    /// Insert a user; fails on a duplicate (case-folded) email
    fn insert_user(&self, user: User) -> Result<(), StoreError>;
    fn get_user(&self, id: UserId) -> Result<User, StoreError>;
    fn find_user_by_email(&self, email: &str) -> Option<User>;

    // ── accounts ───────────────────────────────────────────────────────
    fn insert_account(&self, account: Account) -> Result<(), StoreError>;
    fn get_account(&self, id: AccountId) -> Result<Account, StoreError>;
    fn update_account(&self, account: Account) -> Result<(), StoreError>;
    fn account_for_user(&self, user_id: UserId) -> Option<Account>;

    // ── orders ─────────────────────────────────────────────────────────
    fn insert_order(&self, order: Order) -> Result<(), StoreError>;
    fn update_order(&self, order: Order) -> Result<(), StoreError>;
    fn get_order(&self, id: OrderId) -> Result<Order, StoreError>;
    /// All orders for a user, newest first
    fn orders_for_user(&self, user_id: UserId) -> Vec<Order>;
    /// Orders still live (non-terminal) for a user, newest first
    fn open_orders_for_user(&self, user_id: UserId) -> Vec<Order>;

    // ── trades ─────────────────────────────────────────────────────────
    fn insert_trade(&self, trade: Trade) -> Result<(), StoreError>;
    fn get_trade(&self, id: TradeId) -> Result<Trade, StoreError>;
    /// Trades where the account was maker or taker, newest first
    fn trades_for_account(&self, account_id: AccountId, limit: usize) -> Vec<Trade>;

    // ── transactions ───────────────────────────────────────────────────
    fn insert_transaction(&self, tx: Transaction) -> Result<(), StoreError>;
    fn update_transaction(&self, tx: Transaction) -> Result<(), StoreError>;
    fn get_transaction(&self, id: TxId) -> Result<Transaction, StoreError>;
    /// Look up by on-chain hash; deposits use this for idempotent re-delivery
    fn find_transaction_by_hash(&self, tx_hash: &str) -> Option<Transaction>;
    /// Withdrawals not yet confirmed or failed, oldest first
    fn pending_withdrawals(&self) -> Vec<Transaction>;

    // ── audit ──────────────────────────────────────────────────────────
    fn append_audit(&self, record: AuditRecord) -> Result<(), StoreError>;
    /// Most recent audit records, newest first
    fn audit_records(&self, limit: usize) -> Vec<AuditRecord>;

    /// Row counts for the admin dashboard
    fn metrics(&self) -> StoreMetrics;
}

/// Table sizes, surfaced by the admin service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StoreMetrics {
    pub users: usize,
    pub accounts: usize,
    pub orders: usize,
    pub trades: usize,
    pub transactions: usize,
}
