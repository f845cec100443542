//! In-memory store backend
//!
//! All tables live behind one mutex, which serializes mutations and gives
//! readers a consistent snapshot for free. Units of work clone the table
//! set on `begin` and restore it if the guard drops without `commit` — the
//! same all-or-nothing shape a SQL backend gets from transactions.

use std::collections::BTreeMap;
use std::sync::Mutex;

use types::account::{Account, User};
use types::audit::AuditRecord;
use types::errors::StoreError;
use types::ids::{AccountId, OrderId, TradeId, TxId, UserId};
use types::order::Order;
use types::trade::Trade;
use types::transaction::{Transaction, TransactionStatus, TransactionType};

use crate::{Sequence, Store, StoreMetrics, UnitOfWork};

#[derive(Debug, Clone, Default)]
struct Tables {
    users: BTreeMap<UserId, User>,
    accounts: BTreeMap<AccountId, Account>,
    orders: BTreeMap<OrderId, Order>,
    trades: BTreeMap<TradeId, Trade>,
    transactions: BTreeMap<TxId, Transaction>,
    audit: Vec<AuditRecord>,
    sequences: BTreeMap<&'static str, u64>,
}

impl Tables {
    fn next_id(&mut self, sequence: Sequence) -> u64 {
        let key = match sequence {
            Sequence::Users => "users",
            Sequence::Accounts => "accounts",
            Sequence::Orders => "orders",
            Sequence::Trades => "trades",
            Sequence::Transactions => "transactions",
            Sequence::Links => "links",
            Sequence::Approvals => "approvals",
            Sequence::Audit => "audit",
        };
        let counter = self.sequences.entry(key).or_insert(0);
        *counter += 1;
        *counter
    }
}

/// In-memory [`Store`] implementation
#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: Mutex<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Guard returned by [`InMemoryStore::begin`]. Each guard owns the snapshot
/// it captured at `begin`, so overlapping units of work from other callers
/// cannot disturb this one's rollback point.
pub struct MemoryUnitOfWork<'a> {
    store: &'a InMemoryStore,
    /// Taken on commit; restored on drop while still present
    snapshot: Option<Tables>,
}

impl UnitOfWork for MemoryUnitOfWork<'_> {
    fn commit(mut self: Box<Self>) {
        self.snapshot = None;
    }
}

impl Drop for MemoryUnitOfWork<'_> {
    fn drop(&mut self) {
        if let Some(snapshot) = self.snapshot.take() {
            *self.store.tables.lock().expect("tables poisoned") = snapshot;
        }
    }
}

impl InMemoryStore {
    fn with_tables<R>(&self, f: impl FnOnce(&mut Tables) -> R) -> R {
        let mut tables = self.tables.lock().expect("tables poisoned");
        f(&mut tables)
    }
}

impl Store for InMemoryStore {
    fn next_id(&self, sequence: Sequence) -> u64 {
        self.with_tables(|t| t.next_id(sequence))
    }

    fn begin(&self) -> Box<dyn UnitOfWork + '_> {
        let snapshot = self.tables.lock().expect("tables poisoned").clone();
        Box::new(MemoryUnitOfWork {
            store: self,
            snapshot: Some(snapshot),
        })
    }

    fn insert_user(&self, user: User) -> Result<(), StoreError> {
        self.with_tables(|t| {
            if t.users.values().any(|u| u.email == user.email) {
                return Err(StoreError::DuplicateEmail {
                    email: user.email.clone(),
                });
            }
            t.users.insert(user.id, user);
            Ok(())
        })
    }

    fn get_user(&self, id: UserId) -> Result<User, StoreError> {
        self.with_tables(|t| {
            t.users.get(&id).cloned().ok_or(StoreError::NotFound {
                entity: "user",
                id: id.value(),
            })
        })
    }

    fn find_user_by_email(&self, email: &str) -> Option<User> {
        let folded = email.to_lowercase();
        self.with_tables(|t| t.users.values().find(|u| u.email == folded).cloned())
    }

    fn insert_account(&self, account: Account) -> Result<(), StoreError> {
        self.with_tables(|t| {
            t.accounts.insert(account.id, account);
            Ok(())
        })
    }

    fn get_account(&self, id: AccountId) -> Result<Account, StoreError> {
        self.with_tables(|t| {
            t.accounts.get(&id).cloned().ok_or(StoreError::NotFound {
                entity: "account",
                id: id.value(),
            })
        })
    }

    fn update_account(&self, account: Account) -> Result<(), StoreError> {
        self.with_tables(|t| {
            if !t.accounts.contains_key(&account.id) {
                return Err(StoreError::NotFound {
                    entity: "account",
                    id: account.id.value(),
                });
            }
            t.accounts.insert(account.id, account);
            Ok(())
        })
    }

    fn account_for_user(&self, user_id: UserId) -> Option<Account> {
        self.with_tables(|t| {
            t.accounts
                .values()
                .find(|a| a.user_id == user_id)
                .cloned()
        })
    }

    fn insert_order(&self, order: Order) -> Result<(), StoreError> {
        self.with_tables(|t| {
            t.orders.insert(order.id, order);
            Ok(())
        })
    }

    fn update_order(&self, order: Order) -> Result<(), StoreError> {
        self.with_tables(|t| {
            if !t.orders.contains_key(&order.id) {
                return Err(StoreError::NotFound {
                    entity: "order",
                    id: order.id.value(),
                });
            }
            t.orders.insert(order.id, order);
            Ok(())
        })
    }

    fn get_order(&self, id: OrderId) -> Result<Order, StoreError> {
        self.with_tables(|t| {
            t.orders.get(&id).cloned().ok_or(StoreError::NotFound {
                entity: "order",
                id: id.value(),
            })
        })
    }

    fn orders_for_user(&self, user_id: UserId) -> Vec<Order> {
        self.with_tables(|t| {
            let mut orders: Vec<Order> = t
                .orders
                .values()
                .filter(|o| o.user_id == user_id)
                .cloned()
                .collect();
            orders.sort_by_key(|o| std::cmp::Reverse(o.id));
            orders
        })
    }

    fn open_orders_for_user(&self, user_id: UserId) -> Vec<Order> {
        self.orders_for_user(user_id)
            .into_iter()
            .filter(|o| !o.status.is_terminal())
            .collect()
    }

    fn insert_trade(&self, trade: Trade) -> Result<(), StoreError> {
        self.with_tables(|t| {
            t.trades.insert(trade.id, trade);
            Ok(())
        })
    }

    fn get_trade(&self, id: TradeId) -> Result<Trade, StoreError> {
        self.with_tables(|t| {
            t.trades.get(&id).cloned().ok_or(StoreError::NotFound {
                entity: "trade",
                id: id.value(),
            })
        })
    }

    fn trades_for_account(&self, account_id: AccountId, limit: usize) -> Vec<Trade> {
        self.with_tables(|t| {
            let mut trades: Vec<Trade> = t
                .trades
                .values()
                .filter(|tr| {
                    tr.maker_account_id == account_id || tr.taker_account_id == account_id
                })
                .cloned()
                .collect();
            trades.sort_by_key(|tr| std::cmp::Reverse(tr.id));
            trades.truncate(limit);
            trades
        })
    }

    fn insert_transaction(&self, tx: Transaction) -> Result<(), StoreError> {
        self.with_tables(|t| {
            t.transactions.insert(tx.id, tx);
            Ok(())
        })
    }

    fn update_transaction(&self, tx: Transaction) -> Result<(), StoreError> {
        self.with_tables(|t| {
            if !t.transactions.contains_key(&tx.id) {
                return Err(StoreError::NotFound {
                    entity: "transaction",
                    id: tx.id.value(),
                });
            }
            t.transactions.insert(tx.id, tx);
            Ok(())
        })
    }

    fn get_transaction(&self, id: TxId) -> Result<Transaction, StoreError> {
        self.with_tables(|t| {
            t.transactions
                .get(&id)
                .cloned()
                .ok_or(StoreError::NotFound {
                    entity: "transaction",
                    id: id.value(),
                })
        })
    }

    fn find_transaction_by_hash(&self, tx_hash: &str) -> Option<Transaction> {
        self.with_tables(|t| {
            t.transactions
                .values()
                .find(|tx| tx.tx_hash.as_deref() == Some(tx_hash))
                .cloned()
        })
    }

    fn pending_withdrawals(&self) -> Vec<Transaction> {
        self.with_tables(|t| {
            t.transactions
                .values()
                .filter(|tx| {
                    tx.tx_type == TransactionType::Withdrawal
                        && tx.status == TransactionStatus::Pending
                })
                .cloned()
                .collect()
        })
    }

    fn append_audit(&self, record: AuditRecord) -> Result<(), StoreError> {
        self.with_tables(|t| {
            t.audit.push(record);
            Ok(())
        })
    }

    fn audit_records(&self, limit: usize) -> Vec<AuditRecord> {
        self.with_tables(|t| t.audit.iter().rev().take(limit).cloned().collect())
    }

    fn metrics(&self) -> StoreMetrics {
        self.with_tables(|t| StoreMetrics {
            users: t.users.len(),
            accounts: t.accounts.len(),
            orders: t.orders.len(),
            trades: t.trades.len(),
            transactions: t.transactions.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use types::ids::Asset;
    use types::numeric::{Price, Quantity};
    use types::order::{OrderRequest, Side};

    fn user(id: u64, email: &str) -> User {
        User {
            id: UserId(id),
            email: email.to_string(),
            password_hash: "hash".into(),
            created_at: 1,
        }
    }

    fn order(store: &InMemoryStore, user_id: UserId) -> Order {
        let request = OrderRequest::limit(
            "ALT/USDT".into(),
            Side::Buy,
            Price::from_u64(100),
            Quantity::from_u64(10),
        );
        Order::from_request(
            OrderId(store.next_id(Sequence::Orders)),
            user_id,
            AccountId(1),
            &request,
            1,
        )
    }

    #[test]
    fn test_sequences_are_monotonic_and_independent() {
        let store = InMemoryStore::new();
        assert_eq!(store.next_id(Sequence::Orders), 1);
        assert_eq!(store.next_id(Sequence::Orders), 2);
        assert_eq!(store.next_id(Sequence::Trades), 1);
    }

    #[test]
    fn test_duplicate_email_rejected() {
        let store = InMemoryStore::new();
        store.insert_user(user(1, "a@x.io")).unwrap();
        let err = store.insert_user(user(2, "a@x.io")).unwrap_err();
        assert!(matches!(err, StoreError::DuplicateEmail { .. }));
    }

    #[test]
    fn test_uow_rollback_on_drop() {
        let store = InMemoryStore::new();
        store.insert_user(user(1, "a@x.io")).unwrap();
        {
            let _uow = store.begin();
            store.insert_user(user(2, "b@x.io")).unwrap();
            // dropped without commit
        }
        assert!(store.get_user(UserId(2)).is_err());
        assert!(store.get_user(UserId(1)).is_ok());
    }

    #[test]
    fn test_uow_commit_persists() {
        let store = InMemoryStore::new();
        {
            let uow = store.begin();
            store.insert_user(user(1, "a@x.io")).unwrap();
            uow.commit();
        }
        assert!(store.get_user(UserId(1)).is_ok());
    }

    #[test]
    fn test_overlapping_uows_roll_back_their_own_snapshots() {
        let store = InMemoryStore::new();
        store.insert_user(user(1, "a@x.io")).unwrap();

        let uow_a = store.begin();
        store.insert_user(user(2, "b@x.io")).unwrap();

        {
            let _uow_b = store.begin();
            store.insert_user(user(3, "c@x.io")).unwrap();
            // B dropped without commit: only B's mutation is undone
        }
        assert!(store.get_user(UserId(3)).is_err());
        assert!(store.get_user(UserId(2)).is_ok());

        // A dropped without commit: back to A's own rollback point
        drop(uow_a);
        assert!(store.get_user(UserId(2)).is_err());
        assert!(store.get_user(UserId(1)).is_ok());
    }

    #[test]
    fn test_dropped_uow_does_not_disturb_later_commit() {
        let store = InMemoryStore::new();

        let uow_a = store.begin();
        let uow_b = store.begin();
        store.insert_user(user(1, "a@x.io")).unwrap();
        uow_b.commit();

        // A rolls back to its own (empty) snapshot, not some other guard's
        drop(uow_a);
        assert!(store.get_user(UserId(1)).is_err());
    }

    #[test]
    fn test_uow_rollback_restores_sequences() {
        let store = InMemoryStore::new();
        {
            let _uow = store.begin();
            store.next_id(Sequence::Orders);
            store.next_id(Sequence::Orders);
        }
        assert_eq!(store.next_id(Sequence::Orders), 1);
    }

    #[test]
    fn test_open_orders_filters_terminal() {
        let store = InMemoryStore::new();
        let mut o1 = order(&store, UserId(1));
        let o2 = order(&store, UserId(1));
        o1.fill(Quantity::from_u64(10), 2);
        store.insert_order(o1).unwrap();
        store.insert_order(o2.clone()).unwrap();

        let open = store.open_orders_for_user(UserId(1));
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].id, o2.id);
    }

    #[test]
    fn test_transaction_hash_lookup() {
        let store = InMemoryStore::new();
        let tx = Transaction::deposit(
            TxId(1),
            UserId(1),
            Asset::new("USDT"),
            dec!(100),
            "0xfeed".into(),
            3,
            1,
        );
        store.insert_transaction(tx).unwrap();
        assert!(store.find_transaction_by_hash("0xfeed").is_some());
        assert!(store.find_transaction_by_hash("0xdead").is_none());
    }

    #[test]
    fn test_update_missing_order_errors() {
        let store = InMemoryStore::new();
        let o = order(&store, UserId(1));
        assert!(matches!(
            store.update_order(o).unwrap_err(),
            StoreError::NotFound { entity: "order", .. }
        ));
    }
}
