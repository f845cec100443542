//! Account ledger
//!
//! Authoritative store of per-(account, asset) available and locked
//! balances. This is the only component permitted to mutate balances;
//! everything else goes through the operations here.
//!
//! **Key invariants:**
//! - No balance goes negative on either field at any observable point
//! - A failed compound posting leaves state identical to pre-call
//! - Concurrent postings are serialized; readers see consistent snapshots

mod ledger;

pub use ledger::{AccountLedger, TradeSettlement};
