//! Matching engine service
//!
//! Order book, price-time priority matching, stop-order triggering, and
//! OCO linkage for one market, behind a single-writer command interface.
//!
//! **Key invariants:**
//! - Price-time priority strictly enforced; ties break by arrival order
//! - Trades execute at the maker's price
//! - Deterministic: the same command sequence produces the same trades
//! - A failed command never leaves a partial balance effect; fatal
//!   conditions halt the engine instead of self-repairing

pub mod book;
pub mod engine;
pub mod matching;
pub mod router;
pub mod stops;

pub use book::{BookSnapshot, OrderBook};
pub use engine::MatchingEngine;
pub use router::EngineRouter;
