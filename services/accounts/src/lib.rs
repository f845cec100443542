//! Account service
//!
//! Pre-trade validation and the balance-locking layer in front of the
//! matching engine. Owns user registration, order creation, and the
//! cancellation entry point.

pub mod admission;
pub mod service;

pub use service::{AccountService, OcoParams};
