//! Identifier types for exchange entities
//!
//! Entity identifiers are monotonically assigned 64-bit integers issued by
//! the store's id allocator, so chronological order of creation is encoded
//! directly in the id. Market and asset symbols are validated newtypes.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! numeric_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            /// Get the raw id value
            pub fn value(&self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(v: u64) -> Self {
                Self(v)
            }
        }
    };
}

numeric_id!(
    /// Unique identifier for a user
    UserId
);

numeric_id!(
    /// Unique identifier for a trading account
    AccountId
);

numeric_id!(
    /// Unique identifier for an order
    OrderId
);

numeric_id!(
    /// Unique identifier for a trade
    TradeId
);

numeric_id!(
    /// Unique identifier for a deposit/withdrawal transaction
    TxId
);

numeric_id!(
    /// Shared identifier linking the two legs of an OCO pair
    LinkId
);

numeric_id!(
    /// Unique identifier for a withdrawal approval request
    ApprovalId
);

numeric_id!(
    /// Identifier of an admin operator (two-eyes approvals, account freezes)
    AdminId
);

impl AccountId {
    /// The exchange-owned fee account. Collected fees for every asset are
    /// posted here; conservation checks sum over user accounts plus this one.
    pub const FEE: AccountId = AccountId(0);
}

/// Asset symbol (e.g. "ALT", "USDT")
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Asset(String);

impl Asset {
    /// Create a new asset symbol. Symbols are upper-cased on construction.
    pub fn new(symbol: impl Into<String>) -> Self {
        Self(symbol.into().to_uppercase())
    }

    /// Get the symbol string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Asset {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Market identifier (trading pair)
///
/// Format: "BASE/QUOTE" (e.g. "ALT/USDT", "BTC/USDT")
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MarketId(String);

impl MarketId {
    /// Create a new MarketId from a string
    ///
    /// # Panics
    /// Panics if the format is invalid (must contain '/')
    pub fn new(symbol: impl Into<String>) -> Self {
        Self::try_new(symbol).expect("MarketId must be in BASE/QUOTE format")
    }

    /// Try to create a MarketId, returning None if invalid
    pub fn try_new(symbol: impl Into<String>) -> Option<Self> {
        let s = symbol.into();
        let mut parts = s.split('/');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(base), Some(quote), None) if !base.is_empty() && !quote.is_empty() => {
                Some(Self(s))
            }
            _ => None,
        }
    }

    /// Get the symbol string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Base asset of the pair
    pub fn base(&self) -> Asset {
        Asset::new(self.0.split('/').next().unwrap_or_default())
    }

    /// Quote asset of the pair
    pub fn quote(&self) -> Asset {
        Asset::new(self.0.split('/').nth(1).unwrap_or_default())
    }
}

impl fmt::Display for MarketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for MarketId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}
