//! Crossing detection
//!
//! A taker limit of `None` means a market order, which crosses any resting
//! price. Matching always executes at the resting (maker) price.

use types::numeric::Price;
use types::order::Side;

/// Whether a taker at `taker_limit` can trade against a resting order at
/// `resting_price`
pub fn crosses(taker_side: Side, taker_limit: Option<Price>, resting_price: Price) -> bool {
    let Some(limit) = taker_limit else {
        return true;
    };
    match taker_side {
        Side::Buy => resting_price <= limit,
        Side::Sell => resting_price >= limit,
    }
}
