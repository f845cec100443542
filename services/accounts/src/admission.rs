//! Pre-admission validation
//!
//! Every order request is checked here before any balance is touched. A
//! failed check returns a structured admission error and leaves no trace.

use rust_decimal::Decimal;
use types::account::Account;
use types::config::{ExchangeConfig, MarketConfig};
use types::errors::AdmissionError;
use types::ids::Asset;
use types::order::{OrderKind, OrderRequest, Side, TimeInForce};

/// Validate a request against the market table and the account status,
/// returning the market it trades on.
pub fn validate<'a>(
    config: &'a ExchangeConfig,
    account: &Account,
    request: &OrderRequest,
) -> Result<&'a MarketConfig, AdmissionError> {
    let market = config
        .market(&request.market)
        .ok_or_else(|| AdmissionError::MarketUnknown {
            market: request.market.clone(),
        })?;

    if !account.is_active() {
        return Err(AdmissionError::AccountNotActive {
            account_id: account.id,
        });
    }

    check_amount(market, request)?;
    check_prices(market, request)?;
    check_kind(request)?;
    Ok(market)
}

/// The (asset, quantity) the admission path must lock for this request
pub fn lock_requirement(market: &MarketConfig, request: &OrderRequest) -> (Asset, Decimal) {
    match request.side {
        Side::Sell => (market.base.clone(), request.amount.as_decimal()),
        Side::Buy => match request.price {
            Some(price) => (market.quote.clone(), request.amount * price),
            None => (
                market.quote.clone(),
                request.max_quote.unwrap_or(Decimal::ZERO),
            ),
        },
    }
}

fn check_amount(market: &MarketConfig, request: &OrderRequest) -> Result<(), AdmissionError> {
    let amount = request.amount.as_decimal();
    if amount <= Decimal::ZERO {
        return Err(AdmissionError::InvalidOrder {
            reason: "amount must be positive".into(),
        });
    }
    if amount < market.min_order_size.as_decimal() || amount > market.max_order_size.as_decimal() {
        return Err(AdmissionError::SizeBounds {
            market: market.symbol.clone(),
            amount,
            min: market.min_order_size.as_decimal(),
            max: market.max_order_size.as_decimal(),
        });
    }
    if !request.amount.on_tick(market.size_tick) {
        return Err(AdmissionError::TickViolation {
            market: market.symbol.clone(),
            value: amount,
            tick: market.size_tick,
        });
    }
    Ok(())
}

fn check_prices(market: &MarketConfig, request: &OrderRequest) -> Result<(), AdmissionError> {
    for price in [request.price, request.stop_price].into_iter().flatten() {
        if !price.on_tick(market.price_tick) {
            return Err(AdmissionError::TickViolation {
                market: market.symbol.clone(),
                value: price.as_decimal(),
                tick: market.price_tick,
            });
        }
    }
    Ok(())
}

fn check_kind(request: &OrderRequest) -> Result<(), AdmissionError> {
    let invalid = |reason: &str| AdmissionError::InvalidOrder {
        reason: reason.into(),
    };

    if request.kind.requires_price() && request.price.is_none() {
        return Err(invalid("limit price required for this order kind"));
    }
    if request.kind.requires_stop_price() && request.stop_price.is_none() {
        return Err(invalid("stop price required for this order kind"));
    }

    match request.kind {
        OrderKind::Market => {
            if request.price.is_some() {
                return Err(invalid("market orders carry no limit price"));
            }
            if request.time_in_force != TimeInForce::IOC {
                return Err(invalid("market orders are immediate-or-cancel"));
            }
        }
        OrderKind::Stop | OrderKind::StopLimit => {
            if request.time_in_force != TimeInForce::GTC {
                return Err(invalid("stop orders rest until triggered"));
            }
        }
        OrderKind::Limit => {}
    }

    // A buy with no limit price reserves from a quote budget
    if request.side == Side::Buy
        && request.price.is_none()
        && request.max_quote.unwrap_or(Decimal::ZERO) <= Decimal::ZERO
    {
        return Err(invalid("market buys require a positive max_quote budget"));
    }
    Ok(())
}
