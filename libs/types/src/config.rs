//! Exchange configuration
//!
//! One validated configuration value is built at process start and shared by
//! every component. Construction failures map to exit code 1 in CLI wrappers.

use crate::errors::ConfigError;
use crate::ids::{Asset, MarketId};
use crate::numeric::Quantity;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Maker/taker fee schedule in basis points
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSchedule {
    pub maker_bps: u32,
    pub taker_bps: u32,
}

impl FeeSchedule {
    /// Maker rate as a decimal fraction
    pub fn maker_rate(&self) -> Decimal {
        Decimal::from(self.maker_bps) / Decimal::from(10_000)
    }

    /// Taker rate as a decimal fraction
    pub fn taker_rate(&self) -> Decimal {
        Decimal::from(self.taker_bps) / Decimal::from(10_000)
    }

    /// Fee charged on a received amount, by role
    pub fn fee_on(&self, received: Decimal, is_maker: bool) -> Decimal {
        let rate = if is_maker {
            self.maker_rate()
        } else {
            self.taker_rate()
        };
        received * rate
    }
}

/// Static configuration for one market
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketConfig {
    pub symbol: MarketId,
    pub base: Asset,
    pub quote: Asset,
    /// Prices must sit on this grid
    pub price_tick: Decimal,
    /// Order sizes must sit on this grid
    pub size_tick: Decimal,
    pub min_order_size: Quantity,
    pub max_order_size: Quantity,
    pub fees: FeeSchedule,
}

impl MarketConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.symbol.base() != self.base || self.symbol.quote() != self.quote {
            return Err(ConfigError::SymbolAssetMismatch {
                market: self.symbol.clone(),
            });
        }
        if self.price_tick <= Decimal::ZERO || self.size_tick <= Decimal::ZERO {
            return Err(ConfigError::NonPositiveTick {
                market: self.symbol.clone(),
            });
        }
        if self.min_order_size.is_zero()
            || self.max_order_size.as_decimal() < self.min_order_size.as_decimal()
        {
            return Err(ConfigError::InvalidSizeBounds {
                market: self.symbol.clone(),
            });
        }
        Ok(())
    }
}

/// Root configuration for the trading core
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeConfig {
    pub markets: BTreeMap<MarketId, MarketConfig>,
    /// Minimum confirmations per asset before a deposit is credited
    pub deposit_confirmation_threshold: BTreeMap<Asset, u32>,
    /// Per-asset deduction applied at withdrawal admission
    pub withdrawal_network_fee: BTreeMap<Asset, Decimal>,
}

/// Confirmations required when no per-asset threshold is configured
const DEFAULT_CONFIRMATION_THRESHOLD: u32 = 6;

impl ExchangeConfig {
    /// Build and validate a configuration
    pub fn new(markets: Vec<MarketConfig>) -> Result<Self, ConfigError> {
        let config = Self {
            markets: markets
                .into_iter()
                .map(|m| (m.symbol.clone(), m))
                .collect(),
            deposit_confirmation_threshold: BTreeMap::new(),
            withdrawal_network_fee: BTreeMap::new(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate every market entry
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.markets.is_empty() {
            return Err(ConfigError::NoMarkets);
        }
        for market in self.markets.values() {
            market.validate()?;
        }
        for (asset, fee) in &self.withdrawal_network_fee {
            if *fee < Decimal::ZERO {
                return Err(ConfigError::NegativeNetworkFee {
                    asset: asset.clone(),
                });
            }
        }
        Ok(())
    }

    /// Look up a market
    pub fn market(&self, symbol: &MarketId) -> Option<&MarketConfig> {
        self.markets.get(symbol)
    }

    /// Confirmations required before crediting a deposit of `asset`
    pub fn confirmation_threshold(&self, asset: &Asset) -> u32 {
        self.deposit_confirmation_threshold
            .get(asset)
            .copied()
            .unwrap_or(DEFAULT_CONFIRMATION_THRESHOLD)
    }

    /// Network fee deducted at withdrawal admission
    pub fn network_fee(&self, asset: &Asset) -> Decimal {
        self.withdrawal_network_fee
            .get(asset)
            .copied()
            .unwrap_or(Decimal::ZERO)
    }

    /// Every asset referenced by a configured market
    pub fn assets(&self) -> Vec<Asset> {
        let mut assets: Vec<Asset> = self
            .markets
            .values()
            .flat_map(|m| [m.base.clone(), m.quote.clone()])
            .collect();
        assets.sort();
        assets.dedup();
        assets
    }
}

/// Single ALT/USDT market configuration used throughout the test suites
pub fn default_config() -> ExchangeConfig {
    let tick = Decimal::new(1, 2); // 0.01
    let size_tick = Decimal::new(1, 3); // 0.001
    let mut config = ExchangeConfig::new(vec![MarketConfig {
        symbol: MarketId::new("ALT/USDT"),
        base: Asset::new("ALT"),
        quote: Asset::new("USDT"),
        price_tick: tick,
        size_tick,
        min_order_size: Quantity::new(size_tick),
        max_order_size: Quantity::from_u64(1_000_000),
        fees: FeeSchedule {
            maker_bps: 10,
            taker_bps: 20,
        },
    }])
    .expect("default config is valid");
    config
        .deposit_confirmation_threshold
        .insert(Asset::new("ALT"), 6);
    config
        .deposit_confirmation_threshold
        .insert(Asset::new("USDT"), 6);
    config
        .withdrawal_network_fee
        .insert(Asset::new("USDT"), Decimal::ONE);
    config
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_fee_schedule_rates() {
        let fees = FeeSchedule {
            maker_bps: 10,
            taker_bps: 20,
        };
        assert_eq!(fees.maker_rate(), dec!(0.001));
        assert_eq!(fees.taker_rate(), dec!(0.002));
        assert_eq!(fees.fee_on(dec!(1000), true), dec!(1));
        assert_eq!(fees.fee_on(dec!(1000), false), dec!(2));
    }

    #[test]
    fn test_default_config_valid() {
        let config = default_config();
        assert!(config.validate().is_ok());
        assert!(config.market(&MarketId::new("ALT/USDT")).is_some());
        assert_eq!(config.assets(), vec![Asset::new("ALT"), Asset::new("USDT")]);
    }

    #[test]
    fn test_symbol_asset_mismatch_rejected() {
        let mut market = default_config()
            .market(&MarketId::new("ALT/USDT"))
            .unwrap()
            .clone();
        market.base = Asset::new("BTC");
        let err = ExchangeConfig::new(vec![market]).unwrap_err();
        assert!(matches!(err, ConfigError::SymbolAssetMismatch { .. }));
    }

    #[test]
    fn test_invalid_size_bounds_rejected() {
        let mut market = default_config()
            .market(&MarketId::new("ALT/USDT"))
            .unwrap()
            .clone();
        market.max_order_size = Quantity::new(dec!(0.0001));
        let err = ExchangeConfig::new(vec![market]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidSizeBounds { .. }));
    }

    #[test]
    fn test_threshold_defaults() {
        let config = default_config();
        assert_eq!(config.confirmation_threshold(&Asset::new("DOGE")), 6);
        assert_eq!(config.network_fee(&Asset::new("DOGE")), Decimal::ZERO);
        assert_eq!(config.network_fee(&Asset::new("USDT")), Decimal::ONE);
    }
}
