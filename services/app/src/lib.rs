//! Application context
//!
//! One value holding every component of the trading core, created at
//! startup and handed to the external facade. Nothing here is global: the
//! bus, ledger, engines, and services live inside the context and drop
//! with it.

pub mod telemetry;

use std::sync::Arc;

use accounts::AccountService;
use bus::EventBus;
use ledger::AccountLedger;
use matching_engine::EngineRouter;
use store::{InMemoryStore, Store};
use types::config::ExchangeConfig;
use types::errors::ConfigError;
use wallet::{AdminService, Broadcaster, NullBroadcaster, WalletService};

/// Process exit codes for CLI wrappers around the core
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Ok = 0,
    ConfigError = 1,
    PersistenceUnavailable = 2,
    EngineHalted = 3,
}

impl ExitCode {
    pub fn code(self) -> i32 {
        self as i32
    }
}

/// Every component of the trading core, wired once at startup
pub struct AppContext {
    pub config: Arc<ExchangeConfig>,
    pub store: Arc<dyn Store>,
    pub bus: Arc<EventBus>,
    pub ledger: Arc<AccountLedger>,
    pub engines: Arc<EngineRouter>,
    pub accounts: AccountService,
    pub wallet: Arc<WalletService>,
    pub admin: AdminService,
}

/// Build the context over the in-memory backend with the null broadcaster
pub fn bootstrap(config: ExchangeConfig) -> Result<AppContext, ConfigError> {
    bootstrap_with(
        config,
        Arc::new(InMemoryStore::new()),
        Arc::new(NullBroadcaster),
    )
}

/// Build the context over explicit backend choices. Backends are chosen
/// here once and never mixed afterwards.
pub fn bootstrap_with(
    config: ExchangeConfig,
    store: Arc<dyn Store>,
    broadcaster: Arc<dyn Broadcaster>,
) -> Result<AppContext, ConfigError> {
    config.validate()?;
    let config = Arc::new(config);
    let bus = Arc::new(EventBus::new());
    let ledger = Arc::new(AccountLedger::new(Arc::clone(&bus)));
    let engines = Arc::new(EngineRouter::new(
        &config,
        Arc::clone(&store),
        Arc::clone(&ledger),
        Arc::clone(&bus),
    ));
    let accounts = AccountService::new(
        Arc::clone(&config),
        Arc::clone(&store),
        Arc::clone(&ledger),
        Arc::clone(&engines),
        Arc::clone(&bus),
    );
    let wallet = Arc::new(WalletService::new(
        Arc::clone(&config),
        Arc::clone(&store),
        Arc::clone(&ledger),
        Arc::clone(&bus),
        broadcaster,
    ));
    let admin = AdminService::new(Arc::clone(&store), Arc::clone(&bus), Arc::clone(&wallet));

    Ok(AppContext {
        config,
        store,
        bus,
        ledger,
        engines,
        accounts,
        wallet,
        admin,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::config::{default_config, MarketConfig};
    use types::ids::Asset;
    use types::numeric::Quantity;
    use rust_decimal::Decimal;

    #[test]
    fn test_bootstrap_default_config() {
        let context = bootstrap(default_config()).unwrap();
        assert_eq!(context.engines.markets().len(), 1);
    }

    #[test]
    fn test_bootstrap_rejects_invalid_config() {
        let mut config = default_config();
        config.markets.insert(
            "BAD/PAIR".into(),
            MarketConfig {
                symbol: "BAD/PAIR".into(),
                base: Asset::new("BAD"),
                quote: Asset::new("PAIR"),
                price_tick: Decimal::ZERO,
                size_tick: Decimal::ONE,
                min_order_size: Quantity::from_u64(1),
                max_order_size: Quantity::from_u64(10),
                fees: types::config::FeeSchedule {
                    maker_bps: 0,
                    taker_bps: 0,
                },
            },
        );
        assert!(bootstrap(config).is_err());
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(ExitCode::Ok.code(), 0);
        assert_eq!(ExitCode::ConfigError.code(), 1);
        assert_eq!(ExitCode::PersistenceUnavailable.code(), 2);
        assert_eq!(ExitCode::EngineHalted.code(), 3);
    }
}
