//! Per-market engine routing
//!
//! One engine per configured market, each behind its own mutex. Commands
//! for different markets run in parallel; commands for the same market are
//! serialized, which is what gives the engine its single-writer semantics.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use bus::EventBus;
use ledger::AccountLedger;
use store::Store;
use types::config::ExchangeConfig;
use types::errors::AdmissionError;
use types::ids::MarketId;

use crate::book::BookSnapshot;
use crate::engine::MatchingEngine;

pub struct EngineRouter {
    engines: HashMap<MarketId, Mutex<MatchingEngine>>,
}

impl EngineRouter {
    /// Build one engine per configured market
    pub fn new(
        config: &ExchangeConfig,
        store: Arc<dyn Store>,
        ledger: Arc<AccountLedger>,
        bus: Arc<EventBus>,
    ) -> Self {
        let engines = config
            .markets
            .values()
            .map(|market| {
                (
                    market.symbol.clone(),
                    Mutex::new(MatchingEngine::new(
                        market.clone(),
                        Arc::clone(&store),
                        Arc::clone(&ledger),
                        Arc::clone(&bus),
                    )),
                )
            })
            .collect();
        Self { engines }
    }

    /// Run a command against one market's engine, serialized with every
    /// other command for that market
    pub fn with_engine<R>(
        &self,
        market: &MarketId,
        f: impl FnOnce(&mut MatchingEngine) -> R,
    ) -> Result<R, AdmissionError> {
        let engine = self
            .engines
            .get(market)
            .ok_or_else(|| AdmissionError::MarketUnknown {
                market: market.clone(),
            })?;
        let mut engine = engine.lock().expect("engine mutex poisoned");
        Ok(f(&mut engine))
    }

    /// Aggregated order-book depth for market data
    pub fn snapshot(&self, market: &MarketId, depth: usize) -> Result<BookSnapshot, AdmissionError> {
        self.with_engine(market, |engine| engine.snapshot(depth))
    }

    /// Last executed trade price on a market, if any trade has printed
    pub fn last_trade_price(
        &self,
        market: &MarketId,
    ) -> Result<Option<types::numeric::Price>, AdmissionError> {
        self.with_engine(market, |engine| engine.last_trade_price())
    }

    /// Markets this router serves
    pub fn markets(&self) -> Vec<MarketId> {
        let mut markets: Vec<MarketId> = self.engines.keys().cloned().collect();
        markets.sort();
        markets
    }
}
