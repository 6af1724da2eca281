//! Application state management.

use crate::config::Config;
use crate::db::DatabasePool;
use crate::engine::sync::WheelEngine;
use crate::sources::{ExecutionSource, PriceSource, SimulatedBroker, TimeWindow};
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use std::sync::Arc;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// The wheel engine.
    pub engine: Arc<WheelEngine>,
    /// Broker execution source.
    pub broker: Arc<dyn ExecutionSource>,
    /// Market price source.
    pub prices: Arc<dyn PriceSource>,
    /// Optional database pool.
    pub db: Option<DatabasePool>,
    /// Application configuration.
    pub config: Option<Config>,
}

impl AppState {
    /// Creates a new application state with an empty simulated broker and
    /// no database.
    #[must_use]
    pub fn new() -> Self {
        let broker = Arc::new(SimulatedBroker::new());

        Self {
            engine: Arc::new(WheelEngine::new(Vec::new())),
            broker: broker.clone(),
            prices: broker,
            db: None,
            config: None,
        }
    }

    /// Creates a new application state from configuration.
    #[must_use]
    pub fn from_config(config: Config, db: Option<DatabasePool>) -> Self {
        let engine = Arc::new(WheelEngine::new(config.sync.excluded_symbols.clone()));

        let broker = Arc::new(SimulatedBroker::with_prices(
            config
                .simulation
                .prices
                .iter()
                .filter_map(|seed| {
                    Decimal::from_f64(seed.price).map(|p| (seed.symbol.to_uppercase(), p))
                }),
        ));

        Self {
            engine,
            broker: broker.clone(),
            prices: broker,
            db,
            config: Some(config),
        }
    }

    /// Creates an application state around injected sources. Production
    /// callers plug their real broker and price feed in here.
    #[must_use]
    pub fn with_sources(
        engine: Arc<WheelEngine>,
        broker: Arc<dyn ExecutionSource>,
        prices: Arc<dyn PriceSource>,
        db: Option<DatabasePool>,
        config: Option<Config>,
    ) -> Self {
        Self {
            engine,
            broker,
            prices,
            db,
            config,
        }
    }

    /// Default fetch window derived from the configured lookback;
    /// unbounded when no configuration is loaded.
    #[must_use]
    pub fn sync_window(&self) -> TimeWindow {
        match self.config.as_ref().map(|c| c.sync.lookback_days) {
            Some(days) => TimeWindow {
                from: Some(Utc::now() - Duration::days(days)),
                to: None,
            },
            None => TimeWindow::default(),
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}
