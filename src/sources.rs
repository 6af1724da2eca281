//! Injected upstream dependencies: broker executions and market prices.
//!
//! The engine never fetches anything itself; it is handed an
//! [`ExecutionSource`] and a [`PriceSource`]. Retry/backoff policy belongs
//! to the caller. [`SimulatedBroker`] implements both for development and
//! tests, driven from the `[simulation]` config section.

use crate::engine::execution::RawExecution;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use rust_decimal::Decimal;
use std::collections::HashMap;

/// Upstream failure, mapped to `UpstreamFetchFailure` by the sync.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// The upstream could not be reached or answered with garbage.
    #[error("upstream unavailable: {0}")]
    Unavailable(String),
}

/// Time window for an execution fetch. Unbounded sides are `None`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimeWindow {
    /// Inclusive lower bound.
    pub from: Option<DateTime<Utc>>,
    /// Inclusive upper bound.
    pub to: Option<DateTime<Utc>>,
}

impl TimeWindow {
    /// Whether a timestamp falls inside the window.
    #[must_use]
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.from.map_or(true, |from| ts >= from) && self.to.map_or(true, |to| ts <= to)
    }
}

/// Source of raw broker execution records for an account.
#[async_trait]
pub trait ExecutionSource: Send + Sync {
    /// Fetches raw execution records for the account within the window.
    async fn fetch_executions(
        &self,
        account: &str,
        window: &TimeWindow,
    ) -> Result<Vec<RawExecution>, SourceError>;
}

/// Source of current market prices, keyed by symbol or contract key
/// (`SYM` for stock, `SYM-YYYYMMDD-STRIKE-P/C` for options).
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Returns the current price for the key, `Ok(None)` when the source
    /// has no price for it.
    async fn price(&self, key: &str) -> Result<Option<Decimal>, SourceError>;
}

/// Deterministic in-memory broker for development mode and tests: scripted
/// fills per account plus a seeded price table.
#[derive(Default)]
pub struct SimulatedBroker {
    fills: RwLock<HashMap<String, Vec<RawExecution>>>,
    prices: RwLock<HashMap<String, Decimal>>,
}

impl SimulatedBroker {
    /// Creates an empty simulated broker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a simulated broker with a seeded price table.
    #[must_use]
    pub fn with_prices(prices: impl IntoIterator<Item = (String, Decimal)>) -> Self {
        Self {
            fills: RwLock::new(HashMap::new()),
            prices: RwLock::new(prices.into_iter().collect()),
        }
    }

    /// Scripts a fill for an account.
    pub fn push_fill(&self, account: &str, raw: RawExecution) {
        self.fills
            .write()
            .entry(account.to_string())
            .or_default()
            .push(raw);
    }

    /// Sets the price for a symbol or contract key.
    pub fn set_price(&self, key: &str, price: Decimal) {
        self.prices.write().insert(key.to_string(), price);
    }

    /// Removes a price, making the key unpriced.
    pub fn clear_price(&self, key: &str) {
        self.prices.write().remove(key);
    }
}

#[async_trait]
impl ExecutionSource for SimulatedBroker {
    async fn fetch_executions(
        &self,
        account: &str,
        window: &TimeWindow,
    ) -> Result<Vec<RawExecution>, SourceError> {
        let fills = self.fills.read();
        let records = fills
            .get(account)
            .map(|raws| {
                raws.iter()
                    .filter(|raw| {
                        // Records without a parseable timestamp pass through;
                        // the normalizer rejects and counts them.
                        raw.timestamp
                            .as_deref()
                            .and_then(crate::engine::execution::parse_timestamp)
                            .map_or(true, |ts| window.contains(ts))
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        Ok(records)
    }
}

#[async_trait]
impl PriceSource for SimulatedBroker {
    async fn price(&self, key: &str) -> Result<Option<Decimal>, SourceError> {
        Ok(self.prices.read().get(key).copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn raw(ts: &str) -> RawExecution {
        RawExecution {
            timestamp: Some(ts.to_string()),
            symbol: Some("AAPL".to_string()),
            ..RawExecution::default()
        }
    }

    #[tokio::test]
    async fn test_fetch_scoped_to_account() {
        let broker = SimulatedBroker::new();
        broker.push_fill("U1", raw("2024-03-01T15:00:00Z"));
        broker.push_fill("U2", raw("2024-03-02T15:00:00Z"));

        let fills = broker
            .fetch_executions("U1", &TimeWindow::default())
            .await
            .unwrap();
        assert_eq!(fills.len(), 1);

        let none = broker
            .fetch_executions("U3", &TimeWindow::default())
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_respects_window() {
        let broker = SimulatedBroker::new();
        broker.push_fill("U1", raw("2024-03-01T15:00:00Z"));
        broker.push_fill("U1", raw("2024-04-01T15:00:00Z"));

        let window = TimeWindow {
            from: Some(
                chrono::DateTime::parse_from_rfc3339("2024-03-15T00:00:00Z")
                    .unwrap()
                    .with_timezone(&Utc),
            ),
            to: None,
        };
        let fills = broker.fetch_executions("U1", &window).await.unwrap();
        assert_eq!(fills.len(), 1);
        assert_eq!(fills[0].timestamp.as_deref(), Some("2024-04-01T15:00:00Z"));
    }

    #[tokio::test]
    async fn test_price_table() {
        let broker =
            SimulatedBroker::with_prices([("AAPL".to_string(), dec!(155.00))]);

        assert_eq!(broker.price("AAPL").await.unwrap(), Some(dec!(155.00)));
        assert_eq!(broker.price("MSFT").await.unwrap(), None);

        broker.set_price("MSFT", dec!(410.00));
        assert_eq!(broker.price("MSFT").await.unwrap(), Some(dec!(410.00)));

        broker.clear_price("MSFT");
        assert_eq!(broker.price("MSFT").await.unwrap(), None);
    }
}
