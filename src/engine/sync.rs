//! Sync coordination and the in-memory wheel store.
//!
//! One [`WheelEngine`] owns every account's ledger. Invariants enforced
//! here rather than by callers:
//! - at most one sync in flight per account (`try_lock`, never queued);
//! - the broker fetch completes before any state mutation, so a fetch
//!   failure leaves prior wheel state untouched;
//! - a symbol's rebuilt wheel list is published only after its full batch
//!   has been applied, so concurrent readers see complete snapshots;
//! - different accounts and different symbols proceed in parallel, while
//!   one symbol's executions are applied in strict order on one task.

use crate::engine::EngineError;
use crate::engine::categorizer::{self, CategorizedTrade};
use crate::engine::execution::{self, Execution};
use crate::engine::machine::{self, SymbolBook, TransitionEvent};
use crate::engine::pnl;
use crate::engine::wheel::{Holding, Wheel};
use crate::sources::{ExecutionSource, PriceSource, TimeWindow};
use dashmap::{DashMap, DashSet};
use futures::future::join_all;
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Result of one sync run.
#[derive(Debug)]
pub struct SyncReport {
    /// Identifier of this sync run (for log correlation).
    pub sync_id: Uuid,
    /// New executions applied to wheel state.
    pub ingested: usize,
    /// Records silently absorbed by dedup.
    pub duplicates: usize,
    /// Malformed records skipped.
    pub skipped: usize,
    /// Per-execution labels for the fresh batch, date order.
    pub trades: Vec<CategorizedTrade>,
    /// The fresh canonical executions, for persistence by the caller.
    pub executions: Vec<Execution>,
}

/// Engine-wide counters for the stats endpoint.
#[derive(Debug, Clone, Copy, Default)]
pub struct EngineStats {
    /// Known accounts.
    pub accounts: usize,
    /// Total wheels across accounts.
    pub total_wheels: usize,
    /// Open wheels across accounts.
    pub open_wheels: usize,
    /// Ingested executions across accounts.
    pub total_executions: usize,
}

/// Per-account ledger: append-only execution history plus published
/// per-symbol wheel snapshots.
struct AccountLedger {
    account: String,
    /// Held for the duration of a sync; `try_lock` rejects concurrent runs.
    sync_guard: tokio::sync::Mutex<()>,
    /// Append-only execution history per symbol.
    executions: DashMap<String, Vec<Execution>>,
    /// Execution ids already ingested.
    seen: DashSet<String>,
    /// Published wheel state per symbol, replaced wholesale per sync.
    books: DashMap<String, SymbolBook>,
}

impl AccountLedger {
    fn new(account: &str) -> Self {
        Self {
            account: account.to_string(),
            sync_guard: tokio::sync::Mutex::new(()),
            executions: DashMap::new(),
            seen: DashSet::new(),
            books: DashMap::new(),
        }
    }
}

/// The engine: per-account wheel state keyed by (account, symbol), owned
/// here and never accessed as ambient global state.
pub struct WheelEngine {
    accounts: DashMap<String, Arc<AccountLedger>>,
    excluded_symbols: Vec<String>,
}

impl WheelEngine {
    /// Creates an engine. `excluded_symbols` are dropped at ingestion.
    #[must_use]
    pub fn new(excluded_symbols: Vec<String>) -> Self {
        Self {
            accounts: DashMap::new(),
            excluded_symbols: excluded_symbols
                .into_iter()
                .map(|s| s.trim().to_uppercase())
                .filter(|s| !s.is_empty())
                .collect(),
        }
    }

    fn ledger(&self, account: &str) -> Arc<AccountLedger> {
        self.accounts
            .entry(account.to_string())
            .or_insert_with(|| Arc::new(AccountLedger::new(account)))
            .clone()
    }

    /// Runs one sync for an account: fetch, normalize, dedup, apply,
    /// categorize.
    ///
    /// # Errors
    /// `ConcurrentSyncRejected` when a sync is already in flight for the
    /// account; `UpstreamFetchFailure` when the broker fetch fails — in
    /// both cases prior wheel state is untouched.
    pub async fn sync_account(
        &self,
        account: &str,
        source: &dyn ExecutionSource,
        window: &TimeWindow,
    ) -> Result<SyncReport, EngineError> {
        let ledger = self.ledger(account);
        let _guard = ledger
            .sync_guard
            .try_lock()
            .map_err(|_| EngineError::ConcurrentSyncRejected(account.to_string()))?;

        let sync_id = Uuid::new_v4();
        info!(account, %sync_id, "sync started");

        // Fetch completes before any mutation; a failure here aborts the
        // sync atomically.
        let raws = source
            .fetch_executions(account, window)
            .await
            .map_err(|e| EngineError::UpstreamFetchFailure(e.to_string()))?;

        let mut fresh_by_symbol: HashMap<String, Vec<Execution>> = HashMap::new();
        let mut skipped = 0usize;
        let mut duplicates = 0usize;

        for raw in &raws {
            match execution::normalize(raw) {
                Ok(exec) => {
                    if self.excluded_symbols.contains(&exec.symbol) {
                        debug!(account, symbol = %exec.symbol, "excluded symbol dropped");
                        continue;
                    }
                    if !ledger.seen.insert(exec.exec_id.clone()) {
                        duplicates += 1;
                        continue;
                    }
                    fresh_by_symbol.entry(exec.symbol.clone()).or_default().push(exec);
                }
                Err(err) => {
                    warn!(account, %err, "skipping malformed execution");
                    skipped += 1;
                }
            }
        }

        let ingested = fresh_by_symbol.values().map(Vec::len).sum();
        let executions: Vec<Execution> = fresh_by_symbol.values().flatten().cloned().collect();
        let events = apply_symbols(Arc::clone(&ledger), fresh_by_symbol).await;

        let mut trades = categorizer::categorize(&events);
        trades.sort_by(|a, b| (a.date, a.symbol.clone()).cmp(&(b.date, b.symbol.clone())));

        info!(
            account,
            %sync_id,
            ingested,
            duplicates,
            skipped,
            "sync finished"
        );

        Ok(SyncReport {
            sync_id,
            ingested,
            duplicates,
            skipped,
            trades,
            executions,
        })
    }

    /// Per-execution labels across an account's whole history, keyed by
    /// execution id. Used by the wheel-summary view.
    #[must_use]
    pub fn categorized(&self, account: &str) -> HashMap<String, CategorizedTrade> {
        let Some(ledger) = self.accounts.get(account) else {
            return HashMap::new();
        };
        let mut labels = HashMap::new();
        for book in ledger.books.iter() {
            for trade in categorizer::categorize(&book.events) {
                labels.insert(trade.exec_id.clone(), trade);
            }
        }
        labels
    }

    /// Bulk-loads previously persisted executions (startup restore).
    /// Produces the same wheel state as syncing them would, without a
    /// report.
    pub fn restore(&self, account: &str, executions: Vec<Execution>) {
        let ledger = self.ledger(account);
        let mut count = 0usize;

        for exec in executions {
            if self.excluded_symbols.contains(&exec.symbol) {
                continue;
            }
            if !ledger.seen.insert(exec.exec_id.clone()) {
                continue;
            }
            ledger
                .executions
                .entry(exec.symbol.clone())
                .or_default()
                .push(exec);
            count += 1;
        }

        for entry in ledger.executions.iter() {
            let (book, _) = machine::rebuild_symbol(entry.key(), entry.value());
            ledger.books.insert(entry.key().clone(), book);
        }

        info!(account, count, "restored executions from store");
    }

    /// Known account ids.
    #[must_use]
    pub fn accounts(&self) -> Vec<String> {
        self.accounts.iter().map(|e| e.key().clone()).collect()
    }

    /// All wheels for an account, ordered oldest first by
    /// `(start date, symbol, sequence)`.
    #[must_use]
    pub fn wheels(&self, account: &str) -> Vec<Wheel> {
        let Some(ledger) = self.accounts.get(account) else {
            return Vec::new();
        };
        let mut wheels: Vec<Wheel> = ledger
            .books
            .iter()
            .flat_map(|book| book.wheels.clone())
            .collect();
        wheels.sort_by(|a, b| {
            (a.start_date, a.symbol.clone(), a.sequence)
                .cmp(&(b.start_date, b.symbol.clone(), b.sequence))
        });
        wheels
    }

    /// Flat execution history for an account, newest first.
    #[must_use]
    pub fn history(&self, account: &str) -> Vec<Execution> {
        let Some(ledger) = self.accounts.get(account) else {
            return Vec::new();
        };
        let mut executions: Vec<Execution> = ledger
            .executions
            .iter()
            .flat_map(|entry| entry.value().clone())
            .collect();
        executions.sort_by(|a, b| {
            b.timestamp
                .cmp(&a.timestamp)
                .then_with(|| a.exec_id.cmp(&b.exec_id))
        });
        executions
    }

    /// Cash PnL realized so far for a wheel (final realized PnL once
    /// closed).
    #[must_use]
    pub fn cash_pnl(wheel: &Wheel) -> Decimal {
        pnl::realized_pnl(&wheel.executions)
    }

    /// Prices a wheel's open legs. A failed or missing price leaves the
    /// leg unpriced and never aborts the others.
    pub async fn priced_holdings(wheel: &Wheel, prices: &dyn PriceSource) -> Vec<Holding> {
        let mut holdings = Vec::with_capacity(wheel.open_legs.len());
        for leg in &wheel.open_legs {
            let key = leg.contract_key();
            let current_price = match prices.price(&key).await {
                Ok(price) => price,
                Err(err) => {
                    warn!(key, %err, "price fetch failed; leaving leg unpriced");
                    None
                }
            };
            holdings.push(Holding {
                kind: leg.kind,
                symbol: leg.symbol.clone(),
                strike: leg.strike,
                quantity: leg.quantity,
                open_price: leg.open_price,
                current_price,
                unrealized_pnl: current_price.map(|p| pnl::unrealized(leg, p)),
            });
        }
        holdings
    }

    /// Engine-wide counters.
    #[must_use]
    pub fn stats(&self) -> EngineStats {
        let mut stats = EngineStats {
            accounts: self.accounts.len(),
            ..EngineStats::default()
        };
        for ledger in self.accounts.iter() {
            stats.total_executions += ledger.executions.iter().map(|e| e.value().len()).sum::<usize>();
            for book in ledger.books.iter() {
                stats.total_wheels += book.wheels.len();
                stats.open_wheels += book.wheels.iter().filter(|w| w.is_open()).count();
            }
        }
        stats
    }
}

/// Applies the fresh batch symbol by symbol, concurrently across symbols.
/// Each task appends its symbol's executions, rebuilds the book from the
/// full history and publishes it in one swap.
async fn apply_symbols(
    ledger: Arc<AccountLedger>,
    fresh_by_symbol: HashMap<String, Vec<Execution>>,
) -> Vec<TransitionEvent> {
    let tasks: Vec<_> = fresh_by_symbol
        .into_iter()
        .map(|(symbol, fresh)| {
            let ledger = Arc::clone(&ledger);
            tokio::spawn(async move {
                let fresh_ids: HashSet<String> =
                    fresh.iter().map(|e| e.exec_id.clone()).collect();

                let history = {
                    let mut entry = ledger.executions.entry(symbol.clone()).or_default();
                    entry.extend(fresh);
                    entry.clone()
                };

                let (book, events) = machine::rebuild_symbol(&symbol, &history);
                for exec_id in &book.unassigned {
                    if fresh_ids.contains(exec_id) {
                        warn!(
                            account = %ledger.account,
                            symbol,
                            exec_id = %exec_id,
                            "execution excluded from wheels"
                        );
                    }
                }

                // Publish only after the symbol's full batch is applied.
                ledger.books.insert(symbol.clone(), book);

                events
                    .into_iter()
                    .filter(|e| fresh_ids.contains(&e.exec_id))
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    join_all(tasks)
        .await
        .into_iter()
        .filter_map(Result::ok)
        .flatten()
        .collect()
}
