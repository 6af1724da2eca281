//! Wheel-cycle engine: ingestion, state machine, PnL, categorization and
//! analytics.
//!
//! Raw broker records flow one direction through the engine:
//! normalizer → state machine → PnL → categorizer, with the analytics
//! aggregator reading the finished wheel set on demand. All mutation is
//! funneled through [`sync::WheelEngine`], which serializes syncs per
//! account and publishes per-symbol snapshots atomically.

pub mod analytics;
pub mod categorizer;
pub mod execution;
pub mod machine;
pub mod pnl;
pub mod sync;
pub mod wheel;

/// Engine error types.
///
/// Per-record problems (`MalformedExecution`, `UnassignableExecution`) never
/// abort a sync; `UpstreamFetchFailure` and `ConcurrentSyncRejected` abort
/// the whole sync with prior state untouched.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Raw record could not be mapped to a canonical execution.
    #[error("malformed execution: {0}")]
    MalformedExecution(String),

    /// Execution could not be matched to any wheel transition rule.
    #[error("execution cannot be assigned to a wheel: {0}")]
    UnassignableExecution(String),

    /// Broker or price source was unreachable.
    #[error("upstream fetch failed: {0}")]
    UpstreamFetchFailure(String),

    /// A sync is already in flight for the account.
    #[error("a sync is already running for account {0}")]
    ConcurrentSyncRejected(String),
}
