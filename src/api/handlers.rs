//! API request handlers.

use crate::db::ExecutionStore;
use crate::engine::categorizer::CategorizedTrade;
use crate::engine::execution::{Execution, InstrumentKind};
use crate::engine::sync::WheelEngine;
use crate::engine::wheel::Wheel;
use crate::engine::analytics;
use crate::error::ApiError;
use crate::models::{
    AccountsListResponse, AnalyticsResponse, CategorizedTradeResponse, CloseReasonsResponse,
    HealthResponse, HistoryEntryResponse, HoldingResponse, Money, MonthlyBucketResponse,
    StatsResponse, SymbolRollupResponse, SyncResponse, WheelSummaryResponse, WheelTradeResponse,
    format_currency,
};
use crate::state::AppState;
use axum::Json;
use axum::extract::{Path, State};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

// ============================================================================
// Health Check
// ============================================================================

/// Health check endpoint.
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    ),
    tag = "Health"
)]
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============================================================================
// Statistics & Accounts
// ============================================================================

/// Get engine-wide statistics.
#[utoipa::path(
    get,
    path = "/api/v1/stats",
    responses(
        (status = 200, description = "Engine statistics", body = StatsResponse)
    ),
    tag = "Statistics"
)]
pub async fn get_stats(State(state): State<Arc<AppState>>) -> Json<StatsResponse> {
    let stats = state.engine.stats();
    Json(StatsResponse {
        accounts: stats.accounts,
        total_wheels: stats.total_wheels,
        open_wheels: stats.open_wheels,
        total_executions: stats.total_executions,
    })
}

/// List known accounts.
#[utoipa::path(
    get,
    path = "/api/v1/accounts",
    responses(
        (status = 200, description = "Known account ids", body = AccountsListResponse)
    ),
    tag = "Accounts"
)]
pub async fn list_accounts(State(state): State<Arc<AppState>>) -> Json<AccountsListResponse> {
    let mut accounts = state.engine.accounts();
    accounts.sort();
    Json(AccountsListResponse { accounts })
}

// ============================================================================
// Sync
// ============================================================================

/// Run one sync for an account.
#[utoipa::path(
    post,
    path = "/api/v1/accounts/{account}/sync",
    params(
        ("account" = String, Path, description = "Broker account id")
    ),
    responses(
        (status = 200, description = "Sync completed", body = SyncResponse),
        (status = 409, description = "A sync is already running for the account"),
        (status = 502, description = "Broker fetch failed; state unchanged")
    ),
    tag = "Sync"
)]
pub async fn sync_account(
    State(state): State<Arc<AppState>>,
    Path(account): Path<String>,
) -> Result<Json<SyncResponse>, ApiError> {
    let report = state
        .engine
        .sync_account(&account, state.broker.as_ref(), &state.sync_window())
        .await?;

    // Persistence is best-effort; wheel state is already applied and a
    // restore will pick the rows up on the next successful write.
    if let Some(db) = &state.db {
        let store = ExecutionStore::new(db.clone());
        if let Err(err) = store.insert(&account, &report.executions).await {
            warn!(account, %err, "failed to persist synced executions");
        }
    }

    Ok(Json(SyncResponse {
        status: "success".to_string(),
        count: report.ingested,
        duplicates: report.duplicates,
        skipped: report.skipped,
        categorized_trades: report.trades.iter().map(trade_to_response).collect(),
    }))
}

fn trade_to_response(trade: &CategorizedTrade) -> CategorizedTradeResponse {
    CategorizedTradeResponse {
        date: trade.date.to_string(),
        symbol: trade.symbol.clone(),
        action: trade.action.to_string(),
        suggested_action: trade.suggested_action.to_string(),
        details: trade.details.clone(),
    }
}

// ============================================================================
// Wheel Summary
// ============================================================================

/// Get the wheel summary for an account, newest wheel first.
#[utoipa::path(
    get,
    path = "/api/v1/accounts/{account}/wheels",
    params(
        ("account" = String, Path, description = "Broker account id")
    ),
    responses(
        (status = 200, description = "Wheel summaries", body = [WheelSummaryResponse])
    ),
    tag = "Wheels"
)]
pub async fn get_wheel_summary(
    State(state): State<Arc<AppState>>,
    Path(account): Path<String>,
) -> Json<Vec<WheelSummaryResponse>> {
    let wheels = state.engine.wheels(&account);
    let labels = state.engine.categorized(&account);

    let mut summaries = Vec::with_capacity(wheels.len());
    for (index, wheel) in wheels.iter().enumerate() {
        summaries.push(wheel_to_summary(&state, wheel, index + 1, &labels).await);
    }
    summaries.reverse();

    Json(summaries)
}

async fn wheel_to_summary(
    state: &AppState,
    wheel: &Wheel,
    wheel_num: usize,
    labels: &HashMap<String, CategorizedTrade>,
) -> WheelSummaryResponse {
    let holdings = WheelEngine::priced_holdings(wheel, state.prices.as_ref()).await;

    let priced: Vec<Decimal> = holdings.iter().filter_map(|h| h.unrealized_pnl).collect();
    let unrealized = if priced.is_empty() {
        None
    } else {
        Some(priced.iter().copied().sum::<Decimal>())
    };

    let cash_pnl = wheel
        .realized_pnl
        .unwrap_or_else(|| WheelEngine::cash_pnl(wheel));
    let current_pnl = cash_pnl + unrealized.unwrap_or(Decimal::ZERO);

    WheelSummaryResponse {
        wheel_num,
        symbol: wheel.symbol.clone(),
        strike: wheel.strike.map(|s| format!("${}", s.normalize())),
        start_date: wheel.start_date.to_string(),
        end_date: wheel.end_date.map(|d| d.to_string()),
        is_open: wheel.is_open(),
        phase: wheel.phase.to_string(),
        close_reason: wheel.close_reason.map(|r| r.to_string()),
        comm: Money::new(wheel.commissions_paid),
        premium_collected: Money::new(wheel.premium_collected),
        unrealized_pnl: unrealized.map(Money::new),
        current_pnl: Money::new(current_pnl),
        pnl: Money::new(cash_pnl),
        holdings: holdings
            .into_iter()
            .map(|h| HoldingResponse {
                kind: h.kind.to_string(),
                symbol: h.symbol,
                strike: h.strike,
                quantity: h.quantity,
                purchase_price: h.open_price,
                current_price: h.current_price,
                unrealized_pnl: h.unrealized_pnl.map(Money::new),
            })
            .collect(),
        trades: wheel
            .executions
            .iter()
            .map(|exec| execution_to_trade(exec, labels))
            .collect(),
    }
}

fn execution_to_trade(
    exec: &Execution,
    labels: &HashMap<String, CategorizedTrade>,
) -> WheelTradeResponse {
    let label = labels.get(&exec.exec_id);
    WheelTradeResponse {
        date: exec.trade_date().to_string(),
        action: label
            .map(|t| t.action.to_string())
            .unwrap_or_else(|| format!("{} {}", exec.side, exec.instrument)),
        details: label
            .map(|t| t.details.clone())
            .unwrap_or_else(|| instrument_details(exec)),
        kind: exec.instrument.to_string(),
        quantity: exec.quantity,
        price: Money::new(exec.price),
    }
}

// ============================================================================
// History
// ============================================================================

/// Get the flat execution history for an account, newest first.
#[utoipa::path(
    get,
    path = "/api/v1/accounts/{account}/history",
    params(
        ("account" = String, Path, description = "Broker account id")
    ),
    responses(
        (status = 200, description = "Execution history", body = [HistoryEntryResponse])
    ),
    tag = "History"
)]
pub async fn get_history(
    State(state): State<Arc<AppState>>,
    Path(account): Path<String>,
) -> Json<Vec<HistoryEntryResponse>> {
    let history = state
        .engine
        .history(&account)
        .iter()
        .map(|exec| HistoryEntryResponse {
            date: exec.trade_date().to_string(),
            symbol: exec.symbol.clone(),
            details: instrument_details(exec),
            qty: exec.quantity,
            price: format_currency(exec.price),
            comm: Money::new(exec.commission),
        })
        .collect();

    Json(history)
}

fn instrument_details(exec: &Execution) -> String {
    match exec.instrument {
        InstrumentKind::Stock => "STK".to_string(),
        InstrumentKind::Put => format!(
            "{} P OPT",
            exec.strike.map(|s| s.normalize().to_string()).unwrap_or_default()
        ),
        InstrumentKind::Call => format!(
            "{} C OPT",
            exec.strike.map(|s| s.normalize().to_string()).unwrap_or_default()
        ),
    }
}

// ============================================================================
// Analytics
// ============================================================================

/// Get aggregate analytics for an account.
#[utoipa::path(
    get,
    path = "/api/v1/accounts/{account}/analytics",
    params(
        ("account" = String, Path, description = "Broker account id")
    ),
    responses(
        (status = 200, description = "Aggregate analytics", body = AnalyticsResponse)
    ),
    tag = "Analytics"
)]
pub async fn get_analytics(
    State(state): State<Arc<AppState>>,
    Path(account): Path<String>,
) -> Json<AnalyticsResponse> {
    let wheels = state.engine.wheels(&account);
    let report = analytics::aggregate(&wheels);

    Json(AnalyticsResponse {
        total_wheels: report.total_wheels,
        open_wheels: report.open_wheels,
        closed_wheels: report.closed_wheels,
        win_rate: report.win_rate,
        best_realized: report.best_realized.map(Money::new),
        worst_realized: report.worst_realized.map(Money::new),
        average_realized: report.average_realized.map(Money::new),
        total_premium: Money::new(report.total_premium),
        total_commissions: Money::new(report.total_commissions),
        total_realized: Money::new(report.total_realized),
        average_hold_days: report.average_hold_days,
        monthly: report
            .monthly
            .into_iter()
            .map(|bucket| MonthlyBucketResponse {
                month: bucket.month,
                premium: Money::new(bucket.premium),
                realized_pnl: Money::new(bucket.realized_pnl),
                wheels_opened: bucket.wheels_opened,
                wheels_closed: bucket.wheels_closed,
                trades: bucket.trades,
            })
            .collect(),
        symbols: report
            .symbols
            .into_iter()
            .map(|rollup| SymbolRollupResponse {
                symbol: rollup.symbol,
                total_wheels: rollup.total_wheels,
                open_wheels: rollup.open_wheels,
                closed_wheels: rollup.closed_wheels,
                total_premium: Money::new(rollup.total_premium),
                total_commissions: Money::new(rollup.total_commissions),
                total_realized: Money::new(rollup.total_realized),
                win_rate: rollup.win_rate,
            })
            .collect(),
        close_reasons: CloseReasonsResponse {
            full_cycle: report.close_reasons.full_cycle,
            put_closed: report.close_reasons.put_closed,
            open: report.close_reasons.open,
        },
    })
}
