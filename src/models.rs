//! Request and response models for the REST API.
//!
//! Every money field crosses the wire as [`Money`]: display string, raw
//! numeric value and a sign-derived CSS class. The sign hint is computed by
//! the PnL calculator; this module only renders it.

use crate::engine::pnl;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// A money value presented to the UI.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Money {
    /// Display string, e.g. `$1,234.56` (absolute value).
    pub value: String,
    /// Raw numeric value, sign preserved.
    pub raw: Decimal,
    /// Sign hint: `text-green`, `text-red` or `text-neutral`.
    pub class: String,
}

impl Money {
    /// Wraps a raw amount with its display string and sign class.
    #[must_use]
    pub fn new(raw: Decimal) -> Self {
        Self {
            value: format_currency(raw),
            raw,
            class: pnl::sign_class(raw).to_string(),
        }
    }
}

impl From<Decimal> for Money {
    fn from(raw: Decimal) -> Self {
        Self::new(raw)
    }
}

/// Formats an amount as `$1,234.56` using the absolute value; the sign
/// travels in [`Money::class`].
#[must_use]
pub fn format_currency(raw: Decimal) -> String {
    let mut rounded = raw.abs().round_dp(2);
    rounded.rescale(2);
    let text = rounded.to_string();
    let (int_part, frac_part) = text.split_once('.').unwrap_or((text.as_str(), "00"));

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    format!("${}.{}", grouped, frac_part)
}

// ============================================================================
// Health & Statistics
// ============================================================================

/// Health check response.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Service status.
    pub status: String,
    /// Service version.
    pub version: String,
}

/// Engine-wide statistics.
#[derive(Debug, Serialize, ToSchema)]
pub struct StatsResponse {
    /// Known accounts.
    pub accounts: usize,
    /// Total wheels across accounts.
    pub total_wheels: usize,
    /// Open wheels across accounts.
    pub open_wheels: usize,
    /// Ingested executions across accounts.
    pub total_executions: usize,
}

/// List of known account ids.
#[derive(Debug, Serialize, ToSchema)]
pub struct AccountsListResponse {
    /// Account ids.
    pub accounts: Vec<String>,
}

// ============================================================================
// Sync
// ============================================================================

/// One categorized trade in a sync response.
#[derive(Debug, Serialize, ToSchema)]
pub struct CategorizedTradeResponse {
    /// Execution date (`YYYY-MM-DD`).
    pub date: String,
    /// Underlying symbol.
    pub symbol: String,
    /// What the execution was, e.g. `Put option sold`.
    pub action: String,
    /// Suggested next action, e.g. `Start New Wheel`.
    pub suggested_action: String,
    /// Rationale or rejection reason.
    pub details: String,
}

/// Response for the sync endpoint.
#[derive(Debug, Serialize, ToSchema)]
pub struct SyncResponse {
    /// Outcome status, `success` on completion.
    pub status: String,
    /// New executions applied.
    pub count: usize,
    /// Records absorbed by dedup.
    pub duplicates: usize,
    /// Malformed records skipped.
    pub skipped: usize,
    /// Labels for the freshly synced executions.
    pub categorized_trades: Vec<CategorizedTradeResponse>,
}

// ============================================================================
// Wheel Summary
// ============================================================================

/// One open position leg within a wheel.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HoldingResponse {
    /// Leg kind: `SHARES`, `SHORT_PUT` or `SHORT_CALL`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Underlying symbol.
    pub symbol: String,
    /// Strike (options only).
    pub strike: Option<Decimal>,
    /// Net open quantity.
    pub quantity: Decimal,
    /// Volume-weighted price at open.
    pub purchase_price: Decimal,
    /// Current market price; absent when unpriced.
    pub current_price: Option<Decimal>,
    /// Unrealized PnL; absent when unpriced.
    pub unrealized_pnl: Option<Money>,
}

/// One execution row within a wheel summary.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WheelTradeResponse {
    /// Execution date (`YYYY-MM-DD`).
    pub date: String,
    /// What the execution was, e.g. `Call option sold`.
    pub action: String,
    /// Specifics (strike, quantities).
    pub details: String,
    /// Instrument kind: `STOCK`, `PUT` or `CALL`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Signed quantity.
    pub quantity: Decimal,
    /// Price per unit.
    pub price: Money,
}

/// One wheel in the summary listing.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WheelSummaryResponse {
    /// Display number; the listing shows the newest wheel first.
    pub wheel_num: usize,
    /// Underlying symbol.
    pub symbol: String,
    /// Headline short-put strike, e.g. `$150`.
    pub strike: Option<String>,
    /// Cycle start date (`YYYY-MM-DD`).
    pub start_date: String,
    /// Cycle end date; absent while open.
    pub end_date: Option<String>,
    /// Whether the wheel is still open.
    pub is_open: bool,
    /// Lifecycle phase: `CSP`, `SHARES_HELD`, `COVERED_CALL` or `CLOSED`.
    pub phase: String,
    /// Why the wheel closed (`full_cycle` / `put_closed`); absent while
    /// open.
    pub close_reason: Option<String>,
    /// Commissions paid.
    pub comm: Money,
    /// Premium collected from option sales.
    pub premium_collected: Money,
    /// Unrealized PnL over priced holdings; absent when nothing is priced.
    pub unrealized_pnl: Option<Money>,
    /// Cash PnL realized so far plus unrealized PnL.
    pub current_pnl: Money,
    /// Realized PnL (final for closed wheels, to-date for open ones).
    pub pnl: Money,
    /// Open position legs.
    pub holdings: Vec<HoldingResponse>,
    /// Executions belonging to the wheel, in processing order.
    pub trades: Vec<WheelTradeResponse>,
}

// ============================================================================
// History
// ============================================================================

/// One execution row in the flat history listing.
#[derive(Debug, Serialize, ToSchema)]
pub struct HistoryEntryResponse {
    /// Execution date (`YYYY-MM-DD`).
    pub date: String,
    /// Underlying symbol.
    pub symbol: String,
    /// Instrument specifics, e.g. `150 P OPT`.
    pub details: String,
    /// Signed quantity.
    pub qty: Decimal,
    /// Price per unit, e.g. `$1.20`.
    pub price: String,
    /// Commission.
    pub comm: Money,
}

// ============================================================================
// Analytics
// ============================================================================

/// Monthly analytics bucket.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyBucketResponse {
    /// Bucket key (`YYYY-MM`).
    pub month: String,
    /// Premium collected that month.
    pub premium: Money,
    /// Realized PnL of wheels closed that month.
    pub realized_pnl: Money,
    /// Wheels opened that month.
    pub wheels_opened: usize,
    /// Wheels closed that month.
    pub wheels_closed: usize,
    /// Executions that month.
    pub trades: usize,
}

/// Per-symbol analytics rollup.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SymbolRollupResponse {
    /// Underlying symbol.
    pub symbol: String,
    /// Total wheels.
    pub total_wheels: usize,
    /// Open wheels.
    pub open_wheels: usize,
    /// Closed wheels.
    pub closed_wheels: usize,
    /// Premium collected.
    pub total_premium: Money,
    /// Commissions paid.
    pub total_commissions: Money,
    /// Realized PnL over closed wheels.
    pub total_realized: Money,
    /// Win rate over closed wheels (0..=1); absent with no closed wheels.
    pub win_rate: Option<Decimal>,
}

/// Close-reason histogram.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CloseReasonsResponse {
    /// Wheels closed via call assignment.
    pub full_cycle: usize,
    /// Wheels closed by buying the put back.
    pub put_closed: usize,
    /// Wheels still open.
    pub open: usize,
}

/// Aggregate analytics for an account.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsResponse {
    /// Total wheel count.
    pub total_wheels: usize,
    /// Open wheel count.
    pub open_wheels: usize,
    /// Closed wheel count.
    pub closed_wheels: usize,
    /// Win rate over closed wheels (0..=1); absent with no closed wheels.
    pub win_rate: Option<Decimal>,
    /// Best realized PnL among closed wheels.
    pub best_realized: Option<Money>,
    /// Worst realized PnL among closed wheels.
    pub worst_realized: Option<Money>,
    /// Average realized PnL among closed wheels.
    pub average_realized: Option<Money>,
    /// Premium collected across all wheels.
    pub total_premium: Money,
    /// Commissions paid across all wheels.
    pub total_commissions: Money,
    /// Realized PnL summed over closed wheels.
    pub total_realized: Money,
    /// Average hold duration in days, closed wheels only.
    pub average_hold_days: Option<Decimal>,
    /// Monthly buckets, ascending.
    pub monthly: Vec<MonthlyBucketResponse>,
    /// Per-symbol rollups, symbol order.
    pub symbols: Vec<SymbolRollupResponse>,
    /// Close-reason histogram.
    pub close_reasons: CloseReasonsResponse,
}
