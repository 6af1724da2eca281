//! Read-only analytics over the wheel set.
//!
//! Every field is a deterministic pure function of the wheels passed in;
//! there is no hidden state and no mutation.

use crate::engine::execution::Side;
use crate::engine::wheel::{CloseReason, Wheel};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;

/// Monthly rollup bucket, keyed by `YYYY-MM`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MonthlyBucket {
    /// Bucket key (`YYYY-MM`).
    pub month: String,
    /// Premium collected from option sales that month.
    pub premium: Decimal,
    /// Realized PnL of wheels closed that month.
    pub realized_pnl: Decimal,
    /// Wheels opened that month.
    pub wheels_opened: usize,
    /// Wheels closed that month.
    pub wheels_closed: usize,
    /// Executions that month.
    pub trades: usize,
}

/// Per-symbol rollup mirroring the overview fields.
#[derive(Debug, Clone, Serialize)]
pub struct SymbolRollup {
    /// Underlying symbol.
    pub symbol: String,
    /// Total wheels for the symbol.
    pub total_wheels: usize,
    /// Open wheels (0 or 1 by invariant).
    pub open_wheels: usize,
    /// Closed wheels.
    pub closed_wheels: usize,
    /// Premium collected across all the symbol's wheels.
    pub total_premium: Decimal,
    /// Commissions paid across all the symbol's wheels.
    pub total_commissions: Decimal,
    /// Realized PnL across the symbol's closed wheels.
    pub total_realized: Decimal,
    /// Win rate over the symbol's closed wheels.
    pub win_rate: Option<Decimal>,
}

/// Close-reason histogram.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct CloseReasonBreakdown {
    /// Wheels closed via call assignment.
    pub full_cycle: usize,
    /// Wheels closed by buying the put back.
    pub put_closed: usize,
    /// Wheels still open.
    pub open: usize,
}

/// Aggregate report over the full wheel set.
#[derive(Debug, Clone, Serialize)]
pub struct AnalyticsReport {
    /// Total wheel count.
    pub total_wheels: usize,
    /// Open wheel count.
    pub open_wheels: usize,
    /// Closed wheel count.
    pub closed_wheels: usize,
    /// Closed wheels with realized PnL ≥ 0 over total closed.
    pub win_rate: Option<Decimal>,
    /// Best realized PnL among closed wheels.
    pub best_realized: Option<Decimal>,
    /// Worst realized PnL among closed wheels.
    pub worst_realized: Option<Decimal>,
    /// Average realized PnL among closed wheels.
    pub average_realized: Option<Decimal>,
    /// Premium collected across all wheels.
    pub total_premium: Decimal,
    /// Commissions paid across all wheels.
    pub total_commissions: Decimal,
    /// Realized PnL summed over closed wheels.
    pub total_realized: Decimal,
    /// Average hold duration in days, closed wheels only.
    pub average_hold_days: Option<Decimal>,
    /// Monthly buckets in ascending month order.
    pub monthly: Vec<MonthlyBucket>,
    /// Per-symbol rollups in symbol order.
    pub symbols: Vec<SymbolRollup>,
    /// Close-reason histogram.
    pub close_reasons: CloseReasonBreakdown,
}

/// Folds the wheel set into the aggregate report.
#[must_use]
pub fn aggregate(wheels: &[Wheel]) -> AnalyticsReport {
    let total_wheels = wheels.len();
    let open_wheels = wheels.iter().filter(|w| w.is_open()).count();
    let closed: Vec<&Wheel> = wheels.iter().filter(|w| !w.is_open()).collect();

    let realized: Vec<Decimal> = closed.iter().filter_map(|w| w.realized_pnl).collect();
    let wins = realized.iter().filter(|p| **p >= Decimal::ZERO).count();

    let win_rate = ratio(wins, closed.len());
    let best_realized = realized.iter().max().copied();
    let worst_realized = realized.iter().min().copied();
    let total_realized: Decimal = realized.iter().copied().sum();
    let average_realized = if realized.is_empty() {
        None
    } else {
        Some((total_realized / Decimal::from(realized.len())).round_dp(2))
    };

    let total_premium: Decimal = wheels.iter().map(|w| w.premium_collected).sum();
    let total_commissions: Decimal = wheels.iter().map(|w| w.commissions_paid).sum();

    let hold_days: Vec<i64> = closed
        .iter()
        .filter_map(|w| w.end_date.map(|end| (end - w.start_date).num_days()))
        .collect();
    let average_hold_days = if hold_days.is_empty() {
        None
    } else {
        Some(
            (Decimal::from(hold_days.iter().sum::<i64>()) / Decimal::from(hold_days.len()))
                .round_dp(1),
        )
    };

    let mut close_reasons = CloseReasonBreakdown {
        open: open_wheels,
        ..CloseReasonBreakdown::default()
    };
    for wheel in &closed {
        match wheel.close_reason {
            Some(CloseReason::FullCycle) => close_reasons.full_cycle += 1,
            Some(CloseReason::PutClosed) => close_reasons.put_closed += 1,
            None => {}
        }
    }

    AnalyticsReport {
        total_wheels,
        open_wheels,
        closed_wheels: closed.len(),
        win_rate,
        best_realized,
        worst_realized,
        average_realized,
        total_premium,
        total_commissions,
        total_realized,
        average_hold_days,
        monthly: monthly_buckets(wheels),
        symbols: symbol_rollups(wheels),
        close_reasons,
    }
}

fn ratio(numerator: usize, denominator: usize) -> Option<Decimal> {
    if denominator == 0 {
        None
    } else {
        Some((Decimal::from(numerator) / Decimal::from(denominator)).round_dp(4))
    }
}

fn monthly_buckets(wheels: &[Wheel]) -> Vec<MonthlyBucket> {
    let mut buckets: BTreeMap<String, MonthlyBucket> = BTreeMap::new();

    for wheel in wheels {
        let start_key = wheel.start_date.format("%Y-%m").to_string();
        buckets
            .entry(start_key.clone())
            .or_insert_with(|| MonthlyBucket {
                month: start_key,
                ..MonthlyBucket::default()
            })
            .wheels_opened += 1;

        if let Some(end) = wheel.end_date {
            let end_key = end.format("%Y-%m").to_string();
            let entry = buckets
                .entry(end_key.clone())
                .or_insert_with(|| MonthlyBucket {
                    month: end_key,
                    ..MonthlyBucket::default()
                });
            entry.wheels_closed += 1;
            entry.realized_pnl += wheel.realized_pnl.unwrap_or(Decimal::ZERO);
        }

        for exec in &wheel.executions {
            let key = exec.trade_date().format("%Y-%m").to_string();
            let entry = buckets.entry(key.clone()).or_insert_with(|| MonthlyBucket {
                month: key,
                ..MonthlyBucket::default()
            });
            entry.trades += 1;
            if exec.instrument.is_option() && exec.side == Side::Sell {
                entry.premium += exec.gross_value();
            }
        }
    }

    buckets.into_values().collect()
}

fn symbol_rollups(wheels: &[Wheel]) -> Vec<SymbolRollup> {
    let mut by_symbol: BTreeMap<&str, Vec<&Wheel>> = BTreeMap::new();
    for wheel in wheels {
        by_symbol.entry(wheel.symbol.as_str()).or_default().push(wheel);
    }

    by_symbol
        .into_iter()
        .map(|(symbol, group)| {
            let closed: Vec<&&Wheel> = group.iter().filter(|w| !w.is_open()).collect();
            let wins = closed
                .iter()
                .filter(|w| w.realized_pnl.unwrap_or(Decimal::ZERO) >= Decimal::ZERO)
                .count();
            SymbolRollup {
                symbol: symbol.to_string(),
                total_wheels: group.len(),
                open_wheels: group.iter().filter(|w| w.is_open()).count(),
                closed_wheels: closed.len(),
                total_premium: group.iter().map(|w| w.premium_collected).sum(),
                total_commissions: group.iter().map(|w| w.commissions_paid).sum(),
                total_realized: closed
                    .iter()
                    .filter_map(|w| w.realized_pnl)
                    .sum(),
                win_rate: ratio(wins, closed.len()),
            }
        })
        .collect()
}
