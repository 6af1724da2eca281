//! PnL calculation: premiums, commissions, realized and unrealized results.
//!
//! All arithmetic is `Decimal`; every realized figure is reproducible to the
//! cent from a wheel's execution list alone.

use crate::engine::execution::{Execution, InstrumentKind, Side};
use crate::engine::wheel::{HoldingKind, OpenLeg, Wheel};
use rust_decimal::Decimal;

/// Display hint for a money value, derived purely from sign.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignClass {
    /// Value > 0.
    Positive,
    /// Value < 0.
    Negative,
    /// Value == 0.
    Neutral,
}

impl std::fmt::Display for SignClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Positive => write!(f, "text-green"),
            Self::Negative => write!(f, "text-red"),
            Self::Neutral => write!(f, "text-neutral"),
        }
    }
}

/// Classifies a money value by sign. Computed once here; downstream
/// consumers only read it.
#[must_use]
pub fn sign_class(value: Decimal) -> SignClass {
    if value > Decimal::ZERO {
        SignClass::Positive
    } else if value < Decimal::ZERO {
        SignClass::Negative
    } else {
        SignClass::Neutral
    }
}

/// Credit received for sold option legs:
/// `Σ price × |quantity| × multiplier` over option SELLs.
#[must_use]
pub fn premium_collected(executions: &[Execution]) -> Decimal {
    executions
        .iter()
        .filter(|e| e.instrument.is_option() && e.side == Side::Sell)
        .map(Execution::gross_value)
        .sum()
}

/// Debit paid buying option legs back.
#[must_use]
pub fn option_buyback_cost(executions: &[Execution]) -> Decimal {
    executions
        .iter()
        .filter(|e| e.instrument.is_option() && e.side == Side::Buy)
        .map(Execution::gross_value)
        .sum()
}

/// Total commissions as a positive magnitude (executions carry ≤ 0).
#[must_use]
pub fn commissions_paid(executions: &[Execution]) -> Decimal {
    executions.iter().map(|e| -e.commission).sum()
}

/// Realized stock PnL within the cycle: sales matched against the
/// volume-weighted purchase price. Equals proceeds − cost once the stock
/// position is flat.
#[must_use]
pub fn stock_realized(executions: &[Execution]) -> Decimal {
    let mut quantity = Decimal::ZERO;
    let mut vwap = Decimal::ZERO;
    let mut realized = Decimal::ZERO;

    for exec in executions
        .iter()
        .filter(|e| e.instrument == InstrumentKind::Stock)
    {
        match exec.side {
            Side::Buy => {
                let added = exec.abs_quantity();
                let total = quantity + added;
                if total > Decimal::ZERO {
                    vwap = (vwap * quantity + exec.price * added) / total;
                }
                quantity = total;
            }
            Side::Sell => {
                let closed = exec.abs_quantity().min(quantity);
                realized += (exec.price - vwap) * closed * exec.multiplier;
                quantity -= closed;
            }
        }
    }

    realized
}

/// Cash PnL realized so far:
/// `premium collected − option buybacks − commissions + stock PnL`.
///
/// For a closed wheel this is the final realized PnL, reproducible to the
/// cent from the execution list alone.
#[must_use]
pub fn realized_pnl(executions: &[Execution]) -> Decimal {
    premium_collected(executions) - option_buyback_cost(executions)
        - commissions_paid(executions)
        + stock_realized(executions)
}

/// Unrealized PnL for one open leg at a given market price.
/// Long stock gains as price rises; short option legs gain as price falls.
#[must_use]
pub fn unrealized(leg: &OpenLeg, current_price: Decimal) -> Decimal {
    match leg.kind {
        HoldingKind::Shares => (current_price - leg.open_price) * leg.quantity * leg.multiplier,
        HoldingKind::ShortPut | HoldingKind::ShortCall => {
            (leg.open_price - current_price) * leg.quantity.abs() * leg.multiplier
        }
    }
}

/// Annotates a wheel with premium, commissions and (when closed) realized
/// PnL.
pub fn annotate(wheel: &mut Wheel) {
    wheel.premium_collected = premium_collected(&wheel.executions);
    wheel.commissions_paid = commissions_paid(&wheel.executions);
    wheel.realized_pnl = if wheel.is_open() {
        None
    } else {
        Some(realized_pnl(&wheel.executions))
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use rust_decimal_macros::dec;

    fn exec(
        instrument: InstrumentKind,
        qty: Decimal,
        price: Decimal,
        commission: Decimal,
    ) -> Execution {
        Execution {
            exec_id: "E".to_string(),
            timestamp: DateTime::parse_from_rfc3339("2024-03-01T15:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
            symbol: "AAPL".to_string(),
            instrument,
            side: if qty < Decimal::ZERO { Side::Sell } else { Side::Buy },
            strike: None,
            expiry: None,
            quantity: qty,
            price,
            commission,
            multiplier: if instrument == InstrumentKind::Stock {
                Decimal::ONE
            } else {
                dec!(100)
            },
            assignment: false,
        }
    }

    #[test]
    fn test_premium_and_buyback() {
        let execs = vec![
            exec(InstrumentKind::Put, dec!(-1), dec!(2.00), dec!(-0.65)),
            exec(InstrumentKind::Put, dec!(1), dec!(0.50), dec!(-0.65)),
            exec(InstrumentKind::Call, dec!(-1), dec!(1.50), dec!(-0.65)),
        ];

        assert_eq!(premium_collected(&execs), dec!(350));
        assert_eq!(option_buyback_cost(&execs), dec!(50));
        assert_eq!(commissions_paid(&execs), dec!(1.95));
    }

    #[test]
    fn test_realized_pnl_identity_put_closed() {
        // Put sold for 2.00, bought back at 0.50, two 0.65 commissions.
        let execs = vec![
            exec(InstrumentKind::Put, dec!(-1), dec!(2.00), dec!(-0.65)),
            exec(InstrumentKind::Put, dec!(1), dec!(0.50), dec!(-0.65)),
        ];

        assert_eq!(realized_pnl(&execs), dec!(148.70));
    }

    #[test]
    fn test_realized_pnl_identity_full_cycle() {
        // Premiums 350 + stock gain 500 − commissions 1.30.
        let execs = vec![
            exec(InstrumentKind::Put, dec!(-1), dec!(2.00), dec!(-0.65)),
            exec(InstrumentKind::Stock, dec!(100), dec!(150.00), Decimal::ZERO),
            exec(InstrumentKind::Call, dec!(-1), dec!(1.50), dec!(-0.65)),
            exec(InstrumentKind::Stock, dec!(-100), dec!(155.00), Decimal::ZERO),
        ];

        assert_eq!(stock_realized(&execs), dec!(500));
        assert_eq!(realized_pnl(&execs), dec!(848.70));
    }

    #[test]
    fn test_stock_realized_partial_sale() {
        let execs = vec![
            exec(InstrumentKind::Stock, dec!(100), dec!(150.00), Decimal::ZERO),
            exec(InstrumentKind::Stock, dec!(100), dec!(160.00), Decimal::ZERO),
            exec(InstrumentKind::Stock, dec!(-50), dec!(165.00), Decimal::ZERO),
        ];

        // vwap 155, 50 shares sold at 165.
        assert_eq!(stock_realized(&execs), dec!(500));
    }

    #[test]
    fn test_unrealized_directions() {
        let shares = OpenLeg {
            kind: HoldingKind::Shares,
            symbol: "AAPL".to_string(),
            strike: None,
            expiry: None,
            quantity: dec!(100),
            open_price: dec!(150),
            multiplier: Decimal::ONE,
        };
        assert_eq!(unrealized(&shares, dec!(155)), dec!(500));
        assert_eq!(unrealized(&shares, dec!(145)), dec!(-500));

        let short_put = OpenLeg {
            kind: HoldingKind::ShortPut,
            symbol: "AAPL".to_string(),
            strike: Some(dec!(150)),
            expiry: None,
            quantity: dec!(-1),
            open_price: dec!(2.00),
            multiplier: dec!(100),
        };
        // A price decline favors the short seller.
        assert_eq!(unrealized(&short_put, dec!(0.50)), dec!(150));
        assert_eq!(unrealized(&short_put, dec!(3.00)), dec!(-100));
    }

    #[test]
    fn test_sign_class() {
        assert_eq!(sign_class(dec!(1)), SignClass::Positive);
        assert_eq!(sign_class(dec!(-0.01)), SignClass::Negative);
        assert_eq!(sign_class(Decimal::ZERO), SignClass::Neutral);
        assert_eq!(SignClass::Positive.to_string(), "text-green");
        assert_eq!(SignClass::Negative.to_string(), "text-red");
        assert_eq!(SignClass::Neutral.to_string(), "text-neutral");
    }
}
