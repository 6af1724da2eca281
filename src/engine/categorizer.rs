//! Suggested-action labeling for freshly synced executions.
//!
//! A pure pass over the transition events the state machine already
//! produced; it mutates nothing and never re-derives phase.

use crate::engine::machine::{TransitionEvent, TransitionKind};
use chrono::NaiveDate;
use serde::Serialize;

/// Suggested next action for a synced execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SuggestedAction {
    /// The execution opened a new wheel.
    StartNewWheel,
    /// The execution closed a wheel.
    CloseOpenWheel,
    /// Any other in-cycle transition.
    ContinueWheel,
    /// The execution could not be applied cleanly; needs a human look.
    NeedsReview,
}

impl std::fmt::Display for SuggestedAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StartNewWheel => write!(f, "Start New Wheel"),
            Self::CloseOpenWheel => write!(f, "Close Open Wheel"),
            Self::ContinueWheel => write!(f, "Continue Wheel"),
            Self::NeedsReview => write!(f, "Needs Review"),
        }
    }
}

/// Report entry for one synced execution. Produced per sync, never
/// persisted.
#[derive(Debug, Clone)]
pub struct CategorizedTrade {
    /// Execution id this entry describes.
    pub exec_id: String,
    /// Execution date.
    pub date: NaiveDate,
    /// Underlying symbol.
    pub symbol: String,
    /// What the execution was (human label).
    pub action: &'static str,
    /// Suggested next action.
    pub suggested_action: SuggestedAction,
    /// Free-text rationale or rejection reason.
    pub details: String,
    /// Wheel the execution joined, if any.
    pub wheel_sequence: Option<u32>,
}

/// Labels a batch of transition events.
#[must_use]
pub fn categorize(events: &[TransitionEvent]) -> Vec<CategorizedTrade> {
    events.iter().map(categorize_event).collect()
}

fn categorize_event(event: &TransitionEvent) -> CategorizedTrade {
    CategorizedTrade {
        exec_id: event.exec_id.clone(),
        date: event.date,
        symbol: event.symbol.clone(),
        action: action_label(event.kind),
        suggested_action: suggested_action(event.kind),
        details: event.detail.clone(),
        wheel_sequence: event.wheel_sequence,
    }
}

fn action_label(kind: TransitionKind) -> &'static str {
    match kind {
        TransitionKind::WheelOpened | TransitionKind::PutSold => "Put option sold",
        TransitionKind::PutBuyback | TransitionKind::PutClosed => "Put option bought",
        TransitionKind::PutAssignmentClose => "Put option bought with 100 shares bought",
        TransitionKind::SharesAssigned
        | TransitionKind::StockBought
        | TransitionKind::PartialAssignment => "Stock Buy",
        TransitionKind::CallSold => "Call option sold",
        TransitionKind::CallBuyback => "Call option bought (without shares sold)",
        TransitionKind::CallAssignmentClose => "Call option bought (with shares sold)",
        TransitionKind::StockSold | TransitionKind::SharesCalledAway => "Stock Sell",
        TransitionKind::Unassignable => "Uncategorized",
    }
}

fn suggested_action(kind: TransitionKind) -> SuggestedAction {
    match kind {
        TransitionKind::WheelOpened => SuggestedAction::StartNewWheel,
        TransitionKind::PutClosed | TransitionKind::SharesCalledAway => {
            SuggestedAction::CloseOpenWheel
        }
        TransitionKind::Unassignable | TransitionKind::PartialAssignment => {
            SuggestedAction::NeedsReview
        }
        _ => SuggestedAction::ContinueWheel,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::execution::{Execution, InstrumentKind, Side};
    use crate::engine::machine::rebuild_symbol;
    use chrono::{DateTime, Utc};
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn exec(
        id: &str,
        instrument: InstrumentKind,
        qty: Decimal,
        price: Decimal,
        strike: Option<Decimal>,
    ) -> Execution {
        Execution {
            exec_id: id.to_string(),
            timestamp: DateTime::parse_from_rfc3339("2024-03-01T15:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
            symbol: "AAPL".to_string(),
            instrument,
            side: if qty < Decimal::ZERO { Side::Sell } else { Side::Buy },
            strike,
            expiry: None,
            quantity: qty,
            price,
            commission: Decimal::ZERO,
            multiplier: if instrument == InstrumentKind::Stock {
                Decimal::ONE
            } else {
                dec!(100)
            },
            assignment: false,
        }
    }

    #[test]
    fn test_new_wheel_is_start_new_wheel() {
        let execs = vec![exec("E1", InstrumentKind::Put, dec!(-1), dec!(2.00), Some(dec!(150)))];
        let (_, events) = rebuild_symbol("AAPL", &execs);

        let trades = categorize(&events);
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].suggested_action, SuggestedAction::StartNewWheel);
        assert_eq!(trades[0].action, "Put option sold");
        assert_eq!(trades[0].wheel_sequence, Some(1));
    }

    #[test]
    fn test_orphan_execution_needs_review() {
        // No open wheel and not an opening put sale.
        let execs = vec![exec("E1", InstrumentKind::Stock, dec!(100), dec!(150.00), None)];
        let (book, events) = rebuild_symbol("AAPL", &execs);

        assert!(book.wheels.is_empty());
        let trades = categorize(&events);
        assert_eq!(trades[0].suggested_action, SuggestedAction::NeedsReview);
        assert_eq!(trades[0].action, "Uncategorized");
        assert!(trades[0].details.contains("no open wheel"));
        assert_eq!(trades[0].wheel_sequence, None);
    }

    #[test]
    fn test_full_cycle_labels() {
        let mut e2 = exec("E2", InstrumentKind::Stock, dec!(100), dec!(150.00), None);
        e2.timestamp = DateTime::parse_from_rfc3339("2024-03-15T15:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let mut e3 = exec("E3", InstrumentKind::Call, dec!(-1), dec!(1.50), Some(dec!(155)));
        e3.timestamp = DateTime::parse_from_rfc3339("2024-03-18T15:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let mut e4 = exec("E4", InstrumentKind::Stock, dec!(-100), dec!(155.00), None);
        e4.timestamp = DateTime::parse_from_rfc3339("2024-04-19T20:00:00Z")
            .unwrap()
            .with_timezone(&Utc);

        let execs = vec![
            exec("E1", InstrumentKind::Put, dec!(-1), dec!(2.00), Some(dec!(150))),
            e2,
            e3,
            e4,
        ];
        let (_, events) = rebuild_symbol("AAPL", &execs);
        let trades = categorize(&events);

        assert_eq!(trades[0].suggested_action, SuggestedAction::StartNewWheel);
        assert_eq!(trades[1].suggested_action, SuggestedAction::ContinueWheel);
        assert_eq!(trades[1].action, "Stock Buy");
        assert_eq!(trades[2].suggested_action, SuggestedAction::ContinueWheel);
        assert_eq!(trades[2].action, "Call option sold");
        assert_eq!(trades[3].suggested_action, SuggestedAction::CloseOpenWheel);
        assert_eq!(trades[3].action, "Stock Sell");
    }

    #[test]
    fn test_display_strings() {
        assert_eq!(SuggestedAction::StartNewWheel.to_string(), "Start New Wheel");
        assert_eq!(SuggestedAction::CloseOpenWheel.to_string(), "Close Open Wheel");
        assert_eq!(SuggestedAction::ContinueWheel.to_string(), "Continue Wheel");
        assert_eq!(SuggestedAction::NeedsReview.to_string(), "Needs Review");
    }
}
