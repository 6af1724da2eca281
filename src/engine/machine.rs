//! Wheel state machine: assigns executions to wheels and advances phases.
//!
//! A symbol's wheel list is rebuilt as a pure fold over that symbol's full
//! execution history, so incremental syncs and from-scratch reconstruction
//! produce identical state by construction. Transition rules follow one
//! authoritative table: `NONE → CSP → SHARES_HELD → COVERED_CALL → CLOSED`,
//! with `put_closed` and `full_cycle` as the two close paths.

use crate::engine::execution::{Execution, InstrumentKind, Side};
use crate::engine::pnl;
use crate::engine::wheel::{CloseReason, HoldingKind, OpenLeg, Wheel, WheelPhase};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use tracing::debug;

/// What a single execution did to its symbol's wheel state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionKind {
    /// SELL PUT created a new wheel.
    WheelOpened,
    /// SELL PUT joined the open wheel (scaling in / roll re-open).
    PutSold,
    /// BUY PUT reduced the short put without closing the wheel.
    PutBuyback,
    /// BUY PUT fully offset the short put and closed the wheel.
    PutClosed,
    /// BUY PUT consumed by assignment (companion stock fill or marker).
    PutAssignmentClose,
    /// STOCK BUY delivered assigned shares.
    SharesAssigned,
    /// STOCK BUY added to held shares mid-cycle.
    StockBought,
    /// STOCK SELL reduced shares without closing the wheel.
    StockSold,
    /// SELL CALL wrote a covered call.
    CallSold,
    /// BUY CALL reduced or closed the short call.
    CallBuyback,
    /// BUY CALL consumed by assignment (companion stock sale).
    CallAssignmentClose,
    /// STOCK SELL called the shares away and closed the wheel.
    SharesCalledAway,
    /// Fewer contracts assigned than sold; flagged for review.
    PartialAssignment,
    /// Execution matched no transition rule; excluded from every wheel.
    Unassignable,
}

/// Per-execution transition record, consumed by the categorizer.
#[derive(Debug, Clone)]
pub struct TransitionEvent {
    /// Execution this event describes.
    pub exec_id: String,
    /// Underlying symbol.
    pub symbol: String,
    /// Execution date.
    pub date: NaiveDate,
    /// Transition kind.
    pub kind: TransitionKind,
    /// Wheel the execution was assigned to, if any.
    pub wheel_sequence: Option<u32>,
    /// Human-readable specifics (strike, quantities, rejection reason).
    pub detail: String,
}

/// Reconstructed wheel state for one symbol.
#[derive(Debug, Clone, Default)]
pub struct SymbolBook {
    /// Underlying symbol.
    pub symbol: String,
    /// Wheels ordered by sequence number; at most the last one is open.
    pub wheels: Vec<Wheel>,
    /// Execution ids excluded from every wheel (rule-breaking records).
    pub unassigned: Vec<String>,
    /// Transition events for every execution, in processing order.
    pub events: Vec<TransitionEvent>,
}

impl SymbolBook {
    /// The currently open wheel, if any.
    #[must_use]
    pub fn open_wheel(&self) -> Option<&Wheel> {
        self.wheels.last().filter(|w| w.is_open())
    }
}

/// Sort rank within a timestamp: closes before opens, stock in between,
/// so a same-day roll is processed close-then-open and a same-day
/// assignment lands as put-close → stock fill → call-open.
fn order_class(exec: &Execution) -> u8 {
    match (exec.instrument, exec.side) {
        (InstrumentKind::Put | InstrumentKind::Call, Side::Buy) => 0,
        (InstrumentKind::Stock, _) => 1,
        (InstrumentKind::Put | InstrumentKind::Call, Side::Sell) => 2,
    }
}

/// Rebuilds the full wheel state for one symbol from its execution history.
///
/// Returns the book plus one [`TransitionEvent`] per execution, in
/// processing order.
#[must_use]
pub fn rebuild_symbol(symbol: &str, executions: &[Execution]) -> (SymbolBook, Vec<TransitionEvent>) {
    let mut sorted: Vec<Execution> = executions.to_vec();
    sorted.sort_by(|a, b| {
        (a.timestamp, order_class(a), a.exec_id.as_str())
            .cmp(&(b.timestamp, order_class(b), b.exec_id.as_str()))
    });

    let mut book = SymbolBook {
        symbol: symbol.to_string(),
        ..SymbolBook::default()
    };
    let mut events = Vec::with_capacity(sorted.len());

    for idx in 0..sorted.len() {
        let event = apply(&mut book, &sorted, idx);
        debug!(
            symbol,
            exec_id = %sorted[idx].exec_id,
            kind = ?event.kind,
            "applied execution"
        );
        events.push(event);
    }

    for wheel in &mut book.wheels {
        pnl::annotate(wheel);
    }
    book.events = events.clone();

    (book, events)
}

/// Applies one execution to the book and returns its transition event.
fn apply(book: &mut SymbolBook, sorted: &[Execution], idx: usize) -> TransitionEvent {
    let exec = &sorted[idx];
    let open_idx = book
        .wheels
        .last()
        .filter(|w| w.is_open())
        .map(|_| book.wheels.len() - 1);

    match (exec.instrument, exec.side) {
        (InstrumentKind::Put, Side::Sell) => put_sold(book, exec, open_idx),
        (InstrumentKind::Put, Side::Buy) => put_bought(book, sorted, idx, open_idx),
        (InstrumentKind::Stock, Side::Buy) => stock_bought(book, exec, open_idx),
        (InstrumentKind::Stock, Side::Sell) => stock_sold(book, exec, open_idx),
        (InstrumentKind::Call, Side::Sell) => call_sold(book, exec, open_idx),
        (InstrumentKind::Call, Side::Buy) => call_bought(book, sorted, idx, open_idx),
    }
}

fn put_sold(book: &mut SymbolBook, exec: &Execution, open_idx: Option<usize>) -> TransitionEvent {
    let (wheel_idx, kind) = match open_idx {
        Some(idx) => (idx, TransitionKind::PutSold),
        None => {
            let sequence = book.wheels.len() as u32 + 1;
            book.wheels
                .push(Wheel::open(&book.symbol, sequence, exec.trade_date()));
            (book.wheels.len() - 1, TransitionKind::WheelOpened)
        }
    };

    let wheel = &mut book.wheels[wheel_idx];
    wheel.strike = exec.strike;
    leg_add(wheel, HoldingKind::ShortPut, exec);
    wheel.executions.push(exec.clone());

    event(
        exec,
        kind,
        Some(wheel.sequence),
        format!(
            "sold {} put(s) at strike {}",
            exec.abs_quantity(),
            exec.strike.unwrap_or_default()
        ),
    )
}

fn put_bought(
    book: &mut SymbolBook,
    sorted: &[Execution],
    idx: usize,
    open_idx: Option<usize>,
) -> TransitionEvent {
    let exec = &sorted[idx];
    let Some(wheel_idx) = open_idx else {
        return unassign(book, exec, "put buyback with no open wheel");
    };

    let open_short = -book.wheels[wheel_idx].net_quantity(HoldingKind::ShortPut);
    if open_short <= Decimal::ZERO {
        return unassign(book, exec, "put buyback with no open short put");
    }

    let assigned = exec.assignment || has_companion(sorted, idx, Side::Buy);
    let fully_offset = exec.abs_quantity() >= open_short;

    let wheel = &mut book.wheels[wheel_idx];
    leg_reduce(wheel, HoldingKind::ShortPut, exec.abs_quantity());
    wheel.executions.push(exec.clone());

    if !fully_offset {
        return event(
            exec,
            TransitionKind::PutBuyback,
            Some(wheel.sequence),
            format!("bought back {} of {} short put(s)", exec.abs_quantity(), open_short),
        );
    }

    if assigned {
        // The companion stock fill drives SHARES_HELD; a marker without one
        // flips the phase here so the wheel does not appear closed.
        if exec.assignment && !has_companion(sorted, idx, Side::Buy) {
            wheel.phase = WheelPhase::SharesHeld;
        }
        return event(
            exec,
            TransitionKind::PutAssignmentClose,
            Some(wheel.sequence),
            "short put closed by assignment".to_string(),
        );
    }

    match wheel.phase {
        WheelPhase::Csp => {
            let sequence = wheel.sequence;
            close(wheel, exec.trade_date(), CloseReason::PutClosed);
            event(
                exec,
                TransitionKind::PutClosed,
                Some(sequence),
                "short put bought back before assignment".to_string(),
            )
        }
        WheelPhase::SharesHeld
            if wheel.net_quantity(HoldingKind::Shares) <= Decimal::ZERO =>
        {
            let sequence = wheel.sequence;
            close(wheel, exec.trade_date(), CloseReason::PutClosed);
            event(
                exec,
                TransitionKind::PutClosed,
                Some(sequence),
                "last short put bought back with no shares held".to_string(),
            )
        }
        WheelPhase::SharesHeld | WheelPhase::CoveredCall => {
            // Leftover shorts from a partial assignment; shares keep the
            // wheel alive.
            event(
                exec,
                TransitionKind::PutBuyback,
                Some(wheel.sequence),
                "residual short put bought back".to_string(),
            )
        }
        WheelPhase::Closed => unreachable!("closed wheel cannot be the open wheel"),
    }
}

fn stock_bought(book: &mut SymbolBook, exec: &Execution, open_idx: Option<usize>) -> TransitionEvent {
    let Some(wheel_idx) = open_idx else {
        return unassign(book, exec, "stock purchase with no open wheel");
    };

    let wheel = &mut book.wheels[wheel_idx];
    match wheel.phase {
        WheelPhase::Csp => {
            let contract_multiplier = wheel
                .open_legs
                .iter()
                .find(|l| l.kind == HoldingKind::ShortPut)
                .map(|l| l.multiplier)
                .unwrap_or(Decimal::ONE_HUNDRED);
            let open_short = -wheel.net_quantity(HoldingKind::ShortPut);
            let contracts_assigned = exec.abs_quantity() / contract_multiplier;

            leg_add(wheel, HoldingKind::Shares, exec);
            leg_reduce(
                wheel,
                HoldingKind::ShortPut,
                contracts_assigned.min(open_short),
            );
            wheel.executions.push(exec.clone());
            wheel.phase = WheelPhase::SharesHeld;

            if contracts_assigned < open_short {
                event(
                    exec,
                    TransitionKind::PartialAssignment,
                    Some(wheel.sequence),
                    format!(
                        "assigned {} of {} contract(s); broker semantics unconfirmed",
                        contracts_assigned.normalize(),
                        open_short.normalize()
                    ),
                )
            } else {
                event(
                    exec,
                    TransitionKind::SharesAssigned,
                    Some(wheel.sequence),
                    format!("assigned {} share(s) at {}", exec.abs_quantity(), exec.price),
                )
            }
        }
        WheelPhase::SharesHeld | WheelPhase::CoveredCall => {
            leg_add(wheel, HoldingKind::Shares, exec);
            wheel.executions.push(exec.clone());
            event(
                exec,
                TransitionKind::StockBought,
                Some(wheel.sequence),
                format!("bought {} share(s)", exec.abs_quantity()),
            )
        }
        WheelPhase::Closed => unreachable!("closed wheel cannot be the open wheel"),
    }
}

fn stock_sold(book: &mut SymbolBook, exec: &Execution, open_idx: Option<usize>) -> TransitionEvent {
    let Some(wheel_idx) = open_idx else {
        return unassign(book, exec, "stock sale with no open wheel");
    };

    if book.wheels[wheel_idx].net_quantity(HoldingKind::Shares) <= Decimal::ZERO {
        return unassign(book, exec, "stock sale with no shares held in cycle");
    }

    let wheel = &mut book.wheels[wheel_idx];
    leg_reduce(wheel, HoldingKind::Shares, exec.abs_quantity());
    wheel.executions.push(exec.clone());

    let remaining = wheel.net_quantity(HoldingKind::Shares);
    if wheel.phase == WheelPhase::CoveredCall && remaining <= Decimal::ZERO {
        // Shares called away; any residual short call was exercised with
        // them.
        for leg in &mut wheel.open_legs {
            if leg.kind == HoldingKind::ShortCall {
                leg.quantity = Decimal::ZERO;
            }
        }
        let sequence = wheel.sequence;
        close(wheel, exec.trade_date(), CloseReason::FullCycle);
        event(
            exec,
            TransitionKind::SharesCalledAway,
            Some(sequence),
            format!("{} share(s) called away at {}", exec.abs_quantity(), exec.price),
        )
    } else {
        event(
            exec,
            TransitionKind::StockSold,
            Some(wheel.sequence),
            format!("sold {} share(s)", exec.abs_quantity()),
        )
    }
}

fn call_sold(book: &mut SymbolBook, exec: &Execution, open_idx: Option<usize>) -> TransitionEvent {
    let Some(wheel_idx) = open_idx else {
        return unassign(book, exec, "call sale with no open wheel");
    };

    if book.wheels[wheel_idx].net_quantity(HoldingKind::Shares) <= Decimal::ZERO {
        return unassign(book, exec, "call sold without held shares");
    }

    let wheel = &mut book.wheels[wheel_idx];
    leg_add(wheel, HoldingKind::ShortCall, exec);
    wheel.executions.push(exec.clone());
    if wheel.phase == WheelPhase::SharesHeld {
        wheel.phase = WheelPhase::CoveredCall;
    }

    event(
        exec,
        TransitionKind::CallSold,
        Some(wheel.sequence),
        format!(
            "sold {} covered call(s) at strike {}",
            exec.abs_quantity(),
            exec.strike.unwrap_or_default()
        ),
    )
}

fn call_bought(
    book: &mut SymbolBook,
    sorted: &[Execution],
    idx: usize,
    open_idx: Option<usize>,
) -> TransitionEvent {
    let exec = &sorted[idx];
    let Some(wheel_idx) = open_idx else {
        return unassign(book, exec, "call buyback with no open wheel");
    };

    let open_short = -book.wheels[wheel_idx].net_quantity(HoldingKind::ShortCall);
    if open_short <= Decimal::ZERO {
        return unassign(book, exec, "call buyback with no open short call");
    }

    let assigned = exec.assignment || has_companion(sorted, idx, Side::Sell);
    let fully_offset = exec.abs_quantity() >= open_short;

    let wheel = &mut book.wheels[wheel_idx];
    leg_reduce(wheel, HoldingKind::ShortCall, exec.abs_quantity());
    wheel.executions.push(exec.clone());

    if fully_offset && assigned {
        // The companion stock sale closes the wheel as full_cycle.
        return event(
            exec,
            TransitionKind::CallAssignmentClose,
            Some(wheel.sequence),
            "short call closed by assignment".to_string(),
        );
    }

    if fully_offset && wheel.phase == WheelPhase::CoveredCall {
        wheel.phase = WheelPhase::SharesHeld;
    }
    event(
        exec,
        TransitionKind::CallBuyback,
        Some(wheel.sequence),
        format!("bought back {} of {} short call(s)", exec.abs_quantity(), open_short),
    )
}

/// Whether a stock fill on the same side and date accompanies the option
/// close at `idx` — the evidence that the close came from assignment.
fn has_companion(sorted: &[Execution], idx: usize, stock_side: Side) -> bool {
    let exec = &sorted[idx];
    sorted.iter().any(|other| {
        other.instrument == InstrumentKind::Stock
            && other.side == stock_side
            && other.trade_date() == exec.trade_date()
    })
}

fn close(wheel: &mut Wheel, date: NaiveDate, reason: CloseReason) {
    wheel.phase = WheelPhase::Closed;
    wheel.end_date = Some(date);
    wheel.close_reason = Some(reason);
    wheel.open_legs.clear();
}

fn leg_add(wheel: &mut Wheel, kind: HoldingKind, exec: &Execution) {
    let key = exec.contract_key();
    if let Some(leg) = wheel
        .open_legs
        .iter_mut()
        .find(|l| l.kind == kind && l.contract_key() == key)
    {
        leg.add(exec.quantity, exec.price);
    } else {
        wheel.open_legs.push(OpenLeg {
            kind,
            symbol: exec.symbol.clone(),
            strike: exec.strike,
            expiry: exec.expiry,
            quantity: exec.quantity,
            open_price: exec.price,
            multiplier: exec.multiplier,
        });
    }
    prune(wheel);
}

/// Reduces legs of one kind towards zero, oldest first.
fn leg_reduce(wheel: &mut Wheel, kind: HoldingKind, quantity: Decimal) {
    let mut remaining = quantity.abs();
    for leg in &mut wheel.open_legs {
        if remaining.is_zero() {
            break;
        }
        if leg.kind == kind {
            remaining -= leg.reduce(remaining);
        }
    }
    prune(wheel);
}

fn prune(wheel: &mut Wheel) {
    wheel.open_legs.retain(|l| !l.quantity.is_zero());
}

fn unassign(book: &mut SymbolBook, exec: &Execution, reason: &str) -> TransitionEvent {
    book.unassigned.push(exec.exec_id.clone());
    event(exec, TransitionKind::Unassignable, None, reason.to_string())
}

fn event(
    exec: &Execution,
    kind: TransitionKind,
    wheel_sequence: Option<u32>,
    detail: String,
) -> TransitionEvent {
    TransitionEvent {
        exec_id: exec.exec_id.clone(),
        symbol: exec.symbol.clone(),
        date: exec.trade_date(),
        kind,
        wheel_sequence,
        detail,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use rust_decimal_macros::dec;

    fn ts(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn put(id: &str, when: &str, qty: Decimal, price: Decimal, strike: Decimal) -> Execution {
        option_exec(id, when, qty, price, strike, InstrumentKind::Put)
    }

    fn call(id: &str, when: &str, qty: Decimal, price: Decimal, strike: Decimal) -> Execution {
        option_exec(id, when, qty, price, strike, InstrumentKind::Call)
    }

    fn option_exec(
        id: &str,
        when: &str,
        qty: Decimal,
        price: Decimal,
        strike: Decimal,
        instrument: InstrumentKind,
    ) -> Execution {
        Execution {
            exec_id: id.to_string(),
            timestamp: ts(when),
            symbol: "AAPL".to_string(),
            instrument,
            side: if qty < Decimal::ZERO { Side::Sell } else { Side::Buy },
            strike: Some(strike),
            expiry: None,
            quantity: qty,
            price,
            commission: dec!(-0.65),
            multiplier: dec!(100),
            assignment: false,
        }
    }

    fn stock(id: &str, when: &str, qty: Decimal, price: Decimal) -> Execution {
        Execution {
            exec_id: id.to_string(),
            timestamp: ts(when),
            symbol: "AAPL".to_string(),
            instrument: InstrumentKind::Stock,
            side: if qty < Decimal::ZERO { Side::Sell } else { Side::Buy },
            strike: None,
            expiry: None,
            quantity: qty,
            price,
            commission: Decimal::ZERO,
            multiplier: Decimal::ONE,
            assignment: false,
        }
    }

    #[test]
    fn test_sell_put_opens_wheel_in_csp() {
        let execs = vec![put("E1", "2024-03-01T15:00:00Z", dec!(-1), dec!(2.00), dec!(150))];
        let (book, events) = rebuild_symbol("AAPL", &execs);

        assert_eq!(book.wheels.len(), 1);
        let wheel = &book.wheels[0];
        assert_eq!(wheel.phase, WheelPhase::Csp);
        assert!(wheel.is_open());
        assert_eq!(wheel.sequence, 1);
        assert_eq!(wheel.premium_collected, dec!(200));
        assert_eq!(wheel.strike, Some(dec!(150)));
        assert_eq!(events[0].kind, TransitionKind::WheelOpened);
    }

    #[test]
    fn test_put_buyback_closes_wheel() {
        let execs = vec![
            put("E1", "2024-03-01T15:00:00Z", dec!(-1), dec!(2.00), dec!(150)),
            put("E2", "2024-03-03T15:00:00Z", dec!(1), dec!(0.50), dec!(150)),
        ];
        let (book, events) = rebuild_symbol("AAPL", &execs);

        let wheel = &book.wheels[0];
        assert_eq!(wheel.phase, WheelPhase::Closed);
        assert_eq!(wheel.close_reason, Some(CloseReason::PutClosed));
        assert_eq!(wheel.end_date, Some(NaiveDate::from_ymd_opt(2024, 3, 3).unwrap()));
        assert_eq!(wheel.realized_pnl, Some(dec!(148.70)));
        assert_eq!(events[1].kind, TransitionKind::PutClosed);
    }

    #[test]
    fn test_full_cycle() {
        // Assignment, covered call, shares called away.
        let execs = vec![
            put("E1", "2024-03-01T15:00:00Z", dec!(-1), dec!(2.00), dec!(150)),
            stock("E2", "2024-03-15T15:00:00Z", dec!(100), dec!(150.00)),
            call("E3", "2024-03-18T15:00:00Z", dec!(-1), dec!(1.50), dec!(155)),
            stock("E4", "2024-04-19T20:00:00Z", dec!(-100), dec!(155.00)),
        ];
        let (book, events) = rebuild_symbol("AAPL", &execs);

        assert_eq!(book.wheels.len(), 1);
        let wheel = &book.wheels[0];
        assert_eq!(wheel.phase, WheelPhase::Closed);
        assert_eq!(wheel.close_reason, Some(CloseReason::FullCycle));
        assert!(wheel.open_legs.is_empty());
        // premiums 350 + stock gain 500 − commissions 1.30
        assert_eq!(wheel.realized_pnl, Some(dec!(848.70)));

        assert_eq!(events[1].kind, TransitionKind::SharesAssigned);
        assert_eq!(events[2].kind, TransitionKind::CallSold);
        assert_eq!(events[3].kind, TransitionKind::SharesCalledAway);
    }

    #[test]
    fn test_phase_progression() {
        let execs = vec![
            put("E1", "2024-03-01T15:00:00Z", dec!(-1), dec!(2.00), dec!(150)),
            stock("E2", "2024-03-15T15:00:00Z", dec!(100), dec!(150.00)),
        ];
        let (book, _) = rebuild_symbol("AAPL", &execs);
        assert_eq!(book.wheels[0].phase, WheelPhase::SharesHeld);
        // Assignment consumed the short put leg.
        assert_eq!(book.wheels[0].net_quantity(HoldingKind::ShortPut), Decimal::ZERO);
        assert_eq!(book.wheels[0].net_quantity(HoldingKind::Shares), dec!(100));

        let execs = vec![
            put("E1", "2024-03-01T15:00:00Z", dec!(-1), dec!(2.00), dec!(150)),
            stock("E2", "2024-03-15T15:00:00Z", dec!(100), dec!(150.00)),
            call("E3", "2024-03-18T15:00:00Z", dec!(-1), dec!(1.50), dec!(155)),
        ];
        let (book, _) = rebuild_symbol("AAPL", &execs);
        assert_eq!(book.wheels[0].phase, WheelPhase::CoveredCall);
    }

    #[test]
    fn test_unassignable_without_open_wheel() {
        // First execution is not an opening put sale.
        let execs = vec![stock("E1", "2024-03-01T15:00:00Z", dec!(100), dec!(150.00))];
        let (book, events) = rebuild_symbol("AAPL", &execs);

        assert!(book.wheels.is_empty());
        assert_eq!(book.unassigned, vec!["E1".to_string()]);
        assert_eq!(events[0].kind, TransitionKind::Unassignable);
    }

    #[test]
    fn test_at_most_one_open_wheel() {
        // A second put sale scales into the open wheel instead of opening
        // another one.
        let execs = vec![
            put("E1", "2024-03-01T15:00:00Z", dec!(-1), dec!(2.00), dec!(150)),
            put("E2", "2024-03-05T15:00:00Z", dec!(-1), dec!(1.80), dec!(145)),
        ];
        let (book, events) = rebuild_symbol("AAPL", &execs);

        assert_eq!(book.wheels.len(), 1);
        assert_eq!(book.wheels.iter().filter(|w| w.is_open()).count(), 1);
        assert_eq!(events[1].kind, TransitionKind::PutSold);
        // Headline strike follows the latest short put.
        assert_eq!(book.wheels[0].strike, Some(dec!(145)));
    }

    #[test]
    fn test_same_day_roll_order_insensitive() {
        // Close + re-open at the same timestamp must process close first
        // regardless of input order: old wheel closes, new wheel opens.
        let close_leg = put("E2", "2024-03-08T15:00:00Z", dec!(1), dec!(0.40), dec!(150));
        let open_leg = put("E3", "2024-03-08T15:00:00Z", dec!(-1), dec!(1.90), dec!(145));
        let first = put("E1", "2024-03-01T15:00:00Z", dec!(-1), dec!(2.00), dec!(150));

        let forward = vec![first.clone(), close_leg.clone(), open_leg.clone()];
        let reversed = vec![first, open_leg, close_leg];

        let (book_a, _) = rebuild_symbol("AAPL", &forward);
        let (book_b, _) = rebuild_symbol("AAPL", &reversed);

        for book in [&book_a, &book_b] {
            assert_eq!(book.wheels.len(), 2);
            assert_eq!(book.wheels[0].phase, WheelPhase::Closed);
            assert_eq!(book.wheels[0].close_reason, Some(CloseReason::PutClosed));
            assert_eq!(book.wheels[1].phase, WheelPhase::Csp);
            assert_eq!(book.wheels[1].strike, Some(dec!(145)));
        }
        assert_eq!(book_a.wheels[1].sequence, book_b.wheels[1].sequence);
    }

    #[test]
    fn test_partial_offset_keeps_phase() {
        let execs = vec![
            put("E1", "2024-03-01T15:00:00Z", dec!(-2), dec!(2.00), dec!(150)),
            put("E2", "2024-03-05T15:00:00Z", dec!(1), dec!(0.50), dec!(150)),
        ];
        let (book, events) = rebuild_symbol("AAPL", &execs);

        let wheel = &book.wheels[0];
        assert_eq!(wheel.phase, WheelPhase::Csp);
        assert!(wheel.is_open());
        assert_eq!(wheel.net_quantity(HoldingKind::ShortPut), dec!(-1));
        assert_eq!(events[1].kind, TransitionKind::PutBuyback);
    }

    #[test]
    fn test_partial_assignment_flagged() {
        // Sold 2 puts, only 100 shares delivered.
        let execs = vec![
            put("E1", "2024-03-01T15:00:00Z", dec!(-2), dec!(2.00), dec!(150)),
            stock("E2", "2024-03-15T15:00:00Z", dec!(100), dec!(150.00)),
        ];
        let (book, events) = rebuild_symbol("AAPL", &execs);

        let wheel = &book.wheels[0];
        assert_eq!(wheel.phase, WheelPhase::SharesHeld);
        assert_eq!(wheel.net_quantity(HoldingKind::ShortPut), dec!(-1));
        assert_eq!(events[1].kind, TransitionKind::PartialAssignment);
    }

    #[test]
    fn test_call_buyback_returns_to_shares_held() {
        let execs = vec![
            put("E1", "2024-03-01T15:00:00Z", dec!(-1), dec!(2.00), dec!(150)),
            stock("E2", "2024-03-15T15:00:00Z", dec!(100), dec!(150.00)),
            call("E3", "2024-03-18T15:00:00Z", dec!(-1), dec!(1.50), dec!(155)),
            call("E4", "2024-04-01T15:00:00Z", dec!(1), dec!(0.30), dec!(155)),
        ];
        let (book, events) = rebuild_symbol("AAPL", &execs);

        assert_eq!(book.wheels[0].phase, WheelPhase::SharesHeld);
        assert!(book.wheels[0].is_open());
        assert_eq!(events[3].kind, TransitionKind::CallBuyback);
    }

    #[test]
    fn test_assignment_close_with_companion_stock() {
        // Broker reports both the put close and the stock delivery.
        let execs = vec![
            put("E1", "2024-03-01T15:00:00Z", dec!(-1), dec!(2.00), dec!(150)),
            put("E2", "2024-03-15T15:00:00Z", dec!(1), dec!(0), dec!(150)),
            stock("E3", "2024-03-15T16:00:00Z", dec!(100), dec!(150.00)),
        ];
        let (book, events) = rebuild_symbol("AAPL", &execs);

        let wheel = &book.wheels[0];
        assert!(wheel.is_open());
        assert_eq!(wheel.phase, WheelPhase::SharesHeld);
        assert_eq!(events[1].kind, TransitionKind::PutAssignmentClose);
        assert_eq!(events[2].kind, TransitionKind::SharesAssigned);
    }

    #[test]
    fn test_stock_sale_in_shares_held_keeps_wheel_open() {
        let execs = vec![
            put("E1", "2024-03-01T15:00:00Z", dec!(-1), dec!(2.00), dec!(150)),
            stock("E2", "2024-03-15T15:00:00Z", dec!(100), dec!(150.00)),
            stock("E3", "2024-03-20T15:00:00Z", dec!(-100), dec!(157.00)),
        ];
        let (book, events) = rebuild_symbol("AAPL", &execs);

        let wheel = &book.wheels[0];
        assert!(wheel.is_open());
        assert_eq!(wheel.phase, WheelPhase::SharesHeld);
        assert_eq!(events[2].kind, TransitionKind::StockSold);
    }

    #[test]
    fn test_rebuild_is_idempotent() {
        let execs = vec![
            put("E1", "2024-03-01T15:00:00Z", dec!(-1), dec!(2.00), dec!(150)),
            stock("E2", "2024-03-15T15:00:00Z", dec!(100), dec!(150.00)),
            call("E3", "2024-03-18T15:00:00Z", dec!(-1), dec!(1.50), dec!(155)),
        ];
        let (book_a, _) = rebuild_symbol("AAPL", &execs);
        let (book_b, _) = rebuild_symbol("AAPL", &execs);

        assert_eq!(book_a.wheels.len(), book_b.wheels.len());
        assert_eq!(book_a.wheels[0].phase, book_b.wheels[0].phase);
        assert_eq!(
            book_a.wheels[0].premium_collected,
            book_b.wheels[0].premium_collected
        );
    }
}
