//! Wheel cycle domain types: phases, close reasons, open legs and holdings.

use crate::engine::execution::{Execution, InstrumentKind, contract_key};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Lifecycle phase of a wheel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WheelPhase {
    /// Cash-secured put sold, waiting for expiry, assignment or buyback.
    Csp,
    /// Put was assigned, holding shares, no short call.
    SharesHeld,
    /// Covered call sold against held shares.
    CoveredCall,
    /// Terminal.
    Closed,
}

impl std::fmt::Display for WheelPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Csp => write!(f, "CSP"),
            Self::SharesHeld => write!(f, "SHARES_HELD"),
            Self::CoveredCall => write!(f, "COVERED_CALL"),
            Self::Closed => write!(f, "CLOSED"),
        }
    }
}

/// Why a wheel closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    /// Shares were called away after a covered call.
    FullCycle,
    /// The short put was bought back before assignment.
    PutClosed,
}

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FullCycle => write!(f, "full_cycle"),
            Self::PutClosed => write!(f, "put_closed"),
        }
    }
}

/// Kind of an open position leg within a wheel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HoldingKind {
    /// Long stock.
    Shares,
    /// Short put contracts.
    ShortPut,
    /// Short call contracts.
    ShortCall,
}

impl std::fmt::Display for HoldingKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Shares => write!(f, "SHARES"),
            Self::ShortPut => write!(f, "SHORT_PUT"),
            Self::ShortCall => write!(f, "SHORT_CALL"),
        }
    }
}

/// Net open position leg, maintained by the state machine fold.
///
/// Derived from the wheel's execution list on every rebuild; never mutated
/// outside the fold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenLeg {
    /// Leg kind.
    pub kind: HoldingKind,
    /// Underlying symbol.
    pub symbol: String,
    /// Strike (options only).
    pub strike: Option<Decimal>,
    /// Expiry (options only).
    pub expiry: Option<NaiveDate>,
    /// Net open quantity: positive shares, negative short contracts.
    pub quantity: Decimal,
    /// Volume-weighted price at open.
    pub open_price: Decimal,
    /// Contract multiplier.
    pub multiplier: Decimal,
}

impl OpenLeg {
    /// Instrument key used to price this leg.
    #[must_use]
    pub fn contract_key(&self) -> String {
        let instrument = match self.kind {
            HoldingKind::Shares => InstrumentKind::Stock,
            HoldingKind::ShortPut => InstrumentKind::Put,
            HoldingKind::ShortCall => InstrumentKind::Call,
        };
        contract_key(&self.symbol, self.expiry, self.strike, instrument)
    }

    /// Adds a fill to the leg, updating the volume-weighted open price.
    pub(crate) fn add(&mut self, quantity: Decimal, price: Decimal) {
        let prev = self.quantity.abs();
        let added = quantity.abs();
        let total = prev + added;
        if total > Decimal::ZERO {
            self.open_price = (self.open_price * prev + price * added) / total;
        }
        self.quantity += quantity;
    }

    /// Reduces the leg towards zero, keeping the open price.
    /// Returns the absolute quantity actually closed.
    pub(crate) fn reduce(&mut self, quantity: Decimal) -> Decimal {
        let closed = quantity.abs().min(self.quantity.abs());
        if self.quantity > Decimal::ZERO {
            self.quantity -= closed;
        } else {
            self.quantity += closed;
        }
        closed
    }
}

/// A priced view of an open leg; `None` prices mean "unpriced", never zero.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Holding {
    /// Leg kind.
    pub kind: HoldingKind,
    /// Underlying symbol.
    pub symbol: String,
    /// Strike (options only).
    pub strike: Option<Decimal>,
    /// Net open quantity.
    pub quantity: Decimal,
    /// Volume-weighted price at open.
    pub open_price: Decimal,
    /// Current market price, when the price source knows it.
    pub current_price: Option<Decimal>,
    /// Unrealized PnL, when priced.
    pub unrealized_pnl: Option<Decimal>,
}

/// One wheel cycle for a symbol.
///
/// Open while `end_date` is `None`; a symbol has at most one open wheel at
/// any time. Closed wheels are immutable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Wheel {
    /// Underlying symbol.
    pub symbol: String,
    /// Monotonic per-symbol sequence number, assigned at creation.
    pub sequence: u32,
    /// Current lifecycle phase.
    pub phase: WheelPhase,
    /// Date of the execution that opened the cycle.
    pub start_date: NaiveDate,
    /// Date of the execution that closed the cycle.
    pub end_date: Option<NaiveDate>,
    /// Why the wheel closed.
    pub close_reason: Option<CloseReason>,
    /// Latest short-put strike opened in the cycle (the headline strike).
    pub strike: Option<Decimal>,
    /// Ordered executions belonging to this wheel.
    pub executions: Vec<Execution>,
    /// Net open legs as of the last rebuild.
    pub open_legs: Vec<OpenLeg>,
    /// Credit received for sold option legs.
    pub premium_collected: Decimal,
    /// Total commissions paid (positive magnitude).
    pub commissions_paid: Decimal,
    /// Realized PnL; set once the wheel closes.
    pub realized_pnl: Option<Decimal>,
}

impl Wheel {
    /// Creates a new wheel in `CSP` phase.
    #[must_use]
    pub fn open(symbol: &str, sequence: u32, start_date: NaiveDate) -> Self {
        Self {
            symbol: symbol.to_string(),
            sequence,
            phase: WheelPhase::Csp,
            start_date,
            end_date: None,
            close_reason: None,
            strike: None,
            executions: Vec::new(),
            open_legs: Vec::new(),
            premium_collected: Decimal::ZERO,
            commissions_paid: Decimal::ZERO,
            realized_pnl: None,
        }
    }

    /// Whether the wheel is still open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.end_date.is_none()
    }

    /// Net open quantity for a leg kind, summed across contract keys.
    #[must_use]
    pub fn net_quantity(&self, kind: HoldingKind) -> Decimal {
        self.open_legs
            .iter()
            .filter(|leg| leg.kind == kind)
            .map(|leg| leg.quantity)
            .sum()
    }
}
