//! Canonical execution records and the broker-record normalizer.
//!
//! Broker exports are dynamically shaped; everything downstream of this
//! module operates on one fixed [`Execution`] value tagged by instrument
//! kind. Records that cannot be mapped are rejected with
//! `MalformedExecution` and skipped by the sync, never propagated raw.

use crate::engine::EngineError;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Instrument kind of an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum InstrumentKind {
    /// Common stock.
    Stock,
    /// Put option contract.
    Put,
    /// Call option contract.
    Call,
}

impl InstrumentKind {
    /// Whether this is an option leg (put or call).
    #[must_use]
    pub fn is_option(self) -> bool {
        matches!(self, Self::Put | Self::Call)
    }
}

impl std::fmt::Display for InstrumentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stock => write!(f, "STOCK"),
            Self::Put => write!(f, "PUT"),
            Self::Call => write!(f, "CALL"),
        }
    }
}

impl FromStr for InstrumentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "STOCK" => Ok(Self::Stock),
            "PUT" => Ok(Self::Put),
            "CALL" => Ok(Self::Call),
            _ => Err(format!("Invalid instrument kind: {}", s)),
        }
    }
}

/// Side of an execution from the account's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    /// Bought (quantity > 0).
    Buy,
    /// Sold (quantity < 0).
    Sell,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
        }
    }
}

impl FromStr for Side {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "BUY" => Ok(Self::Buy),
            "SELL" => Ok(Self::Sell),
            _ => Err(format!("Invalid side: {}", s)),
        }
    }
}

/// Canonical, immutable execution fact.
///
/// Once ingested an execution is only ever referenced, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Execution {
    /// Unique broker execution id (or derived fingerprint).
    pub exec_id: String,
    /// Execution timestamp.
    pub timestamp: DateTime<Utc>,
    /// Underlying symbol.
    pub symbol: String,
    /// Instrument kind.
    pub instrument: InstrumentKind,
    /// Buy or sell.
    pub side: Side,
    /// Strike price (options only).
    pub strike: Option<Decimal>,
    /// Expiry date (options only).
    pub expiry: Option<NaiveDate>,
    /// Signed quantity: positive opened/increased exposure, negative reduced.
    pub quantity: Decimal,
    /// Price per unit.
    pub price: Decimal,
    /// Commission, always ≤ 0 (a cost).
    pub commission: Decimal,
    /// Contract multiplier (1 for stock, usually 100 for options).
    pub multiplier: Decimal,
    /// Broker marked this fill as an option assignment/exercise.
    pub assignment: bool,
}

impl Execution {
    /// Calendar date of the execution.
    #[must_use]
    pub fn trade_date(&self) -> NaiveDate {
        self.timestamp.date_naive()
    }

    /// Absolute quantity.
    #[must_use]
    pub fn abs_quantity(&self) -> Decimal {
        self.quantity.abs()
    }

    /// Gross cash value of the fill: `price × |quantity| × multiplier`.
    #[must_use]
    pub fn gross_value(&self) -> Decimal {
        self.price * self.quantity.abs() * self.multiplier
    }

    /// Contract key used to price this leg (underlying symbol for stock).
    #[must_use]
    pub fn contract_key(&self) -> String {
        contract_key(&self.symbol, self.expiry, self.strike, self.instrument)
    }
}

/// Builds the instrument key for an option leg.
/// Format: `{underlying}-{expiry:YYYYMMDD}-{strike}-{C|P}`; plain symbol
/// for stock.
#[must_use]
pub fn contract_key(
    symbol: &str,
    expiry: Option<NaiveDate>,
    strike: Option<Decimal>,
    instrument: InstrumentKind,
) -> String {
    let style_char = match instrument {
        InstrumentKind::Stock => return symbol.to_string(),
        InstrumentKind::Put => "P",
        InstrumentKind::Call => "C",
    };
    let expiry_str = expiry
        .map(|d| d.format("%Y%m%d").to_string())
        .unwrap_or_else(|| "0".to_string());
    let strike_str = strike
        .map(|s| s.normalize().to_string())
        .unwrap_or_else(|| "0".to_string());
    format!("{}-{}-{}-{}", symbol, expiry_str, strike_str, style_char)
}

/// Raw broker execution record, before normalization.
///
/// All fields are optional strings because broker exports arrive as loosely
/// typed rows; the normalizer is the only place allowed to branch on this
/// shape.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawExecution {
    /// Broker execution id.
    #[serde(default)]
    pub exec_id: Option<String>,
    /// Execution timestamp (RFC 3339, `YYYY-MM-DD HH:MM:SS`,
    /// `YYYYMMDD;HHMMSS` or bare date).
    #[serde(default)]
    pub timestamp: Option<String>,
    /// Underlying symbol.
    #[serde(default)]
    pub symbol: Option<String>,
    /// Asset category marker: `OPT` or `STK`.
    #[serde(default)]
    pub asset_category: Option<String>,
    /// Put/call marker: `P` or `C` (options only).
    #[serde(default)]
    pub put_call: Option<String>,
    /// Strike price (options only).
    #[serde(default)]
    pub strike: Option<String>,
    /// Expiry date (options only).
    #[serde(default)]
    pub expiry: Option<String>,
    /// Signed quantity.
    #[serde(default)]
    pub quantity: Option<String>,
    /// Price per unit.
    #[serde(default)]
    pub price: Option<String>,
    /// Commission (either sign; normalized to ≤ 0).
    #[serde(default)]
    pub commission: Option<String>,
    /// Contract multiplier.
    #[serde(default)]
    pub multiplier: Option<String>,
    /// Broker note codes, semicolon separated; `A` marks an assignment.
    #[serde(default)]
    pub notes: Option<String>,
}

/// Converts a raw broker record into a canonical [`Execution`].
///
/// # Errors
/// Returns `MalformedExecution` when symbol, timestamp, quantity or price is
/// missing or non-numeric, when quantity is zero, or when an option row
/// lacks its put/call marker or strike.
pub fn normalize(raw: &RawExecution) -> Result<Execution, EngineError> {
    let symbol = raw
        .symbol
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| EngineError::MalformedExecution("missing symbol".to_string()))?
        .to_uppercase();

    let timestamp = raw
        .timestamp
        .as_deref()
        .and_then(parse_timestamp)
        .ok_or_else(|| {
            EngineError::MalformedExecution(format!("missing or unparseable timestamp for {}", symbol))
        })?;

    let quantity = parse_required_decimal(raw.quantity.as_deref(), "quantity", &symbol)?;
    if quantity.is_zero() {
        return Err(EngineError::MalformedExecution(format!(
            "zero quantity for {}",
            symbol
        )));
    }

    let price = parse_required_decimal(raw.price.as_deref(), "price", &symbol)?;
    if price < Decimal::ZERO {
        return Err(EngineError::MalformedExecution(format!(
            "negative price for {}",
            symbol
        )));
    }

    let instrument = classify_instrument(raw, &symbol)?;

    let strike = match instrument {
        InstrumentKind::Stock => None,
        InstrumentKind::Put | InstrumentKind::Call => {
            Some(parse_required_decimal(raw.strike.as_deref(), "strike", &symbol)?)
        }
    };

    let expiry = raw.expiry.as_deref().and_then(parse_date);

    let commission = match raw.commission.as_deref().map(str::trim) {
        None | Some("") => Decimal::ZERO,
        Some(s) => {
            let c = Decimal::from_str(s).map_err(|_| {
                EngineError::MalformedExecution(format!("non-numeric commission for {}", symbol))
            })?;
            -c.abs()
        }
    };

    let multiplier = match raw.multiplier.as_deref().map(str::trim) {
        None | Some("") => {
            if instrument.is_option() {
                Decimal::ONE_HUNDRED
            } else {
                Decimal::ONE
            }
        }
        Some(s) => {
            let m = Decimal::from_str(s).map_err(|_| {
                EngineError::MalformedExecution(format!("non-numeric multiplier for {}", symbol))
            })?;
            if m <= Decimal::ZERO {
                return Err(EngineError::MalformedExecution(format!(
                    "non-positive multiplier for {}",
                    symbol
                )));
            }
            m
        }
    };

    let side = if quantity < Decimal::ZERO {
        Side::Sell
    } else {
        Side::Buy
    };

    let assignment = raw
        .notes
        .as_deref()
        .map(|n| n.split(';').any(|code| code.trim().eq_ignore_ascii_case("A")))
        .unwrap_or(false);

    // Brokers occasionally omit the execution id; fall back to a field
    // fingerprint so re-syncs of the same row still deduplicate.
    let exec_id = match raw.exec_id.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(id) => id.to_string(),
        None => format!(
            "{}_{}_{}_{}_{}",
            timestamp.format("%Y%m%d%H%M%S"),
            symbol,
            quantity.normalize(),
            price.normalize(),
            strike.map(|s| s.normalize().to_string()).unwrap_or_else(|| "0".to_string()),
        ),
    };

    Ok(Execution {
        exec_id,
        timestamp,
        symbol,
        instrument,
        side,
        strike,
        expiry,
        quantity,
        price,
        commission,
        multiplier,
        assignment,
    })
}

fn classify_instrument(raw: &RawExecution, symbol: &str) -> Result<InstrumentKind, EngineError> {
    let category = raw
        .asset_category
        .as_deref()
        .map(str::trim)
        .map(str::to_uppercase)
        .ok_or_else(|| {
            EngineError::MalformedExecution(format!("missing asset category for {}", symbol))
        })?;

    match category.as_str() {
        "STK" | "STOCK" => Ok(InstrumentKind::Stock),
        "OPT" | "OPTION" => match raw.put_call.as_deref().map(str::trim) {
            Some("P") | Some("p") => Ok(InstrumentKind::Put),
            Some("C") | Some("c") => Ok(InstrumentKind::Call),
            _ => Err(EngineError::MalformedExecution(format!(
                "option row without put/call marker for {}",
                symbol
            ))),
        },
        other => Err(EngineError::MalformedExecution(format!(
            "unknown asset category {} for {}",
            other, symbol
        ))),
    }
}

fn parse_required_decimal(
    value: Option<&str>,
    field: &str,
    symbol: &str,
) -> Result<Decimal, EngineError> {
    let s = value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            EngineError::MalformedExecution(format!("missing {} for {}", field, symbol))
        })?;
    Decimal::from_str(s).map_err(|_| {
        EngineError::MalformedExecution(format!("non-numeric {} for {}", field, symbol))
    })
}

pub(crate) fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y%m%d;%H%M%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(DateTime::from_naive_utc_and_offset(naive, Utc));
        }
    }
    parse_date(s)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| DateTime::from_naive_utc_and_offset(naive, Utc))
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    NaiveDate::parse_from_str(s, "%Y%m%d")
        .or_else(|_| NaiveDate::parse_from_str(s, "%Y-%m-%d"))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn raw_put_sell() -> RawExecution {
        RawExecution {
            exec_id: Some("E1".to_string()),
            timestamp: Some("2024-03-01 15:30:00".to_string()),
            symbol: Some("aapl".to_string()),
            asset_category: Some("OPT".to_string()),
            put_call: Some("P".to_string()),
            strike: Some("150".to_string()),
            expiry: Some("20240329".to_string()),
            quantity: Some("-1".to_string()),
            price: Some("2.00".to_string()),
            commission: Some("0.65".to_string()),
            multiplier: Some("100".to_string()),
            notes: None,
        }
    }

    #[test]
    fn test_normalize_put_sell() {
        let exec = normalize(&raw_put_sell()).expect("should normalize");

        assert_eq!(exec.exec_id, "E1");
        assert_eq!(exec.symbol, "AAPL");
        assert_eq!(exec.instrument, InstrumentKind::Put);
        assert_eq!(exec.side, Side::Sell);
        assert_eq!(exec.strike, Some(dec!(150)));
        assert_eq!(exec.quantity, dec!(-1));
        assert_eq!(exec.price, dec!(2.00));
        // Commission sign is normalized to a cost.
        assert_eq!(exec.commission, dec!(-0.65));
        assert_eq!(exec.multiplier, dec!(100));
        assert!(!exec.assignment);
        assert_eq!(exec.gross_value(), dec!(200));
    }

    #[test]
    fn test_normalize_stock_defaults() {
        let raw = RawExecution {
            exec_id: None,
            timestamp: Some("20240315".to_string()),
            symbol: Some("AAPL".to_string()),
            asset_category: Some("STK".to_string()),
            quantity: Some("100".to_string()),
            price: Some("150.00".to_string()),
            ..RawExecution::default()
        };

        let exec = normalize(&raw).expect("should normalize");
        assert_eq!(exec.instrument, InstrumentKind::Stock);
        assert_eq!(exec.side, Side::Buy);
        assert_eq!(exec.multiplier, Decimal::ONE);
        assert_eq!(exec.commission, Decimal::ZERO);
        assert_eq!(exec.strike, None);
        // Derived fingerprint id when the broker omits one.
        assert_eq!(exec.exec_id, "20240315000000_AAPL_100_150_0");
    }

    #[test]
    fn test_normalize_assignment_note() {
        let mut raw = raw_put_sell();
        raw.quantity = Some("1".to_string());
        raw.notes = Some("A;P".to_string());

        let exec = normalize(&raw).expect("should normalize");
        assert!(exec.assignment);
        assert_eq!(exec.side, Side::Buy);
    }

    #[test]
    fn test_normalize_rejects_missing_symbol() {
        let mut raw = raw_put_sell();
        raw.symbol = Some("  ".to_string());
        assert!(matches!(
            normalize(&raw),
            Err(EngineError::MalformedExecution(_))
        ));
    }

    #[test]
    fn test_normalize_rejects_non_numeric_quantity() {
        let mut raw = raw_put_sell();
        raw.quantity = Some("one".to_string());
        assert!(matches!(
            normalize(&raw),
            Err(EngineError::MalformedExecution(_))
        ));
    }

    #[test]
    fn test_normalize_rejects_zero_quantity() {
        let mut raw = raw_put_sell();
        raw.quantity = Some("0".to_string());
        assert!(matches!(
            normalize(&raw),
            Err(EngineError::MalformedExecution(_))
        ));
    }

    #[test]
    fn test_normalize_rejects_option_without_marker() {
        let mut raw = raw_put_sell();
        raw.put_call = None;
        assert!(matches!(
            normalize(&raw),
            Err(EngineError::MalformedExecution(_))
        ));
    }

    #[test]
    fn test_normalize_rejects_option_without_strike() {
        let mut raw = raw_put_sell();
        raw.strike = None;
        assert!(matches!(
            normalize(&raw),
            Err(EngineError::MalformedExecution(_))
        ));
    }

    #[test]
    fn test_timestamp_formats() {
        for ts in [
            "2024-03-01T15:30:00Z",
            "2024-03-01 15:30:00",
            "20240301;153000",
            "20240301",
            "2024-03-01",
        ] {
            let mut raw = raw_put_sell();
            raw.timestamp = Some(ts.to_string());
            let exec = normalize(&raw).expect(ts);
            assert_eq!(exec.trade_date(), NaiveDate::from_ymd_opt(2024, 3, 1).unwrap());
        }
    }

    #[test]
    fn test_contract_key() {
        let exec = normalize(&raw_put_sell()).unwrap();
        assert_eq!(exec.contract_key(), "AAPL-20240329-150-P");

        let mut raw = raw_put_sell();
        raw.asset_category = Some("STK".to_string());
        raw.put_call = None;
        raw.strike = None;
        let stock = normalize(&raw).unwrap();
        assert_eq!(stock.contract_key(), "AAPL");
    }
}
