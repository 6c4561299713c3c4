//! Period value types and the change audit record.
//!
//! A [`Period`] is the accounting interval (fiscal year) selected for report
//! display. Construction validates the range, so any `Period` in hand is valid.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};

use crate::error::PeriodError;

pub const MIN_PERIOD: i32 = 2000;
pub const MAX_PERIOD: i32 = 2100;

/// Validated accounting period in `MIN_PERIOD..=MAX_PERIOD`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i32")]
pub struct Period(i32);

impl Period {
    pub fn new(raw: i64) -> Result<Self, PeriodError> {
        if raw < MIN_PERIOD as i64 || raw > MAX_PERIOD as i64 {
            return Err(PeriodError::OutOfRange(raw));
        }
        Ok(Self(raw as i32))
    }

    /// Current calendar year, clamped into the valid range.
    pub fn current() -> Self {
        let year = Utc::now().year().clamp(MIN_PERIOD, MAX_PERIOD);
        Self(year)
    }

    pub fn value(self) -> i32 {
        self.0
    }
}

impl TryFrom<i64> for Period {
    type Error = PeriodError;

    fn try_from(raw: i64) -> Result<Self, Self::Error> {
        Period::new(raw)
    }
}

impl From<Period> for i32 {
    fn from(period: Period) -> Self {
        period.0
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Calendar month, 1..=12.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u8")]
pub struct Month(u8);

impl Month {
    pub fn new(raw: i64) -> Result<Self, PeriodError> {
        if !(1..=12).contains(&raw) {
            return Err(PeriodError::MonthOutOfRange(raw));
        }
        Ok(Self(raw as u8))
    }

    pub fn current() -> Self {
        Self(Utc::now().month() as u8)
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl TryFrom<i64> for Month {
    type Error = PeriodError;

    fn try_from(raw: i64) -> Result<Self, Self::Error> {
        Month::new(raw)
    }
}

impl From<Month> for u8 {
    fn from(month: Month) -> Self {
        month.0
    }
}

impl fmt::Display for Month {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Who asked for a period change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeSource {
    Manual,
    Event,
    ImportComplete,
    BlockedDuringImport,
}

impl ChangeSource {
    pub fn as_str(self) -> &'static str {
        match self {
            ChangeSource::Manual => "manual",
            ChangeSource::Event => "event",
            ChangeSource::ImportComplete => "import_complete",
            ChangeSource::BlockedDuringImport => "blocked_during_import",
        }
    }
}

impl FromStr for ChangeSource {
    type Err = PeriodError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "manual" => Ok(ChangeSource::Manual),
            "event" => Ok(ChangeSource::Event),
            "import_complete" => Ok(ChangeSource::ImportComplete),
            "blocked_during_import" => Ok(ChangeSource::BlockedDuringImport),
            other => Err(PeriodError::UnknownSource(other.to_string())),
        }
    }
}

impl fmt::Display for ChangeSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What happened to a requested change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeOutcome {
    Applied,
    NoOp,
    Rejected,
}

impl ChangeOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            ChangeOutcome::Applied => "applied",
            ChangeOutcome::NoOp => "no_op",
            ChangeOutcome::Rejected => "rejected",
        }
    }
}

/// Audit entry for one period change request.
///
/// `to_period` keeps the raw requested value so out-of-range requests stay
/// visible in the history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodChangeRecord {
    pub timestamp: DateTime<Utc>,
    pub from_period: Period,
    pub to_period: i64,
    pub source: ChangeSource,
    pub accepted: bool,
    pub outcome: ChangeOutcome,
}

impl PeriodChangeRecord {
    pub fn new(from: Period, to: i64, source: ChangeSource, outcome: ChangeOutcome) -> Self {
        Self {
            timestamp: Utc::now(),
            from_period: from,
            to_period: to,
            source,
            accepted: outcome == ChangeOutcome::Applied,
            outcome,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn period_bounds_are_inclusive() {
        assert!(Period::new(2000).is_ok());
        assert!(Period::new(2100).is_ok());
        assert_eq!(Period::new(1999), Err(PeriodError::OutOfRange(1999)));
        assert_eq!(Period::new(2101), Err(PeriodError::OutOfRange(2101)));
    }

    #[test]
    fn period_deserialization_validates() {
        let ok: Period = serde_json::from_str("2024").unwrap();
        assert_eq!(ok.value(), 2024);
        assert!(serde_json::from_str::<Period>("1850").is_err());
    }

    #[test]
    fn month_bounds() {
        assert!(Month::new(1).is_ok());
        assert!(Month::new(12).is_ok());
        assert!(Month::new(0).is_err());
        assert!(Month::new(13).is_err());
    }

    #[test]
    fn change_source_parses_wire_names() {
        assert_eq!("manual".parse::<ChangeSource>().unwrap(), ChangeSource::Manual);
        assert_eq!(
            "blocked_during_import".parse::<ChangeSource>().unwrap(),
            ChangeSource::BlockedDuringImport
        );
        assert!("ui".parse::<ChangeSource>().is_err());
    }

    #[test]
    fn record_serializes_camel_case() {
        let record = PeriodChangeRecord::new(
            Period::new(2024).unwrap(),
            2025,
            ChangeSource::Manual,
            ChangeOutcome::Applied,
        );
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["fromPeriod"], 2024);
        assert_eq!(value["toPeriod"], 2025);
        assert_eq!(value["source"], "manual");
        assert_eq!(value["accepted"], true);
        assert_eq!(value["outcome"], "applied");
    }
}
