//! Report windows over a trade ledger.

use std::fmt;
use std::str::FromStr;

use chrono::{Months, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Trailing windows are anchored on the last bar date and include it. A
/// trade belongs to a window when its entry date falls inside.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerWindow {
    OneYear,
    ThreeYears,
    FiveYears,
    All,
    /// Half-open `[start, end)`.
    Custom { start: NaiveDate, end: NaiveDate },
}

impl LedgerWindow {
    pub const STANDARD: [LedgerWindow; 4] = [
        LedgerWindow::OneYear,
        LedgerWindow::ThreeYears,
        LedgerWindow::FiveYears,
        LedgerWindow::All,
    ];

    /// Inclusive start and exclusive end, `None` meaning unbounded.
    pub fn bounds(&self, anchor: NaiveDate) -> (Option<NaiveDate>, Option<NaiveDate>) {
        let trailing = |years: u32| {
            let start = anchor.checked_sub_months(Months::new(years * 12));
            (start, anchor.succ_opt())
        };
        match *self {
            Self::OneYear => trailing(1),
            Self::ThreeYears => trailing(3),
            Self::FiveYears => trailing(5),
            Self::All => (None, None),
            Self::Custom { start, end } => (Some(start), Some(end)),
        }
    }

    pub fn contains(&self, date: NaiveDate, anchor: NaiveDate) -> bool {
        let (start, end) = self.bounds(anchor);
        start.map_or(true, |s| date >= s) && end.map_or(true, |e| date < e)
    }

    pub fn label(&self) -> String {
        match self {
            Self::OneYear => "1Y".into(),
            Self::ThreeYears => "3Y".into(),
            Self::FiveYears => "5Y".into(),
            Self::All => "ALL".into(),
            Self::Custom { start, end } => format!("{start}..{end}"),
        }
    }
}

impl fmt::Display for LedgerWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

impl FromStr for LedgerWindow {
    type Err = EngineError;

    /// `1Y`, `3Y`, `5Y`, `ALL`, or `YYYY-MM-DD..YYYY-MM-DD`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "1Y" => return Ok(Self::OneYear),
            "3Y" => return Ok(Self::ThreeYears),
            "5Y" => return Ok(Self::FiveYears),
            "ALL" => return Ok(Self::All),
            _ => {}
        }
        let bad = || EngineError::invalid_parameter("window", format!("unrecognized window '{s}'"));
        let (start, end) = s.trim().split_once("..").ok_or_else(bad)?;
        let start = NaiveDate::parse_from_str(start, "%Y-%m-%d").map_err(|_| bad())?;
        let end = NaiveDate::parse_from_str(end, "%Y-%m-%d").map_err(|_| bad())?;
        if end <= start {
            return Err(EngineError::invalid_parameter(
                "window",
                format!("end {end} is not after start {start}"),
            ));
        }
        Ok(Self::Custom { start, end })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn parses_standard_labels() {
        assert_eq!("1y".parse::<LedgerWindow>().unwrap(), LedgerWindow::OneYear);
        assert_eq!("ALL".parse::<LedgerWindow>().unwrap(), LedgerWindow::All);
        assert_eq!(
            "2020-01-01..2021-01-01".parse::<LedgerWindow>().unwrap(),
            LedgerWindow::Custom {
                start: d(2020, 1, 1),
                end: d(2021, 1, 1)
            }
        );
        assert!("2Y".parse::<LedgerWindow>().is_err());
        assert!("2021-01-01..2020-01-01".parse::<LedgerWindow>().is_err());
    }

    #[test]
    fn trailing_year_includes_anchor() {
        let anchor = d(2024, 6, 28);
        let w = LedgerWindow::OneYear;
        assert!(w.contains(anchor, anchor));
        assert!(w.contains(d(2023, 6, 28), anchor));
        assert!(!w.contains(d(2023, 6, 27), anchor));
        assert!(!w.contains(d(2024, 6, 29), anchor));
    }

    #[test]
    fn custom_is_half_open() {
        let w: LedgerWindow = "2020-01-01..2020-02-01".parse().unwrap();
        let anchor = d(2030, 1, 1);
        assert!(w.contains(d(2020, 1, 1), anchor));
        assert!(!w.contains(d(2020, 2, 1), anchor));
        assert_eq!(w.to_string(), "2020-01-01..2020-02-01");
    }
}
