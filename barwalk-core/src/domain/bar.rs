//! Bar and BarSeries: the fundamental market data units.

use std::ops::Range;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Daily OHLCV bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

impl Bar {
    pub fn new(date: NaiveDate, open: f64, high: f64, low: f64, close: f64, volume: u64) -> Self {
        Self {
            date,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// Returns true if any OHLC field is NaN or infinite.
    pub fn is_void(&self) -> bool {
        !(self.open.is_finite()
            && self.high.is_finite()
            && self.low.is_finite()
            && self.close.is_finite())
    }

    /// OHLC consistency: high >= max(open, close, low), low <= min(open, close, high).
    pub fn is_sane(&self) -> bool {
        if self.is_void() {
            return false;
        }
        self.high >= self.low
            && self.high >= self.open
            && self.high >= self.close
            && self.low <= self.open
            && self.low <= self.close
    }

    /// Why `is_sane` failed, for flagging.
    pub fn defect(&self) -> Option<String> {
        if self.is_void() {
            return Some("non-finite OHLC value".into());
        }
        if self.high < self.low {
            return Some(format!("high {} < low {}", self.high, self.low));
        }
        if !self.is_sane() {
            return Some(format!(
                "open {} / close {} outside [{}, {}]",
                self.open, self.close, self.low, self.high
            ));
        }
        None
    }
}

/// Loader-side data defects. A series that fails these checks never reaches
/// the engine.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DataQualityError {
    #[error("{symbol}: dates not ascending at index {index} ({previous} then {date})")]
    NotAscending {
        symbol: String,
        index: usize,
        previous: NaiveDate,
        date: NaiveDate,
    },

    #[error("{symbol}: duplicate bar for {date}")]
    DuplicateDate { symbol: String, date: NaiveDate },

    #[error("{symbol}: missing or non-finite {field} at index {index}")]
    IncompleteBar {
        symbol: String,
        index: usize,
        field: &'static str,
    },

    #[error("{symbol}: volume {value} at index {index} is not a non-negative whole number")]
    InvalidVolume {
        symbol: String,
        index: usize,
        value: f64,
    },

    #[error("no data for symbol '{symbol}'")]
    MissingSymbol { symbol: String },

    #[error("{symbol}: unreadable data: {reason}")]
    Unreadable { symbol: String, reason: String },
}

/// Immutable, time-ordered bars for one symbol.
///
/// Construction checks ordering and completeness only. OHLC consistency
/// (`high < low` and friends) is left to the simulator, which skips and flags
/// offending bars instead of rejecting the whole symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BarSeries {
    symbol: String,
    bars: Vec<Bar>,
}

impl BarSeries {
    pub fn new(symbol: impl Into<String>, bars: Vec<Bar>) -> Result<Self, DataQualityError> {
        let symbol = symbol.into();
        for (i, bar) in bars.iter().enumerate() {
            for (field, value) in [
                ("open", bar.open),
                ("high", bar.high),
                ("low", bar.low),
                ("close", bar.close),
            ] {
                if !value.is_finite() {
                    return Err(DataQualityError::IncompleteBar {
                        symbol,
                        index: i,
                        field,
                    });
                }
            }
            if i > 0 {
                let previous = bars[i - 1].date;
                if bar.date == previous {
                    return Err(DataQualityError::DuplicateDate {
                        symbol,
                        date: bar.date,
                    });
                }
                if bar.date < previous {
                    return Err(DataQualityError::NotAscending {
                        symbol,
                        index: i,
                        previous,
                        date: bar.date,
                    });
                }
            }
        }
        Ok(Self { symbol, bars })
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn bars(&self) -> &[Bar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Bar> {
        self.bars.get(index)
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.bars.first().map(|b| b.date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.bars.last().map(|b| b.date)
    }

    pub fn dates(&self) -> Vec<NaiveDate> {
        self.bars.iter().map(|b| b.date).collect()
    }

    /// Index range of bars with `start <= date < end`.
    pub fn index_range(&self, start: NaiveDate, end: NaiveDate) -> Range<usize> {
        let lo = self.bars.partition_point(|b| b.date < start);
        let hi = self.bars.partition_point(|b| b.date < end).max(lo);
        lo..hi
    }

    /// Copy out a sub-series. Out-of-range bounds are clamped.
    pub fn slice(&self, range: Range<usize>) -> BarSeries {
        let end = range.end.min(self.bars.len());
        let start = range.start.min(end);
        BarSeries {
            symbol: self.symbol.clone(),
            bars: self.bars[start..end].to_vec(),
        }
    }
}
