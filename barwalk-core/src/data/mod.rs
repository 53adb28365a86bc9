//! Market data interface.
//!
//! The engine never performs I/O mid-run: a `MarketDataLoader` hands back a
//! validated `BarSeries` up front, or a typed `DataQualityError`. File-backed
//! loaders live in the runner; this module carries the trait, an in-memory
//! loader for tests and embedding, and a seeded synthetic generator.

pub mod synthetic;

use std::collections::HashMap;

use chrono::NaiveDate;

use crate::domain::{Bar, BarSeries, DataQualityError};

pub use synthetic::{random_walk, SyntheticSpec};

/// Source of daily bars for one symbol.
///
/// Implementations must return ascending, de-duplicated dates with complete
/// OHLCV values restricted to `start <= date <= end`.
pub trait MarketDataLoader: Send + Sync {
    fn load(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<BarSeries, DataQualityError>;
}

/// Loader over bars already held in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLoader {
    series: HashMap<String, Vec<Bar>>,
}

impl InMemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) a symbol's bars. Validation happens on load.
    pub fn insert(&mut self, symbol: impl Into<String>, bars: Vec<Bar>) {
        self.series.insert(symbol.into(), bars);
    }

    pub fn with(mut self, symbol: impl Into<String>, bars: Vec<Bar>) -> Self {
        self.insert(symbol, bars);
        self
    }

    pub fn symbols(&self) -> Vec<&str> {
        let mut symbols: Vec<&str> = self.series.keys().map(String::as_str).collect();
        symbols.sort_unstable();
        symbols
    }
}

impl MarketDataLoader for InMemoryLoader {
    fn load(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<BarSeries, DataQualityError> {
        let bars = self
            .series
            .get(symbol)
            .ok_or_else(|| DataQualityError::MissingSymbol {
                symbol: symbol.to_string(),
            })?;
        let series = BarSeries::new(symbol, bars.clone())?;
        let range = series.index_range(start, end + chrono::Duration::days(1));
        Ok(series.slice(range))
    }
}
