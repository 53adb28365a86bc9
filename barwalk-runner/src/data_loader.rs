//! CSV-backed market data loader.
//!
//! Reads `<dir>/<SYMBOL>.csv` with a `date,open,high,low,close,volume` header.
//! Rows must already be in ascending date order; `BarSeries::new` rejects an
//! unsorted file with `NotAscending`. A missing column or empty cell, volume
//! included, is rejected as incomplete rather than patched.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use log::debug;
use serde::Deserialize;

use barwalk_core::{Bar, BarSeries, DataQualityError, MarketDataLoader};

#[derive(Debug, Deserialize)]
struct CsvRow {
    date: NaiveDate,
    open: Option<f64>,
    high: Option<f64>,
    low: Option<f64>,
    close: Option<f64>,
    volume: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct CsvBarLoader {
    dir: PathBuf,
}

impl CsvBarLoader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, symbol: &str) -> PathBuf {
        self.dir.join(format!("{symbol}.csv"))
    }

    fn read_bars(&self, symbol: &str, path: &Path) -> Result<Vec<Bar>, DataQualityError> {
        let unreadable = |reason: String| DataQualityError::Unreadable {
            symbol: symbol.to_string(),
            reason,
        };
        let mut reader = csv::Reader::from_path(path).map_err(|e| unreadable(e.to_string()))?;
        let mut bars = Vec::new();
        for (index, row) in reader.deserialize::<CsvRow>().enumerate() {
            let row = row.map_err(|e| unreadable(e.to_string()))?;
            let field = |name: &'static str, value: Option<f64>| {
                value.ok_or_else(|| DataQualityError::IncompleteBar {
                    symbol: symbol.to_string(),
                    index,
                    field: name,
                })
            };
            bars.push(Bar::new(
                row.date,
                field("open", row.open)?,
                field("high", row.high)?,
                field("low", row.low)?,
                field("close", row.close)?,
                whole_volume(symbol, index, field("volume", row.volume)?)?,
            ));
        }
        Ok(bars)
    }
}

fn whole_volume(symbol: &str, index: usize, value: f64) -> Result<u64, DataQualityError> {
    if !value.is_finite() || value < 0.0 || value.fract() != 0.0 || value > u64::MAX as f64 {
        return Err(DataQualityError::InvalidVolume {
            symbol: symbol.to_string(),
            index,
            value,
        });
    }
    Ok(value as u64)
}

impl MarketDataLoader for CsvBarLoader {
    fn load(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<BarSeries, DataQualityError> {
        let path = self.path_for(symbol);
        if !path.is_file() {
            return Err(DataQualityError::MissingSymbol {
                symbol: symbol.to_string(),
            });
        }
        let bars = self.read_bars(symbol, &path)?;
        debug!("{symbol}: read {} rows from {}", bars.len(), path.display());
        let series = BarSeries::new(symbol, bars)?;
        let end_exclusive = end.succ_opt().unwrap_or(end);
        Ok(series.slice(series.index_range(start, end_exclusive)))
    }
}
