//! Indicator functions and the run-scoped indicator cache.
//!
//! Indicators are pure functions of bar history: the value at index `t` reads
//! only bars `0..=t`. Values before the warm-up (`lookback()`) and any value
//! that cannot be computed are `f64::NAN`; the cache turns that marker into
//! `None` at the read side so strategies never see a fabricated number.
//!
//! Multi-series indicators (Donchian) are exposed as one instance per band.

pub mod atr;
pub mod cache;
pub mod donchian;
pub mod ema;
pub mod rsi;
pub mod sma;

use std::any::TypeId;

use crate::domain::Bar;
use crate::error::EngineError;

pub use atr::Atr;
pub use cache::{IndicatorCache, IndicatorSeries};
pub use donchian::{Donchian, DonchianBand};
pub use ema::Ema;
pub use rsi::Rsi;
pub use sma::Sma;

/// Identity of the function behind a cached series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FnIdentity {
    Builtin(&'static str),
    Custom(TypeId),
}

/// Cache key: `(function identity, args, name)`. Float args are keyed by their
/// bit pattern so that `14.0` and `14.000000001` are distinct.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IndicatorKey {
    pub function: FnIdentity,
    pub args: Vec<u64>,
    pub name: String,
}

impl IndicatorKey {
    pub fn new(function: FnIdentity, args: &[f64], name: impl Into<String>) -> Self {
        Self {
            function,
            args: args.iter().map(|a| a.to_bits()).collect(),
            name: name.into(),
        }
    }
}

/// An indicator function over a full bar series.
///
/// # Look-ahead contamination guard
/// No value at bar t may depend on bar t+1 or later. Every built-in passes
/// the truncated-vs-full series test in `tests/lookahead_test.rs`.
pub trait Indicator: Send + Sync {
    /// Human-readable name (e.g., "sma_20", "atr_14").
    fn name(&self) -> &str;

    fn key(&self) -> IndicatorKey;

    /// Number of leading bars with no valid output.
    fn lookback(&self) -> usize;

    /// Reject degenerate parameters before anything is computed.
    fn validate(&self) -> Result<(), EngineError> {
        Ok(())
    }

    /// Returns a `Vec<f64>` of the same length as `bars`.
    fn compute(&self, bars: &[Bar]) -> Vec<f64>;
}

pub(crate) fn require_period(name: &str, period: usize) -> Result<(), EngineError> {
    if period == 0 {
        return Err(EngineError::invalid_parameter(name, "period must be >= 1"));
    }
    Ok(())
}

/// Create synthetic bars from close prices for testing.
///
/// Generates plausible OHLV: open = prev_close (or close for first bar),
/// high = max(open,close) + 1.0, low = min(open,close) - 1.0, volume = 1000.
#[cfg(test)]
pub fn make_bars(closes: &[f64]) -> Vec<Bar> {
    let base_date = chrono::NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = if i == 0 { close } else { closes[i - 1] };
            Bar {
                date: base_date + chrono::Duration::days(i as i64),
                open,
                high: open.max(close) + 1.0,
                low: open.min(close) - 1.0,
                close,
                volume: 1000,
            }
        })
        .collect()
}

#[cfg(test)]
pub fn make_ohlc_bars(data: &[(f64, f64, f64, f64)]) -> Vec<Bar> {
    let base_date = chrono::NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
    data.iter()
        .enumerate()
        .map(|(i, &(open, high, low, close))| Bar {
            date: base_date + chrono::Duration::days(i as i64),
            open,
            high,
            low,
            close,
            volume: 1000,
        })
        .collect()
}

/// Assert two f64 values are approximately equal (within epsilon).
#[cfg(test)]
pub fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() < epsilon,
        "assert_approx failed: actual={actual}, expected={expected}, diff={}, epsilon={epsilon}",
        (actual - expected).abs()
    );
}

#[cfg(test)]
pub const DEFAULT_EPSILON: f64 = 1e-10;
