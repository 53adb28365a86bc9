//! Simple Moving Average (SMA) of closes.
//!
//! Lookback: period - 1 (first valid value at index period-1).

use super::{require_period, FnIdentity, Indicator, IndicatorKey};
use crate::domain::Bar;
use crate::error::EngineError;

#[derive(Debug, Clone)]
pub struct Sma {
    period: usize,
    name: String,
}

impl Sma {
    pub fn new(period: usize) -> Self {
        Self {
            period,
            name: format!("sma_{period}"),
        }
    }
}

/// Rolling mean over an arbitrary series. A NaN anywhere in the window makes
/// that output NaN.
pub fn sma_of_series(values: &[f64], period: usize) -> Vec<f64> {
    let n = values.len();
    let mut result = vec![f64::NAN; n];
    if period == 0 || n < period {
        return result;
    }

    let mut sum = 0.0;
    let mut nan_count = 0usize;
    for (i, &v) in values.iter().enumerate() {
        if v.is_nan() {
            nan_count += 1;
        } else {
            sum += v;
        }
        if i >= period {
            let leaving = values[i - period];
            if leaving.is_nan() {
                nan_count -= 1;
            } else {
                sum -= leaving;
            }
        }
        if i + 1 >= period && nan_count == 0 {
            result[i] = sum / period as f64;
        }
    }
    result
}

impl Indicator for Sma {
    fn name(&self) -> &str {
        &self.name
    }

    fn key(&self) -> IndicatorKey {
        IndicatorKey::new(FnIdentity::Builtin("sma"), &[self.period as f64], &self.name)
    }

    fn lookback(&self) -> usize {
        self.period.saturating_sub(1)
    }

    fn validate(&self) -> Result<(), EngineError> {
        require_period(&self.name, self.period)
    }

    fn compute(&self, bars: &[Bar]) -> Vec<f64> {
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        sma_of_series(&closes, self.period)
    }
}
