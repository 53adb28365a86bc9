//! Exponential Moving Average (EMA).
//!
//! Seed: EMA[period-1] = SMA of the first `period` closes.
//! Then EMA[t] = EMA[t-1] + alpha * (close[t] - EMA[t-1]), alpha = 2/(period+1).
//! Lookback: period - 1.

use super::{require_period, FnIdentity, Indicator, IndicatorKey};
use crate::domain::Bar;
use crate::error::EngineError;

#[derive(Debug, Clone)]
pub struct Ema {
    period: usize,
    name: String,
}

impl Ema {
    pub fn new(period: usize) -> Self {
        Self {
            period,
            name: format!("ema_{period}"),
        }
    }
}

impl Indicator for Ema {
    fn name(&self) -> &str {
        &self.name
    }

    fn key(&self) -> IndicatorKey {
        IndicatorKey::new(FnIdentity::Builtin("ema"), &[self.period as f64], &self.name)
    }

    fn lookback(&self) -> usize {
        self.period.saturating_sub(1)
    }

    fn validate(&self) -> Result<(), EngineError> {
        require_period(&self.name, self.period)
    }

    fn compute(&self, bars: &[Bar]) -> Vec<f64> {
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        ema_of_series(&closes, self.period)
    }
}

/// EMA over an arbitrary series. A NaN in the seed window leaves the whole
/// output NaN; a later NaN taints everything after it.
pub fn ema_of_series(values: &[f64], period: usize) -> Vec<f64> {
    let n = values.len();
    let mut result = vec![f64::NAN; n];

    if n < period || period == 0 {
        return result;
    }

    let alpha = 2.0 / (period as f64 + 1.0);

    let mut sum = 0.0;
    for &v in values.iter().take(period) {
        if v.is_nan() {
            return result;
        }
        sum += v;
    }
    let seed = sum / period as f64;
    result[period - 1] = seed;

    let mut prev = seed;
    for i in period..n {
        if values[i].is_nan() {
            return result;
        }
        // Incremental form keeps a constant input exactly constant.
        let ema = prev + alpha * (values[i] - prev);
        result[i] = ema;
        prev = ema;
    }

    result
}
