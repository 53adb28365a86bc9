//! Relative Strength Index (RSI), Wilder-smoothed gains and losses.
//!
//! RSI = 100 - 100 / (1 + avg_gain / avg_loss). Lookback: period.
//! No movement at all reads 50; only gains reads 100; only losses reads 0.

use super::{require_period, FnIdentity, Indicator, IndicatorKey};
use crate::domain::Bar;
use crate::error::EngineError;

#[derive(Debug, Clone)]
pub struct Rsi {
    period: usize,
    name: String,
}

impl Rsi {
    pub fn new(period: usize) -> Self {
        Self {
            period,
            name: format!("rsi_{period}"),
        }
    }
}

impl Indicator for Rsi {
    fn name(&self) -> &str {
        &self.name
    }

    fn key(&self) -> IndicatorKey {
        IndicatorKey::new(FnIdentity::Builtin("rsi"), &[self.period as f64], &self.name)
    }

    fn lookback(&self) -> usize {
        self.period
    }

    fn validate(&self) -> Result<(), EngineError> {
        require_period(&self.name, self.period)
    }

    fn compute(&self, bars: &[Bar]) -> Vec<f64> {
        let n = bars.len();
        let period = self.period;
        let mut result = vec![f64::NAN; n];
        if period == 0 || n < period + 1 {
            return result;
        }

        let change = |i: usize| bars[i].close - bars[i - 1].close;

        let mut avg_gain = 0.0;
        let mut avg_loss = 0.0;
        for i in 1..=period {
            let ch = change(i);
            if ch.is_nan() {
                return result;
            }
            if ch > 0.0 {
                avg_gain += ch;
            } else {
                avg_loss -= ch;
            }
        }
        avg_gain /= period as f64;
        avg_loss /= period as f64;
        result[period] = rsi_from_averages(avg_gain, avg_loss);

        let alpha = 1.0 / period as f64;
        for i in (period + 1)..n {
            let ch = change(i);
            if ch.is_nan() {
                return result;
            }
            avg_gain = alpha * ch.max(0.0) + (1.0 - alpha) * avg_gain;
            avg_loss = alpha * (-ch).max(0.0) + (1.0 - alpha) * avg_loss;
            result[i] = rsi_from_averages(avg_gain, avg_loss);
        }
        result
    }
}

fn rsi_from_averages(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 && avg_gain == 0.0 {
        50.0
    } else if avg_loss == 0.0 {
        100.0
    } else if avg_gain == 0.0 {
        0.0
    } else {
        100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
    }
}
