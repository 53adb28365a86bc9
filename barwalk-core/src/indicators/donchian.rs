//! Donchian channel: highest high / lowest low over `period` bars ending at t.
//!
//! Lookback: period - 1. A breakout strategy compares today's price against the
//! channel of the bars *before* today, which the decision guard gives it for
//! free by reading index i-1.

use super::{require_period, FnIdentity, Indicator, IndicatorKey};
use crate::domain::Bar;
use crate::error::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DonchianBand {
    Upper,
    Lower,
}

#[derive(Debug, Clone)]
pub struct Donchian {
    period: usize,
    band: DonchianBand,
    name: String,
}

impl Donchian {
    pub fn upper(period: usize) -> Self {
        Self {
            period,
            band: DonchianBand::Upper,
            name: format!("donchian_upper_{period}"),
        }
    }

    pub fn lower(period: usize) -> Self {
        Self {
            period,
            band: DonchianBand::Lower,
            name: format!("donchian_lower_{period}"),
        }
    }
}

impl Indicator for Donchian {
    fn name(&self) -> &str {
        &self.name
    }

    fn key(&self) -> IndicatorKey {
        let function = match self.band {
            DonchianBand::Upper => "donchian_upper",
            DonchianBand::Lower => "donchian_lower",
        };
        IndicatorKey::new(FnIdentity::Builtin(function), &[self.period as f64], &self.name)
    }

    fn lookback(&self) -> usize {
        self.period.saturating_sub(1)
    }

    fn validate(&self) -> Result<(), EngineError> {
        require_period(&self.name, self.period)
    }

    fn compute(&self, bars: &[Bar]) -> Vec<f64> {
        let n = bars.len();
        let mut result = vec![f64::NAN; n];
        if self.period == 0 || n < self.period {
            return result;
        }

        for i in (self.period - 1)..n {
            let window = &bars[i + 1 - self.period..=i];
            result[i] = match self.band {
                DonchianBand::Upper => window
                    .iter()
                    .map(|b| b.high)
                    .fold(f64::NEG_INFINITY, f64::max),
                DonchianBand::Lower => window.iter().map(|b| b.low).fold(f64::INFINITY, f64::min),
            };
        }
        result
    }
}
