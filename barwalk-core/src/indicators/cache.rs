//! Run-scoped indicator memoization.
//!
//! One `IndicatorCache` lives for exactly one backtest run and borrows that
//! run's bars. Each distinct key is computed once; repeat registrations hand
//! back the same `Arc`. Dropping the cache at the end of the run is the only
//! invalidation there is.

use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;

use log::debug;

use super::{FnIdentity, Indicator, IndicatorKey};
use crate::domain::Bar;
use crate::error::EngineError;

/// A computed series aligned 1:1 with the run's bars.
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorSeries {
    name: String,
    lookback: usize,
    values: Vec<f64>,
}

impl IndicatorSeries {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn lookback(&self) -> usize {
        self.lookback
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value at `index`, or `None` during warm-up, past the end, or where the
    /// function could not produce a number.
    pub fn get(&self, index: usize) -> Option<f64> {
        if index < self.lookback {
            return None;
        }
        self.values.get(index).copied().filter(|v| v.is_finite())
    }

    /// Raw values with NaN as the unavailable marker.
    pub fn raw(&self) -> &[f64] {
        &self.values
    }
}

pub struct IndicatorCache<'a> {
    bars: &'a [Bar],
    series: HashMap<IndicatorKey, Arc<IndicatorSeries>>,
    computations: usize,
}

impl<'a> IndicatorCache<'a> {
    pub fn new(bars: &'a [Bar]) -> Self {
        Self {
            bars,
            series: HashMap::new(),
            computations: 0,
        }
    }

    /// Compute (or fetch) a built-in indicator.
    pub fn register(&mut self, indicator: &dyn Indicator) -> Result<Arc<IndicatorSeries>, EngineError> {
        let key = indicator.key();
        if let Some(hit) = self.series.get(&key) {
            return Ok(Arc::clone(hit));
        }
        indicator.validate()?;
        let lookback = indicator.lookback();
        self.check_lookback(indicator.name(), lookback)?;
        let values = indicator.compute(self.bars);
        self.insert(key, lookback, values)
    }

    /// Compute (or fetch) a custom function. Identity is the function's type
    /// plus `args` plus `name`, so two different closures never collide even
    /// when given the same name.
    pub fn register_fn<F>(
        &mut self,
        name: &str,
        args: &[f64],
        lookback: usize,
        f: F,
    ) -> Result<Arc<IndicatorSeries>, EngineError>
    where
        F: Fn(&[Bar]) -> Vec<f64> + 'static,
    {
        let key = IndicatorKey::new(FnIdentity::Custom(TypeId::of::<F>()), args, name);
        if let Some(hit) = self.series.get(&key) {
            return Ok(Arc::clone(hit));
        }
        self.check_lookback(name, lookback)?;
        let values = f(self.bars);
        self.insert(key, lookback, values)
    }

    /// Number of actual computations performed (cache misses).
    pub fn computations(&self) -> usize {
        self.computations
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    fn check_lookback(&self, name: &str, lookback: usize) -> Result<(), EngineError> {
        if lookback >= self.bars.len() {
            return Err(EngineError::invalid_parameter(
                name,
                format!(
                    "lookback {lookback} exceeds series length {}",
                    self.bars.len()
                ),
            ));
        }
        Ok(())
    }

    fn insert(
        &mut self,
        key: IndicatorKey,
        lookback: usize,
        mut values: Vec<f64>,
    ) -> Result<Arc<IndicatorSeries>, EngineError> {
        if values.len() != self.bars.len() {
            return Err(EngineError::LengthMismatch {
                name: key.name.clone(),
                expected: self.bars.len(),
                actual: values.len(),
            });
        }
        for v in values.iter_mut().take(lookback) {
            *v = f64::NAN;
        }
        self.computations += 1;
        debug!("computed indicator {} ({} bars)", key.name, values.len());
        let series = Arc::new(IndicatorSeries {
            name: key.name.clone(),
            lookback,
            values,
        });
        self.series.insert(key, Arc::clone(&series));
        Ok(series)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{make_bars, Ema, Sma};

    #[test]
    fn repeated_register_reuses_series() {
        let bars = make_bars(&(0..50).map(|i| 100.0 + i as f64).collect::<Vec<_>>());
        let mut cache = IndicatorCache::new(&bars);
        let a = cache.register(&Sma::new(10)).unwrap();
        let b = cache.register(&Sma::new(10)).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.computations(), 1);

        cache.register(&Ema::new(10)).unwrap();
        assert_eq!(cache.computations(), 2);
    }

    #[test]
    fn warmup_reads_unavailable() {
        let bars = make_bars(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        let mut cache = IndicatorCache::new(&bars);
        let sma = cache.register(&Sma::new(3)).unwrap();
        assert_eq!(sma.get(0), None);
        assert_eq!(sma.get(1), None);
        assert_eq!(sma.get(2), Some(2.0));
        assert_eq!(sma.get(5), None);
    }

    #[test]
    fn lookback_beyond_series_is_invalid() {
        let bars = make_bars(&[1.0, 2.0, 3.0]);
        let mut cache = IndicatorCache::new(&bars);
        let err = cache.register(&Sma::new(10)).unwrap_err();
        assert!(matches!(err, EngineError::InvalidParameter { .. }));
        assert_eq!(cache.computations(), 0);
    }

    #[test]
    fn custom_length_mismatch() {
        let bars = make_bars(&[1.0, 2.0, 3.0, 4.0]);
        let mut cache = IndicatorCache::new(&bars);
        let err = cache
            .register_fn("short", &[], 0, |bars: &[Bar]| vec![0.0; bars.len() - 1])
            .unwrap_err();
        assert_eq!(
            err,
            EngineError::LengthMismatch {
                name: "short".into(),
                expected: 4,
                actual: 3
            }
        );
    }

    #[test]
    fn custom_function_masks_lookback() {
        let bars = make_bars(&[1.0, 2.0, 3.0, 4.0]);
        let mut cache = IndicatorCache::new(&bars);
        let double = |bars: &[Bar]| bars.iter().map(|b| b.close * 2.0).collect::<Vec<_>>();
        let s = cache.register_fn("double", &[2.0], 2, double).unwrap();
        assert_eq!(s.get(1), None);
        assert_eq!(s.get(2), Some(6.0));
        assert!(s.raw()[0].is_nan());
    }

    #[test]
    fn custom_key_includes_args() {
        fn scaled(bars: &[Bar]) -> Vec<f64> {
            bars.iter().map(|b| b.close).collect()
        }
        let bars = make_bars(&[1.0, 2.0, 3.0]);
        let mut cache = IndicatorCache::new(&bars);
        let a = cache.register_fn("scaled", &[1.0], 0, scaled).unwrap();
        let b = cache.register_fn("scaled", &[1.0], 0, scaled).unwrap();
        let c = cache.register_fn("scaled", &[2.0], 0, scaled).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(cache.computations(), 2);
    }
}
