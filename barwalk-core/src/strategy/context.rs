//! Run-scoped and decision-scoped views handed to strategies.
//!
//! `RunContext` exists only while a strategy initializes: it owns the run's
//! indicator cache, which is dropped before the first bar is simulated.
//! `DecisionContext` is the only window a strategy has onto data while it
//! decides bar `i`, and it refuses every read at index `>= i`.

use crate::domain::{Bar, BarSeries, ParameterSet};
use crate::error::EngineError;
use crate::indicators::{IndicatorCache, IndicatorSeries};

pub struct RunContext<'a> {
    pub series: &'a BarSeries,
    pub params: &'a ParameterSet,
    pub cache: IndicatorCache<'a>,
}

impl<'a> RunContext<'a> {
    pub fn new(series: &'a BarSeries, params: &'a ParameterSet) -> Self {
        Self {
            series,
            params,
            cache: IndicatorCache::new(series.bars()),
        }
    }
}

/// Guarded view of the data available when deciding bar `cursor`.
#[derive(Debug, Clone, Copy)]
pub struct DecisionContext<'a> {
    bars: &'a [Bar],
    cursor: usize,
}

impl<'a> DecisionContext<'a> {
    /// `cursor` may equal `bars.len()`: that is the decision for the bar after
    /// the last one, which can only become a pending order.
    pub fn new(bars: &'a [Bar], cursor: usize) -> Self {
        Self { bars, cursor }
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    fn guard(&self, index: usize) -> Result<(), EngineError> {
        if index >= self.cursor {
            return Err(EngineError::LookaheadViolation {
                decision_index: self.cursor,
                requested: index,
            });
        }
        Ok(())
    }

    pub fn bar(&self, index: usize) -> Result<&'a Bar, EngineError> {
        self.guard(index)?;
        self.bars.get(index).ok_or(EngineError::LookaheadViolation {
            decision_index: self.cursor,
            requested: index,
        })
    }

    /// Bar `k` steps back; `None` before the start of data.
    pub fn lag_bar(&self, k: usize) -> Result<Option<&'a Bar>, EngineError> {
        match self.cursor.checked_sub(k) {
            Some(index) => self.bar(index).map(Some),
            None => Ok(None),
        }
    }

    pub fn value(&self, series: &IndicatorSeries, index: usize) -> Result<Option<f64>, EngineError> {
        self.guard(index)?;
        Ok(series.get(index))
    }

    /// Indicator value `k` steps back. `k = 0` is the decision bar itself and
    /// is a violation.
    pub fn lag(&self, series: &IndicatorSeries, k: usize) -> Result<Option<f64>, EngineError> {
        match self.cursor.checked_sub(k) {
            Some(index) => self.value(series, index),
            None => Ok(None),
        }
    }
}
