//! Trend-following with pyramiding on pullbacks.
//!
//! Long while the close holds above a trend SMA with RSI confirming. Each
//! fresh RSI dip below `dip_rsi` inside the trend adds a lot, up to
//! `max_pyramid_levels`. The stop starts `stop_atr_mult` ATRs under the entry
//! and trails the highest price since entry.

use std::sync::Arc;

use super::{
    atr_offset, exit_priority_spec, pct_target, read_exit_priority, Decision, DecisionContext,
    ExitPriority, ProtectiveLevels, RunContext, Strategy,
};
use crate::domain::{ParamSchema, ParamSpec, Position};
use crate::error::EngineError;
use crate::indicators::{Atr, IndicatorSeries, Rsi, Sma};

pub const ID: &str = "trend_pyramid";

pub fn schema() -> ParamSchema {
    ParamSchema::new(vec![
        ParamSpec::int("trend_period", 50, 5, 400),
        ParamSpec::int("rsi_period", 14, 2, 100),
        ParamSpec::float("entry_rsi", 50.0, 0.0, 100.0),
        ParamSpec::float("dip_rsi", 40.0, 0.0, 100.0),
        ParamSpec::int("atr_period", 14, 2, 100),
        ParamSpec::float("stop_atr_mult", 3.0, 0.5, 10.0),
        ParamSpec::int("max_pyramid_levels", 3, 0, 10),
        ParamSpec::float("take_profit_pct", 0.0, 0.0, 100.0),
        exit_priority_spec(),
    ])
}

struct Bound {
    trend: Arc<IndicatorSeries>,
    rsi: Arc<IndicatorSeries>,
    atr: Arc<IndicatorSeries>,
    entry_rsi: f64,
    dip_rsi: f64,
    stop_atr_mult: f64,
    take_profit_pct: f64,
    max_levels: u32,
    priority: ExitPriority,
}

#[derive(Default)]
pub struct TrendPyramid {
    bound: Option<Bound>,
}

impl TrendPyramid {
    pub fn new() -> Self {
        Self::default()
    }

    fn bound(&self) -> Result<&Bound, EngineError> {
        self.bound
            .as_ref()
            .ok_or_else(|| EngineError::invalid_parameter(ID, "strategy used before init"))
    }
}

impl Strategy for TrendPyramid {
    fn id(&self) -> &str {
        ID
    }

    fn init(&mut self, ctx: &mut RunContext<'_>) -> Result<(), EngineError> {
        let p = ctx.params;
        let entry_rsi = p.get_float("entry_rsi")?;
        let dip_rsi = p.get_float("dip_rsi")?;
        if dip_rsi >= entry_rsi {
            return Err(EngineError::invalid_parameter(
                "dip_rsi",
                format!("{dip_rsi} must be below entry_rsi {entry_rsi}"),
            ));
        }
        let max_levels = u32::try_from(p.get_int("max_pyramid_levels")?)
            .map_err(|_| EngineError::invalid_parameter("max_pyramid_levels", "out of range"))?;
        self.bound = Some(Bound {
            trend: ctx.cache.register(&Sma::new(p.get_usize("trend_period")?))?,
            rsi: ctx.cache.register(&Rsi::new(p.get_usize("rsi_period")?))?,
            atr: ctx.cache.register(&Atr::new(p.get_usize("atr_period")?))?,
            entry_rsi,
            dip_rsi,
            stop_atr_mult: p.get_float("stop_atr_mult")?,
            take_profit_pct: p.get_float("take_profit_pct")?,
            max_levels,
            priority: read_exit_priority(p)?,
        });
        Ok(())
    }

    fn decide(&self, ctx: &DecisionContext<'_>, position: &Position) -> Result<Decision, EngineError> {
        let b = self.bound()?;
        let Some(bar1) = ctx.lag_bar(1)? else {
            return Ok(Decision::hold());
        };
        let (Some(trend1), Some(rsi1), Some(rsi2)) =
            (ctx.lag(&b.trend, 1)?, ctx.lag(&b.rsi, 1)?, ctx.lag(&b.rsi, 2)?)
        else {
            return Ok(Decision::hold());
        };

        if position.is_flat() {
            if bar1.close > trend1 && rsi1 >= b.entry_rsi {
                return Ok(Decision::enter(format!(
                    "close above {} with rsi {:.1}",
                    b.trend.name(),
                    rsi1
                )));
            }
            return Ok(Decision::hold());
        }

        if bar1.close < trend1 {
            return Ok(Decision::exit(format!("close below {}", b.trend.name())));
        }
        if rsi1 < b.dip_rsi && rsi2 >= b.dip_rsi {
            return Ok(Decision::add_pyramid(format!("rsi dip to {rsi1:.1}")));
        }
        Ok(Decision::hold())
    }

    fn protective_levels(
        &self,
        ctx: &DecisionContext<'_>,
        fill_price: f64,
    ) -> Result<ProtectiveLevels, EngineError> {
        let b = self.bound()?;
        Ok(ProtectiveLevels {
            stop: atr_offset(fill_price, ctx.lag(&b.atr, 1)?, b.stop_atr_mult),
            take_profit: pct_target(fill_price, b.take_profit_pct),
        })
    }

    fn trail_stop(
        &self,
        ctx: &DecisionContext<'_>,
        position: &Position,
    ) -> Result<Option<f64>, EngineError> {
        let b = self.bound()?;
        Ok(atr_offset(
            position.highest_price_since_entry,
            ctx.lag(&b.atr, 1)?,
            b.stop_atr_mult,
        ))
    }

    fn max_pyramid_levels(&self) -> u32 {
        self.bound.as_ref().map_or(0, |b| b.max_levels)
    }

    fn exit_priority(&self) -> ExitPriority {
        self.bound.as_ref().map(|b| b.priority).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{BarSeries, ParamValue};
    use crate::indicators::make_bars;
    use std::collections::BTreeMap;

    #[test]
    fn dip_must_sit_below_entry_threshold() {
        let s = BarSeries::new("TEST", make_bars(&[100.0; 80])).unwrap();
        let mut overrides = BTreeMap::new();
        overrides.insert("dip_rsi".to_string(), ParamValue::Float(60.0));
        let p = schema().bind(&overrides).unwrap();
        let mut ctx = RunContext::new(&s, &p);
        assert!(TrendPyramid::new().init(&mut ctx).is_err());
    }

    #[test]
    fn reports_pyramid_cap_after_init() {
        let s = BarSeries::new("TEST", make_bars(&[100.0; 80])).unwrap();
        let p = schema().bind(&BTreeMap::new()).unwrap();
        let mut ctx = RunContext::new(&s, &p);
        let mut strat = TrendPyramid::new();
        assert_eq!(strat.max_pyramid_levels(), 0);
        strat.init(&mut ctx).unwrap();
        assert_eq!(strat.max_pyramid_levels(), 3);
        assert_eq!(ctx.cache.computations(), 3);
    }
}
