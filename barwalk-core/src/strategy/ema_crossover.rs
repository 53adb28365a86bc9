//! EMA crossover: enter when the fast EMA crosses above the slow EMA, exit
//! while it is below. Optional ATR stop and percentage take-profit.

use std::sync::Arc;

use super::{
    atr_offset, exit_priority_spec, pct_target, read_exit_priority, Decision, DecisionContext,
    ExitPriority, ProtectiveLevels, RunContext, Strategy,
};
use crate::domain::{ParamSchema, ParamSpec, Position};
use crate::error::EngineError;
use crate::indicators::{Atr, Ema, IndicatorSeries};

pub const ID: &str = "ema_crossover";

pub fn schema() -> ParamSchema {
    ParamSchema::new(vec![
        ParamSpec::int("fast_period", 12, 2, 200),
        ParamSpec::int("slow_period", 26, 3, 400),
        ParamSpec::int("atr_period", 14, 2, 100),
        ParamSpec::float("stop_atr_mult", 0.0, 0.0, 10.0),
        ParamSpec::float("take_profit_pct", 0.0, 0.0, 100.0),
        exit_priority_spec(),
    ])
}

struct Bound {
    fast: Arc<IndicatorSeries>,
    slow: Arc<IndicatorSeries>,
    atr: Option<Arc<IndicatorSeries>>,
    stop_atr_mult: f64,
    take_profit_pct: f64,
    priority: ExitPriority,
}

#[derive(Default)]
pub struct EmaCrossover {
    bound: Option<Bound>,
}

impl EmaCrossover {
    pub fn new() -> Self {
        Self::default()
    }

    fn bound(&self) -> Result<&Bound, EngineError> {
        self.bound
            .as_ref()
            .ok_or_else(|| EngineError::invalid_parameter(ID, "strategy used before init"))
    }
}

impl Strategy for EmaCrossover {
    fn id(&self) -> &str {
        ID
    }

    fn init(&mut self, ctx: &mut RunContext<'_>) -> Result<(), EngineError> {
        let fast_period = ctx.params.get_usize("fast_period")?;
        let slow_period = ctx.params.get_usize("slow_period")?;
        if fast_period >= slow_period {
            return Err(EngineError::invalid_parameter(
                "fast_period",
                format!("{fast_period} must be below slow_period {slow_period}"),
            ));
        }
        let stop_atr_mult = ctx.params.get_float("stop_atr_mult")?;
        let atr = if stop_atr_mult > 0.0 {
            Some(ctx.cache.register(&Atr::new(ctx.params.get_usize("atr_period")?))?)
        } else {
            None
        };
        self.bound = Some(Bound {
            fast: ctx.cache.register(&Ema::new(fast_period))?,
            slow: ctx.cache.register(&Ema::new(slow_period))?,
            atr,
            stop_atr_mult,
            take_profit_pct: ctx.params.get_float("take_profit_pct")?,
            priority: read_exit_priority(ctx.params)?,
        });
        Ok(())
    }

    fn decide(&self, ctx: &DecisionContext<'_>, position: &Position) -> Result<Decision, EngineError> {
        let b = self.bound()?;
        let (Some(fast1), Some(slow1), Some(fast2), Some(slow2)) = (
            ctx.lag(&b.fast, 1)?,
            ctx.lag(&b.slow, 1)?,
            ctx.lag(&b.fast, 2)?,
            ctx.lag(&b.slow, 2)?,
        ) else {
            return Ok(Decision::hold());
        };

        if position.is_flat() {
            if fast1 > slow1 && fast2 <= slow2 {
                return Ok(Decision::enter(format!(
                    "{} crossed above {}",
                    b.fast.name(),
                    b.slow.name()
                )));
            }
        } else if fast1 < slow1 {
            return Ok(Decision::exit(format!(
                "{} below {}",
                b.fast.name(),
                b.slow.name()
            )));
        }
        Ok(Decision::hold())
    }

    fn protective_levels(
        &self,
        ctx: &DecisionContext<'_>,
        fill_price: f64,
    ) -> Result<ProtectiveLevels, EngineError> {
        let b = self.bound()?;
        let atr = match &b.atr {
            Some(series) => ctx.lag(series, 1)?,
            None => None,
        };
        Ok(ProtectiveLevels {
            stop: atr_offset(fill_price, atr, b.stop_atr_mult),
            take_profit: pct_target(fill_price, b.take_profit_pct),
        })
    }

    fn exit_priority(&self) -> ExitPriority {
        self.bound.as_ref().map(|b| b.priority).unwrap_or_default()
    }
}
