//! Donchian channel breakout: enter when the prior close clears the entry
//! channel built from the bars before it, exit when it breaks the exit channel.
//! ATR stop that trails the highest price since entry.

use std::sync::Arc;

use super::{
    atr_offset, exit_priority_spec, read_exit_priority, Decision, DecisionContext, ExitPriority,
    ProtectiveLevels, RunContext, Strategy,
};
use crate::domain::{ParamSchema, ParamSpec, Position};
use crate::error::EngineError;
use crate::indicators::{Atr, Donchian, IndicatorSeries};

pub const ID: &str = "donchian_breakout";

pub fn schema() -> ParamSchema {
    ParamSchema::new(vec![
        ParamSpec::int("entry_period", 20, 2, 400),
        ParamSpec::int("exit_period", 10, 2, 400),
        ParamSpec::int("atr_period", 14, 2, 100),
        ParamSpec::float("stop_atr_mult", 2.0, 0.0, 10.0),
        exit_priority_spec(),
    ])
}

struct Bound {
    upper: Arc<IndicatorSeries>,
    lower: Arc<IndicatorSeries>,
    atr: Arc<IndicatorSeries>,
    stop_atr_mult: f64,
    priority: ExitPriority,
}

#[derive(Default)]
pub struct DonchianBreakout {
    bound: Option<Bound>,
}

impl DonchianBreakout {
    pub fn new() -> Self {
        Self::default()
    }

    fn bound(&self) -> Result<&Bound, EngineError> {
        self.bound
            .as_ref()
            .ok_or_else(|| EngineError::invalid_parameter(ID, "strategy used before init"))
    }
}

impl Strategy for DonchianBreakout {
    fn id(&self) -> &str {
        ID
    }

    fn init(&mut self, ctx: &mut RunContext<'_>) -> Result<(), EngineError> {
        let p = ctx.params;
        self.bound = Some(Bound {
            upper: ctx.cache.register(&Donchian::upper(p.get_usize("entry_period")?))?,
            lower: ctx.cache.register(&Donchian::lower(p.get_usize("exit_period")?))?,
            atr: ctx.cache.register(&Atr::new(p.get_usize("atr_period")?))?,
            stop_atr_mult: p.get_float("stop_atr_mult")?,
            priority: read_exit_priority(p)?,
        });
        Ok(())
    }

    fn decide(&self, ctx: &DecisionContext<'_>, position: &Position) -> Result<Decision, EngineError> {
        let b = self.bound()?;
        let Some(bar1) = ctx.lag_bar(1)? else {
            return Ok(Decision::hold());
        };
        // Channel as of the bar before the signal bar, so the signal bar's own
        // high/low cannot define the level it breaks.
        if position.is_flat() {
            if let Some(upper) = ctx.lag(&b.upper, 2)? {
                if bar1.close > upper {
                    return Ok(Decision::enter(format!(
                        "close {:.2} above {} {:.2}",
                        bar1.close,
                        b.upper.name(),
                        upper
                    )));
                }
            }
        } else if let Some(lower) = ctx.lag(&b.lower, 2)? {
            if bar1.close < lower {
                return Ok(Decision::exit(format!("close below {}", b.lower.name())));
            }
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
            take_profit: None,
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

    fn exit_priority(&self) -> ExitPriority {
        self.bound.as_ref().map(|b| b.priority).unwrap_or_default()
    }
}
