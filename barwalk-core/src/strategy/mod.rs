//! Strategy state machines.
//!
//! A strategy is a per-symbol object with a fixed `{init, decide}` interface.
//! `init` binds it to one run (parameters, indicators); `decide` maps the
//! guarded view of bars `< i` plus the current position to one of
//! `{Hold, Enter, Exit, AddPyramid}`. Strategies never touch fills or cash;
//! the simulator owns the position and applies the decision.
//!
//! Exit arbitration within a bar is per strategy: each declares an
//! `ExitPriority` and the simulator takes the first satisfied check.

pub mod context;
pub mod donchian_breakout;
pub mod ema_crossover;
pub mod registry;
pub mod trend_pyramid;

use serde::{Deserialize, Serialize};

use crate::domain::{ParamSpec, ParameterSet, Position};
use crate::error::EngineError;

pub use context::{DecisionContext, RunContext};
pub use donchian_breakout::DonchianBreakout;
pub use ema_crossover::EmaCrossover;
pub use registry::{RegistryEntry, StrategyRegistry};
pub use trend_pyramid::TrendPyramid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    Hold,
    Enter,
    Exit,
    AddPyramid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub signal: Signal,
    pub reason: String,
}

impl Decision {
    pub fn hold() -> Self {
        Self {
            signal: Signal::Hold,
            reason: String::new(),
        }
    }

    pub fn enter(reason: impl Into<String>) -> Self {
        Self {
            signal: Signal::Enter,
            reason: reason.into(),
        }
    }

    pub fn exit(reason: impl Into<String>) -> Self {
        Self {
            signal: Signal::Exit,
            reason: reason.into(),
        }
    }

    pub fn add_pyramid(reason: impl Into<String>) -> Self {
        Self {
            signal: Signal::AddPyramid,
            reason: reason.into(),
        }
    }

    pub fn is_hold(&self) -> bool {
        self.signal == Signal::Hold
    }
}

/// One of the three exit conditions arbitrated within a bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitCheck {
    StopLoss,
    SignalExit,
    TakeProfit,
}

/// Evaluation order of exit checks; the first satisfied one wins the bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitPriority([ExitCheck; 3]);

impl ExitPriority {
    pub const STOP_SIGNAL_TARGET: Self = Self([
        ExitCheck::StopLoss,
        ExitCheck::SignalExit,
        ExitCheck::TakeProfit,
    ]);
    pub const SIGNAL_STOP_TARGET: Self = Self([
        ExitCheck::SignalExit,
        ExitCheck::StopLoss,
        ExitCheck::TakeProfit,
    ]);
    pub const STOP_TARGET_SIGNAL: Self = Self([
        ExitCheck::StopLoss,
        ExitCheck::TakeProfit,
        ExitCheck::SignalExit,
    ]);

    /// Any permutation of the three checks.
    pub fn new(order: [ExitCheck; 3]) -> Result<Self, EngineError> {
        let distinct = order[0] != order[1] && order[0] != order[2] && order[1] != order[2];
        if !distinct {
            return Err(EngineError::invalid_parameter(
                "exit_priority",
                "each exit check must appear exactly once",
            ));
        }
        Ok(Self(order))
    }

    /// Decode the `exit_priority` strategy parameter.
    pub fn from_code(code: i64) -> Result<Self, EngineError> {
        match code {
            0 => Ok(Self::STOP_SIGNAL_TARGET),
            1 => Ok(Self::SIGNAL_STOP_TARGET),
            2 => Ok(Self::STOP_TARGET_SIGNAL),
            other => Err(EngineError::invalid_parameter(
                "exit_priority",
                format!("unknown code {other}"),
            )),
        }
    }

    pub fn checks(&self) -> &[ExitCheck; 3] {
        &self.0
    }
}

impl Default for ExitPriority {
    fn default() -> Self {
        Self::STOP_SIGNAL_TARGET
    }
}

/// Stop and target set on an entry fill.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ProtectiveLevels {
    pub stop: Option<f64>,
    pub take_profit: Option<f64>,
}

pub trait Strategy: Send {
    /// Registry identifier (e.g., "ema_crossover").
    fn id(&self) -> &str;

    /// Bind to one run: read parameters, register indicators, check
    /// cross-parameter constraints.
    fn init(&mut self, ctx: &mut RunContext<'_>) -> Result<(), EngineError>;

    /// Signal for bar `ctx.cursor()`. Unavailable indicators mean `Hold`.
    fn decide(&self, ctx: &DecisionContext<'_>, position: &Position) -> Result<Decision, EngineError>;

    /// Stop/target for an entry filled at `fill_price` on bar `ctx.cursor()`.
    fn protective_levels(
        &self,
        _ctx: &DecisionContext<'_>,
        _fill_price: f64,
    ) -> Result<ProtectiveLevels, EngineError> {
        Ok(ProtectiveLevels::default())
    }

    /// Candidate trailing stop for bar `ctx.cursor()`. The simulator ratchets,
    /// so returning a looser level is harmless.
    fn trail_stop(
        &self,
        _ctx: &DecisionContext<'_>,
        _position: &Position,
    ) -> Result<Option<f64>, EngineError> {
        Ok(None)
    }

    fn max_pyramid_levels(&self) -> u32 {
        0
    }

    fn exit_priority(&self) -> ExitPriority {
        ExitPriority::default()
    }
}

/// Shared `exit_priority` parameter declaration.
pub fn exit_priority_spec() -> ParamSpec {
    ParamSpec::int("exit_priority", 0, 0, 2)
}

pub(crate) fn read_exit_priority(params: &ParameterSet) -> Result<ExitPriority, EngineError> {
    ExitPriority::from_code(params.get_int("exit_priority")?)
}

/// Stop `mult` ATRs below `price`; `None` when disabled or ATR unavailable.
pub(crate) fn atr_offset(price: f64, atr: Option<f64>, mult: f64) -> Option<f64> {
    if mult <= 0.0 {
        return None;
    }
    atr.map(|a| price - mult * a)
}

/// Target `pct` percent above `price`; `None` when disabled.
pub(crate) fn pct_target(price: f64, pct: f64) -> Option<f64> {
    (pct > 0.0).then(|| price * (1.0 + pct / 100.0))
}
