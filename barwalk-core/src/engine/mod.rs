//! Backtesting engine: the bar-by-bar execution state machine.
//!
//! For each bar `i` the loop runs, in order:
//!
//! 1. Budget check (cancellation / deadline).
//! 2. Bar sanity: a malformed bar is flagged and skipped entirely.
//! 3. Trailing stop update from data `< i` (ratchet, tighten only).
//! 4. Strategy decision from data `< i`.
//! 5. Open-of-bar fills: entry, or pyramid addition.
//! 6. Excursion update with the bar's low/high.
//! 7. Exit arbitration in the strategy's priority order (stop / signal / target).
//! 8. Equity mark at the close.
//!
//! A decision made after the final bar can never fill; it is reported as a
//! pending order.

pub mod budget;
pub mod execution;
pub mod sizing;

use chrono::NaiveDate;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::domain::{
    Bar, BarSeries, ExitKind, Fill, FillId, FillKind, FillSide, Lot, ParameterSet, Position,
};
use crate::error::EngineError;
use crate::ledger::{ExitSnapshot, LedgerWindow, TradeLedger};
use crate::strategy::{Decision, DecisionContext, ExitCheck, RunContext, Signal, Strategy};

pub use budget::RunBudget;
pub use execution::{resolve_exit, stop_fill_price, target_fill_price, CostModel, ExitResolution};
pub use sizing::{FixedQuantity, PercentOfEquity, PositionSizer, SizingConfig};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub initial_capital: f64,
    pub costs: CostModel,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            initial_capital: 100_000.0,
            costs: CostModel::frictionless(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub date: NaiveDate,
    pub equity: f64,
}

/// Bar skipped because its OHLC values are inconsistent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlaggedBar {
    pub index: usize,
    pub date: NaiveDate,
    pub reason: String,
}

impl FlaggedBar {
    pub fn to_error(&self) -> EngineError {
        EngineError::Execution {
            index: self.index,
            date: self.date,
            reason: self.reason.clone(),
        }
    }
}

/// Decision computed after the last bar; there is no bar to fill it on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingOrder {
    pub signal: Signal,
    pub reason: String,
    pub decided_after: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOutput {
    pub symbol: String,
    pub strategy: String,
    pub params: ParameterSet,
    pub ledger: TradeLedger,
    pub equity: Vec<EquityPoint>,
    pub flagged_bars: Vec<FlaggedBar>,
    pub pending: Option<PendingOrder>,
    pub bar_count: usize,
    pub indicator_computations: usize,
}

impl RunOutput {
    /// Closed trades plus the open one marked at the last bar.
    pub fn trades(&self, bars: &[Bar]) -> Vec<crate::domain::Trade> {
        self.ledger.all_trades(bars)
    }

    pub fn trades_in(&self, window: LedgerWindow, bars: &[Bar]) -> Vec<crate::domain::Trade> {
        self.ledger.query(window, bars)
    }

    pub fn final_equity(&self) -> Option<f64> {
        self.equity.last().map(|p| p.equity)
    }
}

/// Per-run mutable state. Never shared: one instance per run.
struct Simulation<'a> {
    bars: &'a [Bar],
    config: &'a EngineConfig,
    sizer: &'a dyn PositionSizer,
    position: Position,
    ledger: TradeLedger,
    cash: f64,
}

impl<'a> Simulation<'a> {
    fn equity_at(&self, price: f64) -> f64 {
        self.cash + self.position.market_value(price)
    }

    fn fill(&mut self, index: usize, side: FillSide, kind: FillKind, price: f64, quantity: u64) -> (FillId, f64, f64) {
        let costs = &self.config.costs;
        let slippage = costs.slippage(quantity);
        let commission = costs.commission(price, quantity);
        let notional = price * quantity as f64;
        match side {
            FillSide::Buy => self.cash -= notional + slippage + commission,
            FillSide::Sell => self.cash += notional - slippage - commission,
        }
        let id = self.ledger.record_fill(Fill {
            id: FillId(0),
            bar_index: index,
            date: self.bars[index].date,
            side,
            kind,
            price,
            quantity,
            slippage,
            commission,
        });
        (id, slippage, commission)
    }

    fn enter(
        &mut self,
        strategy: &dyn Strategy,
        ctx: &DecisionContext<'_>,
        decision: &Decision,
    ) -> Result<(), EngineError> {
        let index = ctx.cursor();
        let bars = self.bars;
        let bar = &bars[index];
        let quantity = self
            .sizer
            .size(self.cash, self.config.costs.unit_cost(bar.open));
        if quantity == 0 {
            debug!("{}: sizer returned 0 at bar {index}, entry skipped", self.ledger.symbol());
            return Ok(());
        }
        let (fill, slippage, commission) = self.fill(index, FillSide::Buy, FillKind::Entry, bar.open, quantity);
        self.position.open(
            Lot {
                fill,
                bar_index: index,
                price: bar.open,
                quantity,
            },
            bar.date,
            decision.reason.clone(),
            commission,
            slippage,
        );
        let levels = strategy.protective_levels(ctx, bar.open)?;
        self.position.stop_price = levels.stop.filter(|s| s.is_finite());
        self.position.initial_stop = self.position.stop_price;
        self.position.take_profit_price = levels.take_profit.filter(|t| t.is_finite());
        Ok(())
    }

    fn add_pyramid(&mut self, strategy: &dyn Strategy, index: usize) {
        let max = strategy.max_pyramid_levels();
        if self.position.pyramid_level >= max {
            debug!(
                "{}: pyramid signal at bar {index} ignored, already at level {max}",
                self.ledger.symbol()
            );
            return;
        }
        let bars = self.bars;
        let bar = &bars[index];
        let quantity = self
            .sizer
            .size(self.cash, self.config.costs.unit_cost(bar.open));
        if quantity == 0 {
            debug!("{}: sizer returned 0 for pyramid at bar {index}", self.ledger.symbol());
            return;
        }
        let (fill, slippage, commission) = self.fill(index, FillSide::Buy, FillKind::Pyramid, bar.open, quantity);
        self.position.add_lot(
            Lot {
                fill,
                bar_index: index,
                price: bar.open,
                quantity,
            },
            commission,
            slippage,
        );
    }

    fn exit(&mut self, index: usize, resolution: ExitResolution, signal_reason: &str) {
        let (kind, fill_kind, reason) = match resolution.check {
            ExitCheck::StopLoss => (
                ExitKind::StopLoss,
                FillKind::StopLoss,
                format!("stop at {:.4}", self.position.stop_price.unwrap_or(resolution.price)),
            ),
            ExitCheck::TakeProfit => (
                ExitKind::TakeProfit,
                FillKind::TakeProfit,
                format!(
                    "target at {:.4}",
                    self.position.take_profit_price.unwrap_or(resolution.price)
                ),
            ),
            ExitCheck::SignalExit => (ExitKind::SignalExit, FillKind::SignalExit, signal_reason.to_string()),
        };
        let quantity = self.position.quantity;
        let (fill, slippage, commission) = self.fill(index, FillSide::Sell, fill_kind, resolution.price, quantity);
        let snapshot = ExitSnapshot {
            index,
            date: self.bars[index].date,
            price: resolution.price,
            commission,
            slippage,
            kind,
            reason,
            fill: Some(fill),
        };
        self.ledger.close(&self.position, snapshot);
        self.position.reset();
    }
}

/// Run one strategy over one series.
///
/// `strategy` must be fresh from the registry (or otherwise uninitialized);
/// it is bound to this run by `init` and should not be reused afterwards.
pub fn run_backtest(
    series: &BarSeries,
    strategy: &mut dyn Strategy,
    params: &ParameterSet,
    config: &EngineConfig,
    sizer: &dyn PositionSizer,
    budget: RunBudget<'_>,
) -> Result<RunOutput, EngineError> {
    let bars = series.bars();
    if bars.is_empty() {
        return Err(EngineError::DataInsufficient {
            context: format!("{} backtest", series.symbol()),
            required: 1,
            available: 0,
        });
    }

    let indicator_computations = {
        let mut run_ctx = RunContext::new(series, params);
        strategy.init(&mut run_ctx)?;
        run_ctx.cache.computations()
    };
    let priority = strategy.exit_priority();

    let mut sim = Simulation {
        bars,
        config,
        sizer,
        position: Position::flat(series.symbol()),
        ledger: TradeLedger::new(series.symbol()),
        cash: config.initial_capital,
    };
    let mut equity = Vec::with_capacity(bars.len());
    let mut flagged_bars = Vec::new();
    let mut last_mark = config.initial_capital;

    for (i, bar) in bars.iter().enumerate() {
        budget.check(i)?;

        if let Some(reason) = bar.defect() {
            warn!("{}: skipping malformed bar {i} ({}): {reason}", series.symbol(), bar.date);
            flagged_bars.push(FlaggedBar {
                index: i,
                date: bar.date,
                reason,
            });
            equity.push(EquityPoint {
                date: bar.date,
                equity: last_mark,
            });
            continue;
        }

        let ctx = DecisionContext::new(bars, i);
        let mut signal_exit: Option<String> = None;

        if i > 0 {
            if sim.position.is_open() {
                if let Some(level) = strategy.trail_stop(&ctx, &sim.position)? {
                    sim.position.ratchet_stop(level);
                }
            }

            let decision = strategy.decide(&ctx, &sim.position)?;
            match (decision.signal, sim.position.is_open()) {
                (Signal::Hold, _) => {}
                (Signal::Enter, false) => sim.enter(&*strategy, &ctx, &decision)?,
                (Signal::Exit, true) => signal_exit = Some(decision.reason),
                (Signal::AddPyramid, true) => sim.add_pyramid(&*strategy, i),
                (signal, open) => {
                    debug!(
                        "{}: {signal:?} at bar {i} ignored (position open: {open})",
                        series.symbol()
                    );
                }
            }
        }

        if sim.position.is_open() {
            sim.position.mark_excursion(bar.low, bar.high);
            let resolution = resolve_exit(
                priority,
                bar,
                sim.position.stop_price,
                sim.position.take_profit_price,
                signal_exit.is_some(),
            );
            if let Some(resolution) = resolution {
                sim.exit(i, resolution, signal_exit.as_deref().unwrap_or_default());
            }
        }

        last_mark = sim.equity_at(bar.close);
        equity.push(EquityPoint {
            date: bar.date,
            equity: last_mark,
        });
    }

    let after_last = DecisionContext::new(bars, bars.len());
    let final_decision = strategy.decide(&after_last, &sim.position)?;
    let actionable = match final_decision.signal {
        Signal::Hold => false,
        Signal::Enter => sim.position.is_flat(),
        Signal::Exit | Signal::AddPyramid => sim.position.is_open(),
    };
    let pending = actionable
        .then(|| {
            series.last_date().map(|date| PendingOrder {
                signal: final_decision.signal,
                reason: final_decision.reason.clone(),
                decided_after: date,
            })
        })
        .flatten();

    let Simulation {
        position,
        mut ledger,
        ..
    } = sim;
    ledger.set_open_position(Some(position));

    Ok(RunOutput {
        symbol: series.symbol().to_string(),
        strategy: strategy.id().to_string(),
        params: params.clone(),
        ledger,
        equity,
        flagged_bars,
        pending,
        bar_count: bars.len(),
        indicator_computations,
    })
}
