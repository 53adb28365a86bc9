//! Backtest runner: wires together the strategy registry, engine, and metrics.
//!
//! Two entry points:
//! - `Runner::run()`: a bound `ParameterSet` over a pre-loaded series. Used by
//!   the walk-forward optimizer for every candidate.
//! - `Runner::run_with_overrides()`: binds raw overrides against the
//!   strategy's schema first. Used by basket runs.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use barwalk_core::engine::{EquityPoint, FlaggedBar, PendingOrder, SizingConfig};
use barwalk_core::{
    ledger_fingerprint, run_backtest, BarSeries, EngineConfig, EngineError, LedgerHash,
    ParamValue, ParameterSet, RunBudget, StrategyRegistry, Trade, TradeLedger,
};

use crate::config::RunSettings;
use crate::metrics::PortfolioMetrics;

/// Complete result of a single backtest run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestResult {
    pub symbol: String,
    pub strategy: String,
    pub params: ParameterSet,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub metrics: PortfolioMetrics,
    /// Closed trades plus the open trade marked at the last bar.
    pub trades: Vec<Trade>,
    pub ledger_hash: LedgerHash,
    pub equity: Vec<EquityPoint>,
    pub ledger: TradeLedger,
    pub flagged_bars: Vec<FlaggedBar>,
    pub pending: Option<PendingOrder>,
    pub bar_count: usize,
}

impl BacktestResult {
    pub fn equity_values(&self) -> Vec<f64> {
        self.equity.iter().map(|p| p.equity).collect()
    }
}

/// Stateless run factory. Cheap to clone; safe to share across rayon workers.
#[derive(Clone)]
pub struct Runner {
    registry: StrategyRegistry,
    engine: EngineConfig,
    sizing: SizingConfig,
}

impl Runner {
    pub fn new(registry: StrategyRegistry, engine: EngineConfig, sizing: SizingConfig) -> Self {
        Self {
            registry,
            engine,
            sizing,
        }
    }

    pub fn from_settings(settings: &RunSettings) -> Self {
        Self::new(StrategyRegistry::builtin(), settings.engine, settings.sizing)
    }

    pub fn registry(&self) -> &StrategyRegistry {
        &self.registry
    }

    pub fn engine(&self) -> &EngineConfig {
        &self.engine
    }

    /// Run `strategy_id` with already-bound parameters over `series`.
    ///
    /// A fresh strategy instance, indicator cache and sizer are created for
    /// every call; nothing is carried between runs.
    pub fn run(
        &self,
        series: &BarSeries,
        strategy_id: &str,
        params: &ParameterSet,
        budget: RunBudget<'_>,
    ) -> Result<BacktestResult, EngineError> {
        let mut strategy = self.registry.create(strategy_id)?;
        let sizer = self.sizing.build();
        let output = run_backtest(
            series,
            strategy.as_mut(),
            params,
            &self.engine,
            sizer.as_ref(),
            budget,
        )?;

        let bars = series.bars();
        let trades = output.trades(bars);
        let equity: Vec<f64> = output.equity.iter().map(|p| p.equity).collect();
        let metrics = PortfolioMetrics::compute(&equity, &trades);
        let (start, end) = match (series.first_date(), series.last_date()) {
            (Some(s), Some(e)) => (s, e),
            _ => {
                return Err(EngineError::DataInsufficient {
                    context: format!("{} backtest", series.symbol()),
                    required: 1,
                    available: 0,
                })
            }
        };

        Ok(BacktestResult {
            symbol: output.symbol,
            strategy: output.strategy,
            params: output.params,
            start,
            end,
            metrics,
            ledger_hash: ledger_fingerprint(&trades),
            trades,
            equity: output.equity,
            ledger: output.ledger,
            flagged_bars: output.flagged_bars,
            pending: output.pending,
            bar_count: output.bar_count,
        })
    }

    pub fn run_with_overrides(
        &self,
        series: &BarSeries,
        strategy_id: &str,
        overrides: &BTreeMap<String, ParamValue>,
        budget: RunBudget<'_>,
    ) -> Result<BacktestResult, EngineError> {
        let params = self.registry.bind(strategy_id, overrides)?;
        self.run(series, strategy_id, &params, budget)
    }
}
