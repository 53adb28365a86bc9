//! Basket runs: one strategy over many symbols, in parallel.
//!
//! Each symbol is an independent unit: it loads its own bars, gets its own
//! deadline, and either produces a result or a skip entry. A unit that fails
//! never affects its siblings; only a lookahead violation stops the basket.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::AtomicBool;
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use log::{info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use barwalk_core::{EngineError, MarketDataLoader, ParamValue, RunBudget};

use crate::config::RunSettings;
use crate::grid::ParamGrid;
use crate::runner::{BacktestResult, Runner};
use crate::skip::SkipReason;
use crate::walk_forward::{WalkForwardConfig, WalkForwardError, WalkForwardOptimizer, WalkForwardReport};

#[derive(Debug, Error)]
pub enum BasketError {
    #[error("invalid basket request: {0}")]
    Invalid(String),

    #[error("basket setup failed: {0}")]
    Setup(#[from] EngineError),

    #[error("basket halted on {symbol}: {source}")]
    Halted {
        symbol: String,
        #[source]
        source: EngineError,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum BasketMode {
    Backtest,
    WalkForward {
        config: WalkForwardConfig,
        grid: ParamGrid,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BasketRequest {
    pub symbols: Vec<String>,
    pub start: NaiveDate,
    /// Inclusive.
    pub end: NaiveDate,
    pub strategy_id: String,
    pub params: BTreeMap<String, ParamValue>,
    pub mode: BasketMode,
    /// Wall-clock budget per symbol, measured from when that symbol starts.
    pub timeout: Option<Duration>,
}

impl BasketRequest {
    /// `None` when the settings carry no `[basket]` table. Walk-forward mode
    /// is chosen when `[walk_forward]` is present.
    pub fn from_settings(settings: &RunSettings) -> Option<Self> {
        let basket = settings.basket.as_ref()?;
        let mode = match settings.walk_forward {
            Some(config) => BasketMode::WalkForward {
                config,
                grid: settings.param_grid(),
            },
            None => BasketMode::Backtest,
        };
        Some(Self {
            symbols: basket.symbols.clone(),
            start: basket.start,
            end: basket.end,
            strategy_id: settings.strategy.id.clone(),
            params: settings.strategy.params.clone(),
            mode,
            timeout: basket.timeout_secs.map(Duration::from_secs),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SymbolOutcome {
    Backtest(Box<BacktestResult>),
    WalkForward(Box<WalkForwardReport>),
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SkippedSymbol {
    pub symbol: String,
    pub reason: String,
    pub detail: String,
}

impl SkippedSymbol {
    fn new(symbol: &str, reason: &SkipReason) -> Self {
        Self {
            symbol: symbol.to_string(),
            reason: reason.as_str().to_string(),
            detail: reason.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BasketReport {
    pub results: BTreeMap<String, SymbolOutcome>,
    /// Sorted by symbol.
    pub skipped: Vec<SkippedSymbol>,
}

enum UnitOutcome {
    Done(SymbolOutcome),
    Skipped(SkipReason),
}

pub struct BasketRunner<'a> {
    runner: &'a Runner,
    loader: &'a dyn MarketDataLoader,
    cancel: Option<&'a AtomicBool>,
}

impl<'a> BasketRunner<'a> {
    pub fn new(runner: &'a Runner, loader: &'a dyn MarketDataLoader) -> Self {
        Self {
            runner,
            loader,
            cancel: None,
        }
    }

    /// Flag checked every bar by every symbol still running.
    pub fn with_cancel(mut self, flag: &'a AtomicBool) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn run(&self, request: &BasketRequest) -> Result<BasketReport, BasketError> {
        if request.end < request.start {
            return Err(BasketError::Invalid(format!(
                "end {} is before start {}",
                request.end, request.start
            )));
        }
        if let BasketMode::WalkForward { config, .. } = &request.mode {
            config
                .validate()
                .map_err(|e| BasketError::Invalid(e.to_string()))?;
        }
        // Unknown strategies fail the whole basket, not each symbol.
        self.runner.registry().schema(&request.strategy_id)?;

        let symbols: BTreeSet<&str> = request.symbols.iter().map(String::as_str).collect();
        let outcomes = symbols
            .par_iter()
            .map(|&symbol| {
                self.run_symbol(symbol, request)
                    .map(|outcome| (symbol, outcome))
                    .map_err(|source| BasketError::Halted {
                        symbol: symbol.to_string(),
                        source,
                    })
            })
            .collect::<Result<Vec<_>, BasketError>>()?;

        let mut report = BasketReport::default();
        for (symbol, outcome) in outcomes {
            match outcome {
                UnitOutcome::Done(result) => {
                    report.results.insert(symbol.to_string(), result);
                }
                UnitOutcome::Skipped(reason) => {
                    warn!("{symbol}: skipped ({reason})");
                    report.skipped.push(SkippedSymbol::new(symbol, &reason));
                }
            }
        }
        report.skipped.sort();
        info!(
            "basket complete: {} ok, {} skipped",
            report.results.len(),
            report.skipped.len()
        );
        Ok(report)
    }

    /// `Err` only for errors that must halt the basket.
    fn run_symbol(&self, symbol: &str, request: &BasketRequest) -> Result<UnitOutcome, EngineError> {
        let mut budget = RunBudget::unlimited();
        if let Some(flag) = self.cancel {
            budget = budget.with_cancel(flag);
        }
        if let Some(timeout) = request.timeout {
            budget = budget.with_deadline(Instant::now() + timeout);
        }

        let series = match self.loader.load(symbol, request.start, request.end) {
            Ok(series) => series,
            Err(e) => return Ok(UnitOutcome::Skipped(SkipReason::from(&e))),
        };

        match &request.mode {
            BasketMode::Backtest => {
                match self
                    .runner
                    .run_with_overrides(&series, &request.strategy_id, &request.params, budget)
                {
                    Ok(result) => Ok(UnitOutcome::Done(SymbolOutcome::Backtest(Box::new(result)))),
                    Err(e) if e.is_fatal() => Err(e),
                    Err(e) => Ok(UnitOutcome::Skipped(SkipReason::from(&e))),
                }
            }
            BasketMode::WalkForward { config, grid } => {
                let optimizer = WalkForwardOptimizer::new(self.runner, *config);
                match optimizer.optimize(&series, &request.strategy_id, &request.params, grid, budget)
                {
                    Ok(report) => Ok(UnitOutcome::Done(SymbolOutcome::WalkForward(Box::new(
                        report,
                    )))),
                    Err(WalkForwardError::Engine { source }) if source.is_fatal() => Err(source),
                    Err(WalkForwardError::Engine { source }) => {
                        Ok(UnitOutcome::Skipped(SkipReason::from(&source)))
                    }
                    Err(WalkForwardError::InvalidConfig(message)) => {
                        Ok(UnitOutcome::Skipped(SkipReason::Failed {
                            tag: "invalid_config".into(),
                            message,
                        }))
                    }
                }
            }
        }
    }
}
