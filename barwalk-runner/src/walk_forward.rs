//! Walk-forward optimization: rolling train/test periods and OOS evaluation.
//!
//! The series is tiled into calendar periods: `train_years` of in-sample data
//! followed by `test_years` of out-of-sample data, advancing by `step_years`.
//! In each period every grid candidate is scored on the train slice, the best
//! is re-run once on the test slice, and its test metrics and ledger are kept.
//!
//! Both slices are run independently, so indicator warm-up happens inside
//! each window and no train-window state reaches the test run.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use chrono::{Months, NaiveDate};
use log::{info, warn};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use barwalk_core::{
    ledger_fingerprint, BarSeries, EngineError, LedgerHash, ParamValue, ParameterSet, RunBudget,
    Trade, TradeLedger,
};

use crate::grid::{Candidate, ParamGrid, RejectedCandidate};
use crate::metrics::{mean_f64, std_dev, PortfolioMetrics};
use crate::runner::Runner;
use crate::skip::SkipReason;

// ─── Configuration ───────────────────────────────────────────────────

/// Calendar split for walk-forward periods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WalkForwardConfig {
    pub train_years: u32,
    pub test_years: u32,
    /// Must be at least `test_years` so test windows never overlap.
    pub step_years: u32,
    /// Minimum bars in a train window.
    pub min_train_days: usize,
    /// Minimum bars in a test window.
    pub min_test_days: usize,
}

impl Default for WalkForwardConfig {
    fn default() -> Self {
        Self {
            train_years: 3,
            test_years: 1,
            step_years: 1,
            min_train_days: 252,
            min_test_days: 63,
        }
    }
}

impl WalkForwardConfig {
    pub fn validate(&self) -> Result<(), WalkForwardError> {
        if self.train_years == 0 || self.test_years == 0 || self.step_years == 0 {
            return Err(WalkForwardError::InvalidConfig(
                "train_years, test_years and step_years must be positive".into(),
            ));
        }
        if self.step_years < self.test_years {
            return Err(WalkForwardError::InvalidConfig(format!(
                "step_years ({}) must be >= test_years ({})",
                self.step_years, self.test_years
            )));
        }
        if self.min_train_days == 0 || self.min_test_days == 0 {
            return Err(WalkForwardError::InvalidConfig(
                "min_train_days and min_test_days must be positive".into(),
            ));
        }
        Ok(())
    }
}

// ─── Errors ──────────────────────────────────────────────────────────

/// Only configuration problems and errors that must stop the whole
/// optimization surface here; everything else lands in a skip list.
#[derive(Debug, Error)]
pub enum WalkForwardError {
    #[error("invalid walk-forward config: {0}")]
    InvalidConfig(String),

    #[error("walk-forward aborted: {source}")]
    Engine {
        #[from]
        source: EngineError,
    },
}

impl WalkForwardError {
    /// Errors that stop the optimization instead of skipping one unit.
    fn aborts(err: &EngineError) -> bool {
        err.is_fatal()
            || matches!(
                err,
                EngineError::TimedOut { .. } | EngineError::Cancelled { .. }
            )
    }
}

// ─── Periods ─────────────────────────────────────────────────────────

/// One train/test split. End dates are exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalkForwardPeriod {
    pub index: usize,
    pub train_start: NaiveDate,
    pub train_end: NaiveDate,
    pub test_start: NaiveDate,
    pub test_end: NaiveDate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedPeriod {
    pub period: WalkForwardPeriod,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PeriodPlan {
    pub periods: Vec<WalkForwardPeriod>,
    pub skipped: Vec<SkippedPeriod>,
}

fn add_years(date: NaiveDate, years: u32) -> Option<NaiveDate> {
    date.checked_add_months(Months::new(years.checked_mul(12)?))
}

/// Tile `series` into walk-forward periods.
///
/// Generation stops at the first period whose test window reaches past the
/// last bar; if that trailing window is too short it is recorded as
/// `insufficient_data`. Interior periods that fail the bar minimums (data
/// gaps) are recorded the same way and generation continues.
pub fn generate_periods(
    series: &BarSeries,
    config: &WalkForwardConfig,
) -> Result<PeriodPlan, WalkForwardError> {
    config.validate()?;
    let mut plan = PeriodPlan::default();
    let (Some(first), Some(last)) = (series.first_date(), series.last_date()) else {
        return Ok(plan);
    };

    for index in 0u32.. {
        let Some(train_start) = index
            .checked_mul(config.step_years)
            .and_then(|years| add_years(first, years))
        else {
            break;
        };
        let (Some(train_end), Some(test_end)) = (
            add_years(train_start, config.train_years),
            config
                .train_years
                .checked_add(config.test_years)
                .and_then(|years| add_years(train_start, years)),
        ) else {
            break;
        };
        let test_start = train_end;
        if test_start > last {
            break;
        }

        let period = WalkForwardPeriod {
            index: index as usize,
            train_start,
            train_end,
            test_start,
            test_end,
        };
        let train_bars = series.index_range(train_start, train_end).len();
        let test_bars = series.index_range(test_start, test_end).len();

        if train_bars < config.min_train_days || test_bars < config.min_test_days {
            let detail = format!(
                "train {train_bars}/{} bars, test {test_bars}/{} bars",
                config.min_train_days, config.min_test_days
            );
            warn!(
                "{}: walk-forward period {index} skipped ({detail})",
                series.symbol()
            );
            plan.skipped.push(SkippedPeriod {
                period,
                reason: SkipReason::InsufficientData { detail },
            });
        } else {
            plan.periods.push(period);
        }

        if test_end > last {
            break;
        }
    }
    Ok(plan)
}

// ─── Results ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateRejection {
    pub index: usize,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationResult {
    pub period: WalkForwardPeriod,
    pub best_params: ParameterSet,
    /// Grid index of the winner.
    pub best_index: usize,
    pub train_score: f64,
    pub train_metrics: PortfolioMetrics,
    pub test_metrics: PortfolioMetrics,
    pub test_trades: Vec<Trade>,
    pub test_ledger: TradeLedger,
    pub test_ledger_hash: LedgerHash,
    pub candidates_evaluated: usize,
    pub candidates_rejected: Vec<CandidateRejection>,
}

/// Dispersion of out-of-sample results across periods.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct StabilityMetrics {
    pub mean_cagr_pct: f64,
    pub std_cagr_pct: f64,
    pub mean_sharpe: f64,
    pub std_sharpe: f64,
    /// Share of evaluated periods with a positive test return, in percent.
    pub pct_profitable: f64,
    pub periods_evaluated: usize,
    pub periods_skipped: usize,
}

impl StabilityMetrics {
    pub fn from_results(results: &[OptimizationResult], periods_skipped: usize) -> Self {
        let cagrs: Vec<f64> = results.iter().map(|r| r.test_metrics.cagr_pct).collect();
        let sharpes: Vec<f64> = results.iter().map(|r| r.test_metrics.sharpe).collect();
        let profitable = results
            .iter()
            .filter(|r| r.test_metrics.total_return_pct > 0.0)
            .count();
        let pct_profitable = if results.is_empty() {
            0.0
        } else {
            profitable as f64 / results.len() as f64 * 100.0
        };
        Self {
            mean_cagr_pct: mean_f64(&cagrs),
            std_cagr_pct: std_dev(&cagrs),
            mean_sharpe: mean_f64(&sharpes),
            std_sharpe: std_dev(&sharpes),
            pct_profitable,
            periods_evaluated: results.len(),
            periods_skipped,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalkForwardReport {
    pub symbol: String,
    pub strategy: String,
    pub config: WalkForwardConfig,
    /// Sorted by period index.
    pub results: Vec<OptimizationResult>,
    /// Sorted by period index.
    pub skipped: Vec<SkippedPeriod>,
    /// Grid combinations that failed parameter binding.
    pub grid_rejected: Vec<RejectedCandidate>,
    pub stability: StabilityMetrics,
}

enum PeriodOutcome {
    Evaluated(Box<OptimizationResult>),
    Skipped(SkippedPeriod),
}

struct Scored<'c> {
    candidate: &'c Candidate,
    score: f64,
    metrics: PortfolioMetrics,
}

/// Ordering where `Less` means "better": highest score, then shallower
/// drawdown, then fewer trades, then earlier grid position.
fn rank(a: &Scored<'_>, b: &Scored<'_>) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then(a.metrics.max_drawdown_pct.total_cmp(&b.metrics.max_drawdown_pct))
        .then(a.metrics.trade_count.cmp(&b.metrics.trade_count))
        .then(a.candidate.index.cmp(&b.candidate.index))
}

fn objective(metrics: &PortfolioMetrics) -> f64 {
    let score = metrics.composite_score();
    if score.is_finite() {
        score
    } else {
        f64::NEG_INFINITY
    }
}

// ─── Optimizer ───────────────────────────────────────────────────────

pub struct WalkForwardOptimizer<'r> {
    runner: &'r Runner,
    config: WalkForwardConfig,
}

impl<'r> WalkForwardOptimizer<'r> {
    pub fn new(runner: &'r Runner, config: WalkForwardConfig) -> Self {
        Self { runner, config }
    }

    /// Optimize `strategy_id` over `series`.
    ///
    /// `base` overrides apply to every candidate; grid axes override `base`.
    /// Periods and candidates run in parallel; output order depends only on
    /// period and grid indices.
    pub fn optimize(
        &self,
        series: &BarSeries,
        strategy_id: &str,
        base: &BTreeMap<String, ParamValue>,
        grid: &ParamGrid,
        budget: RunBudget<'_>,
    ) -> Result<WalkForwardReport, WalkForwardError> {
        let plan = generate_periods(series, &self.config)?;
        let schema = self.runner.registry().schema(strategy_id)?;
        let expansion = grid.expand(&schema, base);

        let outcomes = plan
            .periods
            .par_iter()
            .map(|period| self.run_period(series, strategy_id, period, &expansion.candidates, budget))
            .collect::<Result<Vec<_>, WalkForwardError>>()?;

        let mut results = Vec::new();
        let mut skipped = plan.skipped;
        for outcome in outcomes {
            match outcome {
                PeriodOutcome::Evaluated(result) => results.push(*result),
                PeriodOutcome::Skipped(skip) => skipped.push(skip),
            }
        }
        skipped.sort_by_key(|s| s.period.index);

        let stability = StabilityMetrics::from_results(&results, skipped.len());
        Ok(WalkForwardReport {
            symbol: series.symbol().to_string(),
            strategy: strategy_id.to_string(),
            config: self.config,
            results,
            skipped,
            grid_rejected: expansion.rejected,
            stability,
        })
    }

    fn run_period(
        &self,
        series: &BarSeries,
        strategy_id: &str,
        period: &WalkForwardPeriod,
        candidates: &[Candidate],
        budget: RunBudget<'_>,
    ) -> Result<PeriodOutcome, WalkForwardError> {
        let train = series.slice(series.index_range(period.train_start, period.train_end));
        let test = series.slice(series.index_range(period.test_start, period.test_end));

        let runs: Vec<_> = candidates
            .par_iter()
            .map(|c| (c, self.runner.run(&train, strategy_id, &c.params, budget)))
            .collect();

        let mut scored = Vec::with_capacity(runs.len());
        let mut rejected = Vec::new();
        for (candidate, run) in runs {
            match run {
                Ok(result) => scored.push(Scored {
                    candidate,
                    score: objective(&result.metrics),
                    metrics: result.metrics,
                }),
                Err(e) if WalkForwardError::aborts(&e) => return Err(e.into()),
                Err(e) => rejected.push(CandidateRejection {
                    index: candidate.index,
                    reason: SkipReason::from(&e),
                }),
            }
        }

        let Some(best) = scored.iter().min_by(|a, b| rank(a, b)) else {
            warn!(
                "{}: walk-forward period {} has no valid candidates",
                series.symbol(),
                period.index
            );
            return Ok(PeriodOutcome::Skipped(SkippedPeriod {
                period: *period,
                reason: SkipReason::NoValidCandidates,
            }));
        };
        info!(
            "{}: period {} selected [{}] score {:.4} ({} of {} candidates valid)",
            series.symbol(),
            period.index,
            best.candidate.params,
            best.score,
            scored.len(),
            candidates.len()
        );

        let test_run = match self
            .runner
            .run(&test, strategy_id, &best.candidate.params, budget)
        {
            Ok(run) => run,
            Err(e) if WalkForwardError::aborts(&e) => return Err(e.into()),
            Err(e) => {
                warn!(
                    "{}: walk-forward period {} test run failed: {e}",
                    series.symbol(),
                    period.index
                );
                return Ok(PeriodOutcome::Skipped(SkippedPeriod {
                    period: *period,
                    reason: SkipReason::from(&e),
                }));
            }
        };

        Ok(PeriodOutcome::Evaluated(Box::new(OptimizationResult {
            period: *period,
            best_params: best.candidate.params.clone(),
            best_index: best.candidate.index,
            train_score: best.score,
            train_metrics: best.metrics,
            test_metrics: test_run.metrics,
            test_ledger_hash: ledger_fingerprint(&test_run.trades),
            test_trades: test_run.trades,
            test_ledger: test_run.ledger,
            candidates_evaluated: scored.len(),
            candidates_rejected: rejected,
        })))
    }
}
