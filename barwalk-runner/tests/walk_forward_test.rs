//! Walk-forward integration tests: period tiling, candidate selection,
//! rejection bookkeeping and out-of-sample isolation on synthetic data.

use std::collections::BTreeMap;
use std::sync::atomic::AtomicBool;

use chrono::{Months, NaiveDate};

use barwalk_core::data::{random_walk, SyntheticSpec};
use barwalk_core::engine::SizingConfig;
use barwalk_core::{BarSeries, EngineConfig, EngineError, ParamValue, RunBudget, StrategyRegistry};
use barwalk_runner::{
    generate_periods, ParamGrid, Runner, SkipReason, WalkForwardConfig, WalkForwardError,
    WalkForwardOptimizer,
};

fn series(symbol: &str, bars: usize, seed: u64) -> BarSeries {
    let start = NaiveDate::from_ymd_opt(2012, 1, 2).unwrap();
    BarSeries::new(symbol, random_walk(&SyntheticSpec::new(symbol, start, bars, seed))).unwrap()
}

fn runner() -> Runner {
    Runner::new(
        StrategyRegistry::builtin(),
        EngineConfig::default(),
        SizingConfig::default(),
    )
}

fn config() -> WalkForwardConfig {
    WalkForwardConfig {
        train_years: 2,
        test_years: 1,
        step_years: 1,
        min_train_days: 252,
        min_test_days: 63,
    }
}

fn ema_grid() -> ParamGrid {
    ParamGrid::default()
        .axis(
            "fast_period",
            vec![ParamValue::Int(5), ParamValue::Int(10), ParamValue::Int(40)],
        )
        .axis("slow_period", vec![ParamValue::Int(20), ParamValue::Int(30)])
}

// ── Tiling ──

#[test]
fn test_windows_advance_by_step_and_never_overlap() {
    let s = series("TILE", 3200, 1);
    let cfg = WalkForwardConfig {
        step_years: 2,
        ..config()
    };
    let plan = generate_periods(&s, &cfg).unwrap();
    assert!(plan.periods.len() >= 3, "got {} periods", plan.periods.len());
    for pair in plan.periods.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        assert!(a.test_end <= b.test_start, "{a:?} overlaps {b:?}");
        assert_eq!(a.test_start.checked_add_months(Months::new(24)), Some(b.test_start));
        assert_eq!(a.index + 1, b.index);
    }
}

// ── Optimization ──

#[test]
fn one_result_per_period_with_rejections_recorded() {
    let s = series("OPT", 1600, 2);
    let runner = runner();
    let grid = ema_grid().axis("atr_period", vec![ParamValue::Int(14), ParamValue::Int(1)]);
    let report = WalkForwardOptimizer::new(&runner, config())
        .optimize(&s, "ema_crossover", &BTreeMap::new(), &grid, RunBudget::unlimited())
        .unwrap();

    let plan = generate_periods(&s, &config()).unwrap();
    assert_eq!(report.results.len() + report.skipped.len(), plan.periods.len() + plan.skipped.len());
    assert!(!report.results.is_empty());

    // atr_period = 1 is out of range: rejected at binding, once per combination.
    assert_eq!(report.grid_rejected.len(), 6);
    for r in &report.results {
        // fast 40 >= slow 20/30 is rejected by the strategy on every period.
        assert_eq!(r.candidates_evaluated, 4);
        assert_eq!(r.candidates_rejected.len(), 2);
        for rej in &r.candidates_rejected {
            match &rej.reason {
                SkipReason::Failed { tag, .. } => assert_eq!(tag, "invalid_parameter"),
                other => panic!("unexpected rejection {other:?}"),
            }
        }
        let fast = r.best_params.get("fast_period");
        assert!(matches!(fast, Some(ParamValue::Int(5)) | Some(ParamValue::Int(10))));
    }
    assert_eq!(report.stability.periods_evaluated, report.results.len());
}

#[test]
fn winner_has_the_highest_train_score() {
    let s = series("SEL", 1300, 3);
    let runner = runner();
    let report = WalkForwardOptimizer::new(&runner, config())
        .optimize(&s, "ema_crossover", &BTreeMap::new(), &ema_grid(), RunBudget::unlimited())
        .unwrap();
    let schema = runner.registry().schema("ema_crossover").unwrap();
    let expansion = ema_grid().expand(&schema, &BTreeMap::new());

    for r in &report.results {
        let train = s.slice(s.index_range(r.period.train_start, r.period.train_end));
        for c in &expansion.candidates {
            let Ok(run) = runner.run(&train, "ema_crossover", &c.params, RunBudget::unlimited())
            else {
                continue;
            };
            let score = run.metrics.composite_score();
            assert!(
                score <= r.train_score,
                "candidate {} scored {score} above winner {}",
                c.index,
                r.train_score
            );
        }
    }
}

#[test]
fn test_trades_stay_inside_the_test_window() {
    let s = series("OOS", 1600, 4);
    let runner = runner();
    let report = WalkForwardOptimizer::new(&runner, config())
        .optimize(&s, "ema_crossover", &BTreeMap::new(), &ema_grid(), RunBudget::unlimited())
        .unwrap();
    for r in &report.results {
        for t in &r.test_trades {
            assert!(t.entry_date >= r.period.test_start && t.entry_date < r.period.test_end);
            assert!(t.exit_date < r.period.test_end);
        }
        assert_eq!(r.test_metrics.trade_count, r.test_trades.len());
    }
}

#[test]
fn optimization_is_deterministic() {
    let s = series("DET", 1300, 5);
    let runner = runner();
    let optimizer = WalkForwardOptimizer::new(&runner, config());
    let a = optimizer
        .optimize(&s, "ema_crossover", &BTreeMap::new(), &ema_grid(), RunBudget::unlimited())
        .unwrap();
    let b = optimizer
        .optimize(&s, "ema_crossover", &BTreeMap::new(), &ema_grid(), RunBudget::unlimited())
        .unwrap();
    assert_eq!(a, b);
}

// ── Skips and aborts ──

#[test]
fn no_valid_candidate_skips_every_period() {
    let s = series("NONE", 1300, 6);
    let runner = runner();
    let grid = ParamGrid::default()
        .axis("fast_period", vec![ParamValue::Int(30)])
        .axis("slow_period", vec![ParamValue::Int(20)]);
    let report = WalkForwardOptimizer::new(&runner, config())
        .optimize(&s, "ema_crossover", &BTreeMap::new(), &grid, RunBudget::unlimited())
        .unwrap();
    assert!(report.results.is_empty());
    assert!(!report.skipped.is_empty());
    assert!(report
        .skipped
        .iter()
        .any(|p| p.reason == SkipReason::NoValidCandidates));
    assert_eq!(report.stability.periods_evaluated, 0);
}

#[test]
fn too_short_series_records_insufficient_data() {
    // Two years of train data but only a few weeks of test data.
    let s = series("SHORT", 540, 7);
    let runner = runner();
    let report = WalkForwardOptimizer::new(&runner, config())
        .optimize(&s, "ema_crossover", &BTreeMap::new(), &ParamGrid::default(), RunBudget::unlimited())
        .unwrap();
    assert!(report.results.is_empty());
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].reason.as_str(), "insufficient_data");
}

#[test]
fn cancellation_aborts_the_optimization() {
    let s = series("CXL", 1300, 8);
    let runner = runner();
    let cancel = AtomicBool::new(true);
    let err = WalkForwardOptimizer::new(&runner, config())
        .optimize(
            &s,
            "ema_crossover",
            &BTreeMap::new(),
            &ema_grid(),
            RunBudget::unlimited().with_cancel(&cancel),
        )
        .unwrap_err();
    assert!(matches!(
        err,
        WalkForwardError::Engine {
            source: EngineError::Cancelled { .. }
        }
    ));
}

#[test]
fn unknown_strategy_is_an_error() {
    let s = series("UNK", 1300, 9);
    let runner = runner();
    let err = WalkForwardOptimizer::new(&runner, config())
        .optimize(&s, "nope", &BTreeMap::new(), &ParamGrid::default(), RunBudget::unlimited())
        .unwrap_err();
    assert!(matches!(
        err,
        WalkForwardError::Engine {
            source: EngineError::UnknownStrategy(_)
        }
    ));
}
