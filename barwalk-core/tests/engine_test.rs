//! End-to-end engine scenarios: fill timing, stops, pyramiding, exit
//! arbitration, pending orders, malformed bars, budgets, determinism.

use std::collections::BTreeMap;
use std::sync::atomic::AtomicBool;
use std::time::{Duration, Instant};

use barwalk_core::data::{random_walk, SyntheticSpec};
use barwalk_core::domain::{Bar, BarSeries, ExitKind, FillKind, ParamSchema, ParamValue, Position};
use barwalk_core::engine::{run_backtest, EngineConfig, FixedQuantity, RunBudget, RunOutput};
use barwalk_core::error::EngineError;
use barwalk_core::fingerprint::ledger_fingerprint;
use barwalk_core::indicators::{Atr, IndicatorCache};
use barwalk_core::strategy::{
    Decision, DecisionContext, ExitPriority, ProtectiveLevels, RunContext, Signal, Strategy,
    StrategyRegistry,
};
use chrono::NaiveDate;

fn base_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 2).unwrap()
}

/// open = previous close, high/low one point outside the body.
fn bars_from_closes(closes: &[f64]) -> Vec<Bar> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = if i == 0 { close } else { closes[i - 1] };
            Bar::new(
                base_date() + chrono::Duration::days(i as i64),
                open,
                open.max(close) + 1.0,
                open.min(close) - 1.0,
                close,
                1_000,
            )
        })
        .collect()
}

fn bars_from_ohlc(data: &[(f64, f64, f64, f64)]) -> Vec<Bar> {
    data.iter()
        .enumerate()
        .map(|(i, &(o, h, l, c))| Bar::new(base_date() + chrono::Duration::days(i as i64), o, h, l, c, 1_000))
        .collect()
}

/// Emits a fixed signal per decision index.
struct Scripted {
    script: Vec<(usize, Signal)>,
    stop_offset: Option<f64>,
    target_offset: Option<f64>,
    max_levels: u32,
    priority: ExitPriority,
}

impl Scripted {
    fn new(script: Vec<(usize, Signal)>) -> Self {
        Self {
            script,
            stop_offset: None,
            target_offset: None,
            max_levels: 0,
            priority: ExitPriority::default(),
        }
    }
}

impl Strategy for Scripted {
    fn id(&self) -> &str {
        "scripted"
    }

    fn init(&mut self, _ctx: &mut RunContext<'_>) -> Result<(), EngineError> {
        Ok(())
    }

    fn decide(&self, ctx: &DecisionContext<'_>, _position: &Position) -> Result<Decision, EngineError> {
        Ok(self
            .script
            .iter()
            .find(|(i, _)| *i == ctx.cursor())
            .map(|(_, s)| Decision {
                signal: *s,
                reason: format!("scripted {s:?}"),
            })
            .unwrap_or_else(Decision::hold))
    }

    fn protective_levels(
        &self,
        _ctx: &DecisionContext<'_>,
        fill_price: f64,
    ) -> Result<ProtectiveLevels, EngineError> {
        Ok(ProtectiveLevels {
            stop: self.stop_offset.map(|o| fill_price - o),
            take_profit: self.target_offset.map(|o| fill_price + o),
        })
    }

    fn max_pyramid_levels(&self) -> u32 {
        self.max_levels
    }

    fn exit_priority(&self) -> ExitPriority {
        self.priority
    }
}

fn run_scripted(bars: Vec<Bar>, strategy: &mut Scripted) -> RunOutput {
    let series = BarSeries::new("TEST", bars).unwrap();
    run_backtest(
        &series,
        strategy,
        &ParamSchema::default().defaults(),
        &EngineConfig::default(),
        &FixedQuantity(10),
        RunBudget::unlimited(),
    )
    .unwrap()
}

fn run_registry(
    id: &str,
    series: &BarSeries,
    overrides: &[(&str, ParamValue)],
) -> Result<RunOutput, EngineError> {
    let registry = StrategyRegistry::builtin();
    let overrides: BTreeMap<String, ParamValue> =
        overrides.iter().map(|(k, v)| (k.to_string(), *v)).collect();
    let params = registry.bind(id, &overrides)?;
    let mut strategy = registry.create(id)?;
    run_backtest(
        series,
        strategy.as_mut(),
        &params,
        &EngineConfig::default(),
        &FixedQuantity(10),
        RunBudget::unlimited(),
    )
}

// ─── Fill timing ─────────────────────────────────────────────────────

#[test]
fn ema_cross_yields_one_trade_at_next_opens() {
    // Fast EMA crosses above at bar 50, below at bar 120.
    let closes: Vec<f64> = (0..300)
        .map(|i| match i {
            0..=49 => 100.0,
            50..=119 => 110.0,
            _ => 90.0,
        })
        .collect();
    let series = BarSeries::new("SYN", bars_from_closes(&closes)).unwrap();
    let out = run_registry(
        "ema_crossover",
        &series,
        &[("fast_period", ParamValue::Int(5)), ("slow_period", ParamValue::Int(20))],
    )
    .unwrap();

    let trades = out.trades(series.bars());
    assert_eq!(trades.len(), 1, "{trades:#?}");
    let t = &trades[0];
    assert_eq!(t.entry_index, 51);
    assert_eq!(t.entry_price, series.bars()[51].open);
    assert_eq!(t.exit_index, 121);
    assert_eq!(t.exit_price, series.bars()[121].open);
    assert_eq!(t.quantity, 10);
    assert_eq!(t.exit_kind, ExitKind::SignalExit);
    assert!(!t.is_open);
    assert!((t.pnl - (-200.0)).abs() < 1e-9);
    // Lowest low 89, highest high 111 against an entry of 110.
    assert!((t.mae - (-210.0)).abs() < 1e-9);
    assert!((t.mfe - 10.0).abs() < 1e-9);
    assert!(t.signal_reason.contains("crossed above"));
}

#[test]
fn quantity_comes_from_sizer_only() {
    let closes = [100.0, 100.0, 101.0, 102.0, 103.0];
    let series = BarSeries::new("TEST", bars_from_closes(&closes)).unwrap();
    for qty in [1, 7, 250] {
        let mut s = Scripted::new(vec![(2, Signal::Enter)]);
        let out = run_backtest(
            &series,
            &mut s,
            &ParamSchema::default().defaults(),
            &EngineConfig::default(),
            &FixedQuantity(qty),
            RunBudget::unlimited(),
        )
        .unwrap();
        assert_eq!(out.ledger.open_position().unwrap().quantity, qty);
    }
}

// ─── Stops and targets ───────────────────────────────────────────────

#[test]
fn stop_touch_fills_at_stop_price() {
    let bars = bars_from_ohlc(&[
        (100.0, 101.0, 99.0, 100.0),
        (100.0, 102.0, 99.0, 101.0), // entry @ 100, stop 95
        (101.0, 102.0, 96.0, 97.0),
        (99.0, 100.0, 94.0, 96.0), // trades through 95
        (96.0, 97.0, 95.0, 96.0),
    ]);
    let mut s = Scripted::new(vec![(1, Signal::Enter)]);
    s.stop_offset = Some(5.0);
    let out = run_scripted(bars, &mut s);
    let t = &out.ledger.closed_trades()[0];
    assert_eq!(t.exit_kind, ExitKind::StopLoss);
    assert_eq!(t.exit_index, 3);
    assert_eq!(t.exit_price, 95.0);
    assert_eq!(t.initial_stop, Some(95.0));
}

#[test]
fn stop_gap_fills_at_open() {
    let bars = bars_from_ohlc(&[
        (100.0, 101.0, 99.0, 100.0),
        (100.0, 102.0, 99.0, 101.0),
        (90.0, 92.0, 88.0, 91.0), // opens below 95
    ]);
    let mut s = Scripted::new(vec![(1, Signal::Enter)]);
    s.stop_offset = Some(5.0);
    let out = run_scripted(bars, &mut s);
    let t = &out.ledger.closed_trades()[0];
    assert_eq!(t.exit_price, 90.0);
    assert!((t.pnl - (-100.0)).abs() < 1e-9);
    // Price action only: low 88 against 100.
    assert!((t.mae - (-120.0)).abs() < 1e-9);
}

#[test]
fn stop_is_live_on_the_fill_bar() {
    let bars = bars_from_ohlc(&[
        (100.0, 101.0, 99.0, 100.0),
        (100.0, 101.0, 93.0, 94.0), // entry @ 100, stop 95 hit same bar
        (94.0, 95.0, 93.0, 94.0),
    ]);
    let mut s = Scripted::new(vec![(1, Signal::Enter)]);
    s.stop_offset = Some(5.0);
    let out = run_scripted(bars, &mut s);
    let t = &out.ledger.closed_trades()[0];
    assert_eq!(t.entry_index, 1);
    assert_eq!(t.exit_index, 1);
    assert_eq!(t.holding_bars, 0);
    assert_eq!(t.exit_price, 95.0);
}

#[test]
fn target_fills_at_target() {
    let bars = bars_from_ohlc(&[
        (100.0, 101.0, 99.0, 100.0),
        (100.0, 102.0, 99.0, 101.0),
        (101.0, 111.0, 100.0, 108.0),
    ]);
    let mut s = Scripted::new(vec![(1, Signal::Enter)]);
    s.target_offset = Some(10.0);
    let out = run_scripted(bars, &mut s);
    let t = &out.ledger.closed_trades()[0];
    assert_eq!(t.exit_kind, ExitKind::TakeProfit);
    assert_eq!(t.exit_price, 110.0);
}

// ─── Exit arbitration ────────────────────────────────────────────────

fn contested_bar_run(priority: ExitPriority) -> RunOutput {
    // Bar 3: signal exit at the open (99), stop 95 touched, target 108 touched.
    let bars = bars_from_ohlc(&[
        (100.0, 101.0, 99.0, 100.0),
        (100.0, 102.0, 99.0, 101.0),
        (101.0, 102.0, 99.0, 100.0),
        (99.0, 109.0, 94.0, 100.0),
        (100.0, 101.0, 99.0, 100.0),
    ]);
    let mut s = Scripted::new(vec![(1, Signal::Enter), (3, Signal::Exit)]);
    s.stop_offset = Some(5.0);
    s.target_offset = Some(8.0);
    s.priority = priority;
    run_scripted(bars, &mut s)
}

#[test]
fn stop_wins_under_default_priority() {
    let out = contested_bar_run(ExitPriority::STOP_SIGNAL_TARGET);
    let t = &out.ledger.closed_trades()[0];
    assert_eq!(t.exit_kind, ExitKind::StopLoss);
    assert_eq!(t.exit_price, 95.0);
}

#[test]
fn signal_wins_when_listed_first() {
    let out = contested_bar_run(ExitPriority::SIGNAL_STOP_TARGET);
    let t = &out.ledger.closed_trades()[0];
    assert_eq!(t.exit_kind, ExitKind::SignalExit);
    assert_eq!(t.exit_price, 99.0);
    assert_eq!(t.exit_reason, "scripted Exit");
}

#[test]
fn only_one_exit_per_bar() {
    for priority in [
        ExitPriority::STOP_SIGNAL_TARGET,
        ExitPriority::SIGNAL_STOP_TARGET,
        ExitPriority::STOP_TARGET_SIGNAL,
    ] {
        let out = contested_bar_run(priority);
        assert_eq!(out.ledger.closed_trades().len(), 1);
        let sells = out
            .ledger
            .fills()
            .iter()
            .filter(|f| f.kind != FillKind::Entry)
            .count();
        assert_eq!(sells, 1);
    }
}

// ─── Pyramiding ──────────────────────────────────────────────────────

#[test]
fn five_dips_with_cap_three_add_three_lots() {
    let closes: Vec<f64> = (0..20).map(|i| 100.0 + i as f64).collect();
    let mut script = vec![(1, Signal::Enter)];
    script.extend([3, 5, 7, 9, 11].map(|i| (i, Signal::AddPyramid)));
    let mut s = Scripted::new(script);
    s.max_levels = 3;
    let out = run_scripted(bars_from_closes(&closes), &mut s);

    let pyramids = out
        .ledger
        .fills()
        .iter()
        .filter(|f| f.kind == FillKind::Pyramid)
        .count();
    assert_eq!(pyramids, 3);
    let pos = out.ledger.open_position().unwrap();
    assert_eq!(pos.pyramid_level, 3);
    assert_eq!(pos.quantity, 40);
    // Lots at opens 100, 102, 104, 106.
    assert!((pos.entry_price - 103.0).abs() < 1e-9);
}

#[test]
fn pyramid_signal_while_flat_is_ignored() {
    let closes = [100.0; 6];
    let mut s = Scripted::new(vec![(2, Signal::AddPyramid), (3, Signal::Exit)]);
    s.max_levels = 3;
    let out = run_scripted(bars_from_closes(&closes), &mut s);
    assert!(out.ledger.fills().is_empty());
}

// ─── Boundaries ──────────────────────────────────────────────────────

#[test]
fn entry_after_last_bar_is_pending() {
    let closes = [100.0, 101.0, 102.0];
    let mut s = Scripted::new(vec![(3, Signal::Enter)]);
    let out = run_scripted(bars_from_closes(&closes), &mut s);
    let pending = out.pending.expect("pending entry");
    assert_eq!(pending.signal, Signal::Enter);
    assert_eq!(pending.decided_after, base_date() + chrono::Duration::days(2));
    assert!(out.ledger.fills().is_empty());
}

#[test]
fn open_position_is_reported_as_open_trade() {
    let closes = [100.0, 101.0, 102.0, 104.0];
    let mut s = Scripted::new(vec![(1, Signal::Enter)]);
    let out = run_scripted(bars_from_closes(&closes), &mut s);
    let bars = bars_from_closes(&closes);
    let trades = out.trades(&bars);
    assert_eq!(trades.len(), 1);
    assert!(trades[0].is_open);
    assert_eq!(trades[0].exit_kind, ExitKind::MarkToMarket);
    assert_eq!(trades[0].exit_price, 104.0);
    assert!(out.ledger.closed_trades().is_empty());
}

#[test]
fn malformed_bar_is_flagged_and_skipped() {
    let mut bars = bars_from_closes(&[100.0, 101.0, 102.0, 103.0, 104.0]);
    bars[2].high = bars[2].low - 1.0;
    let mut s = Scripted::new(vec![(2, Signal::Enter), (3, Signal::Enter)]);
    let out = run_scripted(bars, &mut s);

    assert_eq!(out.flagged_bars.len(), 1);
    assert_eq!(out.flagged_bars[0].index, 2);
    assert_eq!(out.flagged_bars[0].to_error().tag(), "execution_error");
    // No fill on the flagged bar; the next bar's Enter fills instead.
    let fills = out.ledger.fills();
    assert_eq!(fills.len(), 1);
    assert_eq!(fills[0].bar_index, 3);
    assert_eq!(out.equity.len(), 5);
    assert_eq!(out.equity[2].equity, out.equity[1].equity);
}

// ─── Bounded loss ────────────────────────────────────────────────────

#[test]
fn atr_stop_bounds_loss_per_unit() {
    let k = 2.0;
    let bars = random_walk(&SyntheticSpec::new("RW", base_date(), 600, 11));
    let series = BarSeries::new("RW", bars).unwrap();
    let out = run_registry(
        "ema_crossover",
        &series,
        &[
            ("fast_period", ParamValue::Int(5)),
            ("slow_period", ParamValue::Int(20)),
            ("stop_atr_mult", ParamValue::Float(k)),
        ],
    )
    .unwrap();

    let mut cache = IndicatorCache::new(series.bars());
    let atr = cache.register(&Atr::new(14)).unwrap();
    let trades = out.ledger.closed_trades();
    assert!(!trades.is_empty());
    for t in trades {
        let Some(atr_at_entry) = atr.get(t.entry_index - 1) else {
            continue;
        };
        let exit_open = series.bars()[t.exit_index].open;
        let loss_per_unit = t.entry_price - t.exit_price;
        let gap = (t.entry_price - exit_open).max(0.0);
        assert!(
            loss_per_unit <= k * atr_at_entry + 1e-9 || loss_per_unit <= gap + 1e-9,
            "trade {t:?} lost {loss_per_unit} with atr {atr_at_entry}"
        );
    }
}

// ─── Budget ──────────────────────────────────────────────────────────

#[test]
fn cancelled_run_stops_with_typed_error() {
    let series = BarSeries::new("TEST", bars_from_closes(&[100.0; 10])).unwrap();
    let flag = AtomicBool::new(true);
    let mut s = Scripted::new(vec![]);
    let err = run_backtest(
        &series,
        &mut s,
        &ParamSchema::default().defaults(),
        &EngineConfig::default(),
        &FixedQuantity(1),
        RunBudget::unlimited().with_cancel(&flag),
    )
    .unwrap_err();
    assert_eq!(err, EngineError::Cancelled { bar_index: 0 });
}

#[test]
fn expired_deadline_times_out() {
    let series = BarSeries::new("TEST", bars_from_closes(&[100.0; 10])).unwrap();
    let mut s = Scripted::new(vec![]);
    let deadline = Instant::now() - Duration::from_millis(1);
    let err = run_backtest(
        &series,
        &mut s,
        &ParamSchema::default().defaults(),
        &EngineConfig::default(),
        &FixedQuantity(1),
        RunBudget::unlimited().with_deadline(deadline),
    )
    .unwrap_err();
    assert_eq!(err.tag(), "timeout");
}

// ─── Determinism ─────────────────────────────────────────────────────

#[test]
fn identical_inputs_give_identical_ledgers() {
    let series = BarSeries::new(
        "RW",
        random_walk(&SyntheticSpec::new("RW", base_date(), 800, 3)),
    )
    .unwrap();
    for id in StrategyRegistry::builtin().ids() {
        let a = run_registry(id, &series, &[]).unwrap();
        let b = run_registry(id, &series, &[]).unwrap();
        assert_eq!(
            ledger_fingerprint(&a.trades(series.bars())),
            ledger_fingerprint(&b.trades(series.bars())),
            "{id}"
        );
        assert_eq!(a, b, "{id}");
    }
}

#[test]
fn indicator_computed_once_per_key() {
    let series = BarSeries::new(
        "RW",
        random_walk(&SyntheticSpec::new("RW", base_date(), 300, 5)),
    )
    .unwrap();
    // stop on: fast EMA, slow EMA, ATR.
    let out = run_registry(
        "ema_crossover",
        &series,
        &[("stop_atr_mult", ParamValue::Float(1.5))],
    )
    .unwrap();
    assert_eq!(out.indicator_computations, 3);
}

#[test]
fn lookback_longer_than_series_is_invalid() {
    let series = BarSeries::new("TEST", bars_from_closes(&[100.0; 30])).unwrap();
    let err = run_registry("trend_pyramid", &series, &[]).unwrap_err();
    assert_eq!(err.tag(), "invalid_parameter");
}
