//! Reporting and export: window reports, CSV trade tapes, JSON and Markdown.
//!
//! Window reports are read-side projections: they never touch the ledger a
//! result carries, so building the same report twice gives the same output.

use std::io::Write;
use std::path::Path;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use barwalk_core::{LedgerWindow, Trade};

use crate::basket::{BasketReport, SymbolOutcome};
use crate::metrics::PortfolioMetrics;
use crate::runner::BacktestResult;
use crate::walk_forward::WalkForwardReport;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

// ─── Trade rows ─────────────────────────────────────────────────────

/// One exported ledger row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRow {
    pub symbol: String,
    pub entry_time: NaiveDate,
    pub exit_time: NaiveDate,
    /// Market prices. Slippage is booked as a separate cost.
    pub entry_price: f64,
    pub exit_price: f64,
    /// Executed prices per unit, slippage included.
    pub entry_fill_price: f64,
    pub exit_fill_price: f64,
    pub quantity: u64,
    pub pyramid_level: u32,
    pub signal_reason: String,
    pub exit_reason: String,
    pub exit_kind: String,
    pub pnl: f64,
    pub pnl_pct: f64,
    pub mae: f64,
    pub mfe: f64,
    /// Calendar days between entry and exit.
    pub holding_days: i64,
    pub is_open: bool,
}

impl From<&Trade> for TradeRow {
    fn from(t: &Trade) -> Self {
        Self {
            symbol: t.symbol.clone(),
            entry_time: t.entry_date,
            exit_time: t.exit_date,
            entry_price: t.entry_price,
            exit_price: t.exit_price,
            entry_fill_price: t.entry_fill_price,
            exit_fill_price: t.exit_fill_price,
            quantity: t.quantity,
            pyramid_level: t.pyramid_level,
            signal_reason: t.signal_reason.clone(),
            exit_reason: t.exit_reason.clone(),
            exit_kind: t.exit_kind.as_str().to_string(),
            pnl: t.pnl,
            pnl_pct: t.pnl_pct * 100.0,
            mae: t.mae,
            mfe: t.mfe,
            holding_days: t.holding_days(),
            is_open: t.is_open,
        }
    }
}

// ─── Window reports ─────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowReport {
    pub window: String,
    /// Inclusive; `None` when unbounded.
    pub start: Option<NaiveDate>,
    /// Exclusive; `None` when unbounded.
    pub end: Option<NaiveDate>,
    pub metrics: PortfolioMetrics,
    pub trades: Vec<TradeRow>,
}

impl WindowReport {
    /// Metrics over the equity points and trades (by entry date) inside
    /// `window`, anchored on the result's last bar.
    pub fn build(result: &BacktestResult, window: LedgerWindow) -> Self {
        let anchor = result.end;
        let (start, end) = window.bounds(anchor);
        let equity: Vec<f64> = result
            .equity
            .iter()
            .filter(|p| window.contains(p.date, anchor))
            .map(|p| p.equity)
            .collect();
        let trades: Vec<&Trade> = result
            .trades
            .iter()
            .filter(|t| window.contains(t.entry_date, anchor))
            .collect();
        let owned: Vec<Trade> = trades.iter().map(|t| (*t).clone()).collect();

        Self {
            window: window.label(),
            start,
            end,
            metrics: PortfolioMetrics::compute(&equity, &owned),
            trades: trades.into_iter().map(TradeRow::from).collect(),
        }
    }
}

/// Reports for 1Y, 3Y, 5Y and ALL.
pub fn standard_reports(result: &BacktestResult) -> Vec<WindowReport> {
    LedgerWindow::STANDARD
        .iter()
        .map(|w| WindowReport::build(result, *w))
        .collect()
}

// ─── CSV export ─────────────────────────────────────────────────────

pub fn write_trades_csv<W: Write>(writer: W, rows: &[TradeRow]) -> Result<(), ReportError> {
    let mut wtr = csv::Writer::from_writer(writer);
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn trades_csv_string(trades: &[Trade]) -> Result<String, ReportError> {
    let rows: Vec<TradeRow> = trades.iter().map(TradeRow::from).collect();
    let mut buf = Vec::new();
    write_trades_csv(&mut buf, &rows)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

pub fn export_trades_csv(path: &Path, trades: &[Trade]) -> Result<(), ReportError> {
    let rows: Vec<TradeRow> = trades.iter().map(TradeRow::from).collect();
    let file = std::fs::File::create(path)?;
    write_trades_csv(file, &rows)
}

// ─── JSON export ────────────────────────────────────────────────────

pub fn export_json(result: &BacktestResult) -> Result<String, ReportError> {
    Ok(serde_json::to_string_pretty(result)?)
}

pub fn import_json(json: &str) -> Result<BacktestResult, ReportError> {
    Ok(serde_json::from_str(json)?)
}

// ─── Markdown ───────────────────────────────────────────────────────

fn metrics_row(label: &str, m: &PortfolioMetrics) -> String {
    format!(
        "| {label} | {:.2}% | {:.2}% | {:.2}% | {:.2} | {:.1}% | {:.2} | {} |\n",
        m.total_return_pct,
        m.cagr_pct,
        m.max_drawdown_pct,
        m.sharpe,
        m.win_rate_pct,
        m.profit_factor,
        m.trade_count
    )
}

const METRICS_HEADER: &str = "| Window | Return | CAGR | Max DD | Sharpe | Win Rate | PF | Trades |\n\
                              | --- | --- | --- | --- | --- | --- | --- | --- |\n";

pub fn backtest_markdown(result: &BacktestResult) -> String {
    let mut md = String::with_capacity(1024);
    md.push_str(&format!("# {} - {}\n\n", result.symbol, result.strategy));
    md.push_str(&format!(
        "Period {} to {}, {} bars. Parameters: {}.\n\n",
        result.start, result.end, result.bar_count, result.params
    ));
    md.push_str(METRICS_HEADER);
    for report in standard_reports(result) {
        md.push_str(&metrics_row(&report.window, &report.metrics));
    }
    if !result.flagged_bars.is_empty() {
        md.push_str("\n## Flagged bars\n\n");
        for bar in &result.flagged_bars {
            md.push_str(&format!("- {} (#{}): {}\n", bar.date, bar.index, bar.reason));
        }
    }
    if let Some(pending) = &result.pending {
        md.push_str(&format!(
            "\nPending after {}: {:?} ({})\n",
            pending.decided_after, pending.signal, pending.reason
        ));
    }
    md
}

pub fn walk_forward_markdown(report: &WalkForwardReport) -> String {
    let mut md = String::with_capacity(1024);
    md.push_str(&format!(
        "# Walk-forward {} - {}\n\n",
        report.symbol, report.strategy
    ));
    md.push_str("| Period | Train | Test | Best | Test Return | Test Sharpe |\n");
    md.push_str("| --- | --- | --- | --- | --- | --- |\n");
    for r in &report.results {
        md.push_str(&format!(
            "| {} | {}..{} | {}..{} | {} | {:.2}% | {:.2} |\n",
            r.period.index,
            r.period.train_start,
            r.period.train_end,
            r.period.test_start,
            r.period.test_end,
            r.best_params,
            r.test_metrics.total_return_pct,
            r.test_metrics.sharpe
        ));
    }
    let s = &report.stability;
    md.push_str(&format!(
        "\nCAGR {:.2}% ± {:.2}, Sharpe {:.2} ± {:.2}, {:.0}% of periods profitable.\n",
        s.mean_cagr_pct, s.std_cagr_pct, s.mean_sharpe, s.std_sharpe, s.pct_profitable
    ));
    if !report.skipped.is_empty() {
        md.push_str("\n## Skipped periods\n\n");
        for skip in &report.skipped {
            md.push_str(&format!("- period {}: {}\n", skip.period.index, skip.reason));
        }
    }
    md
}

/// Basket summary. The skipped section is always present.
pub fn basket_markdown(report: &BasketReport) -> String {
    let mut md = String::with_capacity(2048);
    md.push_str("# Basket Report\n\n");
    md.push_str("| Symbol | Return | CAGR | Max DD | Sharpe | Win Rate | PF | Trades |\n");
    md.push_str("| --- | --- | --- | --- | --- | --- | --- | --- |\n");
    for (symbol, outcome) in &report.results {
        match outcome {
            SymbolOutcome::Backtest(result) => md.push_str(&metrics_row(symbol, &result.metrics)),
            SymbolOutcome::WalkForward(wf) => md.push_str(&format!(
                "| {symbol} | walk-forward: {} periods, {:.0}% profitable | | | {:.2} | | | |\n",
                wf.stability.periods_evaluated, wf.stability.pct_profitable, wf.stability.mean_sharpe
            )),
        }
    }
    md.push_str("\n## Skipped\n\n");
    if report.skipped.is_empty() {
        md.push_str("None.\n");
    }
    for skip in &report.skipped {
        md.push_str(&format!("- {}: {}\n", skip.symbol, skip.detail));
    }
    md
}

#[cfg(test)]
mod tests {
    use super::*;
    use barwalk_core::data::{random_walk, SyntheticSpec};
    use barwalk_core::engine::SizingConfig;
    use barwalk_core::{BarSeries, EngineConfig, RunBudget, StrategyRegistry};
    use std::collections::BTreeMap;

    use crate::runner::Runner;

    fn result() -> BacktestResult {
        let start = NaiveDate::from_ymd_opt(2017, 1, 2).unwrap();
        let bars = random_walk(&SyntheticSpec::new("RPT", start, 1600, 5));
        let series = BarSeries::new("RPT", bars).unwrap();
        Runner::new(
            StrategyRegistry::builtin(),
            EngineConfig::default(),
            SizingConfig::default(),
        )
        .run_with_overrides(&series, "ema_crossover", &BTreeMap::new(), RunBudget::unlimited())
        .unwrap()
    }

    #[test]
    fn all_window_matches_full_run() {
        let r = result();
        let all = WindowReport::build(&r, LedgerWindow::All);
        assert_eq!(all.trades.len(), r.trades.len());
        assert_eq!(all.metrics, r.metrics);
        assert_eq!(all.window, "ALL");
    }

    #[test]
    fn trailing_windows_nest() {
        let r = result();
        let reports = standard_reports(&r);
        let counts: Vec<usize> = reports.iter().map(|w| w.trades.len()).collect();
        assert!(counts[0] <= counts[1] && counts[1] <= counts[2] && counts[2] <= counts[3]);
        assert_eq!(reports[0].end, r.end.succ_opt());
    }

    #[test]
    fn window_reports_are_idempotent() {
        let r = result();
        assert_eq!(standard_reports(&r), standard_reports(&r));
    }

    #[test]
    fn csv_has_header_and_one_line_per_trade() {
        let r = result();
        let csv = trades_csv_string(&r.trades).unwrap();
        let mut lines = csv.lines();
        let header = lines.next().unwrap();
        assert!(header.starts_with("symbol,entry_time,exit_time,entry_price"));
        assert!(header.ends_with("holding_days,is_open"));
        assert_eq!(lines.count(), r.trades.len());
    }

    #[test]
    fn rows_carry_market_and_executed_prices() {
        let start = NaiveDate::from_ymd_opt(2017, 1, 2).unwrap();
        let series = BarSeries::new("SLP", random_walk(&SyntheticSpec::new("SLP", start, 800, 8))).unwrap();
        let engine = EngineConfig {
            costs: barwalk_core::engine::CostModel::new(0.05, 0.0),
            ..EngineConfig::default()
        };
        let r = Runner::new(StrategyRegistry::builtin(), engine, SizingConfig::default())
            .run_with_overrides(&series, "ema_crossover", &BTreeMap::new(), RunBudget::unlimited())
            .unwrap();
        let closed: Vec<TradeRow> = r.trades.iter().filter(|t| !t.is_open).map(TradeRow::from).collect();
        assert!(!closed.is_empty());
        for row in &closed {
            assert!((row.entry_fill_price - (row.entry_price + 0.05)).abs() < 1e-9);
            assert!((row.exit_fill_price - (row.exit_price - 0.05)).abs() < 1e-9);
        }
    }

    #[test]
    fn export_writes_file() {
        let r = result();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trades.csv");
        export_trades_csv(&path, &r.trades).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("symbol,"));
    }

    #[test]
    fn json_round_trip_preserves_result() {
        let r = result();
        let back = import_json(&export_json(&r).unwrap()).unwrap();
        assert_eq!(back.ledger_hash, r.ledger_hash);
        assert_eq!(back.trades.len(), r.trades.len());
    }

    #[test]
    fn basket_markdown_lists_skips() {
        let report = BasketReport {
            results: BTreeMap::new(),
            skipped: vec![crate::basket::SkippedSymbol {
                symbol: "ZZZ".into(),
                reason: "timeout".into(),
                detail: "timeout".into(),
            }],
        };
        let md = basket_markdown(&report);
        assert!(md.contains("## Skipped"));
        assert!(md.contains("- ZZZ: timeout"));
    }
}
