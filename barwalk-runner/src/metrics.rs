//! Portfolio metrics: pure functions over an equity curve and a trade list.
//!
//! Every metric is a pure function: equity curve and/or trades in, scalar out.
//! Percent-valued fields are in percent (12.5 = 12.5%); the helpers below
//! return fractions.

use serde::{Deserialize, Serialize};

use barwalk_core::domain::Trade;

/// Bars per year used to annualize.
pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Summary metrics for one run or one report window.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PortfolioMetrics {
    pub total_return_pct: f64,
    pub cagr_pct: f64,
    /// Peak-to-trough decline as a positive percentage.
    pub max_drawdown_pct: f64,
    pub sharpe: f64,
    pub win_rate_pct: f64,
    pub profit_factor: f64,
    pub trade_count: usize,
}

impl PortfolioMetrics {
    pub fn compute(equity_curve: &[f64], trades: &[Trade]) -> Self {
        Self {
            total_return_pct: total_return(equity_curve) * 100.0,
            cagr_pct: cagr(equity_curve, equity_curve.len()) * 100.0,
            max_drawdown_pct: -max_drawdown(equity_curve) * 100.0,
            sharpe: sharpe_ratio(equity_curve, 0.0),
            win_rate_pct: win_rate(trades) * 100.0,
            profit_factor: profit_factor(trades),
            trade_count: trades.len(),
        }
    }

    /// Optimizer objective: `sharpe × (1 − max_drawdown) × (1 + win_rate)`,
    /// drawdown and win rate as fractions.
    pub fn composite_score(&self) -> f64 {
        let dd = (self.max_drawdown_pct / 100.0).clamp(0.0, 1.0);
        let wr = (self.win_rate_pct / 100.0).clamp(0.0, 1.0);
        self.sharpe * (1.0 - dd) * (1.0 + wr)
    }
}

// ─── Individual metric functions ────────────────────────────────────

/// Total return as a fraction: (final - initial) / initial.
pub fn total_return(equity_curve: &[f64]) -> f64 {
    let (Some(&initial), Some(&final_eq)) = (equity_curve.first(), equity_curve.last()) else {
        return 0.0;
    };
    if equity_curve.len() < 2 || initial <= 0.0 {
        return 0.0;
    }
    (final_eq - initial) / initial
}

/// Compound Annual Growth Rate over `trading_days` bars.
///
/// Returns 0.0 for single-bar curves and for non-positive start or end equity.
pub fn cagr(equity_curve: &[f64], trading_days: usize) -> f64 {
    let (Some(&initial), Some(&final_eq)) = (equity_curve.first(), equity_curve.last()) else {
        return 0.0;
    };
    if equity_curve.len() < 2 || trading_days < 2 || initial <= 0.0 || final_eq <= 0.0 {
        return 0.0;
    }
    let years = trading_days as f64 / TRADING_DAYS_PER_YEAR;
    (final_eq / initial).powf(1.0 / years) - 1.0
}

/// Annualized Sharpe ratio from daily returns.
///
/// Sharpe = mean(daily returns - rf) / std(daily returns) * sqrt(252).
/// Returns 0.0 if variance is zero or fewer than 2 returns.
pub fn sharpe_ratio(equity_curve: &[f64], risk_free_rate: f64) -> f64 {
    let returns = daily_returns(equity_curve);
    if returns.len() < 2 {
        return 0.0;
    }
    let daily_rf = risk_free_rate / TRADING_DAYS_PER_YEAR;
    let excess: Vec<f64> = returns.iter().map(|r| r - daily_rf).collect();
    let std = std_dev(&excess);
    if std < 1e-12 {
        return 0.0;
    }
    (mean_f64(&excess) / std) * TRADING_DAYS_PER_YEAR.sqrt()
}

/// Maximum drawdown as a negative fraction (e.g., -0.15 = 15% drawdown).
pub fn max_drawdown(equity_curve: &[f64]) -> f64 {
    let Some(&first) = equity_curve.first() else {
        return 0.0;
    };
    let mut peak = first;
    let mut max_dd = 0.0_f64;
    for &eq in equity_curve {
        if eq > peak {
            peak = eq;
        }
        if peak > 0.0 {
            max_dd = max_dd.min((eq - peak) / peak);
        }
    }
    max_dd
}

/// Fraction of trades with positive net P&L.
pub fn win_rate(trades: &[Trade]) -> f64 {
    if trades.is_empty() {
        return 0.0;
    }
    let winners = trades.iter().filter(|t| t.is_winner()).count();
    winners as f64 / trades.len() as f64
}

/// Gross profits / gross losses, capped at 100.0 when nothing was lost.
pub fn profit_factor(trades: &[Trade]) -> f64 {
    let gross_profit: f64 = trades.iter().map(|t| t.pnl.max(0.0)).sum();
    let gross_loss: f64 = trades.iter().map(|t| (-t.pnl).max(0.0)).sum();
    if gross_loss < 1e-10 {
        return if gross_profit > 0.0 { 100.0 } else { 0.0 };
    }
    (gross_profit / gross_loss).min(100.0)
}

// ─── Helpers ────────────────────────────────────────────────────────

pub fn daily_returns(equity_curve: &[f64]) -> Vec<f64> {
    equity_curve
        .windows(2)
        .map(|w| if w[0] > 0.0 { (w[1] - w[0]) / w[0] } else { 0.0 })
        .collect()
}

pub(crate) fn mean_f64(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation; 0.0 below two values.
pub(crate) fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = mean_f64(values);
    let variance =
        values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}
