//! Trade: a round trip from first entry fill to exit, with excursions.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::ids::FillId;

/// Which exit condition closed the trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitKind {
    StopLoss,
    TakeProfit,
    SignalExit,
    /// Synthetic exit at the last bar for a still-open position.
    MarkToMarket,
}

impl ExitKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StopLoss => "stop_loss",
            Self::TakeProfit => "take_profit",
            Self::SignalExit => "signal_exit",
            Self::MarkToMarket => "mark_to_market",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    // ── Identification ──
    pub symbol: String,

    // ── Entry ──
    pub entry_index: usize,
    pub entry_date: NaiveDate,
    /// Quantity-weighted average market price (bar open) over all lots.
    pub entry_price: f64,
    /// Executed price per unit: `entry_price` plus entry slippage.
    pub entry_fill_price: f64,

    // ── Exit ──
    pub exit_index: usize,
    pub exit_date: NaiveDate,
    /// Market price: the stop, target, or bar open that triggered the exit.
    pub exit_price: f64,
    /// Executed price per unit: `exit_price` minus exit slippage.
    pub exit_fill_price: f64,

    // ── Size ──
    pub quantity: u64,
    pub pyramid_level: u32,

    // ── PnL ──
    pub gross_pnl: f64,
    pub commission: f64,
    pub slippage: f64,
    /// Net of commission and slippage.
    pub pnl: f64,
    pub pnl_pct: f64,

    // ── Excursion ──
    pub mae: f64,
    pub mfe: f64,

    // ── Duration ──
    pub holding_bars: usize,

    // ── Traceability ──
    pub signal_reason: String,
    pub exit_kind: ExitKind,
    pub exit_reason: String,
    pub initial_stop: Option<f64>,
    pub is_open: bool,
    pub fills: Vec<FillId>,
}

impl Trade {
    pub fn is_winner(&self) -> bool {
        self.pnl > 0.0
    }

    /// Calendar days between entry and exit.
    pub fn holding_days(&self) -> i64 {
        (self.exit_date - self.entry_date).num_days()
    }
}

/// Net P&L as a fraction of entry cost.
pub fn pnl_fraction(pnl: f64, entry_price: f64, quantity: u64) -> f64 {
    let cost = entry_price * quantity as f64;
    if cost == 0.0 {
        return 0.0;
    }
    pnl / cost
}
