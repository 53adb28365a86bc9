//! Trade ledger: fill arena, append-only closed trades, and the open position
//! snapshot.
//!
//! Trades reference fills by `FillId` index; nothing holds a reference back
//! into the ledger. An open position is never stored as a trade: it is kept
//! as a snapshot and turned into a synthetic `is_open` trade each time a
//! report asks for it, using the latest bar it is given.

pub mod window;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::trade::pnl_fraction;
use crate::domain::{Bar, ExitKind, Fill, FillId, Position, Trade, TradeId};

pub use window::LedgerWindow;

/// Exit-side data for turning a position into a trade.
#[derive(Debug, Clone, PartialEq)]
pub struct ExitSnapshot {
    pub index: usize,
    pub date: NaiveDate,
    pub price: f64,
    pub commission: f64,
    pub slippage: f64,
    pub kind: ExitKind,
    pub reason: String,
    pub fill: Option<FillId>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TradeLedger {
    symbol: String,
    fills: Vec<Fill>,
    trades: Vec<Trade>,
    open: Option<Position>,
}

impl TradeLedger {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            ..Self::default()
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    /// Append a fill; its `id` is overwritten with the arena index.
    pub fn record_fill(&mut self, mut fill: Fill) -> FillId {
        let id = FillId(self.fills.len());
        fill.id = id;
        self.fills.push(fill);
        id
    }

    pub fn fill(&self, id: FillId) -> Option<&Fill> {
        self.fills.get(id.0)
    }

    pub fn fills(&self) -> &[Fill] {
        &self.fills
    }

    /// Close `position` into a trade and append it.
    pub fn close(&mut self, position: &Position, exit: ExitSnapshot) -> TradeId {
        let id = TradeId(self.trades.len());
        self.trades.push(build_trade(position, exit, false));
        id
    }

    pub fn closed_trades(&self) -> &[Trade] {
        &self.trades
    }

    pub fn set_open_position(&mut self, position: Option<Position>) {
        self.open = position.filter(|p| p.is_open());
    }

    pub fn open_position(&self) -> Option<&Position> {
        self.open.as_ref()
    }

    /// Synthetic trade for the open position, exiting at the close of the last
    /// sane bar in `bars`. Recomputed on every call.
    pub fn mark_to_market(&self, bars: &[Bar]) -> Option<Trade> {
        let position = self.open.as_ref()?;
        let (index, bar) = bars
            .iter()
            .enumerate()
            .rev()
            .find(|(_, b)| b.is_sane())?;
        if index < position.entry_index {
            return None;
        }
        let mtm = position.unrealized_pnl(bar.close);
        let mut trade = build_trade(
            position,
            ExitSnapshot {
                index,
                date: bar.date,
                price: bar.close,
                commission: 0.0,
                slippage: 0.0,
                kind: ExitKind::MarkToMarket,
                reason: "open at last bar".into(),
                fill: None,
            },
            true,
        );
        trade.mae = trade.mae.min(mtm).min(0.0);
        trade.mfe = trade.mfe.max(mtm).max(0.0);
        Some(trade)
    }

    /// Closed trades plus the marked-to-market open trade, by entry.
    pub fn all_trades(&self, bars: &[Bar]) -> Vec<Trade> {
        let mut trades = self.trades.clone();
        trades.extend(self.mark_to_market(bars));
        trades.sort_by_key(|t| (t.entry_index, t.exit_index));
        trades
    }

    /// Trades whose entry falls in `window`, anchored on the last bar date.
    /// Read-only: calling it twice on the same bars gives identical output.
    pub fn query(&self, window: LedgerWindow, bars: &[Bar]) -> Vec<Trade> {
        let Some(anchor) = bars.last().map(|b| b.date) else {
            return Vec::new();
        };
        self.all_trades(bars)
            .into_iter()
            .filter(|t| window.contains(t.entry_date, anchor))
            .collect()
    }
}

fn build_trade(position: &Position, exit: ExitSnapshot, is_open: bool) -> Trade {
    let quantity = position.quantity;
    let gross_pnl = position.unrealized_pnl(exit.price);
    let commission = position.commission_paid + exit.commission;
    let slippage = position.slippage_paid + exit.slippage;
    let pnl = gross_pnl - commission - slippage;
    let per_unit = |cost: f64| if quantity > 0 { cost / quantity as f64 } else { 0.0 };
    let mut fills: Vec<FillId> = position.lots.iter().map(|l| l.fill).collect();
    fills.extend(exit.fill);

    Trade {
        symbol: position.symbol.clone(),
        entry_index: position.entry_index,
        entry_date: position.entry_date.unwrap_or(exit.date),
        entry_price: position.entry_price,
        entry_fill_price: position.entry_price + per_unit(position.slippage_paid),
        exit_index: exit.index,
        exit_date: exit.date,
        exit_price: exit.price,
        exit_fill_price: exit.price - per_unit(exit.slippage),
        quantity,
        pyramid_level: position.pyramid_level,
        gross_pnl,
        commission,
        slippage,
        pnl,
        pnl_pct: pnl_fraction(pnl, position.entry_price, quantity),
        mae: position.mae.min(0.0),
        mfe: position.mfe.max(0.0),
        holding_bars: exit.index.saturating_sub(position.entry_index),
        signal_reason: position.signal_reason.clone(),
        exit_kind: exit.kind,
        exit_reason: exit.reason,
        initial_stop: position.initial_stop,
        is_open,
        fills,
    }
}
