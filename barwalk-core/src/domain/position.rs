//! Position: the single long position a strategy state machine owns.
//!
//! Lots are tracked individually so that pyramid additions keep their own fill
//! price; `entry_price` is the quantity-weighted average of the lots and is
//! what realized P&L is measured against.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::ids::FillId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionStatus {
    Flat,
    Open,
}

/// One entry or pyramid addition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lot {
    pub fill: FillId,
    pub bar_index: usize,
    pub price: f64,
    pub quantity: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub status: PositionStatus,
    pub entry_price: f64,
    pub quantity: u64,
    pub entry_index: usize,
    pub entry_date: Option<NaiveDate>,
    pub stop_price: Option<f64>,
    pub take_profit_price: Option<f64>,
    /// Stop as set on the first fill, before any trailing.
    pub initial_stop: Option<f64>,
    pub pyramid_level: u32,
    pub highest_price_since_entry: f64,
    pub signal_reason: String,
    pub lots: Vec<Lot>,
    /// Worst mark-to-market P&L seen so far (<= 0).
    pub mae: f64,
    /// Best mark-to-market P&L seen so far (>= 0).
    pub mfe: f64,
    pub commission_paid: f64,
    pub slippage_paid: f64,
}

impl Position {
    pub fn flat(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            status: PositionStatus::Flat,
            entry_price: 0.0,
            quantity: 0,
            entry_index: 0,
            entry_date: None,
            stop_price: None,
            take_profit_price: None,
            initial_stop: None,
            pyramid_level: 0,
            highest_price_since_entry: 0.0,
            signal_reason: String::new(),
            lots: Vec::new(),
            mae: 0.0,
            mfe: 0.0,
            commission_paid: 0.0,
            slippage_paid: 0.0,
        }
    }

    pub fn is_open(&self) -> bool {
        self.status == PositionStatus::Open
    }

    pub fn is_flat(&self) -> bool {
        self.status == PositionStatus::Flat
    }

    /// Open a fresh position from an entry fill.
    pub fn open(
        &mut self,
        lot: Lot,
        date: NaiveDate,
        reason: impl Into<String>,
        commission: f64,
        slippage: f64,
    ) {
        self.status = PositionStatus::Open;
        self.entry_price = lot.price;
        self.quantity = lot.quantity;
        self.entry_index = lot.bar_index;
        self.entry_date = Some(date);
        self.stop_price = None;
        self.take_profit_price = None;
        self.initial_stop = None;
        self.pyramid_level = 0;
        self.highest_price_since_entry = lot.price;
        self.signal_reason = reason.into();
        self.lots = vec![lot];
        self.mae = 0.0;
        self.mfe = 0.0;
        self.commission_paid = commission;
        self.slippage_paid = slippage;
    }

    /// Add a pyramid lot. `entry_price` becomes the weighted average.
    pub fn add_lot(&mut self, lot: Lot, commission: f64, slippage: f64) {
        let old_cost = self.entry_price * self.quantity as f64;
        let add_cost = lot.price * lot.quantity as f64;
        self.quantity += lot.quantity;
        if self.quantity > 0 {
            self.entry_price = (old_cost + add_cost) / self.quantity as f64;
        }
        self.pyramid_level += 1;
        self.commission_paid += commission;
        self.slippage_paid += slippage;
        self.lots.push(lot);
    }

    /// Move the stop. Tightening only: a candidate below the current stop is
    /// discarded. Returns whether the stop changed.
    pub fn ratchet_stop(&mut self, candidate: f64) -> bool {
        if !candidate.is_finite() {
            return false;
        }
        match self.stop_price {
            Some(current) if candidate <= current => false,
            _ => {
                self.stop_price = Some(candidate);
                true
            }
        }
    }

    /// Mark-to-market P&L at `price`, before costs.
    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        self.lots
            .iter()
            .map(|lot| (price - lot.price) * lot.quantity as f64)
            .sum()
    }

    /// Fold one bar's low/high into MAE/MFE and the running high.
    pub fn mark_excursion(&mut self, low: f64, high: f64) {
        if self.is_flat() {
            return;
        }
        let adverse = self.unrealized_pnl(low);
        let favorable = self.unrealized_pnl(high);
        self.mae = self.mae.min(adverse).min(0.0);
        self.mfe = self.mfe.max(favorable).max(0.0);
        if high > self.highest_price_since_entry {
            self.highest_price_since_entry = high;
        }
    }

    pub fn market_value(&self, price: f64) -> f64 {
        self.quantity as f64 * price
    }

    /// Back to Flat, keeping the symbol.
    pub fn reset(&mut self) {
        let symbol = std::mem::take(&mut self.symbol);
        *self = Self::flat(symbol);
    }
}
