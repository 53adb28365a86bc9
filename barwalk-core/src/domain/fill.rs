use crate::domain::ids::FillId;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FillSide {
    Buy,
    Sell,
}

/// What caused a fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FillKind {
    Entry,
    Pyramid,
    StopLoss,
    TakeProfit,
    SignalExit,
}

/// Simulated execution record.
///
/// `price` is the effective price after slippage; `slippage` and `commission`
/// are the total costs attributable to this fill (not per unit).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub id: FillId,
    pub bar_index: usize,
    pub date: NaiveDate,
    pub side: FillSide,
    pub kind: FillKind,
    pub price: f64,
    pub quantity: u64,
    pub slippage: f64,
    pub commission: f64,
}

impl Fill {
    pub fn notional(&self) -> f64 {
        self.price * self.quantity as f64
    }
}
