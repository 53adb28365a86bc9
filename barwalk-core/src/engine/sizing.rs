//! Position sizing: translate available equity into a whole-unit quantity.
//!
//! Sizers are signal-agnostic: they see cash and the per-unit fill cost, never
//! the reason for the trade. A result of 0 means "skip this entry".

use serde::{Deserialize, Serialize};

pub trait PositionSizer: Send + Sync {
    /// Quantity to buy at `price` given `available_equity`.
    fn size(&self, available_equity: f64, price: f64) -> u64;

    fn name(&self) -> &str;
}

/// Always the same quantity.
#[derive(Debug, Clone, Copy)]
pub struct FixedQuantity(pub u64);

impl PositionSizer for FixedQuantity {
    fn size(&self, _available_equity: f64, _price: f64) -> u64 {
        self.0
    }

    fn name(&self) -> &str {
        "fixed_quantity"
    }
}

/// Spend a fraction of available equity, rounded down to whole units.
#[derive(Debug, Clone, Copy)]
pub struct PercentOfEquity {
    pub fraction: f64,
}

impl PositionSizer for PercentOfEquity {
    fn size(&self, available_equity: f64, price: f64) -> u64 {
        if !(price > 0.0) || !(available_equity > 0.0) || !(self.fraction > 0.0) {
            return 0;
        }
        let units = (available_equity * self.fraction / price).floor();
        if units.is_finite() && units >= 1.0 {
            units as u64
        } else {
            0
        }
    }

    fn name(&self) -> &str {
        "percent_of_equity"
    }
}

/// Serializable sizing choice for configuration files.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SizingConfig {
    FixedQuantity { quantity: u64 },
    PercentOfEquity { percent: f64 },
}

impl SizingConfig {
    pub fn build(&self) -> Box<dyn PositionSizer> {
        match *self {
            Self::FixedQuantity { quantity } => Box::new(FixedQuantity(quantity)),
            Self::PercentOfEquity { percent } => Box::new(PercentOfEquity {
                fraction: percent / 100.0,
            }),
        }
    }
}

impl Default for SizingConfig {
    fn default() -> Self {
        Self::PercentOfEquity { percent: 100.0 }
    }
}
