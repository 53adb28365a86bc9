//! Fill simulation primitives: costs, protective-order fill prices, and
//! per-bar exit arbitration.
//!
//! Prices here are market prices. Slippage is a per-unit amount charged on
//! every fill (buyers pay it, sellers give it up) and commission is a rate on
//! market notional; both are booked as costs so that excursions stay pure
//! price action.

use serde::{Deserialize, Serialize};

use crate::domain::Bar;
use crate::strategy::{ExitCheck, ExitPriority};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CostModel {
    /// Adverse price move per unit, in price units.
    pub slippage_per_unit: f64,
    /// Fraction of notional (0.001 = 10 bps).
    pub commission_rate: f64,
}

impl CostModel {
    pub fn new(slippage_per_unit: f64, commission_rate: f64) -> Self {
        Self {
            slippage_per_unit,
            commission_rate,
        }
    }

    pub fn frictionless() -> Self {
        Self::new(0.0, 0.0)
    }

    pub fn slippage(&self, quantity: u64) -> f64 {
        self.slippage_per_unit * quantity as f64
    }

    pub fn commission(&self, price: f64, quantity: u64) -> f64 {
        self.commission_rate * price * quantity as f64
    }

    /// All-in cost of buying one unit at `price`, used for sizing.
    pub fn unit_cost(&self, price: f64) -> f64 {
        price * (1.0 + self.commission_rate) + self.slippage_per_unit
    }
}

impl Default for CostModel {
    fn default() -> Self {
        Self::frictionless()
    }
}

/// Sell-stop fill: at the stop when the bar trades through it, at the open
/// when the bar opens below it.
pub fn stop_fill_price(bar: &Bar, stop: f64) -> Option<f64> {
    if bar.open <= stop {
        Some(bar.open)
    } else if bar.low <= stop {
        Some(stop)
    } else {
        None
    }
}

/// Sell-limit fill: at the target when the bar trades through it, at the open
/// when the bar opens above it.
pub fn target_fill_price(bar: &Bar, target: f64) -> Option<f64> {
    if bar.open >= target {
        Some(bar.open)
    } else if bar.high >= target {
        Some(target)
    } else {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExitResolution {
    pub check: ExitCheck,
    pub price: f64,
}

/// First satisfied exit check in `priority` order; later checks are not
/// evaluated.
pub fn resolve_exit(
    priority: ExitPriority,
    bar: &Bar,
    stop: Option<f64>,
    take_profit: Option<f64>,
    signal_exit: bool,
) -> Option<ExitResolution> {
    priority.checks().iter().find_map(|&check| {
        let price = match check {
            ExitCheck::StopLoss => stop.and_then(|s| stop_fill_price(bar, s)),
            ExitCheck::SignalExit => signal_exit.then_some(bar.open),
            ExitCheck::TakeProfit => take_profit.and_then(|t| target_fill_price(bar, t)),
        }?;
        Some(ExitResolution { check, price })
    })
}
