//! Property tests for metric and grid invariants.
//!
//! 1. Drawdown bounds: max drawdown stays within [-1, 0] on positive curves
//! 2. Monotone curves: no drawdown, non-negative return
//! 3. Grid accounting: every combination is a candidate or a rejection, once

use std::collections::BTreeMap;

use proptest::prelude::*;

use barwalk_core::domain::{ParamSchema, ParamSpec, ParamValue};
use barwalk_runner::metrics::{max_drawdown, total_return};
use barwalk_runner::{ParamGrid, PortfolioMetrics};

// ── Strategies (proptest) ────────────────────────────────────────────

fn arb_equity_curve() -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(1.0..1_000_000.0_f64, 2..200)
}

fn arb_gains() -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(0.0..0.05_f64, 1..200)
}

fn arb_int_axis() -> impl Strategy<Value = Vec<ParamValue>> {
    prop::collection::vec((0i64..80).prop_map(ParamValue::Int), 1..5)
}

fn schema() -> ParamSchema {
    ParamSchema::new(vec![
        ParamSpec::int("fast", 10, 2, 50),
        ParamSpec::int("slow", 30, 5, 60),
    ])
}

// ── 1. Drawdown bounds ───────────────────────────────────────────────

proptest! {
    #[test]
    fn drawdown_is_a_bounded_loss(curve in arb_equity_curve()) {
        let dd = max_drawdown(&curve);
        prop_assert!(dd <= 0.0);
        prop_assert!(dd > -1.0);

        let metrics = PortfolioMetrics::compute(&curve, &[]);
        prop_assert!(metrics.max_drawdown_pct >= 0.0);
        prop_assert!(metrics.composite_score().is_finite());
    }
}

// ── 2. Monotone curves ───────────────────────────────────────────────

proptest! {
    #[test]
    fn rising_curve_has_no_drawdown(gains in arb_gains()) {
        let mut curve = vec![10_000.0];
        for g in gains {
            let last = curve[curve.len() - 1];
            curve.push(last * (1.0 + g));
        }
        prop_assert_eq!(max_drawdown(&curve), 0.0);
        prop_assert!(total_return(&curve) >= 0.0);
    }
}

// ── 3. Grid accounting ───────────────────────────────────────────────

proptest! {
    #[test]
    fn every_combination_is_accounted_for(fast in arb_int_axis(), slow in arb_int_axis()) {
        let grid = ParamGrid::default().axis("fast", fast).axis("slow", slow);
        let expansion = grid.expand(&schema(), &BTreeMap::new());

        prop_assert_eq!(expansion.candidates.len() + expansion.rejected.len(), grid.size());

        let mut indices: Vec<usize> = expansion
            .candidates
            .iter()
            .map(|c| c.index)
            .chain(expansion.rejected.iter().map(|r| r.index))
            .collect();
        indices.sort_unstable();
        prop_assert_eq!(indices, (0..grid.size()).collect::<Vec<_>>());
    }
}
