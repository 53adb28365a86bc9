//! Seeded random-walk bars for tests, benches and demos.
//!
//! Output is a pure function of the spec: same seed, same bars. Weekends are
//! skipped; every bar is OHLC-consistent.

use chrono::{Datelike, NaiveDate, Weekday};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::domain::Bar;

#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticSpec {
    pub symbol: String,
    pub start: NaiveDate,
    pub bars: usize,
    pub seed: u64,
    pub start_price: f64,
    /// Daily return is drawn uniformly from `drift ± volatility`.
    pub drift: f64,
    pub volatility: f64,
}

impl SyntheticSpec {
    pub fn new(symbol: impl Into<String>, start: NaiveDate, bars: usize, seed: u64) -> Self {
        Self {
            symbol: symbol.into(),
            start,
            bars,
            seed,
            start_price: 100.0,
            drift: 0.0005,
            volatility: 0.02,
        }
    }
}

/// Generate `spec.bars` weekday bars starting at (or after) `spec.start`.
pub fn random_walk(spec: &SyntheticSpec) -> Vec<Bar> {
    // Mix the symbol into the seed so a basket of symbols sharing one seed
    // does not move in lockstep.
    let symbol_bytes = blake3::hash(spec.symbol.as_bytes());
    let mut seed = [0u8; 32];
    seed.copy_from_slice(symbol_bytes.as_bytes());
    for (slot, byte) in seed.iter_mut().zip(spec.seed.to_le_bytes()) {
        *slot ^= byte;
    }
    let mut rng = StdRng::from_seed(seed);

    let mut bars = Vec::with_capacity(spec.bars);
    let mut price = spec.start_price;
    let mut date = spec.start;
    let spread = spec.volatility.abs().max(1e-9);

    while bars.len() < spec.bars {
        if matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
            date += chrono::Duration::days(1);
            continue;
        }
        let daily_return: f64 = spec.drift + rng.gen_range(-spread..spread);
        let open = price;
        let close = (price * (1.0 + daily_return)).max(0.01);
        let high = open.max(close) * (1.0 + rng.gen_range(0.0..0.01));
        let low = open.min(close) * (1.0 - rng.gen_range(0.0..0.01));
        let volume = rng.gen_range(500_000..5_000_000u64);
        bars.push(Bar::new(date, open, high, low, close, volume));

        price = close;
        date += chrono::Duration::days(1);
    }
    bars
}
