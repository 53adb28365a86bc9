//! Barwalk Core: bar series, indicator cache, strategy state machines, fill
//! simulation and the trade ledger.
//!
//! This crate contains the heart of the backtester:
//! - Domain types (bars, fills, positions, trades, parameters)
//! - Run-scoped indicator memoization with explicit warm-up handling
//! - Strategy state machines behind a no-lookahead decision guard
//! - The bar-by-bar execution simulator (stops, targets, pyramiding)
//! - An arena-backed trade ledger with windowed queries
//! - Market data interface, synthetic data, and ledger fingerprints

pub mod data;
pub mod domain;
pub mod engine;
pub mod error;
pub mod fingerprint;
pub mod indicators;
pub mod ledger;
pub mod strategy;

pub use data::{InMemoryLoader, MarketDataLoader};
pub use domain::{Bar, BarSeries, DataQualityError, ParamValue, ParameterSet, Position, Trade};
pub use engine::{run_backtest, EngineConfig, RunBudget, RunOutput};
pub use error::EngineError;
pub use fingerprint::{ledger_fingerprint, LedgerHash};
pub use ledger::{LedgerWindow, TradeLedger};
pub use strategy::{Decision, Signal, Strategy, StrategyRegistry};
