//! Barwalk Runner: orchestration on top of `barwalk-core`.
//!
//! This crate provides:
//! - TOML run settings
//! - Portfolio metrics and the optimizer's composite score
//! - Parameter grids with per-candidate rejection
//! - Single-backtest runner
//! - Walk-forward optimization with stability metrics
//! - Parallel basket runs with per-symbol timeouts and a skip list
//! - Window reports, CSV/JSON export and Markdown summaries
//! - A CSV bar loader

pub mod basket;
pub mod config;
pub mod data_loader;
pub mod grid;
pub mod metrics;
pub mod report;
pub mod runner;
pub mod skip;
pub mod walk_forward;

pub use basket::{
    BasketError, BasketMode, BasketReport, BasketRequest, BasketRunner, SkippedSymbol,
    SymbolOutcome,
};
pub use config::{ConfigError, RunSettings};
pub use data_loader::CsvBarLoader;
pub use grid::{Candidate, GridExpansion, ParamGrid, RejectedCandidate};
pub use metrics::PortfolioMetrics;
pub use report::{standard_reports, ReportError, TradeRow, WindowReport};
pub use runner::{BacktestResult, Runner};
pub use skip::SkipReason;
pub use walk_forward::{
    generate_periods, OptimizationResult, StabilityMetrics, WalkForwardConfig, WalkForwardError,
    WalkForwardOptimizer, WalkForwardPeriod, WalkForwardReport,
};
