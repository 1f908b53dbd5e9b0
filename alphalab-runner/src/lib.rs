//! AlphaLab Runner — run configuration, orchestration, evaluation and comparison.
//!
//! This crate builds on `alphalab-core` to provide:
//! - TOML run files (`RunConfig`) with content-addressed run ids
//! - The backtest runner: load features, simulate, evaluate, report
//! - Performance metrics over the trade ledger and allocation history
//! - Combination/allocation method comparison and diversification diagnostics
//! - Tracing subscriber setup

pub mod comparison;
pub mod config;
pub mod logging;
pub mod metrics;
pub mod runner;

pub use comparison::{
    diversification_score, strategy_contributions, ComparisonRow, MethodComparison, StrategyContribution,
};
pub use config::{EvaluationConfig, PortfolioConfig, RunConfig, RunId};
pub use logging::init_tracing;
pub use metrics::{EvaluationContext, PerformanceMetrics, ProfitFactor, RollingPoint};
pub use runner::{load_features, BacktestReport, RunError, RunMode, Runner, SCHEMA_VERSION};
