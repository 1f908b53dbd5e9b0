//! AlphaLab Core — feature views, strategy contract, walk-forward simulator, portfolio layer.
//!
//! This crate contains the heart of the backtester:
//! - Domain types (signals, positions, trades, allocations)
//! - Point-in-time feature tables and views
//! - The strategy contract, registry and built-in strategies
//! - Walk-forward simulator with cost model and append-only ledger
//! - Signal combination and capital allocation for multi-strategy runs

pub mod config;
pub mod diagnostics;
pub mod domain;
pub mod engine;
pub mod error;
pub mod features;
pub mod portfolio;
pub mod risk;
pub mod strategy;
pub mod time;

pub use config::BacktestConfig;
pub use diagnostics::{Diagnostic, StrategyOperation};
pub use engine::{CostModel, RunStatus, SimulationOutcome, Simulator};
pub use error::{ConfigError, StrategyError};
pub use features::{FeatureProvider, FeatureSet, FeatureTable, FeatureView, FeatureViews};
pub use strategy::{Strategy, StrategyRegistry};
