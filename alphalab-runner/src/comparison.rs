//! Side-by-side comparison of combination and allocation methods, plus
//! allocation/signal diagnostics.

use std::collections::BTreeMap;
use std::sync::atomic::AtomicBool;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;

use alphalab_core::domain::{Allocation, StrategySignal};
use alphalab_core::portfolio::{AllocationMethod, CombinationMethod};
use alphalab_core::FeatureSet;

use crate::config::RunConfig;
use crate::metrics::{mean_f64, std_dev};
use crate::runner::{BacktestReport, RunError, Runner};

/// Headline metrics of one method's run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonRow {
    pub method: String,
    pub sharpe: Option<f64>,
    pub total_return: f64,
    pub max_drawdown: f64,
    pub volatility: f64,
    pub calmar: Option<f64>,
    pub win_rate: f64,
    pub trade_count: usize,
}

impl ComparisonRow {
    fn from_report(method: &str, report: &BacktestReport) -> Self {
        let m = &report.metrics;
        Self {
            method: method.to_string(),
            sharpe: m.sharpe,
            total_return: m.total_return,
            max_drawdown: m.max_drawdown,
            volatility: m.volatility,
            calmar: m.calmar,
            win_rate: m.win_rate,
            trade_count: m.trade_count,
        }
    }
}

/// Runs one portfolio backtest per method over shared, pre-loaded features.
pub struct MethodComparison<'a> {
    runner: &'a Runner,
    parallel: bool,
}

impl<'a> MethodComparison<'a> {
    pub fn new(runner: &'a Runner) -> Self {
        Self { runner, parallel: true }
    }

    /// Enable or disable running methods on the rayon pool.
    pub fn with_parallelism(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// One run per combination method; the allocation settings stay as configured.
    pub fn compare_combinations(
        &self,
        config: &RunConfig,
        features: &FeatureSet,
        methods: &[CombinationMethod],
    ) -> Result<Vec<ComparisonRow>, RunError> {
        let variants: Vec<(String, RunConfig)> = methods
            .iter()
            .map(|&method| {
                let mut cfg = config.clone();
                let mut portfolio = cfg.portfolio_or_default();
                portfolio.combination = method;
                cfg.portfolio = Some(portfolio);
                (method.to_string(), cfg)
            })
            .collect();
        self.run_variants(variants, features)
    }

    /// One run per allocation method; the combination method stays as configured.
    pub fn compare_allocation_methods(
        &self,
        config: &RunConfig,
        features: &FeatureSet,
        methods: &[AllocationMethod],
    ) -> Result<Vec<ComparisonRow>, RunError> {
        let variants: Vec<(String, RunConfig)> = methods
            .iter()
            .map(|&method| {
                let mut cfg = config.clone();
                let mut portfolio = cfg.portfolio_or_default();
                portfolio.allocation.method = method;
                cfg.portfolio = Some(portfolio);
                (method.to_string(), cfg)
            })
            .collect();
        self.run_variants(variants, features)
    }

    fn run_variants(
        &self,
        variants: Vec<(String, RunConfig)>,
        features: &FeatureSet,
    ) -> Result<Vec<ComparisonRow>, RunError> {
        let run = |(method, cfg): &(String, RunConfig)| {
            let cancel: Option<&AtomicBool> = None;
            self.runner
                .run_on_features(cfg, features, cancel)
                .map(|report| ComparisonRow::from_report(method, &report))
        };
        let mut rows = if self.parallel {
            variants.par_iter().map(run).collect::<Result<Vec<_>, _>>()?
        } else {
            variants.iter().map(run).collect::<Result<Vec<_>, _>>()?
        };
        sort_by_sharpe(&mut rows);
        if let Some(best) = rows.first() {
            info!(methods = rows.len(), best = %best.method, sharpe = ?best.sharpe, "comparison complete");
        }
        Ok(rows)
    }
}

/// Best Sharpe first; rows without a Sharpe go last, ties broken by method name.
fn sort_by_sharpe(rows: &mut [ComparisonRow]) {
    rows.sort_by(|a, b| match (a.sharpe, b.sharpe) {
        (Some(x), Some(y)) => y.total_cmp(&x).then_with(|| a.method.cmp(&b.method)),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => a.method.cmp(&b.method),
    });
}

/// Normalized inverse Herfindahl index of the held weights.
///
/// 1.0 for equal weights, 0.0 for a single position or an empty allocation.
pub fn diversification_score(allocation: &Allocation) -> f64 {
    let held: Vec<f64> = allocation.values().copied().filter(|w| *w > 0.0).collect();
    let n = held.len();
    if n <= 1 {
        return 0.0;
    }
    let total: f64 = held.iter().sum();
    let hhi: f64 = held.iter().map(|w| (w / total).powi(2)).sum();
    ((1.0 - hhi) / (1.0 - 1.0 / n as f64)).clamp(0.0, 1.0)
}

/// Per-strategy summary of emitted signals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyContribution {
    pub strategy: String,
    pub signal_count: usize,
    pub avg_alpha: f64,
    pub alpha_std: f64,
    pub avg_confidence: f64,
}

/// Group signals by the strategy that produced them (`"unknown"` when untagged).
pub fn strategy_contributions(signals: &[StrategySignal]) -> Vec<StrategyContribution> {
    let mut groups: BTreeMap<&str, (Vec<f64>, Vec<f64>)> = BTreeMap::new();
    for signal in signals {
        let entry = groups.entry(signal.strategy_name().unwrap_or("unknown")).or_default();
        entry.0.push(signal.alpha_score);
        entry.1.push(signal.confidence);
    }
    groups
        .into_iter()
        .map(|(strategy, (alphas, confidences))| StrategyContribution {
            strategy: strategy.to_string(),
            signal_count: alphas.len(),
            avg_alpha: mean_f64(&alphas),
            alpha_std: std_dev(&alphas),
            avg_confidence: mean_f64(&confidences),
        })
        .collect()
}
