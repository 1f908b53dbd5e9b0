//! Backtest runner — wires together run config, features, simulator and metrics.
//!
//! Two entry points:
//! - `Runner::run()`: loads the universe from a `FeatureProvider`, then runs.
//! - `Runner::run_on_features()`: takes pre-loaded features. Used by comparisons so
//!   the same data is reused across methods.

use std::sync::atomic::AtomicBool;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use alphalab_core::diagnostics::Diagnostic;
use alphalab_core::domain::{AllocationSnapshot, Symbol, TradeResult};
use alphalab_core::features::FeatureError;
use alphalab_core::portfolio::PortfolioManager;
use alphalab_core::strategy::StrategyRegistry;
use alphalab_core::{ConfigError, FeatureProvider, FeatureSet, RunStatus, SimulationOutcome, Simulator};

use crate::config::{RunConfig, RunId};
use crate::metrics::{rolling_metrics, EvaluationContext, PerformanceMetrics, RollingPoint};

/// Errors from the runner.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("feature error: {0}")]
    Features(#[from] FeatureError),
}

/// Bumped whenever the report layout changes.
pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    SingleStrategy,
    Portfolio,
}

/// Complete result of one backtest run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestReport {
    /// Schema version for forward-compatible deserialization.
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub run_id: RunId,
    pub label: String,
    pub mode: RunMode,
    pub status: RunStatus,
    pub steps: usize,
    pub metrics: PerformanceMetrics,
    pub rolling: Vec<RollingPoint>,
    pub trades: Vec<TradeResult>,
    pub allocations: Vec<AllocationSnapshot>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Reports written before the field existed read as the current version.
fn default_schema_version() -> u32 {
    SCHEMA_VERSION
}

impl BacktestReport {
    fn from_outcome(config: &RunConfig, mode: RunMode, outcome: SimulationOutcome) -> Self {
        let ctx = EvaluationContext::from_config(&config.backtest);
        let metrics = PerformanceMetrics::compute(&outcome.trades, &outcome.allocations, &ctx);
        let rolling = rolling_metrics(&outcome.trades, config.evaluation.rolling_window);
        Self {
            schema_version: SCHEMA_VERSION,
            run_id: config.run_id(),
            label: config.display_label(),
            mode,
            status: outcome.status,
            steps: outcome.steps,
            metrics,
            rolling,
            trades: outcome.trades,
            allocations: outcome.allocations,
            diagnostics: outcome.diagnostics,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.status.is_cancelled()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Load every symbol of `universe`. Symbols the provider does not know are left
/// out (the simulator reports them per step); any other provider error aborts.
pub fn load_features(provider: &dyn FeatureProvider, universe: &[Symbol]) -> Result<FeatureSet, FeatureError> {
    let mut features = FeatureSet::new();
    for symbol in universe {
        match provider.load(symbol) {
            Ok(table) => features.insert(table),
            Err(FeatureError::SymbolNotFound { symbol }) => {
                warn!(%symbol, "no feature data, symbol will be skipped");
            }
            Err(err) => return Err(err),
        }
    }
    Ok(features)
}

/// Runs backtests against a strategy registry.
#[derive(Debug, Clone)]
pub struct Runner {
    registry: StrategyRegistry,
}

impl Default for Runner {
    fn default() -> Self {
        Self::new(StrategyRegistry::with_builtins())
    }
}

impl Runner {
    pub fn new(registry: StrategyRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &StrategyRegistry {
        &self.registry
    }

    /// Validate, load features, simulate and evaluate.
    pub fn run(
        &self,
        config: &RunConfig,
        provider: &dyn FeatureProvider,
        cancel: Option<&AtomicBool>,
    ) -> Result<BacktestReport, RunError> {
        config.validate(&self.registry)?;
        let features = load_features(provider, &config.backtest.universe)?;
        self.simulate(config, &features, cancel)
    }

    /// Same as `run` with features already in memory. No I/O.
    pub fn run_on_features(
        &self,
        config: &RunConfig,
        features: &FeatureSet,
        cancel: Option<&AtomicBool>,
    ) -> Result<BacktestReport, RunError> {
        config.validate(&self.registry)?;
        self.simulate(config, features, cancel)
    }

    /// Simulate and evaluate a config that has already passed `validate`.
    fn simulate(
        &self,
        config: &RunConfig,
        features: &FeatureSet,
        cancel: Option<&AtomicBool>,
    ) -> Result<BacktestReport, RunError> {
        let mut simulator = Simulator::new(config.backtest.clone())?.with_parallelism(config.evaluation.parallel);

        let (mode, outcome) = if config.is_portfolio() {
            let portfolio = config.portfolio_or_default();
            let manager = PortfolioManager::from_configs(
                &self.registry,
                &config.strategies,
                portfolio.combination,
                portfolio.allocation,
            )?;
            (RunMode::Portfolio, simulator.run_portfolio(&manager, features, cancel))
        } else {
            if let Some(filter) = &config.risk {
                simulator = simulator.with_risk_filter(filter.clone());
            }
            let strategy = self.registry.create_from(&config.strategies[0])?;
            (RunMode::SingleStrategy, simulator.run(strategy.as_ref(), features, cancel))
        };

        let report = BacktestReport::from_outcome(config, mode, outcome);
        info!(
            run_id = %report.run_id,
            label = %report.label,
            trades = report.metrics.trade_count,
            win_rate = report.metrics.win_rate,
            total_return = report.metrics.total_return,
            sharpe = ?report.metrics.sharpe,
            "backtest complete"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alphalab_core::features::{InMemoryProvider, SyntheticProvider};
    use alphalab_core::strategy::StrategyConfig;
    use alphalab_core::{BacktestConfig, FeatureTable};
    use chrono::{Duration, TimeZone, Utc};

    fn config(universe: &[&str]) -> RunConfig {
        let start = Utc.with_ymd_and_hms(2024, 1, 3, 0, 0, 0).unwrap();
        RunConfig {
            label: None,
            backtest: BacktestConfig::new(
                universe.iter().map(|s| s.to_string()).collect(),
                start,
                start + Duration::hours(48),
                Duration::hours(6),
                Duration::hours(2),
            ),
            strategies: vec![StrategyConfig::new("momentum_rank")],
            portfolio: None,
            risk: None,
            evaluation: Default::default(),
        }
    }

    #[test]
    fn unknown_symbols_are_skipped_at_load() {
        let provider = InMemoryProvider::new();
        let features = load_features(&provider, &["BTC".to_string()]).unwrap();
        assert!(features.is_empty());
    }

    #[test]
    fn provider_errors_other_than_missing_abort() {
        struct Broken;
        impl FeatureProvider for Broken {
            fn load(&self, _symbol: &str) -> Result<FeatureTable, FeatureError> {
                Err(FeatureError::Source("warehouse offline".into()))
            }
        }
        let err = Runner::default().run(&config(&["BTC"]), &Broken, None).unwrap_err();
        assert!(matches!(err, RunError::Features(FeatureError::Source(_))));
    }

    /// Counts `load` calls; serves nothing.
    #[derive(Default)]
    struct Counting {
        loads: std::sync::atomic::AtomicUsize,
    }

    impl FeatureProvider for Counting {
        fn load(&self, symbol: &str) -> Result<FeatureTable, FeatureError> {
            self.loads.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Err(FeatureError::SymbolNotFound { symbol: symbol.to_string() })
        }
    }

    #[test]
    fn invalid_config_fails_before_loading() {
        let mut cfg = config(&["BTC", "ETH"]);
        cfg.strategies[0].name = "nope".into();
        let provider = Counting::default();
        let err = Runner::default().run(&cfg, &provider, None).unwrap_err();
        assert!(matches!(err, RunError::Config(ConfigError::UnknownStrategy(_))));
        assert_eq!(provider.loads.load(std::sync::atomic::Ordering::SeqCst), 0);
    }

    #[test]
    fn preloaded_features_are_still_validated() {
        let mut cfg = config(&["BTC"]);
        cfg.evaluation.rolling_window = 0;
        let err = Runner::default()
            .run_on_features(&cfg, &FeatureSet::new(), None)
            .unwrap_err();
        assert!(matches!(err, RunError::Config(ConfigError::Invalid { .. })));
    }

    #[test]
    fn valid_config_loads_each_symbol_once() {
        let provider = Counting::default();
        let report = Runner::default().run(&config(&["BTC", "ETH"]), &provider, None).unwrap();
        assert_eq!(provider.loads.load(std::sync::atomic::Ordering::SeqCst), 2);
        assert!(report.trades.is_empty());
    }

    #[test]
    fn report_carries_identity_and_schema() {
        let cfg = config(&["BTC", "ETH"]);
        let report = Runner::default().run(&cfg, &SyntheticProvider::default(), None).unwrap();
        assert_eq!(report.schema_version, SCHEMA_VERSION);
        assert_eq!(report.run_id, cfg.run_id());
        assert_eq!(report.mode, RunMode::SingleStrategy);
        assert_eq!(report.status, RunStatus::Completed);
        assert_eq!(report.steps, 25);

        let json = report.to_json().unwrap();
        let back: BacktestReport = serde_json::from_str(&json).unwrap();
        assert_eq!(back.run_id, report.run_id);
        assert_eq!(back.trades.len(), report.trades.len());
    }
}
