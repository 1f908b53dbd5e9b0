//! Serializable run configuration, loaded from TOML.
//!
//! A run file names the backtest range, one or more strategies, and optionally a
//! portfolio section. One strategy without `[portfolio]` runs in single-strategy
//! mode; anything else runs through the portfolio manager.
//!
//! ```toml
//! label = "momentum vs reversion"
//!
//! [backtest]
//! universe = ["BTC", "ETH"]
//! start = "2024-01-03T00:00:00Z"
//! end = "2024-01-10T00:00:00Z"
//! window_hours = 6.0
//! shift_hours = 1.0
//! fee_rate = 0.001
//!
//! [[strategies]]
//! name = "momentum_rank"
//! weight = 2.0
//! [strategies.params]
//! max_positions = 2
//!
//! [portfolio]
//! combination = "confidence_weighted"
//! [portfolio.allocation]
//! method = "proportional"
//! max_weight = 0.5
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use alphalab_core::portfolio::{AllocatorConfig, CombinationMethod};
use alphalab_core::risk::RiskFilter;
use alphalab_core::strategy::{StrategyConfig, StrategyRegistry};
use alphalab_core::{BacktestConfig, ConfigError};

/// Unique identifier for a run (content-addressable hash of its config).
pub type RunId = String;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub backtest: BacktestConfig,
    pub strategies: Vec<StrategyConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub portfolio: Option<PortfolioConfig>,
    /// Optional pre-signal veto, single-strategy mode only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk: Option<RiskFilter>,
    #[serde(default)]
    pub evaluation: EvaluationConfig,
}

/// How signals from several strategies are merged and sized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioConfig {
    #[serde(default = "default_combination")]
    pub combination: CombinationMethod,
    #[serde(default)]
    pub allocation: AllocatorConfig,
}

impl Default for PortfolioConfig {
    fn default() -> Self {
        Self {
            combination: default_combination(),
            allocation: AllocatorConfig::default(),
        }
    }
}

fn default_combination() -> CombinationMethod {
    CombinationMethod::ConfidenceWeighted
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluationConfig {
    /// Trades per window for rolling metrics.
    pub rolling_window: usize,
    /// Run per-symbol work within a step on the rayon pool.
    pub parallel: bool,
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            rolling_window: 20,
            parallel: true,
        }
    }
}

impl RunConfig {
    /// Parse a run file. Only syntax and shape are checked here; see `validate`.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Read and parse a run file from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_toml_str(&content)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Check everything that can be checked before data is loaded.
    pub fn validate(&self, registry: &StrategyRegistry) -> Result<(), ConfigError> {
        self.backtest.validate()?;
        registry.validate(self.strategies.iter().map(|s| s.name.as_str()))?;
        for strategy in &self.strategies {
            if !strategy.weight.is_finite() || strategy.weight < 0.0 {
                return Err(ConfigError::invalid(
                    "strategies.weight",
                    strategy.weight,
                    format!("weight for '{}' must be finite and >= 0", strategy.name),
                ));
            }
        }
        if let Some(portfolio) = &self.portfolio {
            portfolio.allocation.validate()?;
        }
        if self.evaluation.rolling_window == 0 {
            return Err(ConfigError::invalid(
                "evaluation.rolling_window",
                0,
                "rolling window must hold at least one trade",
            ));
        }
        Ok(())
    }

    /// Whether the run goes through the portfolio manager.
    pub fn is_portfolio(&self) -> bool {
        self.portfolio.is_some() || self.strategies.len() > 1
    }

    /// Portfolio settings, defaulted when several strategies run without a section.
    pub fn portfolio_or_default(&self) -> PortfolioConfig {
        self.portfolio.clone().unwrap_or_default()
    }

    /// Deterministic hash of this configuration.
    ///
    /// Two runs with identical configs share a RunId.
    pub fn run_id(&self) -> RunId {
        let json = serde_json::to_string(self).unwrap_or_else(|_| format!("{self:?}"));
        blake3::hash(json.as_bytes()).to_hex().to_string()
    }

    /// Human label for reports: the configured label, or the strategy names.
    pub fn display_label(&self) -> String {
        self.label.clone().unwrap_or_else(|| {
            self.strategies
                .iter()
                .map(|s| s.name.as_str())
                .collect::<Vec<_>>()
                .join("+")
        })
    }
}
