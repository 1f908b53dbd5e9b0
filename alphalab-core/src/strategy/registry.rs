//! Strategy registry — resolves configured names to runtime trait objects.
//!
//! Every strategy a run can reference is registered up front; configs are validated
//! against the registry before any simulation starts, so an unknown name is a
//! `ConfigError`, never a mid-run surprise.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::builtin::{BollingerMeanReversion, MacdRsiConfluence, MomentumRank};
use super::{BinarySignalAdapter, Strategy};
use crate::error::ConfigError;

/// Numeric strategy parameters keyed by name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StrategyParams(BTreeMap<String, f64>);

impl StrategyParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: f64) -> Self {
        self.0.insert(name.into(), value);
        self
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.0.get(name).copied()
    }

    /// Named f64 parameter, falling back to `default`.
    pub fn f64_or(&self, name: &str, default: f64) -> f64 {
        self.get(name).unwrap_or(default)
    }

    /// Named count parameter, falling back to `default`. Negative values clamp to 0.
    pub fn usize_or(&self, name: &str, default: usize) -> usize {
        self.get(name).map(|v| v.max(0.0) as usize).unwrap_or(default)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// One strategy entry in a run configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyConfig {
    pub name: String,
    #[serde(default)]
    pub params: StrategyParams,
    /// Weight used by the `weighted` combination method.
    #[serde(default = "default_weight")]
    pub weight: f64,
}

fn default_weight() -> f64 {
    1.0
}

impl StrategyConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: StrategyParams::new(),
            weight: default_weight(),
        }
    }

    pub fn with_params(mut self, params: StrategyParams) -> Self {
        self.params = params;
        self
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }
}

pub type StrategyConstructor = fn(&StrategyParams) -> Box<dyn Strategy>;

fn build_momentum_rank(params: &StrategyParams) -> Box<dyn Strategy> {
    Box::new(MomentumRank::from_params(params))
}

fn build_bollinger_mean_reversion(params: &StrategyParams) -> Box<dyn Strategy> {
    Box::new(BollingerMeanReversion::from_params(params))
}

fn build_macd_rsi_confluence(params: &StrategyParams) -> Box<dyn Strategy> {
    Box::new(BinarySignalAdapter::new(MacdRsiConfluence::from_params(params)))
}

/// Name → constructor table.
#[derive(Clone, Default)]
pub struct StrategyRegistry {
    constructors: BTreeMap<String, StrategyConstructor>,
}

impl std::fmt::Debug for StrategyRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrategyRegistry")
            .field("names", &self.constructors.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl StrategyRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-loaded with `momentum_rank`, `bollinger_mean_reversion` and the
    /// long/flat `macd_rsi_confluence` (behind `BinarySignalAdapter`).
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(MomentumRank::NAME, build_momentum_rank);
        registry.register(BollingerMeanReversion::NAME, build_bollinger_mean_reversion);
        registry.register(MacdRsiConfluence::NAME, build_macd_rsi_confluence);
        registry
    }

    /// Register (or replace) a constructor.
    pub fn register(&mut self, name: impl Into<String>, constructor: StrategyConstructor) {
        self.constructors.insert(name.into(), constructor);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.constructors.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.constructors.keys().map(|k| k.as_str())
    }

    pub fn create(&self, name: &str, params: &StrategyParams) -> Result<Box<dyn Strategy>, ConfigError> {
        let constructor = self
            .constructors
            .get(name)
            .ok_or_else(|| ConfigError::UnknownStrategy(name.to_string()))?;
        Ok(constructor(params))
    }

    pub fn create_from(&self, config: &StrategyConfig) -> Result<Box<dyn Strategy>, ConfigError> {
        self.create(&config.name, &config.params)
    }

    /// Check a whole set of names before any simulation starts.
    pub fn validate<'a>(&self, names: impl IntoIterator<Item = &'a str>) -> Result<(), ConfigError> {
        let mut seen = 0usize;
        for name in names {
            if !self.contains(name) {
                return Err(ConfigError::UnknownStrategy(name.to_string()));
            }
            seen += 1;
        }
        if seen == 0 {
            return Err(ConfigError::NoStrategies);
        }
        Ok(())
    }
}
