//! Capital allocator — turns combined alphas into target weights.
//!
//! Long-only: a symbol qualifies with `alpha > 0` and `alpha >= min_alpha`. Weights
//! always sum to exactly 0 (nothing qualifies) or 1. The per-position cap holds unless
//! it is arithmetically impossible (`max_weight * k < 1`), in which case `allocate`
//! falls back to equal weight and returns the violation as a warning.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{Allocation, StrategySignal, Symbol};
use crate::error::ConfigError;

const EPS: f64 = 1e-12;
const MIN_VOLATILITY: f64 = 0.1;
const DEFAULT_VOLATILITY: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationMethod {
    Proportional,
    EqualWeight,
    TopN,
    ThresholdTiers,
    InverseVolatility,
}

impl AllocationMethod {
    pub const ALL: [AllocationMethod; 5] = [
        Self::Proportional,
        Self::EqualWeight,
        Self::TopN,
        Self::ThresholdTiers,
        Self::InverseVolatility,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Proportional => "proportional",
            Self::EqualWeight => "equal_weight",
            Self::TopN => "top_n",
            Self::ThresholdTiers => "threshold_tiers",
            Self::InverseVolatility => "inverse_volatility",
        }
    }
}

impl fmt::Display for AllocationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Conviction bands for `ThresholdTiers`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TierConfig {
    pub high_threshold: f64,
    pub medium_threshold: f64,
    pub high: f64,
    pub medium: f64,
    pub low: f64,
}

impl Default for TierConfig {
    fn default() -> Self {
        Self {
            high_threshold: 0.5,
            medium_threshold: 0.3,
            high: 1.5,
            medium: 1.0,
            low: 0.5,
        }
    }
}

impl TierConfig {
    fn multiplier(&self, alpha: f64) -> f64 {
        if alpha > self.high_threshold {
            self.high
        } else if alpha > self.medium_threshold {
            self.medium
        } else {
            self.low
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AllocatorConfig {
    pub method: AllocationMethod,
    pub max_positions: Option<usize>,
    /// Per-position cap as a fraction of capital.
    pub max_weight: f64,
    pub min_alpha: f64,
    /// Positions held by `TopN`.
    pub top_n: usize,
    pub tiers: TierConfig,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            method: AllocationMethod::Proportional,
            max_positions: None,
            max_weight: 1.0,
            min_alpha: 0.0,
            top_n: 10,
            tiers: TierConfig::default(),
        }
    }
}

impl AllocatorConfig {
    pub fn new(method: AllocationMethod) -> Self {
        Self {
            method,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.max_weight > 0.0 && self.max_weight <= 1.0) {
            return Err(ConfigError::invalid("max_weight", self.max_weight, "must be in (0, 1]"));
        }
        if !self.min_alpha.is_finite() {
            return Err(ConfigError::invalid("min_alpha", self.min_alpha, "must be finite"));
        }
        if self.top_n == 0 {
            return Err(ConfigError::invalid("top_n", 0, "must be at least 1"));
        }
        if self.max_positions == Some(0) {
            return Err(ConfigError::invalid("max_positions", 0, "must be at least 1 when set"));
        }
        let t = &self.tiers;
        if t.medium_threshold > t.high_threshold {
            return Err(ConfigError::invalid(
                "tiers.medium_threshold",
                t.medium_threshold,
                format!("must not exceed high_threshold ({})", t.high_threshold),
            ));
        }
        for (field, m) in [("tiers.high", t.high), ("tiers.medium", t.medium), ("tiers.low", t.low)] {
            if !m.is_finite() || m <= 0.0 {
                return Err(ConfigError::invalid(field, m, "multiplier must be positive"));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AllocationError {
    #[error("cap {max_weight} cannot hold {positions} positions summing to 1")]
    Infeasible { max_weight: f64, positions: usize },
}

/// Weights plus the constraint violation that forced a fallback, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct AllocationOutcome {
    pub weights: Allocation,
    pub warning: Option<AllocationError>,
}

impl AllocationOutcome {
    pub fn is_fallback(&self) -> bool {
        self.warning.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct CapitalAllocator {
    config: AllocatorConfig,
}

impl CapitalAllocator {
    pub fn new(config: AllocatorConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &AllocatorConfig {
        &self.config
    }

    /// Allocate, honoring the cap, or report why that is impossible.
    ///
    /// Every input symbol appears in the result; non-held symbols get 0.
    /// `volatility` maps symbol to `atr_pct` and is read only by `InverseVolatility`.
    pub fn try_allocate(
        &self,
        signals: &[StrategySignal],
        volatility: &BTreeMap<Symbol, f64>,
    ) -> Result<Allocation, AllocationError> {
        let mut weights: Allocation = signals.iter().map(|s| (s.symbol.clone(), 0.0)).collect();
        let held = self.held(signals);
        if held.is_empty() {
            return Ok(weights);
        }
        if self.config.max_weight * (held.len() as f64) < 1.0 - EPS {
            return Err(AllocationError::Infeasible {
                max_weight: self.config.max_weight,
                positions: held.len(),
            });
        }

        let raw: Vec<f64> = held
            .iter()
            .map(|s| self.raw_weight(s, volatility))
            .collect();
        let capped = cap_and_redistribute(normalize(raw), self.config.max_weight);
        for (s, w) in held.iter().zip(capped) {
            weights.insert(s.symbol.clone(), w);
        }
        Ok(weights)
    }

    /// Like `try_allocate`, but an infeasible cap degrades to equal weight over the
    /// held symbols (each above the cap) and is reported in `warning`.
    pub fn allocate(&self, signals: &[StrategySignal], volatility: &BTreeMap<Symbol, f64>) -> AllocationOutcome {
        match self.try_allocate(signals, volatility) {
            Ok(weights) => AllocationOutcome {
                weights,
                warning: None,
            },
            Err(err) => {
                let held = self.held(signals);
                let w = 1.0 / held.len() as f64;
                let mut weights: Allocation = signals.iter().map(|s| (s.symbol.clone(), 0.0)).collect();
                for s in held {
                    weights.insert(s.symbol.clone(), w);
                }
                AllocationOutcome {
                    weights,
                    warning: Some(err),
                }
            }
        }
    }

    /// Symbols that will receive weight, best alpha first (ties by symbol).
    fn held<'a>(&self, signals: &'a [StrategySignal]) -> Vec<&'a StrategySignal> {
        let mut qualifying: Vec<&StrategySignal> = signals
            .iter()
            .filter(|s| s.alpha_score > 0.0 && s.alpha_score >= self.config.min_alpha)
            .collect();
        qualifying.sort_by(|a, b| {
            b.alpha_score
                .total_cmp(&a.alpha_score)
                .then_with(|| a.symbol.cmp(&b.symbol))
        });
        if let Some(max) = self.config.max_positions {
            qualifying.truncate(max);
        }
        if self.config.method == AllocationMethod::TopN {
            qualifying.truncate(self.config.top_n);
        }
        qualifying
    }

    fn raw_weight(&self, signal: &StrategySignal, volatility: &BTreeMap<Symbol, f64>) -> f64 {
        match self.config.method {
            AllocationMethod::Proportional => signal.alpha_score,
            AllocationMethod::EqualWeight | AllocationMethod::TopN => 1.0,
            AllocationMethod::ThresholdTiers => self.config.tiers.multiplier(signal.alpha_score),
            AllocationMethod::InverseVolatility => {
                let vol = volatility
                    .get(&signal.symbol)
                    .copied()
                    .filter(|v| v.is_finite())
                    .unwrap_or(DEFAULT_VOLATILITY);
                1.0 / vol.max(MIN_VOLATILITY)
            }
        }
    }
}

fn normalize(mut weights: Vec<f64>) -> Vec<f64> {
    let total: f64 = weights.iter().sum();
    if total > 0.0 {
        weights.iter_mut().for_each(|w| *w /= total);
    }
    weights
}

/// Clip to `cap` and hand the excess to uncapped positions pro rata, until stable.
/// If nothing is left to absorb it, the capped set is renormalized.
fn cap_and_redistribute(mut weights: Vec<f64>, cap: f64) -> Vec<f64> {
    let n = weights.len();
    let mut capped = vec![false; n];
    for _ in 0..=n {
        let mut excess = 0.0;
        for (w, c) in weights.iter_mut().zip(capped.iter_mut()) {
            if *w > cap + EPS {
                excess += *w - cap;
                *w = cap;
                *c = true;
            }
        }
        if excess <= EPS {
            break;
        }
        let absorb: f64 = weights
            .iter()
            .zip(&capped)
            .filter(|(_, c)| !**c)
            .map(|(w, _)| *w)
            .sum();
        if absorb <= EPS {
            break;
        }
        for (w, c) in weights.iter_mut().zip(&capped) {
            if !*c {
                *w += excess * *w / absorb;
            }
        }
    }
    let normalized = normalize(weights);
    normalized.into_iter().map(|w| w.min(cap)).collect()
}
