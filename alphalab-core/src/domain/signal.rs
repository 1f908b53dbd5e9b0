//! StrategySignal — a strategy's scored opinion about one symbol at one instant.
//!
//! Signals are created fresh at every evaluation step and never mutated afterwards;
//! combination produces new signals rather than editing the inputs.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::Symbol;

/// Opaque per-signal metadata (indicator snapshots, provenance, ...).
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// Metadata key carrying the name of the strategy that produced a signal.
pub const STRATEGY_NAME_KEY: &str = "strategy_name";

/// Legacy binary entry decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Long,
    Flat,
}

/// Scored signal emitted by a strategy for one symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategySignal {
    pub timestamp: DateTime<Utc>,
    pub symbol: Symbol,
    /// Directional conviction in [-1, 1]; positive = long.
    pub alpha_score: f64,
    /// Certainty in [0, 1].
    pub confidence: f64,
    /// How long the opinion is expected to stay valid.
    #[serde(with = "crate::time::serde_hours", rename = "horizon_hours")]
    pub horizon: Duration,
    #[serde(default)]
    pub metadata: Metadata,
}

impl StrategySignal {
    /// Build a signal, clamping alpha into [-1, 1] and confidence into [0, 1].
    ///
    /// Non-finite inputs collapse to a neutral, zero-confidence signal.
    pub fn new(
        timestamp: DateTime<Utc>,
        symbol: impl Into<Symbol>,
        alpha_score: f64,
        confidence: f64,
        horizon: Duration,
    ) -> Self {
        let (alpha_score, confidence) = if alpha_score.is_finite() && confidence.is_finite() {
            (alpha_score.clamp(-1.0, 1.0), confidence.clamp(0.0, 1.0))
        } else {
            (0.0, 0.0)
        };
        Self {
            timestamp,
            symbol: symbol.into(),
            alpha_score,
            confidence,
            horizon,
            metadata: Metadata::new(),
        }
    }

    /// Neutral signal: no conviction either way.
    pub fn neutral(timestamp: DateTime<Utc>, symbol: impl Into<Symbol>, horizon: Duration) -> Self {
        Self::new(timestamp, symbol, 0.0, 0.0, horizon)
    }

    /// Lift a binary decision: `Long` becomes alpha 1 / confidence 1, `Flat` is neutral.
    pub fn from_decision(
        decision: Decision,
        timestamp: DateTime<Utc>,
        symbol: impl Into<Symbol>,
        horizon: Duration,
    ) -> Self {
        match decision {
            Decision::Long => Self::new(timestamp, symbol, 1.0, 1.0, horizon),
            Decision::Flat => Self::neutral(timestamp, symbol, horizon),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_strategy_name(self, name: &str) -> Self {
        self.with_metadata(STRATEGY_NAME_KEY, name)
    }

    pub fn strategy_name(&self) -> Option<&str> {
        self.metadata.get(STRATEGY_NAME_KEY).and_then(|v| v.as_str())
    }

    /// Long-only v1: any positive alpha is an entry.
    pub fn is_long(&self) -> bool {
        self.alpha_score > 0.0
    }
}
