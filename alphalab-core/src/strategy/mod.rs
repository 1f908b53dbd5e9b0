//! Strategy contract — symbol selection, entry scoring, exit decisions.
//!
//! Strategies are pure functions of the point-in-time views they are handed. They
//! never see rows stamped after `now`, never see the ledger, and never touch capital:
//! sizing belongs to the allocator, bookkeeping to the simulator.

pub mod builtin;
pub mod legacy;
pub mod registry;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{StrategySignal, Symbol};
use crate::error::StrategyError;
use crate::features::{FeatureView, FeatureViews};

pub use legacy::{BinarySignalAdapter, BinaryStrategy};
pub use registry::{StrategyConfig, StrategyConstructor, StrategyParams, StrategyRegistry};

/// How often a strategy wants to be evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationMode {
    /// Evaluate on every bar of the underlying series.
    EveryBar,
    /// Evaluate once per `evaluation_interval`.
    Periodic,
}

/// Cadence hints used to derive a walk-forward window and shift.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StrategyProfile {
    pub evaluation_mode: EvaluationMode,
    #[serde(with = "crate::time::serde_hours", rename = "evaluation_interval_hours")]
    pub evaluation_interval: Duration,
    #[serde(with = "crate::time::serde_hours", rename = "max_hold_hours")]
    pub max_hold: Duration,
    #[serde(with = "crate::time::serde_hours", rename = "bar_interval_hours")]
    pub bar_interval: Duration,
}

impl Default for StrategyProfile {
    fn default() -> Self {
        Self {
            evaluation_mode: EvaluationMode::Periodic,
            evaluation_interval: Duration::hours(1),
            max_hold: Duration::hours(4),
            bar_interval: Duration::minutes(15),
        }
    }
}

impl StrategyProfile {
    /// Step length implied by the profile.
    pub fn evaluation_step(&self) -> Duration {
        match self.evaluation_mode {
            EvaluationMode::EveryBar => self.bar_interval,
            EvaluationMode::Periodic => self.evaluation_interval,
        }
    }
}

/// A trading strategy.
///
/// # Contract
/// Every view passed in holds only rows stamped at or before `now`. Returning `Err`
/// from any callback is a strategy fault: the simulator logs it, records a
/// diagnostic, skips the affected symbol (or step), and keeps going.
pub trait Strategy: Send + Sync {
    /// Registry identifier (e.g., "momentum_rank").
    fn name(&self) -> &str;

    fn profile(&self) -> StrategyProfile {
        StrategyProfile::default()
    }

    /// Minimum visible rows before a symbol is offered to this strategy.
    fn warmup_bars(&self) -> usize {
        0
    }

    /// Ordered candidate list for this step. May be empty.
    fn select_symbols(
        &self,
        views: &FeatureViews<'_>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Symbol>, StrategyError>;

    /// Scored entry opinion for one selected symbol.
    fn generate_alpha_signal(
        &self,
        symbol: &str,
        view: &FeatureView<'_>,
        now: DateTime<Utc>,
    ) -> Result<StrategySignal, StrategyError>;

    /// Asked once per bar while a position is open.
    fn should_close_position(
        &self,
        symbol: &str,
        view: &FeatureView<'_>,
        entry_time: DateTime<Utc>,
        now: DateTime<Utc>,
        entry_price: f64,
        current_price: f64,
    ) -> Result<bool, StrategyError>;
}

/// Read the latest value of a required column.
pub fn require(view: &FeatureView<'_>, column: &str) -> Result<f64, StrategyError> {
    view.latest(column)
        .ok_or_else(|| StrategyError::MissingFeature(column.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::FeatureTable;
    use chrono::TimeZone;

    #[test]
    fn evaluation_step_follows_mode() {
        let mut p = StrategyProfile::default();
        assert_eq!(p.evaluation_step(), Duration::hours(1));
        p.evaluation_mode = EvaluationMode::EveryBar;
        assert_eq!(p.evaluation_step(), Duration::minutes(15));
    }

    #[test]
    fn profile_serializes_hours() {
        let json = serde_json::to_value(StrategyProfile::default()).unwrap();
        assert_eq!(json["max_hold_hours"], 4.0);
        assert_eq!(json["evaluation_mode"], "periodic");
    }

    #[test]
    fn require_reports_missing_column() {
        let t = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let table = FeatureTable::new("BTC", vec![t])
            .unwrap()
            .with_column("close", vec![10.0])
            .unwrap();
        let view = table.full_view();
        assert_eq!(require(&view, "close"), Ok(10.0));
        assert_eq!(
            require(&view, "rsi"),
            Err(StrategyError::MissingFeature("rsi".into()))
        );
    }
}
