//! Risk filter — a post-selection veto on candidate symbols.
//!
//! Applied by the simulator after `select_symbols` when configured. It only removes
//! candidates and truncates; it never reorders and never invents symbols.

use serde::{Deserialize, Serialize};

use crate::domain::Symbol;
use crate::features::{FeatureView, FeatureViews, PRICE_COLUMN};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskFilter {
    pub max_positions: usize,
    /// Upper bound on `atr_pct`.
    pub max_volatility_pct: f64,
    /// Lower bound on `volume_ratio`.
    pub min_volume_ratio: f64,
}

impl Default for RiskFilter {
    fn default() -> Self {
        Self {
            max_positions: 3,
            max_volatility_pct: 5.0,
            min_volume_ratio: 0.5,
        }
    }
}

impl RiskFilter {
    /// Whether the latest row of `view` is acceptable. Absent columns do not veto,
    /// but a non-positive close always does.
    pub fn allow_symbol(&self, view: &FeatureView<'_>) -> bool {
        if view.is_empty() {
            return false;
        }
        if view
            .latest("atr_pct")
            .is_some_and(|atr| atr > self.max_volatility_pct)
        {
            return false;
        }
        if view
            .latest("volume_ratio")
            .is_some_and(|vr| vr < self.min_volume_ratio)
        {
            return false;
        }
        if view.latest(PRICE_COLUMN).is_some_and(|close| close <= 0.0) {
            return false;
        }
        true
    }

    /// Keep allowed symbols in their original order, capped at `max_positions`.
    pub fn filter_symbols(&self, symbols: &[Symbol], views: &FeatureViews<'_>) -> Vec<Symbol> {
        symbols
            .iter()
            .filter(|s| views.get(*s).is_some_and(|v| self.allow_symbol(v)))
            .take(self.max_positions)
            .cloned()
            .collect()
    }
}
