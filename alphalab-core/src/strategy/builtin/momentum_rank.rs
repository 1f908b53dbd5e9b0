//! Momentum rank — buys the strongest multi-timeframe momentum names.
//!
//! Score is a weighted blend of tanh-normalized momentum columns, renormalized over
//! whichever columns are present. Candidates must pass a volatility cap and a volume
//! floor; the best `max_positions` above `min_momentum_score` are selected.

use chrono::{DateTime, Duration, Utc};

use super::{pnl_pct, top_ranked};
use crate::domain::{StrategySignal, Symbol};
use crate::error::StrategyError;
use crate::features::{FeatureView, FeatureViews};
use crate::strategy::{EvaluationMode, Strategy, StrategyParams, StrategyProfile};

const SCORE_WEIGHTS: [(&str, f64); 5] = [
    ("price_momentum_1", 0.1),
    ("price_momentum_5", 0.3),
    ("price_momentum_10", 0.3),
    ("macd_histogram", 0.2),
    ("rsi_distance_50", 0.1),
];

const STOP_LOSS_PCT: f64 = -2.5;
const TAKE_PROFIT_PCT: f64 = 5.0;
const EXIT_SCORE: f64 = 0.1;
const EXIT_VOLUME_ZSCORE: f64 = -1.0;
const EXIT_VOLATILITY_MULTIPLE: f64 = 1.5;

#[derive(Debug, Clone)]
pub struct MomentumRank {
    pub min_momentum_score: f64,
    pub atr_pct_max: f64,
    pub volume_min_zscore: f64,
    pub max_positions: usize,
    pub max_hold: Duration,
}

impl Default for MomentumRank {
    fn default() -> Self {
        Self {
            min_momentum_score: 0.2,
            atr_pct_max: 6.0,
            volume_min_zscore: -0.5,
            max_positions: 3,
            max_hold: Duration::hours(6),
        }
    }
}

impl MomentumRank {
    pub const NAME: &'static str = "momentum_rank";

    pub fn from_params(params: &StrategyParams) -> Self {
        let d = Self::default();
        Self {
            min_momentum_score: params.f64_or("min_momentum_score", d.min_momentum_score),
            atr_pct_max: params.f64_or("atr_pct_max", d.atr_pct_max),
            volume_min_zscore: params.f64_or("volume_min_zscore", d.volume_min_zscore),
            max_positions: params.usize_or("max_positions", d.max_positions),
            max_hold: params
                .get("max_hold_hours")
                .map(crate::time::hours)
                .unwrap_or(d.max_hold),
        }
    }

    /// Weighted momentum score in [-1, 1]; 0 if no momentum column is visible.
    pub fn score(view: &FeatureView<'_>) -> f64 {
        let mut score = 0.0;
        let mut weight_sum = 0.0;
        for (column, weight) in SCORE_WEIGHTS {
            let Some(value) = view.latest(column) else {
                continue;
            };
            let normalized = match column {
                "macd_histogram" => value.tanh(),
                "rsi_distance_50" => value / 50.0,
                _ => (value * 10.0).tanh(),
            };
            score += normalized * weight;
            weight_sum += weight;
        }
        if weight_sum > 0.0 {
            score / weight_sum
        } else {
            0.0
        }
    }

    /// Volatility cap and volume floor. Absent columns do not block.
    fn passes_filters(&self, view: &FeatureView<'_>) -> bool {
        if view.latest("atr_pct").is_some_and(|atr| atr > self.atr_pct_max) {
            return false;
        }
        if view
            .latest("volume_zscore")
            .is_some_and(|z| z < self.volume_min_zscore)
        {
            return false;
        }
        true
    }
}

impl Strategy for MomentumRank {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn profile(&self) -> StrategyProfile {
        StrategyProfile {
            evaluation_mode: EvaluationMode::Periodic,
            evaluation_interval: Duration::hours(1),
            max_hold: self.max_hold,
            bar_interval: Duration::minutes(15),
        }
    }

    fn select_symbols(
        &self,
        views: &FeatureViews<'_>,
        _now: DateTime<Utc>,
    ) -> Result<Vec<Symbol>, StrategyError> {
        let candidates = views
            .iter()
            .filter(|(_, view)| !view.is_empty() && self.passes_filters(view))
            .map(|(symbol, view)| (symbol.clone(), Self::score(view)))
            .filter(|(_, score)| *score >= self.min_momentum_score)
            .collect();
        Ok(top_ranked(candidates, self.max_positions))
    }

    fn generate_alpha_signal(
        &self,
        symbol: &str,
        view: &FeatureView<'_>,
        now: DateTime<Utc>,
    ) -> Result<StrategySignal, StrategyError> {
        if view.is_empty() || !self.passes_filters(view) {
            return Ok(StrategySignal::neutral(now, symbol, self.max_hold)
                .with_metadata("passes_filters", false));
        }
        let score = Self::score(view);
        Ok(StrategySignal::new(now, symbol, score, score.abs(), self.max_hold)
            .with_metadata("momentum_score", score)
            .with_metadata("passes_filters", true))
    }

    fn should_close_position(
        &self,
        _symbol: &str,
        view: &FeatureView<'_>,
        entry_time: DateTime<Utc>,
        now: DateTime<Utc>,
        entry_price: f64,
        current_price: f64,
    ) -> Result<bool, StrategyError> {
        if view.is_empty() {
            return Ok(true);
        }
        let pnl = pnl_pct(entry_price, current_price);
        if pnl < STOP_LOSS_PCT || pnl > TAKE_PROFIT_PCT {
            return Ok(true);
        }
        if Self::score(view) < EXIT_SCORE {
            return Ok(true);
        }
        if view
            .latest("volume_zscore")
            .is_some_and(|z| z < EXIT_VOLUME_ZSCORE)
        {
            return Ok(true);
        }
        if view
            .latest("atr_pct")
            .is_some_and(|atr| atr > self.atr_pct_max * EXIT_VOLATILITY_MULTIPLE)
        {
            return Ok(true);
        }
        Ok(now - entry_time >= self.max_hold)
    }
}
