//! MACD/RSI confluence — the long/flat baseline.
//!
//! Goes long when RSI sits in a healthy band, the MACD histogram is positive,
//! volatility is contained and volume is not drying up. Registered through
//! `BinarySignalAdapter`, so every entry carries alpha 1 and confidence 1.

use chrono::{DateTime, Duration, Utc};

use super::{pnl_pct, top_ranked};
use crate::domain::{Decision, Symbol};
use crate::error::StrategyError;
use crate::features::{FeatureView, FeatureViews};
use crate::strategy::{BinaryStrategy, EvaluationMode, StrategyParams, StrategyProfile};

const RSI_OPTIMAL: f64 = 55.0;
const RSI_EXIT: f64 = 75.0;
const STOP_LOSS_PCT: f64 = -3.0;
const TAKE_PROFIT_PCT: f64 = 6.0;

/// Latest readings the filters need.
#[derive(Debug, Clone, Copy)]
struct Readings {
    rsi: f64,
    macd_histogram: f64,
    atr_pct: f64,
    volume_ratio: f64,
}

#[derive(Debug, Clone)]
pub struct MacdRsiConfluence {
    pub rsi_min: f64,
    pub rsi_max: f64,
    pub macd_hist_min: f64,
    pub atr_pct_max: f64,
    pub volume_min_ratio: f64,
    pub max_positions: usize,
    pub max_hold: Duration,
}

impl Default for MacdRsiConfluence {
    fn default() -> Self {
        Self {
            rsi_min: 40.0,
            rsi_max: 65.0,
            macd_hist_min: 0.0,
            atr_pct_max: 5.0,
            volume_min_ratio: 0.8,
            max_positions: 3,
            max_hold: Duration::hours(8),
        }
    }
}

impl MacdRsiConfluence {
    pub const NAME: &'static str = "macd_rsi_confluence";

    pub fn from_params(params: &StrategyParams) -> Self {
        let d = Self::default();
        Self {
            rsi_min: params.f64_or("rsi_min", d.rsi_min),
            rsi_max: params.f64_or("rsi_max", d.rsi_max),
            macd_hist_min: params.f64_or("macd_hist_min", d.macd_hist_min),
            atr_pct_max: params.f64_or("atr_pct_max", d.atr_pct_max),
            volume_min_ratio: params.f64_or("volume_min_ratio", d.volume_min_ratio),
            max_positions: params.usize_or("max_positions", d.max_positions),
            max_hold: params
                .get("max_hold_hours")
                .map(crate::time::hours)
                .unwrap_or(d.max_hold),
        }
    }

    /// All four filter columns, or `None` if any is absent or NaN.
    fn readings(view: &FeatureView<'_>) -> Option<Readings> {
        Some(Readings {
            rsi: view.latest("rsi")?,
            macd_histogram: view.latest("macd_histogram")?,
            atr_pct: view.latest("atr_pct")?,
            volume_ratio: view.latest("volume_ratio")?,
        })
    }

    fn passes_filters(&self, r: &Readings) -> bool {
        (self.rsi_min..=self.rsi_max).contains(&r.rsi)
            && r.macd_histogram >= self.macd_hist_min
            && r.atr_pct <= self.atr_pct_max
            && r.volume_ratio >= self.volume_min_ratio
    }

    /// Ranking score: RSI near 55, strong histogram, volume, low volatility.
    fn score(r: &Readings) -> f64 {
        let rsi = 1.0 - (r.rsi - RSI_OPTIMAL).abs() / 50.0;
        let macd = r.macd_histogram.tanh();
        let volume = r.volume_ratio.min(2.0) / 2.0;
        let calm = 1.0 / (1.0 + r.atr_pct / 5.0);
        0.3 * rsi + 0.4 * macd + 0.2 * volume + 0.1 * calm
    }
}

impl BinaryStrategy for MacdRsiConfluence {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn profile(&self) -> StrategyProfile {
        StrategyProfile {
            evaluation_mode: EvaluationMode::Periodic,
            evaluation_interval: Duration::hours(2),
            max_hold: self.max_hold,
            bar_interval: Duration::hours(1),
        }
    }

    fn select_symbols(
        &self,
        views: &FeatureViews<'_>,
        _now: DateTime<Utc>,
    ) -> Result<Vec<Symbol>, StrategyError> {
        let candidates = views
            .iter()
            .filter_map(|(symbol, view)| Self::readings(view).map(|r| (symbol, r)))
            .filter(|(_, r)| self.passes_filters(r))
            .map(|(symbol, r)| (symbol.clone(), Self::score(&r)))
            .filter(|(_, score)| score.is_finite())
            .collect();
        Ok(top_ranked(candidates, self.max_positions))
    }

    fn generate_signal(
        &self,
        _symbol: &str,
        view: &FeatureView<'_>,
        _now: DateTime<Utc>,
    ) -> Result<Decision, StrategyError> {
        Ok(match Self::readings(view) {
            Some(r) if self.passes_filters(&r) => Decision::Long,
            _ => Decision::Flat,
        })
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
        if view.latest("rsi").is_some_and(|rsi| rsi > RSI_EXIT) {
            return Ok(true);
        }
        if view.latest("macd_histogram").is_some_and(|h| h < 0.0) {
            return Ok(true);
        }
        Ok(now - entry_time >= self.max_hold)
    }
}
