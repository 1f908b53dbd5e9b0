//! Bollinger mean reversion — buys oversold capitulation near the lower band.
//!
//! Entry needs all four: price near the lower band, RSI oversold, a volume surge,
//! and a calm volatility regime. Exits fire on a failed reversion (stop), a completed
//! reversion (middle band in profit), overextension (upper band), RSI overbought,
//! a quick profit target, or the hold limit.

use chrono::{DateTime, Duration, Utc};

use super::{pnl_pct, top_ranked};
use crate::domain::{StrategySignal, Symbol};
use crate::error::StrategyError;
use crate::features::{FeatureView, FeatureViews};
use crate::strategy::{EvaluationMode, Strategy, StrategyParams, StrategyProfile};

const ENTRY_BB_POSITION_MAX: f64 = 0.2;
const MIDDLE_BAND: (f64, f64) = (0.4, 0.6);
const MIDDLE_BAND_MIN_PNL_PCT: f64 = 0.3;
const UPPER_BAND_EXIT: f64 = 0.9;
const QUICK_PROFIT_PCT: f64 = 2.5;

/// Latest entry-relevant readings for one symbol.
#[derive(Debug, Clone, Copy)]
struct Setup {
    bb_position: f64,
    rsi: f64,
    volume_ratio: f64,
    atr_pct: f64,
}

#[derive(Debug, Clone)]
pub struct BollingerMeanReversion {
    pub bb_period: usize,
    pub rsi_oversold: f64,
    pub rsi_overbought: f64,
    pub volume_spike_min: f64,
    pub atr_pct_max: f64,
    pub stop_loss_pct: f64,
    pub take_profit_bb_upper: bool,
    pub max_positions: usize,
    pub max_hold: Duration,
}

impl Default for BollingerMeanReversion {
    fn default() -> Self {
        Self {
            bb_period: 20,
            rsi_oversold: 30.0,
            rsi_overbought: 70.0,
            volume_spike_min: 1.2,
            atr_pct_max: 4.0,
            stop_loss_pct: 1.5,
            take_profit_bb_upper: true,
            max_positions: 2,
            max_hold: Duration::hours(4),
        }
    }
}

impl BollingerMeanReversion {
    pub const NAME: &'static str = "bollinger_mean_reversion";

    pub fn from_params(params: &StrategyParams) -> Self {
        let d = Self::default();
        Self {
            bb_period: params.usize_or("bb_period", d.bb_period),
            rsi_oversold: params.f64_or("rsi_oversold", d.rsi_oversold),
            rsi_overbought: params.f64_or("rsi_overbought", d.rsi_overbought),
            volume_spike_min: params.f64_or("volume_spike_min", d.volume_spike_min),
            atr_pct_max: params.f64_or("atr_pct_max", d.atr_pct_max),
            stop_loss_pct: params.f64_or("stop_loss_pct", d.stop_loss_pct),
            take_profit_bb_upper: params
                .get("take_profit_bb_upper")
                .map(|v| v != 0.0)
                .unwrap_or(d.take_profit_bb_upper),
            max_positions: params.usize_or("max_positions", d.max_positions),
            max_hold: params
                .get("max_hold_hours")
                .map(crate::time::hours)
                .unwrap_or(d.max_hold),
        }
    }

    /// All four entry columns, or `None` if any is absent or NaN.
    fn setup(view: &FeatureView<'_>) -> Option<Setup> {
        Some(Setup {
            bb_position: view.latest("bb_position")?,
            rsi: view.latest("rsi")?,
            volume_ratio: view.latest("volume_ratio")?,
            atr_pct: view.latest("atr_pct")?,
        })
    }

    fn passes_entry_filters(&self, s: &Setup) -> bool {
        s.bb_position <= ENTRY_BB_POSITION_MAX
            && s.rsi <= self.rsi_oversold
            && s.volume_ratio >= self.volume_spike_min
            && s.atr_pct <= self.atr_pct_max
    }

    fn setup_score(&self, s: &Setup) -> f64 {
        let band = 1.0 - s.bb_position;
        let rsi = ((self.rsi_oversold - s.rsi) / self.rsi_oversold).max(0.0);
        let volume = (s.volume_ratio - 1.0).min(1.0);
        let calm = (1.0 - s.atr_pct / self.atr_pct_max).max(0.0);
        band * 0.4 + rsi * 0.3 + volume * 0.2 + calm * 0.1
    }

    fn confidence(&self, s: &Setup, setup_score: f64) -> f64 {
        let mut confidence = setup_score;
        if s.volume_ratio > 1.5 {
            confidence = (confidence * 1.1).min(1.0);
        }
        if s.rsi < 25.0 {
            confidence = (confidence * 1.1).min(1.0);
        }
        if s.atr_pct > 3.0 {
            confidence *= 0.9;
        }
        confidence.clamp(0.0, 1.0)
    }
}

impl Strategy for BollingerMeanReversion {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn profile(&self) -> StrategyProfile {
        StrategyProfile {
            evaluation_mode: EvaluationMode::EveryBar,
            evaluation_interval: Duration::minutes(30),
            max_hold: self.max_hold,
            bar_interval: Duration::minutes(5),
        }
    }

    /// Band statistics need a full lookback.
    fn warmup_bars(&self) -> usize {
        self.bb_period
    }

    fn select_symbols(
        &self,
        views: &FeatureViews<'_>,
        _now: DateTime<Utc>,
    ) -> Result<Vec<Symbol>, StrategyError> {
        let candidates = views
            .iter()
            .filter_map(|(symbol, view)| {
                let setup = Self::setup(view)?;
                if !self.passes_entry_filters(&setup) {
                    return None;
                }
                let score = self.setup_score(&setup);
                (score > 0.0).then(|| (symbol.clone(), score))
            })
            .collect();
        Ok(top_ranked(candidates, self.max_positions))
    }

    fn generate_alpha_signal(
        &self,
        symbol: &str,
        view: &FeatureView<'_>,
        now: DateTime<Utc>,
    ) -> Result<StrategySignal, StrategyError> {
        let Some(setup) = Self::setup(view).filter(|s| self.passes_entry_filters(s)) else {
            return Ok(StrategySignal::neutral(now, symbol, self.max_hold)
                .with_metadata("passes_filters", false));
        };
        let score = self.setup_score(&setup);
        let confidence = self.confidence(&setup, score);
        Ok(StrategySignal::new(now, symbol, score, confidence, self.max_hold)
            .with_metadata("bb_position", setup.bb_position)
            .with_metadata("rsi", setup.rsi)
            .with_metadata("volume_ratio", setup.volume_ratio)
            .with_metadata("atr_pct", setup.atr_pct)
            .with_metadata("setup_score", score)
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
        if pnl < -self.stop_loss_pct {
            return Ok(true);
        }
        if let Some(bb) = view.latest("bb_position") {
            if (MIDDLE_BAND.0..=MIDDLE_BAND.1).contains(&bb) && pnl > MIDDLE_BAND_MIN_PNL_PCT {
                return Ok(true);
            }
            if self.take_profit_bb_upper && bb > UPPER_BAND_EXIT {
                return Ok(true);
            }
        }
        if view.latest("rsi").is_some_and(|rsi| rsi > self.rsi_overbought) {
            return Ok(true);
        }
        if pnl > QUICK_PROFIT_PCT {
            return Ok(true);
        }
        Ok(now - entry_time >= self.max_hold)
    }
}
