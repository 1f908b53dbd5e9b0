//! Backtest configuration — universe, time range, walk-forward cadence, costs.
//!
//! Validated eagerly: a `Simulator` cannot be built from an invalid config, so every
//! `ConfigError` surfaces before the first step runs.

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::Symbol;
use crate::error::ConfigError;
use crate::strategy::StrategyProfile;
use crate::time::as_hours;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestConfig {
    pub universe: Vec<Symbol>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    /// Maximum hold per trade.
    #[serde(with = "crate::time::serde_hours", rename = "window_hours")]
    pub window: Duration,
    /// Spacing between evaluation steps.
    #[serde(with = "crate::time::serde_hours", rename = "shift_hours")]
    pub shift: Duration,
    /// Per-side fee as a fraction (0.001 = 10 bps).
    #[serde(default)]
    pub fee_rate: f64,
    /// Per-side slippage as a fraction.
    #[serde(default)]
    pub slippage_rate: f64,
    /// Rows a symbol must have visible before it is offered to a strategy.
    #[serde(default = "default_min_warmup_bars")]
    pub min_warmup_bars: usize,
}

fn default_min_warmup_bars() -> usize {
    1
}

impl BacktestConfig {
    /// Frictionless config with a one-row warmup.
    pub fn new(
        universe: Vec<Symbol>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        window: Duration,
        shift: Duration,
    ) -> Self {
        Self {
            universe,
            start,
            end,
            window,
            shift,
            fee_rate: 0.0,
            slippage_rate: 0.0,
            min_warmup_bars: default_min_warmup_bars(),
        }
    }

    /// Derive the cadence from a strategy profile: window is the profile's maximum
    /// hold, shift its evaluation step (clamped to the window).
    pub fn from_profile(
        universe: Vec<Symbol>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        profile: &StrategyProfile,
    ) -> Self {
        let window = profile.max_hold;
        let shift = profile.evaluation_step().min(window);
        Self::new(universe, start, end, window, shift)
    }

    pub fn with_costs(mut self, fee_rate: f64, slippage_rate: f64) -> Self {
        self.fee_rate = fee_rate;
        self.slippage_rate = slippage_rate;
        self
    }

    pub fn with_min_warmup_bars(mut self, bars: usize) -> Self {
        self.min_warmup_bars = bars;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.start >= self.end {
            return Err(ConfigError::invalid(
                "start",
                self.start.to_rfc3339(),
                format!("start must be before end ({})", self.end.to_rfc3339()),
            ));
        }
        if self.window <= Duration::zero() {
            return Err(ConfigError::invalid(
                "window_hours",
                as_hours(self.window),
                "window must be positive",
            ));
        }
        if self.shift <= Duration::zero() {
            return Err(ConfigError::invalid(
                "shift_hours",
                as_hours(self.shift),
                "shift must be positive",
            ));
        }
        if self.shift > self.window {
            return Err(ConfigError::invalid(
                "shift_hours",
                as_hours(self.shift),
                format!("shift must not exceed window ({})", as_hours(self.window)),
            ));
        }
        for (field, value) in [("fee_rate", self.fee_rate), ("slippage_rate", self.slippage_rate)] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::invalid(field, value, "must be finite and >= 0"));
            }
        }
        if self.fee_rate + self.slippage_rate >= 1.0 {
            return Err(ConfigError::invalid(
                "fee_rate",
                self.fee_rate + self.slippage_rate,
                "fee_rate + slippage_rate must be below 1",
            ));
        }
        if self.universe.is_empty() {
            return Err(ConfigError::invalid("universe", "[]", "universe must not be empty"));
        }
        let mut seen = BTreeSet::new();
        for symbol in &self.universe {
            if !seen.insert(symbol.as_str()) {
                return Err(ConfigError::invalid("universe", symbol, "duplicate symbol"));
            }
        }
        Ok(())
    }

    /// Evaluation timestamps `start, start + shift, ...` up to and including `end`.
    pub fn step_times(&self) -> impl Iterator<Item = DateTime<Utc>> + '_ {
        let shift = self.shift;
        let end = self.end;
        std::iter::successors(Some(self.start), move |t| Some(*t + shift)).take_while(move |t| *t <= end)
    }

    /// Number of evaluation steps in the range.
    pub fn step_count(&self) -> usize {
        if self.shift <= Duration::zero() || self.start > self.end {
            return 0;
        }
        let span = (self.end - self.start).num_milliseconds();
        (span / self.shift.num_milliseconds().max(1)) as usize + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::EvaluationMode;
    use chrono::TimeZone;

    fn base() -> BacktestConfig {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        BacktestConfig::new(
            vec!["BTC".into(), "ETH".into()],
            start,
            start + Duration::days(2),
            Duration::hours(4),
            Duration::hours(1),
        )
    }

    fn field_of(err: ConfigError) -> &'static str {
        match err {
            ConfigError::Invalid { field, .. } => field,
            other => panic!("unexpected error: {other}"),
        }
    }

    // ── Validation ──

    #[test]
    fn valid_config_passes() {
        assert!(base().validate().is_ok());
    }

    #[test]
    fn start_must_precede_end() {
        let mut c = base();
        c.end = c.start;
        assert_eq!(field_of(c.validate().unwrap_err()), "start");
    }

    #[test]
    fn shift_must_not_exceed_window() {
        let mut c = base();
        c.shift = Duration::hours(8);
        let err = c.validate().unwrap_err();
        assert_eq!(field_of(err.clone()), "shift_hours");
        assert!(err.to_string().contains("must not exceed window"));
    }

    #[test]
    fn non_positive_durations_rejected() {
        let mut c = base();
        c.window = Duration::zero();
        assert_eq!(field_of(c.validate().unwrap_err()), "window_hours");
        let mut c = base();
        c.shift = Duration::hours(-1);
        assert_eq!(field_of(c.validate().unwrap_err()), "shift_hours");
    }

    #[test]
    fn costs_are_checked() {
        assert_eq!(field_of(base().with_costs(-0.1, 0.0).validate().unwrap_err()), "fee_rate");
        assert_eq!(
            field_of(base().with_costs(0.0, f64::NAN).validate().unwrap_err()),
            "slippage_rate"
        );
        assert!(base().with_costs(0.6, 0.4).validate().is_err());
        assert!(base().with_costs(0.001, 0.0005).validate().is_ok());
    }

    #[test]
    fn universe_must_be_unique_and_non_empty() {
        let mut c = base();
        c.universe.clear();
        assert_eq!(field_of(c.validate().unwrap_err()), "universe");
        let mut c = base();
        c.universe.push("BTC".into());
        assert_eq!(field_of(c.validate().unwrap_err()), "universe");
    }

    // ── Cadence ──

    #[test]
    fn step_times_include_end() {
        let c = base();
        let steps: Vec<_> = c.step_times().collect();
        assert_eq!(steps.len(), 49);
        assert_eq!(steps.len(), c.step_count());
        assert_eq!(*steps.last().unwrap(), c.end);
    }

    #[test]
    fn from_profile_derives_window_and_shift() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let profile = StrategyProfile {
            evaluation_mode: EvaluationMode::EveryBar,
            evaluation_interval: Duration::hours(2),
            max_hold: Duration::hours(6),
            bar_interval: Duration::minutes(15),
        };
        let c = BacktestConfig::from_profile(vec!["BTC".into()], start, start + Duration::days(1), &profile);
        assert_eq!(c.window, Duration::hours(6));
        assert_eq!(c.shift, Duration::minutes(15));

        let periodic = StrategyProfile {
            evaluation_mode: EvaluationMode::Periodic,
            evaluation_interval: Duration::hours(12),
            ..profile
        };
        let c = BacktestConfig::from_profile(vec!["BTC".into()], start, start + Duration::days(1), &periodic);
        assert_eq!(c.shift, Duration::hours(6));
    }

    // ── Serialization ──

    #[test]
    fn toml_round_trip_uses_hours() {
        let c = base().with_costs(0.001, 0.0005);
        let text = toml::to_string(&c).unwrap();
        assert!(text.contains("window_hours = 4.0"));
        let back: BacktestConfig = toml::from_str(&text).unwrap();
        assert_eq!(back, c);
    }
}
