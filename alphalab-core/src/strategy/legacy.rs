//! Binary (long/flat) strategies and the adapter that lifts them into `Strategy`.

use chrono::{DateTime, Utc};

use super::{Strategy, StrategyProfile};
use crate::domain::{Decision, StrategySignal, Symbol};
use crate::error::StrategyError;
use crate::features::{FeatureView, FeatureViews};

/// Older strategy form that only answers "go long or not".
pub trait BinaryStrategy: Send + Sync {
    fn name(&self) -> &str;

    fn profile(&self) -> StrategyProfile {
        StrategyProfile::default()
    }

    fn warmup_bars(&self) -> usize {
        0
    }

    fn select_symbols(
        &self,
        views: &FeatureViews<'_>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Symbol>, StrategyError>;

    fn generate_signal(
        &self,
        symbol: &str,
        view: &FeatureView<'_>,
        now: DateTime<Utc>,
    ) -> Result<Decision, StrategyError>;

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

/// Wraps a `BinaryStrategy`: `Long` becomes alpha 1 / confidence 1, `Flat` alpha 0 /
/// confidence 0. Everything else is forwarded unchanged.
#[derive(Debug, Clone)]
pub struct BinarySignalAdapter<S> {
    inner: S,
}

impl<S: BinaryStrategy> BinarySignalAdapter<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

impl<S: BinaryStrategy> Strategy for BinarySignalAdapter<S> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn profile(&self) -> StrategyProfile {
        self.inner.profile()
    }

    fn warmup_bars(&self) -> usize {
        self.inner.warmup_bars()
    }

    fn select_symbols(
        &self,
        views: &FeatureViews<'_>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Symbol>, StrategyError> {
        self.inner.select_symbols(views, now)
    }

    fn generate_alpha_signal(
        &self,
        symbol: &str,
        view: &FeatureView<'_>,
        now: DateTime<Utc>,
    ) -> Result<StrategySignal, StrategyError> {
        let decision = self.inner.generate_signal(symbol, view, now)?;
        Ok(StrategySignal::from_decision(
            decision,
            now,
            symbol,
            self.inner.profile().max_hold,
        ))
    }

    fn should_close_position(
        &self,
        symbol: &str,
        view: &FeatureView<'_>,
        entry_time: DateTime<Utc>,
        now: DateTime<Utc>,
        entry_price: f64,
        current_price: f64,
    ) -> Result<bool, StrategyError> {
        self.inner
            .should_close_position(symbol, view, entry_time, now, entry_price, current_price)
    }
}
