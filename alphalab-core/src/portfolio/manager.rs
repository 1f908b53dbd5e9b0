//! Portfolio manager — runs every strategy at one timestamp, combines their signals,
//! and allocates capital over the combined view.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use tracing::warn;

use super::allocator::{AllocationError, AllocatorConfig, CapitalAllocator};
use super::combiner::{CombinationMethod, SignalCombiner, LEAD_STRATEGY_KEY};
use crate::diagnostics::{Diagnostic, StrategyOperation};
use crate::domain::{Allocation, StrategySignal, Symbol};
use crate::error::ConfigError;
use crate::features::FeatureViews;
use crate::strategy::{Strategy, StrategyConfig, StrategyRegistry};

/// Everything produced by one rebalance.
#[derive(Debug, Clone)]
pub struct Rebalance {
    /// Raw per-strategy signals, tagged with `strategy_name`.
    pub signals: Vec<StrategySignal>,
    /// One combined signal per symbol.
    pub combined: Vec<StrategySignal>,
    pub allocation: Allocation,
    pub diagnostics: Vec<Diagnostic>,
    /// Set when the cap was infeasible and the allocation fell back to equal weight.
    pub fallback: Option<AllocationError>,
}

impl Rebalance {
    /// Combined signal for `symbol`, if any strategy produced one.
    pub fn combined_for(&self, symbol: &str) -> Option<&StrategySignal> {
        self.combined.iter().find(|s| s.symbol == symbol)
    }
}

pub struct PortfolioManager {
    strategies: Vec<Box<dyn Strategy>>,
    combiner: SignalCombiner,
    allocator: CapitalAllocator,
}

impl std::fmt::Debug for PortfolioManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortfolioManager")
            .field("strategies", &self.strategy_names().collect::<Vec<_>>())
            .field("combiner", &self.combiner)
            .field("allocator", &self.allocator)
            .finish()
    }
}

impl PortfolioManager {
    pub fn new(
        strategies: Vec<Box<dyn Strategy>>,
        combiner: SignalCombiner,
        allocator: CapitalAllocator,
    ) -> Result<Self, ConfigError> {
        if strategies.is_empty() {
            return Err(ConfigError::NoStrategies);
        }
        Ok(Self {
            strategies,
            combiner,
            allocator,
        })
    }

    /// Build strategies from configs; each config's `weight` feeds the `weighted` combiner.
    pub fn from_configs(
        registry: &StrategyRegistry,
        configs: &[StrategyConfig],
        combination: CombinationMethod,
        allocation: AllocatorConfig,
    ) -> Result<Self, ConfigError> {
        registry.validate(configs.iter().map(|c| c.name.as_str()))?;
        let strategies = configs
            .iter()
            .map(|c| registry.create_from(c))
            .collect::<Result<Vec<_>, _>>()?;
        let weights: BTreeMap<String, f64> = configs.iter().map(|c| (c.name.clone(), c.weight)).collect();
        let combiner = SignalCombiner::new(combination).with_weights(weights);
        Self::new(strategies, combiner, CapitalAllocator::new(allocation)?)
    }

    pub fn strategies(&self) -> &[Box<dyn Strategy>] {
        &self.strategies
    }

    pub fn strategy_names(&self) -> impl Iterator<Item = &str> {
        self.strategies.iter().map(|s| s.name())
    }

    pub fn strategy(&self, name: &str) -> Option<&dyn Strategy> {
        self.strategies
            .iter()
            .find(|s| s.name() == name)
            .map(|s| s.as_ref())
    }

    /// The strategy that owns exits for a combined signal: its lead contributor,
    /// or the first configured strategy when the lead is unknown.
    pub fn exit_owner(&self, combined: &StrategySignal) -> &dyn Strategy {
        combined
            .metadata
            .get(LEAD_STRATEGY_KEY)
            .and_then(|v| v.as_str())
            .and_then(|name| self.strategy(name))
            .unwrap_or_else(|| self.strategies[0].as_ref())
    }

    pub fn combiner(&self) -> &SignalCombiner {
        &self.combiner
    }

    pub fn allocator(&self) -> &CapitalAllocator {
        &self.allocator
    }

    /// Largest warmup any strategy asks for.
    pub fn warmup_bars(&self) -> usize {
        self.strategies.iter().map(|s| s.warmup_bars()).max().unwrap_or(0)
    }

    /// Ask every strategy for signals. A failing strategy (or symbol) is recorded and
    /// skipped; the others continue.
    pub fn collect_signals(
        &self,
        views: &FeatureViews<'_>,
        now: DateTime<Utc>,
        step: usize,
    ) -> (Vec<StrategySignal>, Vec<Diagnostic>) {
        let mut signals = Vec::new();
        let mut diagnostics = Vec::new();

        for strategy in &self.strategies {
            let warmup = strategy.warmup_bars();
            let eligible: FeatureViews<'_> = views
                .iter()
                .filter(|(_, v)| v.len() >= warmup)
                .map(|(s, v)| (s.clone(), *v))
                .collect();

            let selected = match strategy.select_symbols(&eligible, now) {
                Ok(selected) => selected,
                Err(err) => {
                    warn!(step, %now, strategy = strategy.name(), error = %err, "select_symbols failed");
                    diagnostics.push(Diagnostic::StrategyFault {
                        step,
                        timestamp: now,
                        symbol: None,
                        strategy: strategy.name().to_string(),
                        operation: StrategyOperation::SelectSymbols,
                        message: err.to_string(),
                    });
                    continue;
                }
            };

            for symbol in selected {
                let Some(view) = eligible.get(&symbol) else {
                    diagnostics.push(Diagnostic::DataUnavailable {
                        step,
                        timestamp: now,
                        symbol,
                        reason: format!("selected by {} without visible data", strategy.name()),
                    });
                    continue;
                };
                match strategy.generate_alpha_signal(&symbol, view, now) {
                    Ok(signal) => signals.push(signal.with_strategy_name(strategy.name())),
                    Err(err) => {
                        warn!(step, %now, %symbol, strategy = strategy.name(), error = %err, "generate_alpha_signal failed");
                        diagnostics.push(Diagnostic::StrategyFault {
                            step,
                            timestamp: now,
                            symbol: Some(symbol),
                            strategy: strategy.name().to_string(),
                            operation: StrategyOperation::GenerateSignal,
                            message: err.to_string(),
                        });
                    }
                }
            }
        }
        (signals, diagnostics)
    }

    /// Collect, combine and allocate for one timestamp.
    pub fn rebalance(&self, views: &FeatureViews<'_>, now: DateTime<Utc>, step: usize) -> Rebalance {
        let (signals, mut diagnostics) = self.collect_signals(views, now, step);
        let combined = self.combiner.combine(&signals);

        let volatility: BTreeMap<Symbol, f64> = views
            .iter()
            .filter_map(|(s, v)| v.latest("atr_pct").map(|atr| (s.clone(), atr)))
            .collect();
        let outcome = self.allocator.allocate(&combined, &volatility);

        if let Some(AllocationError::Infeasible {
            max_weight,
            positions,
        }) = &outcome.warning
        {
            warn!(step, %now, max_weight, positions, "allocation cap infeasible, using equal weight");
            diagnostics.push(Diagnostic::AllocationInfeasible {
                step,
                timestamp: now,
                max_weight: *max_weight,
                positions: *positions,
                message: outcome.warning.as_ref().map(|e| e.to_string()).unwrap_or_default(),
            });
        }

        Rebalance {
            signals,
            combined,
            allocation: outcome.weights,
            diagnostics,
            fallback: outcome.warning,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StrategyError;
    use crate::features::{FeatureTable, FeatureView};
    use crate::portfolio::allocator::AllocationMethod;
    use chrono::{Duration, TimeZone};

    struct Fixed {
        name: &'static str,
        alpha: f64,
        confidence: f64,
        fail_select: bool,
    }

    impl Strategy for Fixed {
        fn name(&self) -> &str {
            self.name
        }

        fn select_symbols(
            &self,
            views: &FeatureViews<'_>,
            _now: DateTime<Utc>,
        ) -> Result<Vec<Symbol>, StrategyError> {
            if self.fail_select {
                return Err(StrategyError::Failed("boom".into()));
            }
            Ok(views.keys().cloned().collect())
        }

        fn generate_alpha_signal(
            &self,
            symbol: &str,
            _view: &FeatureView<'_>,
            now: DateTime<Utc>,
        ) -> Result<StrategySignal, StrategyError> {
            Ok(StrategySignal::new(now, symbol, self.alpha, self.confidence, Duration::hours(2)))
        }

        fn should_close_position(
            &self,
            _symbol: &str,
            _view: &FeatureView<'_>,
            _entry_time: DateTime<Utc>,
            _now: DateTime<Utc>,
            _entry_price: f64,
            _current_price: f64,
        ) -> Result<bool, StrategyError> {
            Ok(false)
        }
    }

    fn fixed(name: &'static str, alpha: f64, confidence: f64) -> Box<dyn Strategy> {
        Box::new(Fixed {
            name,
            alpha,
            confidence,
            fail_select: false,
        })
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn tables() -> Vec<FeatureTable> {
        ["A", "B"]
            .iter()
            .map(|s| {
                FeatureTable::new(*s, vec![t0()])
                    .unwrap()
                    .with_column("close", vec![100.0])
                    .unwrap()
            })
            .collect()
    }

    fn manager(strategies: Vec<Box<dyn Strategy>>, method: CombinationMethod) -> PortfolioManager {
        PortfolioManager::new(
            strategies,
            SignalCombiner::new(method),
            CapitalAllocator::new(AllocatorConfig::new(AllocationMethod::Proportional)).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn rejects_empty_strategy_list() {
        let err = PortfolioManager::new(
            Vec::new(),
            SignalCombiner::new(CombinationMethod::Weighted),
            CapitalAllocator::new(AllocatorConfig::default()).unwrap(),
        )
        .err();
        assert_eq!(err, Some(ConfigError::NoStrategies));
    }

    #[test]
    fn rebalance_tags_combines_and_allocates() {
        let tables = tables();
        let views: FeatureViews = tables.iter().map(|t| (t.symbol().to_string(), t.full_view())).collect();
        let m = manager(
            vec![fixed("a", 0.8, 0.9), fixed("b", 0.2, 0.3)],
            CombinationMethod::ConfidenceWeighted,
        );
        let r = m.rebalance(&views, t0(), 0);

        assert_eq!(r.signals.len(), 4);
        assert!(r.signals.iter().all(|s| s.strategy_name().is_some()));
        let a = r.combined_for("A").unwrap();
        assert!((a.alpha_score - 0.65).abs() < 1e-12);
        assert!((r.allocation["A"] - 0.5).abs() < 1e-12);
        assert_eq!(m.exit_owner(a).name(), "a");
        assert!(r.diagnostics.is_empty());
        assert!(r.fallback.is_none());
    }

    #[test]
    fn failing_strategy_is_isolated() {
        let tables = tables();
        let views: FeatureViews = tables.iter().map(|t| (t.symbol().to_string(), t.full_view())).collect();
        let broken: Box<dyn Strategy> = Box::new(Fixed {
            name: "broken",
            alpha: 1.0,
            confidence: 1.0,
            fail_select: true,
        });
        let m = manager(vec![broken, fixed("ok", 0.4, 0.5)], CombinationMethod::Weighted);
        let r = m.rebalance(&views, t0(), 7);

        assert_eq!(r.signals.len(), 2);
        assert_eq!(r.diagnostics.len(), 1);
        assert!(r.diagnostics[0].is_strategy_fault());
        assert_eq!(r.diagnostics[0].step(), 7);
        assert!((r.allocation.values().sum::<f64>() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn from_configs_validates_names() {
        let registry = StrategyRegistry::with_builtins();
        let err = PortfolioManager::from_configs(
            &registry,
            &[StrategyConfig::new("momentum_rank"), StrategyConfig::new("missing")],
            CombinationMethod::Weighted,
            AllocatorConfig::default(),
        )
        .err();
        assert_eq!(err, Some(ConfigError::UnknownStrategy("missing".into())));
    }
}
