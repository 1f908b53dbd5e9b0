//! Walk-forward simulator.
//!
//! Steps run strictly in time order at `start, start + shift, ... <= end`. At each
//! step every strategy sees only rows stamped at or before the step time; a long
//! entry fills at the close of the first bar strictly after it, and the exit is
//! found by walking forward bar by bar. Trades never compound and windows may
//! overlap. Per-symbol work inside a step may run on rayon, but is always joined
//! before the next step starts.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use tracing::{debug, info, warn};

use super::costs::CostModel;
use super::ledger::{Ledger, RunStatus, SimulationOutcome};
use crate::config::BacktestConfig;
use crate::diagnostics::{Diagnostic, StrategyOperation};
use crate::domain::{
    equal_weights, AllocationSnapshot, Direction, ExitReason, Position, StrategySignal, Symbol,
    TradeResult,
};
use crate::error::ConfigError;
use crate::features::{FeatureSet, FeatureTable, FeatureViews};
use crate::portfolio::PortfolioManager;
use crate::risk::RiskFilter;
use crate::strategy::Strategy;

/// What one symbol contributed to a step.
#[derive(Debug, Default)]
struct SymbolResult {
    trade: Option<TradeResult>,
    diagnostics: Vec<Diagnostic>,
}

impl SymbolResult {
    fn diagnostic(d: Diagnostic) -> Self {
        Self {
            trade: None,
            diagnostics: vec![d],
        }
    }
}

/// A filled entry waiting for its exit walk.
struct Entry<'a> {
    symbol: &'a str,
    table: &'a FeatureTable,
    signal: &'a StrategySignal,
    owner: &'a dyn Strategy,
    weight: Option<f64>,
    decision_time: DateTime<Utc>,
    step: usize,
}

#[derive(Debug, Clone)]
pub struct Simulator {
    config: BacktestConfig,
    costs: CostModel,
    risk_filter: Option<RiskFilter>,
    parallel: bool,
}

impl Simulator {
    /// Validates `config`; an invalid config never reaches the step loop.
    pub fn new(config: BacktestConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            costs: CostModel::from_config(&config),
            config,
            risk_filter: None,
            parallel: true,
        })
    }

    /// Veto selected symbols through `filter` before signals are requested.
    pub fn with_risk_filter(mut self, filter: RiskFilter) -> Self {
        self.risk_filter = Some(filter);
        self
    }

    /// Enables or disables parallel per-symbol work within a step.
    pub fn with_parallelism(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn config(&self) -> &BacktestConfig {
        &self.config
    }

    // ─── Single-strategy mode ────────────────────────────────────────

    pub fn run(
        &self,
        strategy: &dyn Strategy,
        features: &FeatureSet,
        cancel: Option<&AtomicBool>,
    ) -> SimulationOutcome {
        let warmup = self.config.min_warmup_bars.max(strategy.warmup_bars());
        info!(
            strategy = strategy.name(),
            symbols = self.config.universe.len(),
            steps = self.config.step_count(),
            warmup,
            "simulation started"
        );

        let mut ledger = Ledger::default();
        let mut steps = 0usize;
        let mut status = RunStatus::Completed;

        for (step, t) in self.config.step_times().enumerate() {
            if cancel.is_some_and(|f| f.load(Ordering::Relaxed)) {
                status = RunStatus::Cancelled {
                    completed_steps: step,
                };
                break;
            }
            let views = self.views_at(features, t, warmup, step, &mut ledger);
            let opened = self.single_step(strategy, features, &views, t, step, &mut ledger);
            ledger.record_allocation(AllocationSnapshot {
                step,
                timestamp: t,
                weights: equal_weights(opened.iter().map(|s| s.as_str())),
            });
            steps = step + 1;
        }

        self.finish(strategy.name(), ledger, status, steps)
    }

    fn single_step(
        &self,
        strategy: &dyn Strategy,
        features: &FeatureSet,
        views: &FeatureViews<'_>,
        t: DateTime<Utc>,
        step: usize,
        ledger: &mut Ledger,
    ) -> Vec<Symbol> {
        let selected = match strategy.select_symbols(views, t) {
            Ok(selected) => selected,
            Err(err) => {
                warn!(step, %t, strategy = strategy.name(), error = %err, "select_symbols failed, skipping step");
                ledger.record(Diagnostic::StrategyFault {
                    step,
                    timestamp: t,
                    symbol: None,
                    strategy: strategy.name().to_string(),
                    operation: StrategyOperation::SelectSymbols,
                    message: err.to_string(),
                });
                return Vec::new();
            }
        };
        let selected = match &self.risk_filter {
            Some(filter) => filter.filter_symbols(&selected, views),
            None => selected,
        };

        let mut seen = BTreeSet::new();
        let mut jobs = Vec::new();
        for symbol in selected {
            if !seen.insert(symbol.clone()) {
                continue;
            }
            match (views.get(&symbol), features.get(&symbol)) {
                (Some(view), Some(table)) => jobs.push((symbol, *view, table)),
                _ => ledger.record(Diagnostic::DataUnavailable {
                    step,
                    timestamp: t,
                    symbol,
                    reason: "selected symbol has no visible feature rows".into(),
                }),
            }
        }

        let results = self.map_symbols(&jobs, |(symbol, view, table)| {
            let signal = match strategy.generate_alpha_signal(symbol, view, t) {
                Ok(signal) => signal,
                Err(err) => {
                    warn!(step, %t, %symbol, strategy = strategy.name(), error = %err, "generate_alpha_signal failed");
                    return SymbolResult::diagnostic(Diagnostic::StrategyFault {
                        step,
                        timestamp: t,
                        symbol: Some(symbol.clone()),
                        strategy: strategy.name().to_string(),
                        operation: StrategyOperation::GenerateSignal,
                        message: err.to_string(),
                    });
                }
            };
            if !signal.is_long() {
                return SymbolResult::default();
            }
            self.execute(Entry {
                symbol,
                table,
                signal: &signal,
                owner: strategy,
                weight: None,
                decision_time: t,
                step,
            })
        });

        self.absorb(results, ledger)
    }

    // ─── Portfolio mode ──────────────────────────────────────────────

    /// Every strategy in `manager` votes at each step; positions open for symbols the
    /// allocator weights above zero, and each exit is owned by that symbol's lead
    /// strategy.
    pub fn run_portfolio(
        &self,
        manager: &PortfolioManager,
        features: &FeatureSet,
        cancel: Option<&AtomicBool>,
    ) -> SimulationOutcome {
        let warmup = self.config.min_warmup_bars;
        info!(
            strategies = ?manager.strategy_names().collect::<Vec<_>>(),
            combination = %manager.combiner().method(),
            allocation = %manager.allocator().config().method,
            steps = self.config.step_count(),
            "portfolio simulation started"
        );

        let mut ledger = Ledger::default();
        let mut steps = 0usize;
        let mut status = RunStatus::Completed;

        for (step, t) in self.config.step_times().enumerate() {
            if cancel.is_some_and(|f| f.load(Ordering::Relaxed)) {
                status = RunStatus::Cancelled {
                    completed_steps: step,
                };
                break;
            }
            let views = self.views_at(features, t, warmup, step, &mut ledger);
            let rebalance = manager.rebalance(&views, t, step);
            ledger.record_all(rebalance.diagnostics.iter().cloned());

            let jobs: Vec<(&StrategySignal, f64, &FeatureTable)> = rebalance
                .allocation
                .iter()
                .filter(|(_, w)| **w > 0.0)
                .filter_map(|(symbol, w)| {
                    let signal = rebalance.combined_for(symbol)?;
                    let table = features.get(symbol)?;
                    Some((signal, *w, table))
                })
                .collect();

            let results = self.map_symbols(&jobs, |(signal, weight, table)| {
                self.execute(Entry {
                    symbol: &signal.symbol,
                    table,
                    signal,
                    owner: manager.exit_owner(signal),
                    weight: Some(*weight),
                    decision_time: t,
                    step,
                })
            });
            self.absorb(results, &mut ledger);

            ledger.record_allocation(AllocationSnapshot {
                step,
                timestamp: t,
                weights: rebalance.allocation,
            });
            steps = step + 1;
        }

        self.finish("portfolio", ledger, status, steps)
    }

    // ─── Shared machinery ────────────────────────────────────────────

    /// Point-in-time views for the universe. Symbols without enough visible rows are
    /// recorded as unavailable and left out.
    fn views_at<'a>(
        &self,
        features: &'a FeatureSet,
        t: DateTime<Utc>,
        warmup: usize,
        step: usize,
        ledger: &mut Ledger,
    ) -> FeatureViews<'a> {
        let mut views = FeatureViews::new();
        for symbol in &self.config.universe {
            let reason = match features.get(symbol) {
                None => Some("no feature table".to_string()),
                Some(table) => {
                    let view = table.view_at(t);
                    if view.is_empty() {
                        Some("no rows at or before step time".to_string())
                    } else if view.len() < warmup {
                        Some(format!("warmup needs {warmup} rows, have {}", view.len()))
                    } else {
                        views.insert(symbol.clone(), view);
                        None
                    }
                }
            };
            if let Some(reason) = reason {
                debug!(step, %t, %symbol, %reason, "symbol unavailable");
                ledger.record(Diagnostic::DataUnavailable {
                    step,
                    timestamp: t,
                    symbol: symbol.clone(),
                    reason,
                });
            }
        }
        views
    }

    fn map_symbols<J, F>(&self, jobs: &[J], f: F) -> Vec<SymbolResult>
    where
        J: Sync,
        F: Fn(&J) -> SymbolResult + Sync + Send,
    {
        if self.parallel {
            jobs.par_iter().map(&f).collect()
        } else {
            jobs.iter().map(&f).collect()
        }
    }

    /// Merge one step's per-symbol results into the ledger; returns symbols traded.
    fn absorb(&self, results: Vec<SymbolResult>, ledger: &mut Ledger) -> Vec<Symbol> {
        let mut trades = Vec::new();
        for result in results {
            ledger.record_all(result.diagnostics);
            if let Some(trade) = result.trade {
                trades.push(trade);
            }
        }
        let opened = trades.iter().map(|t| t.symbol.clone()).collect();
        ledger.append_step(trades);
        opened
    }

    /// Fill the entry, walk to the exit, and price the round trip.
    fn execute(&self, entry: Entry<'_>) -> SymbolResult {
        let Entry {
            symbol,
            table,
            signal,
            owner,
            weight,
            decision_time,
            step,
        } = entry;

        let unavailable = |reason: &str| {
            SymbolResult::diagnostic(Diagnostic::DataUnavailable {
                step,
                timestamp: decision_time,
                symbol: symbol.to_string(),
                reason: reason.to_string(),
            })
        };
        let Some(entry_index) = table.first_index_after(decision_time) else {
            return unavailable("no bar after decision time to fill entry");
        };
        let Some(entry_price) = table.price(entry_index) else {
            return unavailable("entry bar has no valid close");
        };
        let Some(entry_time) = table.timestamp(entry_index) else {
            return unavailable("entry bar has no timestamp");
        };

        let mut position = Position::open(symbol, entry_time, entry_price, entry_index, owner.name());
        let (exit_index, exit_reason) = match self.walk_exit(&mut position, table, owner) {
            Ok(exit) => exit,
            Err(message) => {
                warn!(step, %decision_time, %symbol, strategy = owner.name(), error = %message, "should_close_position failed, dropping trade");
                return SymbolResult::diagnostic(Diagnostic::StrategyFault {
                    step,
                    timestamp: decision_time,
                    symbol: Some(symbol.to_string()),
                    strategy: owner.name().to_string(),
                    operation: StrategyOperation::ShouldClosePosition,
                    message,
                });
            }
        };

        // walk_exit only stops on bars with a valid price.
        let exit_price = table.price(exit_index).unwrap_or(entry_price);
        let exit_time = table.timestamp(exit_index).unwrap_or(entry_time);
        let trade = TradeResult {
            symbol: symbol.to_string(),
            strategy: owner.name().to_string(),
            direction: Direction::Long,
            decision_time,
            entry_time,
            exit_time,
            bars_held: exit_index - entry_index,
            entry_price,
            exit_price,
            return_pct: self.costs.net_return(entry_price, exit_price),
            max_drawdown_within_hold: position.max_drawdown(),
            exit_reason,
            alpha_score: signal.alpha_score,
            confidence: signal.confidence,
            weight,
            metadata: signal.metadata.clone(),
        };
        debug!(
            step,
            symbol = %trade.symbol,
            entry = %trade.entry_time,
            exit = %trade.exit_time,
            return_pct = trade.return_pct,
            reason = ?trade.exit_reason,
            "trade closed"
        );
        SymbolResult {
            trade: Some(trade),
            diagnostics: Vec::new(),
        }
    }

    /// Walk bars after the entry until the strategy closes, the window elapses, or
    /// data runs out. Bars without a valid close are skipped.
    fn walk_exit(
        &self,
        position: &mut Position,
        table: &FeatureTable,
        owner: &dyn Strategy,
    ) -> Result<(usize, ExitReason), String> {
        let mut last = position.entry_index;
        for i in (position.entry_index + 1)..table.len() {
            let (Some(price), Some(now)) = (table.price(i), table.timestamp(i)) else {
                continue;
            };
            position.mark(price);
            last = i;

            let view = table.view_through(i);
            let close = owner
                .should_close_position(
                    &position.symbol,
                    &view,
                    position.entry_time,
                    now,
                    position.entry_price,
                    price,
                )
                .map_err(|e| e.to_string())?;
            if close {
                return Ok((i, ExitReason::StrategySignal));
            }
            if now - position.entry_time >= self.config.window {
                return Ok((i, ExitReason::MaxTime));
            }
        }
        Ok((last, ExitReason::MaxTime))
    }

    fn finish(&self, label: &str, ledger: Ledger, status: RunStatus, steps: usize) -> SimulationOutcome {
        let trades = ledger.trade_count();
        let outcome = ledger.finish(status, steps);
        info!(
            run = label,
            steps,
            trades,
            diagnostics = outcome.diagnostics.len(),
            faults = outcome.strategy_faults().count(),
            status = ?outcome.status,
            "simulation finished"
        );
        outcome
    }
}
