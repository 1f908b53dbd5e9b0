//! Simulation outcome — the append-only trade ledger plus everything recorded
//! alongside it.

use serde::{Deserialize, Serialize};

use crate::diagnostics::Diagnostic;
use crate::domain::{AllocationSnapshot, TradeResult};

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    /// The cancellation flag was observed before step `completed_steps` started.
    Cancelled { completed_steps: usize },
}

impl RunStatus {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

/// Result of one simulation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationOutcome {
    /// Trades ordered by `entry_time` (stable with respect to step order).
    pub trades: Vec<TradeResult>,
    /// One snapshot per completed step.
    pub allocations: Vec<AllocationSnapshot>,
    pub diagnostics: Vec<Diagnostic>,
    pub status: RunStatus,
    /// Steps actually evaluated.
    pub steps: usize,
}

impl SimulationOutcome {
    pub fn is_cancelled(&self) -> bool {
        self.status.is_cancelled()
    }

    pub fn strategy_faults(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| d.is_strategy_fault())
    }
}

/// Accumulates results during a run; only the simulator appends.
#[derive(Debug, Default)]
pub(crate) struct Ledger {
    trades: Vec<TradeResult>,
    allocations: Vec<AllocationSnapshot>,
    diagnostics: Vec<Diagnostic>,
}

impl Ledger {
    /// Append one step's trades, ordered by `(entry_time, symbol)`.
    pub(crate) fn append_step(&mut self, mut trades: Vec<TradeResult>) {
        trades.sort_by(|a, b| {
            a.entry_time
                .cmp(&b.entry_time)
                .then_with(|| a.symbol.cmp(&b.symbol))
        });
        self.trades.extend(trades);
    }

    pub(crate) fn record_allocation(&mut self, snapshot: AllocationSnapshot) {
        self.allocations.push(snapshot);
    }

    pub(crate) fn record(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    pub(crate) fn record_all(&mut self, diagnostics: impl IntoIterator<Item = Diagnostic>) {
        self.diagnostics.extend(diagnostics);
    }

    pub(crate) fn trade_count(&self) -> usize {
        self.trades.len()
    }

    /// Final stable sort by entry time: symbols on unaligned grids can fill a later
    /// step's entry before an earlier step's.
    pub(crate) fn finish(mut self, status: RunStatus, steps: usize) -> SimulationOutcome {
        self.trades.sort_by_key(|t| t.entry_time);
        SimulationOutcome {
            trades: self.trades,
            allocations: self.allocations,
            diagnostics: self.diagnostics,
            status,
            steps,
        }
    }
}
