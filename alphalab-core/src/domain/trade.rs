//! TradeResult — a completed, cost-adjusted round trip appended to the ledger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::signal::Metadata;
use super::Symbol;

/// Trade direction. v1 is long-only; the enum keeps the ledger schema explicit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Long,
}

/// Why a position was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    /// The strategy's `should_close_position` returned true.
    StrategySignal,
    /// The maximum hold elapsed, or the data ran out.
    MaxTime,
}

/// A completed trade. Immutable once it reaches the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeResult {
    // ── Identification ──
    pub symbol: Symbol,
    pub strategy: String,
    pub direction: Direction,

    // ── Timing ──
    /// Evaluation step time at which the entry decision was made.
    pub decision_time: DateTime<Utc>,
    pub entry_time: DateTime<Utc>,
    pub exit_time: DateTime<Utc>,
    pub bars_held: usize,

    // ── Prices ──
    pub entry_price: f64,
    pub exit_price: f64,

    // ── Outcome ──
    /// Net return as a fraction (0.05 = 5%), after fees and slippage on both sides.
    pub return_pct: f64,
    /// Worst peak-to-trough move during the hold, as a fraction <= 0.
    pub max_drawdown_within_hold: f64,
    pub exit_reason: ExitReason,

    // ── Signal context ──
    /// Alpha score that triggered the entry (combined alpha in portfolio mode).
    pub alpha_score: f64,
    pub confidence: f64,
    /// Target weight from the allocator, when the trade came from a portfolio run.
    pub weight: Option<f64>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl TradeResult {
    pub fn is_winner(&self) -> bool {
        self.return_pct > 0.0
    }

    pub fn holding_hours(&self) -> f64 {
        crate::time::as_hours(self.exit_time - self.entry_time)
    }
}
