//! Per-run diagnostics — every non-fatal issue the simulator skipped past.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::Symbol;

/// Which strategy callback failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyOperation {
    SelectSymbols,
    GenerateSignal,
    ShouldClosePosition,
}

/// A recorded, non-fatal issue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    /// No usable feature rows for a symbol at a step; the symbol was skipped.
    DataUnavailable {
        step: usize,
        timestamp: DateTime<Utc>,
        symbol: Symbol,
        reason: String,
    },
    /// A strategy callback returned an error; the symbol (or step) was skipped.
    StrategyFault {
        step: usize,
        timestamp: DateTime<Utc>,
        symbol: Option<Symbol>,
        strategy: String,
        operation: StrategyOperation,
        message: String,
    },
    /// Allocation constraints could not be met; the step fell back to equal weight.
    AllocationInfeasible {
        step: usize,
        timestamp: DateTime<Utc>,
        max_weight: f64,
        positions: usize,
        message: String,
    },
}

impl Diagnostic {
    pub fn step(&self) -> usize {
        match self {
            Self::DataUnavailable { step, .. }
            | Self::StrategyFault { step, .. }
            | Self::AllocationInfeasible { step, .. } => *step,
        }
    }

    pub fn is_strategy_fault(&self) -> bool {
        matches!(self, Self::StrategyFault { .. })
    }

    pub fn is_data_unavailable(&self) -> bool {
        matches!(self, Self::DataUnavailable { .. })
    }

    pub fn is_allocation_infeasible(&self) -> bool {
        matches!(self, Self::AllocationInfeasible { .. })
    }
}
