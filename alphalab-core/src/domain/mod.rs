//! Domain types for AlphaLab

pub mod allocation;
pub mod position;
pub mod signal;
pub mod trade;

pub use allocation::{equal_weights, Allocation, AllocationSnapshot};
pub use position::Position;
pub use signal::{Decision, Metadata, StrategySignal, STRATEGY_NAME_KEY};
pub use trade::{Direction, ExitReason, TradeResult};

/// Symbol type alias
pub type Symbol = String;
