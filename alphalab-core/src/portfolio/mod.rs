//! Portfolio layer — combining strategies' signals and sizing the result.

pub mod allocator;
pub mod combiner;
pub mod manager;

pub use allocator::{
    AllocationError, AllocationMethod, AllocationOutcome, AllocatorConfig, CapitalAllocator, TierConfig,
};
pub use combiner::{
    CombinationMethod, SignalCombiner, COMBINATION_METHOD_KEY, LEAD_STRATEGY_KEY, NUM_STRATEGIES_KEY,
};
pub use manager::{PortfolioManager, Rebalance};
