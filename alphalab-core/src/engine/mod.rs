//! Walk-forward engine — the step loop, trade costs and the run ledger.
//!
//! Each evaluation step hands strategies point-in-time feature views, fills long
//! entries at the next bar, and walks every position forward to its exit:
//!
//! 1. Views: rows stamped at or before the step time, warmup-filtered
//! 2. Selection and signals (or a full portfolio rebalance)
//! 3. Entry fill at the first bar strictly after the step
//! 4. Exit walk: strategy close, window elapsed, or data exhausted

pub mod costs;
pub mod ledger;
pub mod simulator;

pub use costs::CostModel;
pub use ledger::{RunStatus, SimulationOutcome};
pub use simulator::Simulator;
