//! Cost model — per-side fees and slippage applied to a round trip.
//!
//! Both frictions are fractions charged on each side. The buyer pays more on entry,
//! the seller receives less on exit; the net return is measured against the
//! effective (cost-inclusive) entry.

use crate::config::BacktestConfig;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostModel {
    pub fee_rate: f64,
    pub slippage_rate: f64,
}

impl CostModel {
    pub fn new(fee_rate: f64, slippage_rate: f64) -> Self {
        Self {
            fee_rate,
            slippage_rate,
        }
    }

    pub fn frictionless() -> Self {
        Self::new(0.0, 0.0)
    }

    pub fn from_config(config: &BacktestConfig) -> Self {
        Self::new(config.fee_rate, config.slippage_rate)
    }

    fn per_side(&self) -> f64 {
        self.fee_rate + self.slippage_rate
    }

    /// Effective price paid to buy at `price`.
    pub fn effective_entry(&self, price: f64) -> f64 {
        price * (1.0 + self.per_side())
    }

    /// Effective proceeds from selling at `price`.
    pub fn effective_exit(&self, price: f64) -> f64 {
        price * (1.0 - self.per_side())
    }

    /// Net long return of a round trip as a fraction.
    pub fn net_return(&self, entry_price: f64, exit_price: f64) -> f64 {
        let cost_basis = self.effective_entry(entry_price);
        if cost_basis <= 0.0 {
            return 0.0;
        }
        (self.effective_exit(exit_price) - cost_basis) / cost_basis
    }
}

impl Default for CostModel {
    fn default() -> Self {
        Self::frictionless()
    }
}
