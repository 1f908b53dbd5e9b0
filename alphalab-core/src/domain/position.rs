use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Symbol;

/// An open long position inside one simulated hold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub symbol: Symbol,
    pub entry_time: DateTime<Utc>,
    pub entry_price: f64,
    /// Row index of the entry bar in the symbol's feature table.
    pub entry_index: usize,
    /// Name of the strategy that owns the exit decision.
    pub strategy_reference: String,
    peak_price: f64,
    max_drawdown: f64,
}

impl Position {
    pub fn open(
        symbol: impl Into<Symbol>,
        entry_time: DateTime<Utc>,
        entry_price: f64,
        entry_index: usize,
        strategy_reference: impl Into<String>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            entry_time,
            entry_price,
            entry_index,
            strategy_reference: strategy_reference.into(),
            peak_price: entry_price,
            max_drawdown: 0.0,
        }
    }

    /// Record a new observed price; updates the running peak and worst drawdown.
    pub fn mark(&mut self, price: f64) {
        if price > self.peak_price {
            self.peak_price = price;
        }
        if self.peak_price > 0.0 {
            let dd = (price - self.peak_price) / self.peak_price;
            if dd < self.max_drawdown {
                self.max_drawdown = dd;
            }
        }
    }

    /// Gross (pre-cost) return at `current_price` as a fraction.
    pub fn unrealized_return(&self, current_price: f64) -> f64 {
        if self.entry_price == 0.0 {
            return 0.0;
        }
        (current_price - self.entry_price) / self.entry_price
    }

    /// Worst peak-to-trough move seen so far (a fraction <= 0).
    pub fn max_drawdown(&self) -> f64 {
        self.max_drawdown
    }
}
