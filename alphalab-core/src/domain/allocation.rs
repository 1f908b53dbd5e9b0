//! Allocation — target weights per symbol at one rebalance time.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::Symbol;

/// Symbol -> non-negative target weight.
pub type Allocation = BTreeMap<Symbol, f64>;

/// Allocation recorded at one simulator step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationSnapshot {
    pub step: usize,
    pub timestamp: DateTime<Utc>,
    pub weights: Allocation,
}

impl AllocationSnapshot {
    /// Symbols holding a strictly positive weight.
    pub fn held(&self) -> impl Iterator<Item = &str> {
        self.weights
            .iter()
            .filter(|(_, w)| **w > 0.0)
            .map(|(s, _)| s.as_str())
    }

    pub fn total_weight(&self) -> f64 {
        self.weights.values().sum()
    }
}

/// Equal weights over `symbols`; empty in, empty out.
pub fn equal_weights<'a>(symbols: impl IntoIterator<Item = &'a str>) -> Allocation {
    let symbols: Vec<&str> = symbols.into_iter().collect();
    if symbols.is_empty() {
        return Allocation::new();
    }
    let w = 1.0 / symbols.len() as f64;
    symbols.into_iter().map(|s| (s.to_string(), w)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn equal_weights_sum_to_one() {
        let a = equal_weights(["A", "B", "C"]);
        assert_eq!(a.len(), 3);
        assert!((a.values().sum::<f64>() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn held_skips_zero_weights() {
        let mut weights = Allocation::new();
        weights.insert("A".into(), 0.5);
        weights.insert("B".into(), 0.0);
        weights.insert("C".into(), 0.5);
        let snap = AllocationSnapshot {
            step: 0,
            timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            weights,
        };
        assert_eq!(snap.held().collect::<Vec<_>>(), vec!["A", "C"]);
        assert!((snap.total_weight() - 1.0).abs() < 1e-12);
    }
}
