//! Feature provider trait and structured error types.
//!
//! The FeatureProvider trait abstracts over wherever indicator tables come from
//! (a warehouse, files, a synthetic generator) so the engine can be driven and
//! mocked without knowing about acquisition.

use std::collections::BTreeMap;

use thiserror::Error;

use super::FeatureTable;
use crate::domain::Symbol;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FeatureError {
    #[error("no feature data for symbol '{symbol}'")]
    SymbolNotFound { symbol: String },

    #[error("timestamps for '{symbol}' are not strictly ascending at row {index}")]
    UnsortedTimestamps { symbol: String, index: usize },

    #[error("column '{column}' for '{symbol}' has {actual} rows, expected {expected}")]
    ColumnLength {
        symbol: String,
        column: String,
        expected: usize,
        actual: usize,
    },

    #[error("feature source error: {0}")]
    Source(String),
}

/// Source of materialized feature tables. Implementations must return rows sorted
/// ascending by timestamp; the engine never calls a provider during a simulation.
pub trait FeatureProvider: Send + Sync {
    fn load(&self, symbol: &str) -> Result<FeatureTable, FeatureError>;
}

/// Provider backed by tables already held in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryProvider {
    tables: BTreeMap<Symbol, FeatureTable>,
}

impl InMemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, table: FeatureTable) -> Self {
        self.tables.insert(table.symbol().to_string(), table);
        self
    }
}

impl FeatureProvider for InMemoryProvider {
    fn load(&self, symbol: &str) -> Result<FeatureTable, FeatureError> {
        self.tables
            .get(symbol)
            .cloned()
            .ok_or_else(|| FeatureError::SymbolNotFound {
                symbol: symbol.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn in_memory_provider_returns_clone() {
        let ts = vec![Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()];
        let table = FeatureTable::new("BTC", ts).unwrap();
        let provider = InMemoryProvider::new().with_table(table);
        assert_eq!(provider.load("BTC").unwrap().len(), 1);
        assert_eq!(
            provider.load("ETH").unwrap_err(),
            FeatureError::SymbolNotFound {
                symbol: "ETH".into()
            }
        );
    }
}
