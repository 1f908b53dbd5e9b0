//! Feature tables and point-in-time views.
//!
//! A `FeatureTable` holds one symbol's time-indexed numeric columns. Strategies never
//! see a table directly: the simulator hands them a `FeatureView`, a borrowed prefix
//! containing only rows stamped at or before the current simulated time. Slicing is a
//! binary search plus a length; the underlying table is never copied or mutated.

pub mod provider;
pub mod synthetic;

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

use crate::domain::Symbol;

pub use provider::{FeatureError, FeatureProvider, InMemoryProvider};
pub use synthetic::{SyntheticConfig, SyntheticProvider};

/// Column used as the execution price for entries, exits and marks.
pub const PRICE_COLUMN: &str = "close";

/// Point-in-time views keyed by symbol, as handed to `Strategy::select_symbols`.
pub type FeatureViews<'a> = BTreeMap<Symbol, FeatureView<'a>>;

// ─── Table ───────────────────────────────────────────────────────────

/// One symbol's feature history. Timestamps are strictly ascending and every
/// column has exactly one value per timestamp.
#[derive(Debug, Clone, Serialize)]
pub struct FeatureTable {
    symbol: Symbol,
    timestamps: Vec<DateTime<Utc>>,
    columns: BTreeMap<String, Vec<f64>>,
}

impl FeatureTable {
    pub fn new(symbol: impl Into<Symbol>, timestamps: Vec<DateTime<Utc>>) -> Result<Self, FeatureError> {
        let symbol = symbol.into();
        if let Some(i) = timestamps.windows(2).position(|w| w[0] >= w[1]) {
            return Err(FeatureError::UnsortedTimestamps {
                symbol,
                index: i + 1,
            });
        }
        Ok(Self {
            symbol,
            timestamps,
            columns: BTreeMap::new(),
        })
    }

    /// Attach a column. Its length must match the timestamp index.
    pub fn with_column(mut self, name: impl Into<String>, values: Vec<f64>) -> Result<Self, FeatureError> {
        let name = name.into();
        if values.len() != self.timestamps.len() {
            return Err(FeatureError::ColumnLength {
                symbol: self.symbol,
                column: name,
                expected: self.timestamps.len(),
                actual: values.len(),
            });
        }
        self.columns.insert(name, values);
        Ok(self)
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn timestamps(&self) -> &[DateTime<Utc>] {
        &self.timestamps
    }

    pub fn timestamp(&self, index: usize) -> Option<DateTime<Utc>> {
        self.timestamps.get(index).copied()
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.columns.get(name).map(|v| v.as_slice())
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(|k| k.as_str())
    }

    /// Execution price at a row: the `close` value if it is finite and positive.
    pub fn price(&self, index: usize) -> Option<f64> {
        self.columns
            .get(PRICE_COLUMN)
            .and_then(|c| c.get(index))
            .copied()
            .filter(|p| p.is_finite() && *p > 0.0)
    }

    /// Number of rows stamped at or before `t`.
    pub fn rows_through(&self, t: DateTime<Utc>) -> usize {
        self.timestamps.partition_point(|ts| *ts <= t)
    }

    /// Index of the first row stamped strictly after `t`.
    pub fn first_index_after(&self, t: DateTime<Utc>) -> Option<usize> {
        let i = self.rows_through(t);
        (i < self.len()).then_some(i)
    }

    /// View of every row stamped at or before `t`.
    pub fn view_at(&self, t: DateTime<Utc>) -> FeatureView<'_> {
        FeatureView {
            table: self,
            end: self.rows_through(t),
        }
    }

    /// View of rows `0..=index` (clamped to the table length).
    pub fn view_through(&self, index: usize) -> FeatureView<'_> {
        FeatureView {
            table: self,
            end: (index + 1).min(self.len()),
        }
    }

    pub fn full_view(&self) -> FeatureView<'_> {
        FeatureView {
            table: self,
            end: self.len(),
        }
    }
}

// ─── View ────────────────────────────────────────────────────────────

/// Read-only prefix of a `FeatureTable`. Everything reachable through a view is
/// stamped at or before the view's cut-off.
#[derive(Debug, Clone, Copy)]
pub struct FeatureView<'a> {
    table: &'a FeatureTable,
    end: usize,
}

impl<'a> FeatureView<'a> {
    pub fn symbol(&self) -> &'a str {
        self.table.symbol()
    }

    pub fn len(&self) -> usize {
        self.end
    }

    pub fn is_empty(&self) -> bool {
        self.end == 0
    }

    pub fn timestamps(&self) -> &'a [DateTime<Utc>] {
        &self.table.timestamps[..self.end]
    }

    pub fn latest_timestamp(&self) -> Option<DateTime<Utc>> {
        self.timestamps().last().copied()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.table.has_column(name)
    }

    pub fn column(&self, name: &str) -> Option<&'a [f64]> {
        self.table.column(name).map(|c| &c[..self.end])
    }

    /// Most recent value of `name`; `None` if the column is absent, the view is
    /// empty, or the value is NaN.
    pub fn latest(&self, name: &str) -> Option<f64> {
        self.column(name)
            .and_then(|c| c.last())
            .copied()
            .filter(|v| !v.is_nan())
    }

    /// The trailing `n` values of `name`, or `None` if fewer than `n` rows are visible.
    pub fn tail(&self, name: &str, n: usize) -> Option<&'a [f64]> {
        let c = self.column(name)?;
        (c.len() >= n).then(|| &c[c.len() - n..])
    }

    pub fn latest_price(&self) -> Option<f64> {
        self.latest(PRICE_COLUMN).filter(|p| *p > 0.0)
    }
}

// ─── Set ─────────────────────────────────────────────────────────────

/// Feature tables for a whole universe, keyed by symbol.
#[derive(Debug, Clone, Default)]
pub struct FeatureSet {
    tables: BTreeMap<Symbol, FeatureTable>,
}

impl FeatureSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, table: FeatureTable) {
        self.tables.insert(table.symbol.clone(), table);
    }

    pub fn get(&self, symbol: &str) -> Option<&FeatureTable> {
        self.tables.get(symbol)
    }

    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

impl FromIterator<FeatureTable> for FeatureSet {
    fn from_iter<I: IntoIterator<Item = FeatureTable>>(iter: I) -> Self {
        let mut set = Self::new();
        for table in iter {
            set.insert(table);
        }
        set
    }
}
