//! Feature store boundary.
//!
//! The feature store owns feature computation. This crate only asks it two
//! questions: how far the labeled data reaches, and what the selected
//! features look like for the inspections in a window.

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use polars::prelude::PolarsError;
use thiserror::Error;

use super::dataset::{DateRange, FeatureColumn, FeatureRow, FeatureRows, FeatureSpec, RowKey};

/// Table holding one row per inspection with its outcome.
pub const GROUND_TRUTH_TABLE: &str = "features.parcels_inspections";

/// Date column of [`GROUND_TRUTH_TABLE`].
pub const GROUND_TRUTH_COLUMN: &str = "inspection_date";

#[derive(Error, Debug)]
pub enum FeatureStoreError {
    #[error("Table not found: {0}")]
    TableNotFound(String),

    #[error("Column {column} not found in {table}")]
    ColumnNotFound { table: String, column: String },

    #[error("Feature pattern {0} matched no columns")]
    EmptyPattern(String),

    #[error("Feature {name} is provided by both {first} and {second}")]
    DuplicateFeature {
        name: String,
        first: String,
        second: String,
    },

    #[error("Polars error: {0}")]
    Polars(#[from] PolarsError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid data: {0}")]
    InvalidData(String),
}

pub type StoreResult<T> = Result<T, FeatureStoreError>;

/// Query interface of the feature store.
pub trait FeatureStore {
    /// Latest value of `column` in `table`.
    fn max_available_date(&self, table: &str, column: &str) -> StoreResult<NaiveDate>;

    /// Labeled feature rows for every inspection in `range`, one value per
    /// selected column, in column order.
    fn materialize_features(
        &self,
        features: &[FeatureSpec],
        range: &DateRange,
        residential_only: bool,
    ) -> StoreResult<FeatureRows>;
}

/// Resolve feature specs against table schemas.
///
/// Columns come out in spec order, then table order. A column selected by
/// several specs appears once, attributed to the first.
pub(crate) fn select_columns<F>(
    specs: &[FeatureSpec],
    mut table_columns: F,
) -> StoreResult<Vec<FeatureColumn>>
where
    F: FnMut(&str) -> StoreResult<Vec<String>>,
{
    let mut selected: Vec<FeatureColumn> = Vec::new();

    for spec in specs {
        let available = table_columns(&spec.table)?;
        let mut matched = 0;

        for column in available.iter().filter(|c| spec.matches(c)) {
            matched += 1;
            match selected.iter().find(|c| &c.name == column) {
                Some(existing) if existing.table == spec.table => continue,
                Some(existing) => {
                    return Err(FeatureStoreError::DuplicateFeature {
                        name: column.clone(),
                        first: existing.table.clone(),
                        second: spec.table.clone(),
                    })
                }
                None => selected.push(FeatureColumn {
                    name: column.clone(),
                    table: spec.table.clone(),
                    source: spec.to_string(),
                }),
            }
        }

        if matched == 0 {
            return Err(FeatureStoreError::EmptyPattern(spec.to_string()));
        }
    }

    Ok(selected)
}

/// A recorded inspection outcome.
#[derive(Debug, Clone)]
pub struct Inspection {
    pub key: RowKey,
    pub label: bool,
    pub residential: bool,
}

#[derive(Debug, Clone, Default)]
struct MemoryTable {
    columns: Vec<String>,
    rows: HashMap<RowKey, Vec<Option<f64>>>,
}

/// Feature store held entirely in memory.
///
/// Inspections without a row in a feature table get missing values for that
/// table's columns.
#[derive(Debug, Clone, Default)]
pub struct InMemoryFeatureStore {
    inspections: Vec<Inspection>,
    tables: BTreeMap<String, MemoryTable>,
}

impl InMemoryFeatureStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an inspection outcome.
    pub fn add_inspection(
        &mut self,
        entity_id: &str,
        inspection_date: NaiveDate,
        label: bool,
        residential: bool,
    ) {
        self.inspections.push(Inspection {
            key: RowKey {
                entity_id: entity_id.to_string(),
                inspection_date,
            },
            label,
            residential,
        });
    }

    /// Declare a feature table and its columns.
    pub fn add_table(&mut self, table: &str, columns: &[&str]) {
        self.tables.insert(
            table.to_string(),
            MemoryTable {
                columns: columns.iter().map(|c| c.to_string()).collect(),
                rows: HashMap::new(),
            },
        );
    }

    /// Set the feature values of one inspection in a declared table.
    pub fn set_values(
        &mut self,
        table: &str,
        entity_id: &str,
        inspection_date: NaiveDate,
        values: Vec<Option<f64>>,
    ) -> StoreResult<()> {
        let memory_table = self
            .tables
            .get_mut(table)
            .ok_or_else(|| FeatureStoreError::TableNotFound(table.to_string()))?;

        if values.len() != memory_table.columns.len() {
            return Err(FeatureStoreError::InvalidData(format!(
                "{} has {} columns, got {} values",
                table,
                memory_table.columns.len(),
                values.len()
            )));
        }

        let key = RowKey {
            entity_id: entity_id.to_string(),
            inspection_date,
        };
        memory_table.rows.insert(key, values);
        Ok(())
    }
}

impl FeatureStore for InMemoryFeatureStore {
    fn max_available_date(&self, table: &str, column: &str) -> StoreResult<NaiveDate> {
        if table != GROUND_TRUTH_TABLE {
            return Err(FeatureStoreError::TableNotFound(table.to_string()));
        }
        if column != GROUND_TRUTH_COLUMN {
            return Err(FeatureStoreError::ColumnNotFound {
                table: table.to_string(),
                column: column.to_string(),
            });
        }

        self.inspections
            .iter()
            .map(|i| i.key.inspection_date)
            .max()
            .ok_or_else(|| FeatureStoreError::InvalidData(format!("{} is empty", table)))
    }

    fn materialize_features(
        &self,
        features: &[FeatureSpec],
        range: &DateRange,
        residential_only: bool,
    ) -> StoreResult<FeatureRows> {
        let columns = select_columns(features, |table| {
            self.tables
                .get(table)
                .map(|t| t.columns.clone())
                .ok_or_else(|| FeatureStoreError::TableNotFound(table.to_string()))
        })?;

        // (table, position within table) per selected column
        let positions: Vec<(&MemoryTable, usize)> = columns
            .iter()
            .map(|c| {
                let table = &self.tables[&c.table];
                let pos = table
                    .columns
                    .iter()
                    .position(|name| name == &c.name)
                    .unwrap_or_default();
                (table, pos)
            })
            .collect();

        let mut rows: Vec<FeatureRow> = self
            .inspections
            .iter()
            .filter(|i| range.contains(i.key.inspection_date))
            .filter(|i| !residential_only || i.residential)
            .map(|i| FeatureRow {
                key: i.key.clone(),
                label: i.label,
                values: positions
                    .iter()
                    .map(|(table, pos)| table.rows.get(&i.key).and_then(|values| values[*pos]))
                    .collect(),
            })
            .collect();

        rows.sort_by(|a, b| a.key.cmp(&b.key));

        Ok(FeatureRows { columns, rows })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn store() -> InMemoryFeatureStore {
        let mut store = InMemoryFeatureStore::new();
        store.add_inspection("p1", date(2019, 1, 10), true, true);
        store.add_inspection("p2", date(2019, 2, 10), false, false);
        store.add_inspection("p3", date(2019, 6, 1), true, true);
        store.add_table("tax", &["rate", "value"]);
        store.add_table("fire", &["count_1km"]);
        store
            .set_values("tax", "p1", date(2019, 1, 10), vec![Some(0.1), Some(100.0)])
            .unwrap();
        store
            .set_values("fire", "p2", date(2019, 2, 10), vec![Some(3.0)])
            .unwrap();
        store
    }

    fn specs(raw: &[&str]) -> Vec<FeatureSpec> {
        raw.iter().map(|s| FeatureSpec::parse(s).unwrap()).collect()
    }

    #[test]
    fn test_max_available_date() {
        let store = store();
        let max = store
            .max_available_date(GROUND_TRUTH_TABLE, GROUND_TRUTH_COLUMN)
            .unwrap();
        assert_eq!(max, date(2019, 6, 1));
        assert!(store.max_available_date("features.tax", "date").is_err());
    }

    #[test]
    fn test_materialize_window_is_half_open() {
        let store = store();
        let range = DateRange::new(date(2019, 1, 1), date(2019, 6, 1)).unwrap();
        let rows = store
            .materialize_features(&specs(&["tax.*", "fire.*"]), &range, false)
            .unwrap();

        assert_eq!(rows.columns.len(), 3);
        assert_eq!(rows.rows.len(), 2);
        assert_eq!(rows.rows[0].key.entity_id, "p1");
        assert_eq!(rows.rows[0].values, vec![Some(0.1), Some(100.0), None]);
        assert_eq!(rows.rows[1].values, vec![None, None, Some(3.0)]);
    }

    #[test]
    fn test_materialize_residential_only() {
        let store = store();
        let range = DateRange::new(date(2019, 1, 1), date(2019, 12, 1)).unwrap();
        let rows = store
            .materialize_features(&specs(&["tax.rate"]), &range, true)
            .unwrap();
        let ids: Vec<_> = rows.rows.iter().map(|r| r.key.entity_id.as_str()).collect();
        assert_eq!(ids, vec!["p1", "p3"]);
    }

    #[test]
    fn test_unknown_table_and_empty_pattern() {
        let store = store();
        let range = DateRange::new(date(2019, 1, 1), date(2019, 12, 1)).unwrap();
        assert!(matches!(
            store.materialize_features(&specs(&["crime.*"]), &range, false),
            Err(FeatureStoreError::TableNotFound(_))
        ));
        assert!(matches!(
            store.materialize_features(&specs(&["tax.nothing_*"]), &range, false),
            Err(FeatureStoreError::EmptyPattern(_))
        ));
    }

    #[test]
    fn test_select_columns_dedupes_within_table() {
        let columns = select_columns(&specs(&["tax.*", "tax.rate"]), |_| {
            Ok(vec!["rate".to_string(), "value".to_string()])
        })
        .unwrap();
        assert_eq!(columns.len(), 2);
        assert_eq!(columns[0].source, "tax.*");
    }

    #[test]
    fn test_select_columns_rejects_cross_table_duplicates() {
        let result = select_columns(&specs(&["tax.*", "fire.*"]), |_| Ok(vec!["count".to_string()]));
        assert!(matches!(result, Err(FeatureStoreError::DuplicateFeature { .. })));
    }
}
