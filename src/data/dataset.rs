//! Core data types for experiment datasets.
//!
//! A [`Dataset`] is the labeled, row-aligned view of the feature store for
//! one temporal window. Rows are `(parcel, inspection date)` pairs.

use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use glob::Pattern;
use polars::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::ConfigError;
use crate::error::{ExperimentError, ExperimentResult};

/// Dense, row-major feature matrix (after imputation).
pub type Matrix = Vec<Vec<f64>>;

/// Half-open date interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    /// Create a range, `None` if `start > end`.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Option<Self> {
        (start <= end).then_some(Self { start, end })
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date >= self.start && date < self.end
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Whether the two ranges share at least one date. Empty ranges never overlap.
    pub fn overlaps(&self, other: &DateRange) -> bool {
        self.start < other.end && other.start < self.end
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// A `table.pattern` feature selector. The pattern is a shell glob over the
/// table's column names.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FeatureSpec {
    pub table: String,
    pub pattern: Pattern,
}

impl FeatureSpec {
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let raw = raw.trim();
        let invalid = || ConfigError::FeaturePattern(raw.to_string());
        match raw.split_once('.') {
            Some((table, pattern)) if !table.is_empty() && !pattern.is_empty() => Ok(Self {
                table: table.to_string(),
                pattern: Pattern::new(pattern).map_err(|_| invalid())?,
            }),
            _ => Err(invalid()),
        }
    }

    pub fn parse_list(raw: &[String]) -> Result<Vec<Self>, ConfigError> {
        raw.iter().map(|s| Self::parse(s)).collect()
    }

    /// Whether a column of `self.table` is selected by this spec.
    pub fn matches(&self, column: &str) -> bool {
        self.pattern.matches(column)
    }
}

impl fmt::Display for FeatureSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.table, self.pattern)
    }
}

/// A stored value that counts as observed: present and finite.
pub fn observed(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite())
}

/// A materialized feature column and the `FeatureSpec` that selected it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureColumn {
    pub name: String,
    pub table: String,
    pub source: String,
}

/// Row identity: which parcel, inspected when. Orders by date, then parcel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RowKey {
    pub inspection_date: NaiveDate,
    pub entity_id: String,
}

/// One materialized row as returned by a feature store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    pub key: RowKey,
    pub label: bool,
    pub values: Vec<Option<f64>>,
}

/// Feature store output for one window.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureRows {
    pub columns: Vec<FeatureColumn>,
    pub rows: Vec<FeatureRow>,
}

/// Immutable labeled dataset.
///
/// Invariants: `x`, `y` and `index` have the same length, and every row of
/// `x` has one value per feature name.
#[derive(Debug, Clone, Serialize)]
pub struct Dataset {
    x: Vec<Vec<Option<f64>>>,
    y: Vec<bool>,
    index: Vec<RowKey>,
    feature_names: Vec<String>,
    feature_mapping: BTreeMap<String, String>,
}

impl Dataset {
    pub fn new(
        x: Vec<Vec<Option<f64>>>,
        y: Vec<bool>,
        index: Vec<RowKey>,
        feature_names: Vec<String>,
        feature_mapping: BTreeMap<String, String>,
    ) -> ExperimentResult<Self> {
        if x.len() != y.len() || x.len() != index.len() {
            return Err(ExperimentError::DatasetIntegrity(format!(
                "row counts differ: {} feature rows, {} labels, {} index entries",
                x.len(),
                y.len(),
                index.len()
            )));
        }

        if let Some((row, values)) = x
            .iter()
            .enumerate()
            .find(|(_, values)| values.len() != feature_names.len())
        {
            return Err(ExperimentError::DatasetIntegrity(format!(
                "row {} ({} on {}) has {} values for {} features",
                row,
                index[row].entity_id,
                index[row].inspection_date,
                values.len(),
                feature_names.len()
            )));
        }

        Ok(Self {
            x,
            y,
            index,
            feature_names,
            feature_mapping,
        })
    }

    /// Assemble a dataset from feature store output.
    pub fn from_rows(rows: FeatureRows) -> ExperimentResult<Self> {
        let feature_names: Vec<String> = rows.columns.iter().map(|c| c.name.clone()).collect();
        let feature_mapping = rows
            .columns
            .iter()
            .map(|c| (c.name.clone(), c.source.clone()))
            .collect();

        let mut x = Vec::with_capacity(rows.rows.len());
        let mut y = Vec::with_capacity(rows.rows.len());
        let mut index = Vec::with_capacity(rows.rows.len());
        for row in rows.rows {
            x.push(row.values);
            y.push(row.label);
            index.push(row.key);
        }

        Self::new(x, y, index, feature_names, feature_mapping)
    }

    pub fn n_rows(&self) -> usize {
        self.y.len()
    }

    pub fn n_features(&self) -> usize {
        self.feature_names.len()
    }

    pub fn x(&self) -> &[Vec<Option<f64>>] {
        &self.x
    }

    pub fn labels(&self) -> &[bool] {
        &self.y
    }

    pub fn index(&self) -> &[RowKey] {
        &self.index
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn feature_mapping(&self) -> &BTreeMap<String, String> {
        &self.feature_mapping
    }

    pub fn positives(&self) -> usize {
        self.y.iter().filter(|&&label| label).count()
    }

    /// Values of one feature column, top to bottom. NaN and infinities
    /// read as missing.
    pub fn column(&self, feature: usize) -> impl Iterator<Item = Option<f64>> + '_ {
        self.x.iter().map(move |row| observed(row[feature]))
    }

    /// Convert to a DataFrame with index and label columns first.
    pub fn to_dataframe(&self) -> PolarsResult<DataFrame> {
        let entity_ids: Vec<&str> = self.index.iter().map(|k| k.entity_id.as_str()).collect();
        let dates: Vec<String> = self
            .index
            .iter()
            .map(|k| k.inspection_date.to_string())
            .collect();
        let labels: Vec<i32> = self.y.iter().map(|&label| i32::from(label)).collect();

        let mut columns: Vec<Column> = vec![
            Series::new("entity_id".into(), entity_ids).into(),
            Series::new("inspection_date".into(), dates).into(),
            Series::new("label".into(), labels).into(),
        ];

        for (j, name) in self.feature_names.iter().enumerate() {
            let values: Vec<Option<f64>> = self.column(j).collect();
            columns.push(Series::new(name.as_str().into(), values).into());
        }

        DataFrame::new(columns)
    }
}
