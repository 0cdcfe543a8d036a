//! Parquet-backed feature store.
//!
//! Layout under the data directory:
//! - `parcels_inspections.parquet`: parcel_id, inspection_date (YYYY-MM-DD),
//!   viol_outcome (0/1), residential (bool)
//! - `features/{table}.parquet`: parcel_id, inspection_date, feature columns
//!
//! Feature tables are left-joined onto the inspections of the requested
//! window, so an inspection without features yields missing values.

use std::path::Path;

use chrono::NaiveDate;
use polars::prelude::*;
use tracing::debug;

use super::dataset::{observed, DateRange, FeatureRow, FeatureRows, FeatureSpec, RowKey};
use super::store::{
    select_columns, FeatureStore, FeatureStoreError, StoreResult, GROUND_TRUTH_TABLE,
};

const ENTITY_COLUMN: &str = "parcel_id";
const DATE_COLUMN: &str = "inspection_date";
const LABEL_COLUMN: &str = "viol_outcome";
const RESIDENTIAL_COLUMN: &str = "residential";

/// Parquet feature store rooted at a data directory.
pub struct ParquetFeatureStore {
    data_dir: String,
}

impl ParquetFeatureStore {
    pub fn new(data_dir: &str) -> Self {
        Self {
            data_dir: data_dir.to_string(),
        }
    }

    fn inspections_path(&self) -> String {
        format!("{}/parcels_inspections.parquet", self.data_dir)
    }

    fn table_path(&self, table: &str) -> String {
        format!("{}/features/{}.parquet", self.data_dir, table)
    }

    /// Map a qualified table name (`features.tax`) to its file.
    fn path_for(&self, table: &str) -> String {
        if table == GROUND_TRUTH_TABLE {
            return self.inspections_path();
        }
        let bare = table.strip_prefix("features.").unwrap_or(table);
        self.table_path(bare)
    }

    fn scan(&self, path: &str) -> StoreResult<LazyFrame> {
        if !Path::new(path).exists() {
            return Err(FeatureStoreError::TableNotFound(path.to_string()));
        }
        Ok(LazyFrame::scan_parquet(path, ScanArgsParquet::default())?)
    }

    /// Column names of a feature table, keys excluded.
    fn feature_columns(&self, table: &str) -> StoreResult<Vec<String>> {
        let mut lf = self.scan(&self.table_path(table))?;
        let schema = lf.collect_schema()?;
        Ok(schema
            .iter_names()
            .map(|name| name.to_string())
            .filter(|name| name != ENTITY_COLUMN && name != DATE_COLUMN)
            .collect())
    }

    fn keys() -> [Expr; 2] {
        [
            col(ENTITY_COLUMN).cast(DataType::String),
            col(DATE_COLUMN).cast(DataType::String),
        ]
    }
}

impl FeatureStore for ParquetFeatureStore {
    fn max_available_date(&self, table: &str, column: &str) -> StoreResult<NaiveDate> {
        let mut lf = self.scan(&self.path_for(table))?;
        let schema = lf.collect_schema()?;
        if schema.get(column).is_none() {
            return Err(FeatureStoreError::ColumnNotFound {
                table: table.to_string(),
                column: column.to_string(),
            });
        }

        let stats = lf
            .select([col(column).cast(DataType::String).max().alias("max_date")])
            .collect()?;

        let max_str = stats
            .column("max_date")?
            .str()?
            .get(0)
            .ok_or_else(|| FeatureStoreError::InvalidData(format!("{} is empty", table)))?;

        parse_date(max_str)
    }

    fn materialize_features(
        &self,
        features: &[FeatureSpec],
        range: &DateRange,
        residential_only: bool,
    ) -> StoreResult<FeatureRows> {
        let columns = select_columns(features, |table| self.feature_columns(table))?;

        let mut lf = self
            .scan(&self.inspections_path())?
            .select([
                col(ENTITY_COLUMN).cast(DataType::String),
                col(DATE_COLUMN).cast(DataType::String),
                col(LABEL_COLUMN).cast(DataType::Int32),
                col(RESIDENTIAL_COLUMN).cast(DataType::Boolean),
            ])
            .filter(
                col(DATE_COLUMN)
                    .gt_eq(lit(range.start.to_string()))
                    .and(col(DATE_COLUMN).lt(lit(range.end.to_string()))),
            );

        if residential_only {
            lf = lf.filter(col(RESIDENTIAL_COLUMN).eq(lit(true)));
        }

        let mut tables: Vec<&str> = Vec::new();
        for column in &columns {
            if !tables.contains(&column.table.as_str()) {
                tables.push(column.table.as_str());
            }
        }

        for table in tables {
            let mut selection: Vec<Expr> = Self::keys().to_vec();
            selection.extend(
                columns
                    .iter()
                    .filter(|c| c.table == table)
                    .map(|c| col(c.name.as_str()).cast(DataType::Float64)),
            );

            let table_lf = self
                .scan(&self.table_path(table))?
                .select(selection)
                .unique(
                    Some(vec![ENTITY_COLUMN.into(), DATE_COLUMN.into()]),
                    UniqueKeepStrategy::Last,
                );

            lf = lf.join(
                table_lf,
                [col(ENTITY_COLUMN), col(DATE_COLUMN)],
                [col(ENTITY_COLUMN), col(DATE_COLUMN)],
                JoinArgs::new(JoinType::Left),
            );
        }

        let df = lf.collect()?;
        debug!("Materialized {} rows for {}", df.height(), range);

        let ids = df.column(ENTITY_COLUMN)?.str()?;
        let dates = df.column(DATE_COLUMN)?.str()?;
        let labels = df.column(LABEL_COLUMN)?.i32()?;
        let feature_cols = columns
            .iter()
            .map(|c| df.column(&c.name).and_then(|s| s.f64()))
            .collect::<PolarsResult<Vec<_>>>()?;

        let mut rows = Vec::with_capacity(df.height());
        for idx in 0..df.height() {
            let entity_id = ids.get(idx).ok_or_else(|| {
                FeatureStoreError::InvalidData(format!("row {} has no {}", idx, ENTITY_COLUMN))
            })?;
            let inspection_date = dates
                .get(idx)
                .ok_or_else(|| {
                    FeatureStoreError::InvalidData(format!("row {} has no {}", idx, DATE_COLUMN))
                })
                .and_then(parse_date)?;
            let label = labels.get(idx).ok_or_else(|| {
                FeatureStoreError::InvalidData(format!(
                    "{} on {} has no {}",
                    entity_id, inspection_date, LABEL_COLUMN
                ))
            })?;

            rows.push(FeatureRow {
                key: RowKey {
                    entity_id: entity_id.to_string(),
                    inspection_date,
                },
                label: label != 0,
                values: feature_cols
                    .iter()
                    .map(|c| observed(c.get(idx)))
                    .collect(),
            });
        }

        rows.sort_by(|a, b| a.key.cmp(&b.key));

        Ok(FeatureRows { columns, rows })
    }
}

fn parse_date(raw: &str) -> StoreResult<NaiveDate> {
    // Date columns cast to string may carry a time component.
    let day = raw.get(..10).unwrap_or(raw);
    NaiveDate::parse_from_str(day, "%Y-%m-%d")
        .map_err(|e| FeatureStoreError::InvalidData(format!("Invalid date {}: {}", raw, e)))
}
