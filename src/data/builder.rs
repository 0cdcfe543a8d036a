//! Dataset assembly.
//!
//! Turns feature store output into aligned [`Dataset`] values for the train
//! and test windows.

use tracing::{debug, info};

use crate::error::{ExperimentError, ExperimentResult};
use crate::validation::TemporalWindow;

use super::dataset::{Dataset, DateRange, FeatureSpec};
use super::store::FeatureStore;

/// Builds labeled datasets from a feature store.
pub struct DatasetBuilder<'a, S: FeatureStore + ?Sized> {
    store: &'a S,
}

impl<'a, S: FeatureStore + ?Sized> DatasetBuilder<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Build the dataset for inspections in `range`.
    pub fn build(
        &self,
        features: &[FeatureSpec],
        range: &DateRange,
        residential_only: bool,
    ) -> ExperimentResult<Dataset> {
        let rows = self
            .store
            .materialize_features(features, range, residential_only)?;
        let dataset = Dataset::from_rows(rows)?;

        debug!(
            "Built dataset for {}: {} rows x {} features ({} positive)",
            range,
            dataset.n_rows(),
            dataset.n_features(),
            dataset.positives()
        );

        Ok(dataset)
    }

    /// Build train and test datasets for a validated window.
    ///
    /// The two ranges must be ordered and disjoint.
    pub fn build_pair(
        &self,
        features: &[FeatureSpec],
        window: &TemporalWindow,
        residential_only: bool,
    ) -> ExperimentResult<(Dataset, Dataset)> {
        ensure_disjoint(&window.train, &window.test)?;

        info!("Building train set for {}", window.train);
        let train = self.build(features, &window.train, residential_only)?;
        info!("Building test set for {}", window.test);
        let test = self.build(features, &window.test, residential_only)?;

        if train.feature_names() != test.feature_names() {
            return Err(ExperimentError::DatasetIntegrity(format!(
                "train has features {:?}, test has {:?}",
                train.feature_names(),
                test.feature_names()
            )));
        }

        Ok((train, test))
    }
}

fn ensure_disjoint(train: &DateRange, test: &DateRange) -> ExperimentResult<()> {
    if train.end > test.start || train.overlaps(test) {
        return Err(ExperimentError::DatasetIntegrity(format!(
            "train window {} must end before test window {} starts",
            train, test
        )));
    }
    Ok(())
}
