//! End-to-end experiment run.

use chrono::Utc;
use indicatif::ProgressBar;
use tracing::{info, warn};

use crate::config::ExperimentConfig;
use crate::data::{DatasetBuilder, FeatureSpec, FeatureStore};
use crate::error::{ExperimentError, ExperimentResult};
use crate::grid::GridExpander;
use crate::preprocessing::Preprocessor;
use crate::registry::{
    ArtifactSink, ExperimentRecord, ExperimentRegistry, RecordStore, RegistryError, RunArtifacts,
};
use crate::validation::{QualityGate, TemporalBoundaryValidator};

use super::train_eval::TrainEvalLoop;
use super::{ConfigurationOutcome, ConfigurationStatus, RunReport};

/// Switches that come from the command line rather than the config file.
#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    /// Worker hint for families that accept one.
    pub n_jobs: usize,
    /// Persist records and artifacts.
    pub log_results: bool,
    /// Write train/test datasets before preprocessing.
    pub dump_datasets: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            n_jobs: 1,
            log_results: true,
            dump_datasets: false,
        }
    }
}

/// Drives one experiment from configuration to registry.
pub struct ExperimentRunner<'a, F, S, A>
where
    F: FeatureStore + ?Sized,
    S: RecordStore,
    A: ArtifactSink,
{
    config: ExperimentConfig,
    options: RunOptions,
    store: &'a F,
    registry: ExperimentRegistry<S, A>,
    progress: ProgressBar,
}

impl<'a, F, S, A> ExperimentRunner<'a, F, S, A>
where
    F: FeatureStore + ?Sized,
    S: RecordStore,
    A: ArtifactSink,
{
    pub fn new(
        config: ExperimentConfig,
        options: RunOptions,
        store: &'a F,
        registry: ExperimentRegistry<S, A>,
    ) -> Self {
        Self {
            config,
            options,
            store,
            registry,
            progress: ProgressBar::hidden(),
        }
    }

    /// Report per-configuration progress on `bar`.
    pub fn with_progress(mut self, bar: ProgressBar) -> Self {
        self.progress = bar;
        self
    }

    pub fn registry(&self) -> &ExperimentRegistry<S, A> {
        &self.registry
    }

    pub fn run(&mut self) -> ExperimentResult<RunReport> {
        let config = &self.config;
        let options = self.options;

        // 1. Configuration
        config.validate(options.log_results)?;
        let features = FeatureSpec::parse_list(&config.features)?;
        let configurations =
            GridExpander::new(config.grid_seed).expand_all(&config.models, config.grid_size)?;
        let name = config.name_or_default().to_string();

        // 2. Name idempotence
        if options.log_results && self.registry.exists(&name)? {
            return Err(ExperimentError::ExperimentExists(name));
        }

        // 3. Temporal bounds
        let max_date = TemporalBoundaryValidator::max_available_date(self.store)?;
        let window = TemporalBoundaryValidator::validate(
            config.start_date,
            config.fake_today,
            &config.validation_window,
            max_date,
        )?;

        // 4. Datasets
        let (train, test) = DatasetBuilder::new(self.store).build_pair(
            &features,
            &window,
            config.residential_only,
        )?;
        info!(
            "Train: {} rows ({} positive), test: {} rows ({} positive), {} features",
            train.n_rows(),
            train.positives(),
            test.n_rows(),
            test.positives(),
            train.n_features()
        );

        // 5. Quality gate
        let gate = QualityGate::new(config.missing_threshold);
        let train_quality = gate.check(&train)?;
        let test_quality = gate.check(&test)?;

        if options.dump_datasets {
            self.registry.dump_dataset(&name, "train", &train)?;
            self.registry.dump_dataset(&name, "test", &test)?;
            info!("Dumped train and test datasets for {}", name);
        }

        // 6. Preprocessing, fit on train only
        let preprocessor = Preprocessor::fit(&train);
        let train_x = preprocessor.transform(&train);
        let test_x = preprocessor.transform(&test);

        let config_snapshot = serde_json::to_value(config).map_err(RegistryError::from)?;
        let train_eval = TrainEvalLoop {
            train_x: &train_x,
            train_y: train.labels(),
            test_x: &test_x,
            test_y: test.labels(),
            feature_names: train.feature_names(),
            n_jobs: options.n_jobs,
        };

        // 7. Train, evaluate, log
        let total = configurations.len();
        self.progress.set_length(total as u64);
        let mut outcomes = Vec::with_capacity(total);

        for (index, configuration) in configurations.iter().enumerate() {
            let key = configuration.key();
            info!("{} out of {} - Training {}", index + 1, total, key);
            self.progress.set_message(key.clone());

            let outcome = match train_eval.train_and_evaluate(configuration) {
                Ok(trained) => {
                    info!("{}: {}", key, trained.evaluation.summary());

                    let status = if options.log_results {
                        let record = ExperimentRecord {
                            experiment_name: name.clone(),
                            configuration_index: index,
                            config: config_snapshot.clone(),
                            model_family: configuration.family(),
                            parameters: trained.model.params(),
                            evaluation: trained.evaluation.clone(),
                            features: train.feature_names().to_vec(),
                            feature_mapping: train.feature_mapping().clone(),
                            created_at: Utc::now(),
                        };
                        let artifacts = RunArtifacts {
                            index: test.index(),
                            labels: test.labels(),
                            scores: &trained.scores,
                            model: trained.model.as_ref(),
                            preprocessor: &preprocessor,
                        };
                        ConfigurationStatus::Logged(self.registry.create(&record, &artifacts)?)
                    } else {
                        ConfigurationStatus::Skipped
                    };

                    ConfigurationOutcome {
                        index,
                        family: configuration.family(),
                        key,
                        status,
                        evaluation: Some(trained.evaluation),
                    }
                }
                Err(failure) => {
                    let stage = failure.stage;
                    let error = ExperimentError::ModelFit {
                        configuration: key.clone(),
                        source: failure.error,
                    };
                    warn!("{} ({} stage)", error, stage);

                    ConfigurationOutcome {
                        index,
                        family: configuration.family(),
                        key,
                        status: ConfigurationStatus::Failed {
                            stage,
                            reason: error.to_string(),
                        },
                        evaluation: None,
                    }
                }
            };

            outcomes.push(outcome);
            self.progress.inc(1);
        }
        self.progress.finish_with_message("done");

        let report = RunReport {
            experiment_name: name,
            window,
            train_rows: train.n_rows(),
            test_rows: test.n_rows(),
            train_quality,
            test_quality,
            outcomes,
        };
        info!(
            "Finished {}: {} logged, {} failed",
            report.experiment_name,
            report.logged(),
            report.failed()
        );
        Ok(report)
    }
}
