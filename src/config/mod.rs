//! Experiment configuration.
//!
//! A run is described by a TOML document:
//!
//! ```toml
//! start_date = "01Jan2015"
//! fake_today = "01Jan2016"
//! validation_window = "1Year"
//! residential_only = false
//! features = ["tax.*", "fire.count_*"]
//! models = ["RandomForest", "LogisticRegression"]
//! grid_size = 4
//! experiment_name = "tax_and_fire"
//! ```

pub mod experiment;

pub use experiment::{parse_config_date, ConfigError, ExperimentConfig, CONFIG_DATE_FORMAT};
