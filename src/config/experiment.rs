//! Experiment configuration document.

use std::fs;
use std::path::Path;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::validation::quality::DEFAULT_MISSING_THRESHOLD;

/// Date format used by configuration files (e.g. `01Jan2015`).
pub const CONFIG_DATE_FORMAT: &str = "%d%b%Y";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Unsupported validation window: {0}")]
    ValidationWindow(String),

    #[error("Unknown model family: {0}")]
    UnknownModel(String),

    #[error("Invalid date '{0}', expected DDMonYYYY (01Jan2015) or YYYY-MM-DD")]
    Date(String),

    #[error("Invalid feature pattern '{0}', expected table.pattern")]
    FeaturePattern(String),

    #[error("Invalid value: {0}")]
    Invalid(String),
}

/// Parse a configuration date, accepting `01Jan2015` or `2015-01-01`.
pub fn parse_config_date(raw: &str) -> Result<NaiveDate, ConfigError> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, CONFIG_DATE_FORMAT)
        .or_else(|_| NaiveDate::parse_from_str(raw, "%Y-%m-%d"))
        .map_err(|_| ConfigError::Date(raw.to_string()))
}

/// Configuration for a single experiment run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentConfig {
    /// First inspection date used for training.
    #[serde(default = "default_start_date", with = "config_date")]
    pub start_date: NaiveDate,

    /// Pretend "today": training ends here, testing starts here.
    #[serde(with = "config_date")]
    pub fake_today: NaiveDate,

    /// Symbolic test window length ("None", "1Month", "6Month", "1Year").
    pub validation_window: String,

    /// Restrict inspections to residential parcels.
    #[serde(default)]
    pub residential_only: bool,

    /// Feature patterns of the form `table.pattern`.
    pub features: Vec<String>,

    /// Model family identifiers, trained in this order.
    pub models: Vec<String>,

    /// Upper bound on configurations per model family.
    pub grid_size: usize,

    /// Experiment name, required when results are logged.
    #[serde(default)]
    pub experiment_name: Option<String>,

    /// Maximum tolerated proportion of missing values per column.
    #[serde(default = "default_missing_threshold")]
    pub missing_threshold: f64,

    /// Seed for sampled hyperparameter grids and model randomness.
    #[serde(default)]
    pub grid_seed: u64,
}

fn default_start_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default()
}

fn default_missing_threshold() -> f64 {
    DEFAULT_MISSING_THRESHOLD
}

impl ExperimentConfig {
    /// Load a configuration file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse a configuration document.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Check values that serde cannot express.
    ///
    /// `logging` is whether results will be written to the registry, in
    /// which case an experiment name is mandatory.
    pub fn validate(&self, logging: bool) -> Result<(), ConfigError> {
        if self.features.is_empty() {
            return Err(ConfigError::Invalid("features must not be empty".to_string()));
        }
        if self.models.is_empty() {
            return Err(ConfigError::Invalid("models must not be empty".to_string()));
        }
        if self.grid_size == 0 {
            return Err(ConfigError::Invalid("grid_size must be at least 1".to_string()));
        }
        if !(0.0..=1.0).contains(&self.missing_threshold) {
            return Err(ConfigError::Invalid(format!(
                "missing_threshold must be within [0, 1], got {}",
                self.missing_threshold
            )));
        }

        if logging {
            let name = self.experiment_name.as_deref().unwrap_or_default();
            if name.is_empty() {
                return Err(ConfigError::Invalid(
                    "experiment_name is required when logging is enabled".to_string(),
                ));
            }
            if !is_valid_experiment_name(name) {
                return Err(ConfigError::Invalid(format!(
                    "experiment_name '{}' may only contain letters, digits, '_', '-' and '.'",
                    name
                )));
            }
        }

        Ok(())
    }

    /// Experiment name, or `"experiment"` when none was configured.
    pub fn name_or_default(&self) -> &str {
        self.experiment_name.as_deref().unwrap_or("experiment")
    }
}

/// Experiment names double as directory names in the file-backed registry.
pub fn is_valid_experiment_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

mod config_date {
    use chrono::NaiveDate;
    use serde::{Deserialize, Deserializer, Serializer};

    use super::{parse_config_date, CONFIG_DATE_FORMAT};

    pub fn serialize<S: Serializer>(date: &NaiveDate, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&date.format(CONFIG_DATE_FORMAT).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveDate, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse_config_date(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"
        start_date = "01Jan2015"
        fake_today = "2016-01-01"
        validation_window = "1Year"
        residential_only = true
        features = ["tax.*", "fire.count_*"]
        models = ["RandomForest", "LogisticRegression"]
        grid_size = 3
        experiment_name = "tax_and_fire"
        missing_threshold = 0.3
        grid_seed = 7
    "#;

    #[test]
    fn test_parse_full_config() {
        let config = ExperimentConfig::from_toml_str(FULL).unwrap();
        assert_eq!(config.start_date, NaiveDate::from_ymd_opt(2015, 1, 1).unwrap());
        assert_eq!(config.fake_today, NaiveDate::from_ymd_opt(2016, 1, 1).unwrap());
        assert_eq!(config.validation_window, "1Year");
        assert!(config.residential_only);
        assert_eq!(config.features.len(), 2);
        assert_eq!(config.grid_size, 3);
        assert_eq!(config.experiment_name.as_deref(), Some("tax_and_fire"));
        assert_eq!(config.missing_threshold, 0.3);
        assert_eq!(config.grid_seed, 7);
        assert!(config.validate(true).is_ok());
    }

    #[test]
    fn test_defaults() {
        let config = ExperimentConfig::from_toml_str(
            r#"
            fake_today = "01Jun2019"
            validation_window = "None"
            features = ["tax.*"]
            models = ["LogisticRegression"]
            grid_size = 1
            "#,
        )
        .unwrap();

        assert_eq!(config.start_date, NaiveDate::from_ymd_opt(1970, 1, 1).unwrap());
        assert!(!config.residential_only);
        assert_eq!(config.missing_threshold, DEFAULT_MISSING_THRESHOLD);
        assert!(config.experiment_name.is_none());
        assert!(config.validate(false).is_ok());
    }

    #[test]
    fn test_missing_fake_today_is_rejected() {
        let result = ExperimentConfig::from_toml_str(
            r#"
            validation_window = "None"
            features = ["tax.*"]
            models = ["LogisticRegression"]
            grid_size = 1
            "#,
        );
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_parse_config_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2015, 5, 5).unwrap();
        assert_eq!(parse_config_date("05May2015").unwrap(), expected);
        assert_eq!(parse_config_date("2015-05-05").unwrap(), expected);
        assert!(matches!(parse_config_date("May 5th"), Err(ConfigError::Date(_))));
    }

    #[test]
    fn test_logging_requires_name() {
        let mut config = ExperimentConfig::from_toml_str(FULL).unwrap();
        config.experiment_name = None;
        assert!(config.validate(false).is_ok());
        assert!(matches!(config.validate(true), Err(ConfigError::Invalid(_))));

        config.experiment_name = Some("../escape".to_string());
        assert!(config.validate(true).is_err());
    }

    #[test]
    fn test_zero_grid_size_is_rejected() {
        let mut config = ExperimentConfig::from_toml_str(FULL).unwrap();
        config.grid_size = 0;
        assert!(config.validate(false).is_err());
    }

    #[test]
    fn test_date_round_trips_through_snapshot() {
        let config = ExperimentConfig::from_toml_str(FULL).unwrap();
        let value = serde_json::to_value(&config).unwrap();
        assert_eq!(value["fake_today"], "01Jan2016");
    }
}
