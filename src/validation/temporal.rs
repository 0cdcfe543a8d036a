//! Temporal boundary validation.
//!
//! Training uses inspections in `[start_date, fake_today)`, testing those in
//! `[fake_today, fake_today + window)`. Both must lie within the labeled
//! data, whose extent is read once from the ground-truth table.

use std::fmt;
use std::str::FromStr;

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::ConfigError;
use crate::data::{DateRange, FeatureStore, GROUND_TRUTH_COLUMN, GROUND_TRUTH_TABLE};
use crate::error::{ExperimentError, ExperimentResult};

/// Symbolic length of the test window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValidationWindow {
    None,
    OneMonth,
    SixMonths,
    OneYear,
}

impl ValidationWindow {
    pub fn days(&self) -> i64 {
        match self {
            ValidationWindow::None => 0,
            ValidationWindow::OneMonth => 30,
            ValidationWindow::SixMonths => 180,
            ValidationWindow::OneYear => 365,
        }
    }

    pub fn duration(&self) -> Duration {
        Duration::days(self.days())
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationWindow::None => "None",
            ValidationWindow::OneMonth => "1Month",
            ValidationWindow::SixMonths => "6Month",
            ValidationWindow::OneYear => "1Year",
        }
    }
}

impl FromStr for ValidationWindow {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(ValidationWindow::None),
            "1month" => Ok(ValidationWindow::OneMonth),
            "6month" => Ok(ValidationWindow::SixMonths),
            "1year" => Ok(ValidationWindow::OneYear),
            _ => Err(ConfigError::ValidationWindow(s.to_string())),
        }
    }
}

impl fmt::Display for ValidationWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validated train and test ranges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemporalWindow {
    pub train: DateRange,
    pub test: DateRange,
    pub validation_window: ValidationWindow,
}

/// Checks requested windows against the extent of the labeled data.
pub struct TemporalBoundaryValidator;

impl TemporalBoundaryValidator {
    /// Latest labeled inspection date in the feature store.
    pub fn max_available_date<S: FeatureStore + ?Sized>(store: &S) -> ExperimentResult<NaiveDate> {
        let max = store.max_available_date(GROUND_TRUTH_TABLE, GROUND_TRUTH_COLUMN)?;
        info!(
            "Labeled data in {}.{} reaches {}",
            GROUND_TRUTH_TABLE, GROUND_TRUTH_COLUMN, max
        );
        Ok(max)
    }

    /// Resolve and check the train/test windows.
    pub fn validate(
        start_date: NaiveDate,
        fake_today: NaiveDate,
        validation_window: &str,
        max_available_date: NaiveDate,
    ) -> ExperimentResult<TemporalWindow> {
        let window: ValidationWindow = validation_window.parse()?;

        if start_date > max_available_date {
            return Err(ExperimentError::TemporalBounds(format!(
                "start date {} is after the last labeled inspection {} in {}",
                start_date, max_available_date, GROUND_TRUTH_TABLE
            )));
        }

        let test_end = fake_today + window.duration();
        if test_end > max_available_date {
            return Err(ExperimentError::TemporalBounds(format!(
                "test window {} + {} ends {}, after the last labeled inspection {} in {}",
                fake_today, window, test_end, max_available_date, GROUND_TRUTH_TABLE
            )));
        }

        let train = DateRange::new(start_date, fake_today).ok_or_else(|| {
            ConfigError::Invalid(format!(
                "start_date {} is after fake_today {}",
                start_date, fake_today
            ))
        })?;
        let test = DateRange {
            start: fake_today,
            end: test_end,
        };

        Ok(TemporalWindow {
            train,
            test,
            validation_window: window,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_window_parsing() {
        assert_eq!("None".parse::<ValidationWindow>().unwrap().days(), 0);
        assert_eq!("1month".parse::<ValidationWindow>().unwrap().days(), 30);
        assert_eq!("6MONTH".parse::<ValidationWindow>().unwrap().days(), 180);
        assert_eq!("1Year".parse::<ValidationWindow>().unwrap().days(), 365);
        assert!(matches!(
            "2Weeks".parse::<ValidationWindow>(),
            Err(ConfigError::ValidationWindow(_))
        ));
    }

    #[test]
    fn test_zero_length_test_window() {
        let window = TemporalBoundaryValidator::validate(
            date(2019, 1, 1),
            date(2019, 6, 1),
            "none",
            date(2019, 12, 1),
        )
        .unwrap();

        assert_eq!(window.train.start, date(2019, 1, 1));
        assert_eq!(window.train.end, date(2019, 6, 1));
        assert_eq!(window.test.start, date(2019, 6, 1));
        assert_eq!(window.test.end, date(2019, 6, 1));
        assert!(window.test.is_empty());
    }

    #[test]
    fn test_start_after_max_names_max_date() {
        let err = TemporalBoundaryValidator::validate(
            date(2020, 1, 1),
            date(2020, 2, 1),
            "None",
            date(2019, 12, 1),
        )
        .unwrap_err();

        assert!(matches!(err, ExperimentError::TemporalBounds(_)));
        let message = err.to_string();
        assert!(message.contains("2019-12-01"));
        assert!(message.contains(GROUND_TRUTH_TABLE));
    }

    #[test]
    fn test_window_past_max() {
        let result = TemporalBoundaryValidator::validate(
            date(2019, 1, 1),
            date(2019, 6, 1),
            "1Year",
            date(2019, 12, 1),
        );
        assert!(matches!(result, Err(ExperimentError::TemporalBounds(_))));

        let ok = TemporalBoundaryValidator::validate(
            date(2019, 1, 1),
            date(2019, 6, 1),
            "6Month",
            date(2019, 12, 1),
        )
        .unwrap();
        assert_eq!(ok.test.end, date(2019, 11, 28));
    }

    #[test]
    fn test_window_ending_on_max_is_accepted() {
        let window = TemporalBoundaryValidator::validate(
            date(2019, 1, 1),
            date(2019, 11, 1),
            "1Month",
            date(2019, 12, 1),
        )
        .unwrap();
        assert_eq!(window.test.end, date(2019, 12, 1));
    }

    #[test]
    fn test_start_after_fake_today_is_config_error() {
        let result = TemporalBoundaryValidator::validate(
            date(2019, 6, 1),
            date(2019, 1, 1),
            "None",
            date(2019, 12, 1),
        );
        assert!(matches!(result, Err(ExperimentError::Config(_))));
    }

    #[test]
    fn test_unknown_window_is_config_error() {
        let result = TemporalBoundaryValidator::validate(
            date(2019, 1, 1),
            date(2019, 6, 1),
            "fortnight",
            date(2019, 12, 1),
        );
        assert!(matches!(
            result,
            Err(ExperimentError::Config(ConfigError::ValidationWindow(_)))
        ));
    }
}
