//! Bounded, deterministic grid expansion.

use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::SeedableRng;
use tracing::info;

use crate::config::ConfigError;
use crate::models::{ModelConfiguration, ModelFamily, ModelParams};

use super::{ForestGrid, LogisticGrid, SvmGrid};

/// Turns family names into model configurations.
///
/// The forest grid is sampled without replacement with a seeded RNG and
/// emitted in enumeration order. The linear grids are truncated.
#[derive(Debug, Clone)]
pub struct GridExpander {
    seed: u64,
    pub forest: ForestGrid,
    pub logistic: LogisticGrid,
    pub svm: SvmGrid,
}

impl GridExpander {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            forest: ForestGrid::default(),
            logistic: LogisticGrid::default(),
            svm: SvmGrid::default(),
        }
    }

    /// At most `grid_size` configurations for one family.
    pub fn expand(
        &self,
        family: &str,
        grid_size: usize,
    ) -> Result<Vec<ModelConfiguration>, ConfigError> {
        if grid_size == 0 {
            return Err(ConfigError::Invalid("grid_size must be at least 1".to_string()));
        }
        let family: ModelFamily = family.parse()?;

        let params: Vec<ModelParams> = match family {
            ModelFamily::RandomForest => {
                let all = self.forest.combinations(self.seed);
                sample_in_order(all, grid_size, self.seed)
                    .into_iter()
                    .map(ModelParams::RandomForest)
                    .collect()
            }
            ModelFamily::LogisticRegression => self
                .logistic
                .combinations()
                .into_iter()
                .take(grid_size)
                .map(ModelParams::LogisticRegression)
                .collect(),
            ModelFamily::LinearSvm => self
                .svm
                .combinations()
                .into_iter()
                .take(grid_size)
                .map(ModelParams::LinearSvm)
                .collect(),
        };

        info!(
            "{}: {} configuration(s) (grid size {})",
            family,
            params.len(),
            grid_size
        );
        Ok(params.into_iter().map(ModelConfiguration::new).collect())
    }

    /// Expand every family in order and concatenate.
    pub fn expand_all(
        &self,
        families: &[String],
        grid_size: usize,
    ) -> Result<Vec<ModelConfiguration>, ConfigError> {
        let mut configurations = Vec::new();
        for family in families {
            configurations.extend(self.expand(family, grid_size)?);
        }
        Ok(configurations)
    }
}

/// `size` items drawn without replacement, kept in their original order.
fn sample_in_order<T>(items: Vec<T>, size: usize, seed: u64) -> Vec<T> {
    if size >= items.len() {
        return items;
    }
    let mut rng = StdRng::seed_from_u64(seed);
    let mut picked = sample(&mut rng, items.len(), size).into_vec();
    picked.sort_unstable();

    let mut picked = picked.into_iter().peekable();
    items
        .into_iter()
        .enumerate()
        .filter_map(|(i, item)| {
            if picked.peek() == Some(&i) {
                picked.next();
                Some(item)
            } else {
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ImportanceKind;

    #[test]
    fn test_forest_sampling_is_deterministic() {
        let expander = GridExpander::new(11);
        let a = expander.expand("RandomForest", 5).unwrap();
        let b = expander.expand("RandomForest", 5).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 5);
        assert!(a
            .iter()
            .all(|c| c.importance == ImportanceKind::FeatureImportances));
    }

    #[test]
    fn test_forest_sample_keeps_enumeration_order() {
        let expander = GridExpander::new(5);
        let all = expander.forest.combinations(5);
        let sampled = expander.expand("random_forest", 10).unwrap();

        let positions: Vec<usize> = sampled
            .iter()
            .map(|c| {
                all.iter()
                    .position(|p| ModelParams::RandomForest(p.clone()) == c.params)
                    .unwrap()
            })
            .collect();
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_oversized_grid_is_capped() {
        let expander = GridExpander::new(0);
        assert_eq!(expander.expand("RandomForest", 1000).unwrap().len(), 36);
        assert_eq!(expander.expand("LogisticRegression", 1000).unwrap().len(), 6);
    }

    #[test]
    fn test_linear_grids_truncate() {
        let expander = GridExpander::new(0);
        let configs = expander.expand("LinearSVC", 3).unwrap();
        assert_eq!(configs.len(), 3);
        assert_eq!(configs[0].family(), ModelFamily::LinearSvm);
        assert_eq!(
            configs[0].params,
            ModelParams::LinearSvm(expander.svm.combinations()[0].clone())
        );
    }

    #[test]
    fn test_expand_all_concatenates_in_order() {
        let expander = GridExpander::new(0);
        let families = vec!["LogisticRegression".to_string(), "RandomForest".to_string()];
        let configs = expander.expand_all(&families, 2).unwrap();
        assert_eq!(configs.len(), 4);
        assert_eq!(configs[0].family(), ModelFamily::LogisticRegression);
        assert_eq!(configs[3].family(), ModelFamily::RandomForest);
    }

    #[test]
    fn test_invalid_requests() {
        let expander = GridExpander::new(0);
        assert!(matches!(
            expander.expand("XGBoost", 2),
            Err(ConfigError::UnknownModel(_))
        ));
        assert!(matches!(
            expander.expand("RandomForest", 0),
            Err(ConfigError::Invalid(_))
        ));
    }
}
