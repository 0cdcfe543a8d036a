//! Random forest of `linfa-trees` gini trees.
//!
//! Each tree is fit on a bootstrap sample restricted to a random subset of
//! the features. Its RNG is seeded from the forest seed and the tree index,
//! so the fitted forest does not depend on how many threads grew it.
//! Scores are the fraction of trees voting positive.

use std::fmt;

use linfa::prelude::*;
use linfa_trees::{DecisionTree, SplitQuality};
use ndarray::{Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{
    check_rows, check_training_input, estimator_error, records, ModelError, ModelFamily,
    ModelParams, ModelResult, TrainableModel,
};

/// Features each tree is grown on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaxFeatures {
    Sqrt,
    Log2,
    All,
}

impl MaxFeatures {
    pub fn resolve(&self, n_features: usize) -> usize {
        let n = n_features as f64;
        let k = match self {
            MaxFeatures::Sqrt => n.sqrt() as usize,
            MaxFeatures::Log2 => n.log2() as usize,
            MaxFeatures::All => n_features,
        };
        k.clamp(1, n_features.max(1))
    }
}

impl fmt::Display for MaxFeatures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MaxFeatures::Sqrt => f.write_str("sqrt"),
            MaxFeatures::Log2 => f.write_str("log2"),
            MaxFeatures::All => f.write_str("all"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForestParams {
    pub n_estimators: usize,
    /// `None` grows until leaves are pure or too small to split.
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub max_features: MaxFeatures,
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: None,
            min_samples_split: 2,
            max_features: MaxFeatures::Sqrt,
            seed: 0,
        }
    }
}

/// One fitted tree and the columns it was trained on.
#[derive(Debug, Clone, Serialize)]
struct SubspaceTree {
    features: Vec<usize>,
    tree: DecisionTree<f64, bool>,
}

impl SubspaceTree {
    fn votes(&self, x: &Array2<f64>) -> Array1<bool> {
        self.tree.predict(&x.select(Axis(1), &self.features))
    }

    /// Importances spread back over all `n_features` columns.
    fn importances(&self, n_features: usize) -> Vec<f64> {
        let mut out = vec![0.0; n_features];
        for (&feature, value) in self.features.iter().zip(self.tree.feature_importance()) {
            if value.is_finite() {
                out[feature] = value;
            }
        }
        out
    }
}

fn grow_tree(
    x: &Array2<f64>,
    y: &Array1<bool>,
    params: &ForestParams,
    index: usize,
) -> ModelResult<SubspaceTree> {
    let (n_rows, n_features) = x.dim();
    let mut rng = StdRng::seed_from_u64(params.seed.wrapping_add(index as u64));

    let bootstrap: Vec<usize> = (0..n_rows).map(|_| rng.gen_range(0..n_rows)).collect();
    let mut features =
        sample(&mut rng, n_features, params.max_features.resolve(n_features)).into_vec();
    features.sort_unstable();

    let dataset = Dataset::new(
        x.select(Axis(0), &bootstrap).select(Axis(1), &features),
        y.select(Axis(0), &bootstrap),
    );
    let tree = DecisionTree::params()
        .split_quality(SplitQuality::Gini)
        .max_depth(params.max_depth)
        .min_weight_split(params.min_samples_split as f32)
        .fit(&dataset)
        .map_err(|e| estimator_error(ModelFamily::RandomForest, e))?;

    Ok(SubspaceTree { features, tree })
}

#[derive(Debug, Clone, Serialize)]
pub struct RandomForest {
    params: ForestParams,
    #[serde(skip)]
    n_jobs: usize,
    n_features: usize,
    trees: Vec<SubspaceTree>,
    importances: Vec<f64>,
}

impl RandomForest {
    pub fn new(params: ForestParams) -> Self {
        Self {
            params,
            n_jobs: 1,
            n_features: 0,
            trees: Vec::new(),
            importances: Vec::new(),
        }
    }
}

impl TrainableModel for RandomForest {
    fn family(&self) -> ModelFamily {
        ModelFamily::RandomForest
    }

    fn params(&self) -> ModelParams {
        ModelParams::RandomForest(self.params.clone())
    }

    fn fit(&mut self, x: &[Vec<f64>], y: &[bool]) -> ModelResult<()> {
        self.params().validate()?;
        let n_features = check_training_input(x, y)?;
        if n_features == 0 {
            return Err(ModelError::InvalidParameter(
                "at least one feature is required".to_string(),
            ));
        }

        let records = records(x, n_features)?;
        let targets: Array1<bool> = y.iter().copied().collect();

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.n_jobs.max(1))
            .build()?;
        let params = &self.params;
        let trees: Vec<SubspaceTree> = pool.install(|| {
            (0..params.n_estimators)
                .into_par_iter()
                .map(|index| grow_tree(&records, &targets, params, index))
                .collect::<ModelResult<_>>()
        })?;

        let mut importances = vec![0.0; n_features];
        for tree in &trees {
            for (total, v) in importances.iter_mut().zip(tree.importances(n_features)) {
                *total += v;
            }
        }
        let n_trees = trees.len() as f64;
        importances.iter_mut().for_each(|v| *v /= n_trees);

        debug!("Grew {} trees on {} threads", trees.len(), self.n_jobs.max(1));
        self.trees = trees;
        self.importances = importances;
        self.n_features = n_features;
        Ok(())
    }

    fn predict_proba(&self, x: &[Vec<f64>]) -> ModelResult<Vec<f64>> {
        if self.trees.is_empty() {
            return Err(ModelError::NotFitted);
        }
        check_rows(x, self.n_features, "prediction features")?;
        if x.is_empty() {
            return Ok(Vec::new());
        }

        let records = records(x, self.n_features)?;
        let mut positive = vec![0usize; x.len()];
        for tree in &self.trees {
            for (count, vote) in positive.iter_mut().zip(tree.votes(&records)) {
                *count += usize::from(vote);
            }
        }

        let n_trees = self.trees.len() as f64;
        Ok(positive.into_iter().map(|c| c as f64 / n_trees).collect())
    }

    fn set_parallelism(&mut self, n_jobs: usize) {
        self.n_jobs = n_jobs.max(1);
    }

    fn feature_importances(&self) -> Option<Vec<f64>> {
        (!self.trees.is_empty()).then(|| self.importances.clone())
    }

    fn snapshot(&self) -> ModelResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}
