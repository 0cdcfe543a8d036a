//! Threshold-based evaluation of predicted scores.
//!
//! Calculates:
//! - Precision among the top 1/5/10/20% of rows ranked by score
//! - Confusion matrix at a 0.5 probability cutoff
//! - Ranked feature importances

use serde::{Deserialize, Serialize};

/// Population shares at which precision is reported.
pub const PRECISION_CUTOFFS: [f64; 4] = [0.01, 0.05, 0.10, 0.20];

/// Score at or above which a row is predicted positive.
pub const PROBABILITY_CUTOFF: f64 = 0.5;

/// Precision among the top-scored share of the population.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrecisionAtCutoff {
    /// Population share, e.g. `0.05` for the top 5%.
    pub percent: f64,
    /// Rows counted.
    pub k: usize,
    /// `None` for an empty test set.
    pub precision: Option<f64>,
    /// Score of the k-th ranked row.
    pub score_cutoff: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub tp: usize,
    pub fp: usize,
    pub tn: usize,
    pub fn_: usize,
}

impl ConfusionMatrix {
    pub fn total(&self) -> usize {
        self.tp + self.fp + self.tn + self.fn_
    }

    pub fn accuracy(&self) -> f64 {
        ratio(self.tp + self.tn, self.total())
    }

    pub fn precision(&self) -> f64 {
        ratio(self.tp, self.tp + self.fp)
    }

    pub fn recall(&self) -> f64 {
        ratio(self.tp, self.tp + self.fn_)
    }

    pub fn f1(&self) -> f64 {
        let (p, r) = (self.precision(), self.recall());
        if p + r == 0.0 {
            0.0
        } else {
            2.0 * p * r / (p + r)
        }
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureWeight {
    pub feature: String,
    pub weight: f64,
}

/// Evaluation of one configuration on the test set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub n_rows: usize,
    pub n_positives: usize,
    pub precision_at: Vec<PrecisionAtCutoff>,
    pub confusion: ConfusionMatrix,
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    /// Ranked by absolute weight; `None` when the model exposes none.
    pub feature_importances: Option<Vec<FeatureWeight>>,
}

impl EvaluationResult {
    /// Precision at a population share, if it was computed.
    pub fn precision_at(&self, percent: f64) -> Option<f64> {
        self.precision_at
            .iter()
            .find(|p| (p.percent - percent).abs() < 1e-9)
            .and_then(|p| p.precision)
    }

    pub fn summary(&self) -> String {
        let precision: Vec<String> = self
            .precision_at
            .iter()
            .map(|p| match p.precision {
                Some(v) => format!("P@{:.0}%={:.3}", p.percent * 100.0, v),
                None => format!("P@{:.0}%=n/a", p.percent * 100.0),
            })
            .collect();
        format!(
            "{} rows ({} positive) | {} | acc {:.3} prec {:.3} rec {:.3} f1 {:.3}",
            self.n_rows,
            self.n_positives,
            precision.join(" "),
            self.accuracy,
            self.precision,
            self.recall,
            self.f1
        )
    }
}

/// Evaluation calculator.
pub struct Evaluator;

impl Evaluator {
    /// Evaluate scores against labels. `importances` are raw per-feature
    /// weights aligned with `feature_names`.
    pub fn evaluate(
        labels: &[bool],
        scores: &[f64],
        feature_names: &[String],
        importances: Option<&[f64]>,
    ) -> EvaluationResult {
        let confusion = Self::confusion_matrix(labels, scores, PROBABILITY_CUTOFF);
        EvaluationResult {
            n_rows: labels.len(),
            n_positives: labels.iter().filter(|&&l| l).count(),
            precision_at: PRECISION_CUTOFFS
                .iter()
                .map(|&p| Self::precision_at(labels, scores, p))
                .collect(),
            confusion,
            accuracy: confusion.accuracy(),
            precision: confusion.precision(),
            recall: confusion.recall(),
            f1: confusion.f1(),
            feature_importances: importances.map(|w| Self::rank_importances(feature_names, w)),
        }
    }

    /// Precision among the top `percent` of rows by score.
    ///
    /// Ties keep row order. `k = floor(percent * n)` clamped to `[1, n]`.
    pub fn precision_at(labels: &[bool], scores: &[f64], percent: f64) -> PrecisionAtCutoff {
        let n = labels.len().min(scores.len());
        if n == 0 {
            return PrecisionAtCutoff {
                percent,
                k: 0,
                precision: None,
                score_cutoff: None,
            };
        }

        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));

        // nudge so that e.g. 0.07 * 100 is not floored to 6
        let k = ((percent * n as f64 + 1e-9).floor() as usize).clamp(1, n);
        let hits = order[..k].iter().filter(|&&i| labels[i]).count();

        PrecisionAtCutoff {
            percent,
            k,
            precision: Some(hits as f64 / k as f64),
            score_cutoff: Some(scores[order[k - 1]]),
        }
    }

    pub fn confusion_matrix(labels: &[bool], scores: &[f64], cutoff: f64) -> ConfusionMatrix {
        let mut matrix = ConfusionMatrix::default();
        for (&label, &score) in labels.iter().zip(scores) {
            match (label, score >= cutoff) {
                (true, true) => matrix.tp += 1,
                (false, true) => matrix.fp += 1,
                (false, false) => matrix.tn += 1,
                (true, false) => matrix.fn_ += 1,
            }
        }
        matrix
    }

    /// Pair weights with names, largest magnitude first.
    pub fn rank_importances(feature_names: &[String], weights: &[f64]) -> Vec<FeatureWeight> {
        let mut ranked: Vec<FeatureWeight> = feature_names
            .iter()
            .zip(weights)
            .map(|(feature, &weight)| FeatureWeight {
                feature: feature.clone(),
                weight,
            })
            .collect();
        ranked.sort_by(|a, b| b.weight.abs().total_cmp(&a.weight.abs()));
        ranked
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    /// 100 rows, the 10 positives ranked first.
    fn ranked() -> (Vec<bool>, Vec<f64>) {
        let labels = (0..100).map(|i| i < 10).collect();
        let scores = (0..100).map(|i| 1.0 - i as f64 / 100.0).collect();
        (labels, scores)
    }

    #[test]
    fn test_precision_at_cutoffs() {
        let (labels, scores) = ranked();
        let p10 = Evaluator::precision_at(&labels, &scores, 0.10);
        assert_eq!(p10.k, 10);
        assert_relative_eq!(p10.precision.unwrap(), 1.0);
        assert_relative_eq!(p10.score_cutoff.unwrap(), 0.91, epsilon = 1e-12);

        let p20 = Evaluator::precision_at(&labels, &scores, 0.20);
        assert_relative_eq!(p20.precision.unwrap(), 0.5);
    }

    #[test]
    fn test_precision_non_increasing_on_ranked_data() {
        let (labels, scores) = ranked();
        let result = Evaluator::evaluate(&labels, &scores, &[], None);
        let values: Vec<f64> = result
            .precision_at
            .iter()
            .map(|p| p.precision.unwrap())
            .collect();
        assert!(values.windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn test_small_population_takes_at_least_one_row() {
        let p = Evaluator::precision_at(&[false, true, false], &[0.2, 0.9, 0.1], 0.01);
        assert_eq!(p.k, 1);
        assert_eq!(p.precision, Some(1.0));
    }

    #[test]
    fn test_ties_keep_row_order() {
        let p = Evaluator::precision_at(&[false, true], &[0.5, 0.5], 0.5);
        assert_eq!(p.k, 1);
        assert_eq!(p.precision, Some(0.0));
    }

    #[test]
    fn test_empty_test_set() {
        let result = Evaluator::evaluate(&[], &[], &[], None);
        assert!(result.precision_at.iter().all(|p| p.precision.is_none()));
        assert_eq!(result.confusion, ConfusionMatrix::default());
        assert_eq!(result.precision_at(0.05), None);
    }

    #[test]
    fn test_confusion_matrix_and_stats() {
        let labels = [true, true, false, false, true];
        let scores = [0.9, 0.4, 0.6, 0.1, 0.5];
        let m = Evaluator::confusion_matrix(&labels, &scores, PROBABILITY_CUTOFF);
        assert_eq!(
            m,
            ConfusionMatrix {
                tp: 2,
                fp: 1,
                tn: 1,
                fn_: 1
            }
        );
        assert_relative_eq!(m.accuracy(), 0.6);
        assert_relative_eq!(m.precision(), 2.0 / 3.0);
        assert_relative_eq!(m.recall(), 2.0 / 3.0);
        assert_relative_eq!(m.f1(), 2.0 / 3.0);
    }

    #[test]
    fn test_rank_importances_by_magnitude() {
        let names = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let ranked = Evaluator::rank_importances(&names, &[0.1, -0.7, 0.3]);
        let order: Vec<&str> = ranked.iter().map(|w| w.feature.as_str()).collect();
        assert_eq!(order, vec!["b", "c", "a"]);
        assert_eq!(ranked[0].weight, -0.7);
    }
}
