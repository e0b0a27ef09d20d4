//! Classification metrics.

use crate::data::Samples;
use crate::error::MlError;
use linfa::prelude::*;
use ndarray::{Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};

/// Square count matrix indexed by (actual class, predicted class), one row
/// and column per class even when a class never occurs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    counts: Array2<usize>,
}

impl ConfusionMatrix {
    pub fn n_classes(&self) -> usize {
        self.counts.nrows()
    }

    pub fn get(&self, actual: usize, predicted: usize) -> usize {
        self.counts[[actual, predicted]]
    }

    pub fn total(&self) -> usize {
        self.counts.sum()
    }

    /// Correct predictions: the diagonal sum.
    pub fn trace(&self) -> usize {
        self.counts.diag().sum()
    }

    /// Correct over total, in `f64`.
    pub fn accuracy(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        self.trace() as f64 / total as f64
    }

    /// Largest single cell, used to scale heatmaps.
    pub fn max_count(&self) -> usize {
        self.counts.iter().copied().max().unwrap_or(0)
    }

    pub fn rows(&self) -> Vec<Vec<usize>> {
        self.counts.outer_iter().map(|r| r.to_vec()).collect()
    }
}

/// Build a confusion matrix over `n_classes` classes.
pub fn confusion_matrix(
    actual: ArrayView1<'_, usize>,
    predicted: ArrayView1<'_, usize>,
    n_classes: usize,
) -> Result<ConfusionMatrix, MlError> {
    if actual.len() != predicted.len() {
        return Err(MlError::evaluation(format!(
            "{} labels but {} predictions",
            actual.len(),
            predicted.len()
        )));
    }
    let mut counts = Array2::<usize>::zeros((n_classes, n_classes));
    for (&a, &p) in actual.iter().zip(predicted.iter()) {
        if a >= n_classes || p >= n_classes {
            return Err(MlError::evaluation(format!(
                "label pair ({a}, {p}) outside {n_classes} classes"
            )));
        }
        counts[[a, p]] += 1;
    }
    Ok(ConfusionMatrix { counts })
}

/// Classification metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationMetrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub confusion_matrix: Option<Vec<Vec<usize>>>,
}

impl ClassificationMetrics {
    /// Score `predicted` against the labels of `truth` with linfa's
    /// confusion matrix.
    pub fn evaluate(predicted: &Array1<usize>, truth: &Samples) -> Result<Self, MlError> {
        if predicted.len() != truth.targets.len() {
            return Err(MlError::evaluation(format!(
                "{} labels but {} predictions",
                truth.targets.len(),
                predicted.len()
            )));
        }
        if predicted.is_empty() {
            return Err(MlError::evaluation("metrics of an empty prediction set"));
        }
        let cm = predicted
            .confusion_matrix(truth)
            .map_err(|e| MlError::evaluation(e.to_string()))?;
        Ok(Self {
            accuracy: f64::from(cm.accuracy()),
            precision: f64::from(cm.precision()),
            recall: f64::from(cm.recall()),
            f1_score: f64::from(cm.f1_score()),
            confusion_matrix: None,
        })
    }

    /// Attach the cell counts, as rendered.
    pub fn with_counts(mut self, cm: &ConfusionMatrix) -> Self {
        self.confusion_matrix = Some(cm.rows());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn truth(labels: Array1<usize>) -> Samples {
        let n = labels.len();
        linfa::Dataset::new(Array2::zeros((n, 1)), labels)
    }

    #[test]
    fn test_confusion_matrix_layout() {
        let actual = array![0, 0, 1, 2, 2, 2];
        let predicted = array![0, 1, 1, 2, 0, 2];
        let cm = confusion_matrix(actual.view(), predicted.view(), 3).unwrap();
        assert_eq!(cm.rows(), vec![vec![1, 1, 0], vec![0, 1, 0], vec![1, 0, 2]]);
        assert_eq!(cm.total(), 6);
        assert_eq!(cm.trace(), 4);
        assert_eq!(cm.max_count(), 2);
    }

    #[test]
    fn test_matrix_stays_square_for_missing_class() {
        let actual = array![0, 0, 1];
        let predicted = array![0, 1, 1];
        let cm = confusion_matrix(actual.view(), predicted.view(), 3).unwrap();
        assert_eq!(cm.n_classes(), 3);
        assert_eq!(cm.rows()[2], vec![0, 0, 0]);
    }

    #[test]
    fn test_accuracy_matches_trace_over_total() {
        let actual = array![0, 1, 2, 1, 0];
        let predicted = array![0, 2, 2, 1, 1];
        let cm = confusion_matrix(actual.view(), predicted.view(), 3).unwrap();
        assert!((cm.accuracy() - 0.6).abs() < 1e-12);

        let metrics = ClassificationMetrics::evaluate(&predicted, &truth(actual)).unwrap();
        assert!((metrics.accuracy - cm.accuracy()).abs() < 1e-6);
    }

    #[test]
    fn test_rejects_mismatch_and_out_of_range() {
        let a = array![0, 1];
        let b = array![0];
        assert!(confusion_matrix(a.view(), b.view(), 2).is_err());
        assert!(ClassificationMetrics::evaluate(&b, &truth(a.clone())).is_err());
        let c = array![0, 3];
        assert!(confusion_matrix(a.view(), c.view(), 2).is_err());
        let empty = Array1::<usize>::zeros(0);
        assert!(ClassificationMetrics::evaluate(&empty, &truth(empty.clone())).is_err());
    }

    #[test]
    fn test_perfect_predictions_score_one() {
        let labels = array![0, 1, 2, 2, 1, 0];
        let metrics = ClassificationMetrics::evaluate(&labels, &truth(labels.clone())).unwrap();
        assert!((metrics.accuracy - 1.0).abs() < 1e-6);
        assert!((metrics.precision - 1.0).abs() < 1e-6);
        assert!((metrics.recall - 1.0).abs() < 1e-6);
        assert!((metrics.f1_score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_scores_are_fractions() {
        let actual = array![0, 0, 1, 1, 2, 2];
        let predicted = array![0, 1, 1, 1, 2, 0];
        let cm = confusion_matrix(actual.view(), predicted.view(), 3).unwrap();
        let metrics = ClassificationMetrics::evaluate(&predicted, &truth(actual))
            .unwrap()
            .with_counts(&cm);
        for score in [metrics.precision, metrics.recall, metrics.f1_score] {
            assert!((0.0..=1.0).contains(&score));
        }
        assert_eq!(metrics.confusion_matrix, Some(cm.rows()));
    }
}
