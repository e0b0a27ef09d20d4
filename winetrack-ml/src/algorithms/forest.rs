//! Random forest: bagged linfa decision trees with a majority vote.

use crate::data::Samples;
use crate::error::MlError;
use linfa::prelude::*;
use linfa_ensemble::EnsembleLearnerParams;
use linfa_trees::{DecisionTree, SplitQuality};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

/// Random forest hyperparameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RandomForestParams {
    pub n_estimators: usize,
    pub max_depth: Option<usize>,
    pub seed: u64,
}

impl Default for RandomForestParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: None,
            seed: 42,
        }
    }
}

impl RandomForestParams {
    pub fn new(n_estimators: usize) -> Self {
        Self {
            n_estimators,
            ..Self::default()
        }
    }

    pub fn max_depth(mut self, depth: Option<usize>) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Fit `n_estimators` Gini trees, each on a bootstrap draw of `train`.
    pub fn fit(
        &self,
        train: &Samples,
        n_classes: usize,
    ) -> Result<RandomForestClassifier, MlError> {
        if self.n_estimators == 0 {
            return Err(MlError::invalid_input("n_estimators must be at least 1"));
        }
        if self.max_depth == Some(0) {
            return Err(MlError::invalid_input("max_depth must be at least 1"));
        }
        if train.records.nrows() == 0 || train.records.ncols() == 0 {
            return Err(MlError::training("cannot fit on an empty feature matrix"));
        }
        if train.records.nrows() != train.targets.len() {
            return Err(MlError::training(format!(
                "feature rows ({}) and labels ({}) differ",
                train.records.nrows(),
                train.targets.len()
            )));
        }
        if let Some(bad) = train.targets.iter().find(|&&label| label >= n_classes) {
            return Err(MlError::training(format!(
                "label {bad} outside {n_classes} classes"
            )));
        }

        let tree_params = DecisionTree::<f64, usize>::params()
            .split_quality(SplitQuality::Gini)
            .max_depth(self.max_depth);
        let ensemble =
            EnsembleLearnerParams::new_fixed_rng(tree_params, StdRng::seed_from_u64(self.seed))
                .ensemble_size(self.n_estimators)
                .bootstrap_proportion(1.0)
                .fit(train)
                .map_err(|e| MlError::training(format!("forest fit failed: {e}")))?;

        let trees = ensemble.models;
        for (i, tree) in trees.iter().enumerate() {
            tracing::trace!(
                tree = i,
                depth = tree.max_depth(),
                leaves = tree.num_leaves(),
                "Grew tree"
            );
        }

        Ok(RandomForestClassifier {
            params: *self,
            n_features: train.records.ncols(),
            n_classes,
            trees,
        })
    }
}

/// A fitted forest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForestClassifier {
    pub params: RandomForestParams,
    pub n_features: usize,
    pub n_classes: usize,
    pub trees: Vec<DecisionTree<f64, usize>>,
}

impl RandomForestClassifier {
    /// Per-class vote counts, one row per sample.
    pub fn votes(&self, x: ArrayView2<'_, f64>) -> Result<Array2<usize>, MlError> {
        if self.trees.is_empty() {
            return Err(MlError::model("forest has no trees"));
        }
        if x.ncols() != self.n_features {
            return Err(MlError::model(format!(
                "expected {} features, got {}",
                self.n_features,
                x.ncols()
            )));
        }

        let mut votes = Array2::<usize>::zeros((x.nrows(), self.n_classes));
        for tree in &self.trees {
            let predicted: Array1<usize> = tree.predict(&x);
            for (i, &class) in predicted.iter().enumerate() {
                if class >= self.n_classes {
                    return Err(MlError::model(format!(
                        "tree voted for class {class} outside {}",
                        self.n_classes
                    )));
                }
                votes[[i, class]] += 1;
            }
        }
        Ok(votes)
    }

    /// Majority class per row; ties go to the lowest class index.
    pub fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Array1<usize>, MlError> {
        let votes = self.votes(x)?;
        Ok(votes.outer_iter().map(majority).collect())
    }
}

fn majority(row: ArrayView1<'_, usize>) -> usize {
    let mut best = 0;
    for (i, &v) in row.iter().enumerate() {
        if v > row[best] {
            best = i;
        }
    }
    best
}
