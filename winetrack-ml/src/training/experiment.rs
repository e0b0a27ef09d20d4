//! Training experiment description.

use crate::algorithms::RandomForestParams;
use crate::config::WinetrackConfig;
use crate::data::Dataset;
use crate::training::reproducibility::EnvironmentSnapshot;
use serde::{Deserialize, Serialize};

/// Everything that determines one tracked training: what is trained, on
/// which data, with which settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingExperiment {
    /// Experiment name in the tracking store.
    pub name: String,
    pub dataset: String,
    pub model_type: String,
    pub test_size: f64,
    pub seed: u64,
    pub max_depth: usize,
    pub n_estimators: usize,
    pub environment: EnvironmentSnapshot,
}

impl TrainingExperiment {
    pub fn from_config(config: &WinetrackConfig, dataset: &Dataset) -> Self {
        let training = &config.training;
        Self {
            name: config.tracking.experiment_name.clone(),
            dataset: dataset.name.clone(),
            model_type: "RandomForestClassifier".to_string(),
            test_size: training.test_size,
            seed: training.seed,
            max_depth: training.max_depth,
            n_estimators: training.n_estimators,
            environment: EnvironmentSnapshot::capture(dataset.digest(), training.seed),
        }
    }

    /// Forest settings; the split seed also seeds the forest.
    pub fn forest_params(&self) -> RandomForestParams {
        RandomForestParams::new(self.n_estimators)
            .max_depth(Some(self.max_depth))
            .seed(self.seed)
    }

    /// Hyperparameters logged as run params, in logging order.
    pub fn logged_params(&self) -> [(&'static str, String); 2] {
        [
            ("max_depth", self.max_depth.to_string()),
            ("n_estimators", self.n_estimators.to_string()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_default_config() {
        let dataset = Dataset::wine().unwrap();
        let exp = TrainingExperiment::from_config(&WinetrackConfig::with_defaults(), &dataset);
        assert_eq!(exp.name, "new_exp2");
        assert_eq!(exp.dataset, "wine");
        assert_eq!(exp.environment.dataset_digest, dataset.digest());

        let params = exp.forest_params();
        assert_eq!(params.n_estimators, 11);
        assert_eq!(params.max_depth, Some(6));
        assert_eq!(params.seed, 42);

        let logged = exp.logged_params();
        assert_eq!(logged[0], ("max_depth", "6".to_string()));
        assert_eq!(logged[1], ("n_estimators", "11".to_string()));
    }
}
