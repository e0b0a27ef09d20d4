//! Seeded train/test partitioning.

use crate::data::dataset::{Dataset, Samples};
use crate::error::MlError;
use rand::SeedableRng;
use rand::rngs::StdRng;

/// Held-out and training samples produced by a split.
#[derive(Debug, Clone)]
pub struct TrainTestSplit {
    pub train: Samples,
    pub test: Samples,
}

impl TrainTestSplit {
    pub fn train_len(&self) -> usize {
        self.train.targets.len()
    }

    pub fn test_len(&self) -> usize {
        self.test.targets.len()
    }
}

/// Shuffle with `seed`, then hold out the first `ceil(test_size * n)` samples.
pub fn train_test_split(
    dataset: &Dataset,
    test_size: f64,
    seed: u64,
) -> Result<TrainTestSplit, MlError> {
    if !(test_size > 0.0 && test_size < 1.0) {
        return Err(MlError::invalid_input(format!(
            "test_size must be in (0, 1), got {test_size}"
        )));
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let (test, train) = dataset
        .to_samples()
        .shuffle(&mut rng)
        .split_with_ratio(test_size as f32);

    if test.targets.is_empty() || train.targets.is_empty() {
        return Err(MlError::invalid_input(format!(
            "test_size {test_size} on {} samples leaves an empty partition",
            dataset.n_samples()
        )));
    }
    Ok(TrainTestSplit { train, test })
}
