//! Datasets and train/test partitioning.

pub mod dataset;
pub mod split;

pub use dataset::{Dataset, Samples};
pub use split::{TrainTestSplit, train_test_split};
