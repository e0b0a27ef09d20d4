//! Classifiers trained in-process.

pub mod forest;

pub use forest::{RandomForestClassifier, RandomForestParams};
