//! Training infrastructure: experiment description, the tracked runner, metrics.

pub mod experiment;
pub mod metrics;
pub mod reproducibility;
pub mod runner;

pub use experiment::TrainingExperiment;
pub use metrics::{ClassificationMetrics, ConfusionMatrix, confusion_matrix};
pub use reproducibility::EnvironmentSnapshot;
pub use runner::{EvaluationOutcome, SourceArtifact, TrainingRunner};
