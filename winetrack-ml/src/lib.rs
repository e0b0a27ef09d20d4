//! # winetrack-ml — tracked random-forest training on the wine dataset
//!
//! Trains a seeded random forest on the embedded 178-sample wine data,
//! evaluates it on a held-out split, renders the confusion matrix as a PNG,
//! and records parameters, metrics, tags, artifacts, and the model under a
//! single run in an MLflow-compatible tracking store (REST server or local
//! `mlruns` directory).

// Foundation
pub mod config;
pub mod error;

// Data and models
pub mod algorithms;
pub mod data;

// Training and reporting
pub mod report;
pub mod training;

// Experiment tracking
pub mod tracking;

// Re-exports
pub use config::{WinetrackConfig, load_config};
pub use data::Dataset;
pub use error::MlError;
pub use tracking::{TrackingStore, TrackingUri, open_store};
pub use training::{EvaluationOutcome, TrainingRunner};
