//! Tracked training run: split, fit, evaluate, render, and record everything
//! under one run.

use crate::algorithms::RandomForestClassifier;
use crate::config::WinetrackConfig;
use crate::data::{Dataset, TrainTestSplit, train_test_split};
use crate::error::MlError;
use crate::report::render_confusion_matrix;
use crate::tracking::{ActiveRun, ModelInfo, RunOptions, RunStatus, TrackingStore};
use crate::training::experiment::TrainingExperiment;
use crate::training::metrics::{ClassificationMetrics, ConfusionMatrix, confusion_matrix};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A source file uploaded alongside the results.
#[derive(Debug, Clone)]
pub struct SourceArtifact {
    pub name: String,
    pub contents: Vec<u8>,
}

/// Result of a completed tracked run.
#[derive(Debug, Clone)]
pub struct EvaluationOutcome {
    pub experiment_id: String,
    pub run_id: String,
    pub accuracy: f64,
    pub metrics: ClassificationMetrics,
    pub confusion: ConfusionMatrix,
    pub image_path: PathBuf,
    pub train_size: usize,
    pub test_size: usize,
    pub model: ModelInfo,
}

/// Runs one tracked training against a store.
pub struct TrainingRunner {
    store: Arc<dyn TrackingStore>,
    config: WinetrackConfig,
    source: Option<SourceArtifact>,
}

/// What the steps inside the run scope produce.
struct RunResults {
    accuracy: f64,
    metrics: ClassificationMetrics,
    confusion: ConfusionMatrix,
    model: ModelInfo,
}

impl TrainingRunner {
    pub fn new(store: Arc<dyn TrackingStore>, config: WinetrackConfig) -> Self {
        Self {
            store,
            config,
            source: None,
        }
    }

    /// Upload `contents` as `name` with every run.
    pub fn with_source(mut self, name: impl Into<String>, contents: impl Into<Vec<u8>>) -> Self {
        self.source = Some(SourceArtifact {
            name: name.into(),
            contents: contents.into(),
        });
        self
    }

    /// Train and evaluate on `dataset`, recording the run.
    ///
    /// Any failure after the run starts marks it `FAILED` (best effort) and
    /// the original error is returned.
    pub async fn run(&self, dataset: &Dataset) -> Result<EvaluationOutcome, MlError> {
        let experiment = TrainingExperiment::from_config(&self.config, dataset);
        let experiment_id = self
            .store
            .get_or_create_experiment(&experiment.name)
            .await?;
        debug!(experiment = %experiment.name, experiment_id = %experiment_id, "Using experiment");

        let split = train_test_split(dataset, experiment.test_size, experiment.seed)?;
        info!(
            train = split.train_len(),
            test = split.test_len(),
            seed = experiment.seed,
            "Split dataset"
        );

        let source_name = self
            .source
            .as_ref()
            .map_or_else(|| "winetrack".to_string(), |s| s.name.clone());
        let run = ActiveRun::start(
            self.store.clone(),
            &experiment_id,
            RunOptions {
                run_name: None,
                source_name,
                extra_tags: experiment.environment.to_tags(),
            },
        )
        .await?;

        match self.tracked_steps(&run, &experiment, dataset, &split).await {
            Ok(results) => {
                let ended = run.end(RunStatus::Finished).await?;
                Ok(EvaluationOutcome {
                    experiment_id,
                    run_id: ended.run_id,
                    accuracy: results.accuracy,
                    metrics: results.metrics,
                    confusion: results.confusion,
                    image_path: self.config.output.confusion_matrix_path.clone(),
                    train_size: split.train_len(),
                    test_size: split.test_len(),
                    model: results.model,
                })
            }
            Err(e) => {
                let run_id = run.run_id().to_string();
                warn!(run_id = %run_id, error = %e, "Run failed");
                if let Err(end_err) = run.end(RunStatus::Failed).await {
                    warn!(run_id = %run_id, error = %end_err, "Could not mark run as failed");
                }
                Err(e)
            }
        }
    }

    async fn tracked_steps(
        &self,
        run: &ActiveRun,
        experiment: &TrainingExperiment,
        dataset: &Dataset,
        split: &TrainTestSplit,
    ) -> Result<RunResults, MlError> {
        let forest: RandomForestClassifier = experiment
            .forest_params()
            .fit(&split.train, dataset.n_classes())?;
        let predictions = forest.predict(split.test.records.view())?;
        let confusion = confusion_matrix(
            split.test.targets.view(),
            predictions.view(),
            dataset.n_classes(),
        )?;
        let accuracy = confusion.accuracy();
        info!(accuracy, trees = forest.trees.len(), "Evaluated forest");

        run.log_metric("accuracy", accuracy).await?;
        for (key, value) in experiment.logged_params() {
            run.log_param(key, value).await?;
        }

        let metrics =
            ClassificationMetrics::evaluate(&predictions, &split.test)?.with_counts(&confusion);
        debug!(
            precision = metrics.precision,
            recall = metrics.recall,
            f1 = metrics.f1_score,
            "Test metrics"
        );
        let image_path = &self.config.output.confusion_matrix_path;
        render_confusion_matrix(&confusion, &dataset.target_names, image_path)?;

        run.log_artifact_file(image_path, None).await?;
        if let Some(source) = &self.source {
            run.log_artifact_bytes(&source.name, &source.contents).await?;
        }

        run.set_tags(&self.config.tags).await?;

        let model = run
            .log_model(
                &forest,
                &experiment.model_type,
                &self.config.output.model_artifact_path,
            )
            .await?;

        Ok(RunResults {
            accuracy,
            metrics,
            confusion,
            model,
        })
    }
}
