//! The active-run scope.

use crate::error::MlError;
use crate::tracking::model::{HISTORY_TAG, ModelInfo, package_model};
use crate::tracking::store::{Metric, Param, RunInfo, RunStatus, RunTag, TrackingStore};
use rand::Rng;
use rand::seq::SliceRandom;
use serde::Serialize;
use std::fmt::Display;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

pub const TAG_SOURCE_NAME: &str = "mlflow.source.name";
pub const TAG_SOURCE_TYPE: &str = "mlflow.source.type";
pub const TAG_USER: &str = "mlflow.user";
pub const TAG_RUN_NAME: &str = "mlflow.runName";

const ADJECTIVES: &[&str] = &[
    "amber", "bold", "brisk", "calm", "crisp", "dry", "gentle", "mellow", "oaky", "ripe",
    "robust", "smooth", "tart", "velvet", "vivid",
];
const NOUNS: &[&str] = &[
    "barrel", "cellar", "cork", "decanter", "grape", "harvest", "vine", "vineyard", "vintage",
    "press",
];

/// Options for starting a run.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Generated when absent.
    pub run_name: Option<String>,
    pub source_name: String,
    pub extra_tags: Vec<RunTag>,
}

/// `adjective-noun-NNN`, like tracking servers name unnamed runs.
pub fn generate_run_name<R: Rng + ?Sized>(rng: &mut R) -> String {
    let adjective = ADJECTIVES.choose(rng).copied().unwrap_or("fresh");
    let noun = NOUNS.choose(rng).copied().unwrap_or("run");
    format!("{adjective}-{noun}-{}", rng.gen_range(0..1000))
}

fn current_user() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string())
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// A run in progress. Consumed by [`ActiveRun::end`].
pub struct ActiveRun {
    store: Arc<dyn TrackingStore>,
    info: RunInfo,
}

impl ActiveRun {
    /// Create a run in `experiment_id` with the standard source and user tags.
    pub async fn start(
        store: Arc<dyn TrackingStore>,
        experiment_id: &str,
        options: RunOptions,
    ) -> Result<Self, MlError> {
        let run_name = options
            .run_name
            .unwrap_or_else(|| generate_run_name(&mut rand::thread_rng()));
        let mut tags = vec![
            RunTag::new(TAG_SOURCE_NAME, options.source_name),
            RunTag::new(TAG_SOURCE_TYPE, "LOCAL"),
            RunTag::new(TAG_USER, current_user()),
            RunTag::new(TAG_RUN_NAME, run_name.as_str()),
        ];
        tags.extend(options.extra_tags);

        let info = store
            .create_run(experiment_id, Some(&run_name), now_millis(), &tags)
            .await?;
        info!(
            run_id = %info.run_id,
            run_name = %run_name,
            experiment_id,
            store = %store.location(),
            "Started run"
        );
        Ok(Self { store, info })
    }

    pub fn run_id(&self) -> &str {
        &self.info.run_id
    }

    pub fn info(&self) -> &RunInfo {
        &self.info
    }

    pub async fn log_metric(&self, key: &str, value: f64) -> Result<(), MlError> {
        if !value.is_finite() {
            return Err(MlError::invalid_input(format!(
                "metric '{key}' is not finite: {value}"
            )));
        }
        let metric = Metric {
            key: key.to_string(),
            value,
            timestamp: now_millis(),
            step: 0,
        };
        self.store.log_metric(self.run_id(), &metric).await?;
        debug!(key, value, "Logged metric");
        Ok(())
    }

    pub async fn log_param(&self, key: &str, value: impl Display) -> Result<(), MlError> {
        let param = Param {
            key: key.to_string(),
            value: value.to_string(),
        };
        self.store.log_param(self.run_id(), &param).await?;
        debug!(key, value = %param.value, "Logged param");
        Ok(())
    }

    pub async fn set_tag(&self, key: &str, value: &str) -> Result<(), MlError> {
        self.store
            .set_tag(self.run_id(), &RunTag::new(key, value))
            .await
    }

    pub async fn set_tags<'a, I>(&self, tags: I) -> Result<(), MlError>
    where
        I: IntoIterator<Item = (&'a String, &'a String)>,
    {
        for (key, value) in tags {
            self.set_tag(key, value).await?;
        }
        Ok(())
    }

    /// Upload `contents` at `artifact_path` under the run's artifact root.
    pub async fn log_artifact_bytes(
        &self,
        artifact_path: &str,
        contents: &[u8],
    ) -> Result<(), MlError> {
        self.store
            .log_artifact(&self.info, artifact_path, contents)
            .await?;
        debug!(artifact_path, bytes = contents.len(), "Logged artifact");
        Ok(())
    }

    /// Upload a local file, keeping its file name, optionally under `artifact_dir`.
    pub async fn log_artifact_file(
        &self,
        path: &Path,
        artifact_dir: Option<&str>,
    ) -> Result<(), MlError> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                MlError::invalid_input(format!("'{}' has no file name", path.display()))
            })?;
        let contents = tokio::fs::read(path).await?;
        let artifact_path = match artifact_dir.map(|d| d.trim_matches('/')) {
            Some(dir) if !dir.is_empty() => format!("{dir}/{file_name}"),
            _ => file_name.to_string(),
        };
        self.log_artifact_bytes(&artifact_path, &contents).await
    }

    /// Log a serializable model under `artifact_path` and record it in the history tag.
    pub async fn log_model<M: Serialize + Sync>(
        &self,
        model: &M,
        model_type: &str,
        artifact_path: &str,
    ) -> Result<ModelInfo, MlError> {
        let package = package_model(model, model_type, self.run_id(), artifact_path)?;
        for (path, contents) in &package.files {
            self.log_artifact_bytes(path, contents).await?;
        }
        self.set_tag(HISTORY_TAG, &package.info.history_tag_value()?)
            .await?;
        info!(
            artifact_path = %package.info.artifact_path,
            model_uuid = %package.info.model_uuid,
            "Logged model"
        );
        Ok(package.info)
    }

    /// Close the run with a terminal status.
    pub async fn end(self, status: RunStatus) -> Result<RunInfo, MlError> {
        let end_time = now_millis();
        self.store
            .update_run(self.run_id(), status, Some(end_time))
            .await?;
        info!(run_id = %self.info.run_id, %status, "Ended run");
        Ok(RunInfo {
            status,
            end_time: Some(end_time),
            ..self.info
        })
    }
}
