//! Local file store using the MLflow `mlruns` directory layout.
//!
//! ```text
//! <root>/<experiment_id>/meta.yaml
//! <root>/<experiment_id>/<run_id>/meta.yaml
//! <root>/<experiment_id>/<run_id>/metrics/<key>    "<timestamp> <value> <step>" per line
//! <root>/<experiment_id>/<run_id>/params/<key>
//! <root>/<experiment_id>/<run_id>/tags/<key>
//! <root>/<experiment_id>/<run_id>/artifacts/...
//! ```

use crate::error::MlError;
use crate::tracking::store::{
    Experiment, Metric, Param, RunInfo, RunStatus, RunTag, TrackingStore,
    validate_relative_path,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::debug;

pub const DEFAULT_EXPERIMENT_ID: &str = "0";
pub const DEFAULT_EXPERIMENT_NAME: &str = "Default";
const META_FILE: &str = "meta.yaml";
const TRASH_DIR: &str = ".trash";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ExperimentMeta {
    artifact_location: String,
    creation_time: i64,
    experiment_id: String,
    last_update_time: i64,
    lifecycle_stage: String,
    name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RunMeta {
    artifact_uri: String,
    end_time: Option<i64>,
    #[serde(default)]
    entry_point_name: String,
    experiment_id: String,
    lifecycle_stage: String,
    run_id: String,
    run_name: String,
    run_uuid: String,
    #[serde(default)]
    source_name: String,
    #[serde(default = "local_source_type")]
    source_type: u8,
    #[serde(default)]
    source_version: String,
    start_time: i64,
    status: u8,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    user_id: String,
}

/// SourceType.LOCAL
fn local_source_type() -> u8 {
    4
}

impl RunMeta {
    fn info(&self) -> RunInfo {
        RunInfo {
            run_id: self.run_id.clone(),
            experiment_id: self.experiment_id.clone(),
            run_name: Some(self.run_name.clone()).filter(|n| !n.is_empty()),
            status: RunStatus::from_code(self.status).unwrap_or(RunStatus::Running),
            start_time: self.start_time,
            end_time: self.end_time,
            artifact_uri: self.artifact_uri.clone(),
        }
    }
}

/// Everything recorded for one run, read back from disk.
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub info: RunInfo,
    pub params: BTreeMap<String, String>,
    pub tags: BTreeMap<String, String>,
    pub metrics: BTreeMap<String, Vec<Metric>>,
}

impl RunRecord {
    /// Most recent value logged for `key`.
    pub fn latest_metric(&self, key: &str) -> Option<f64> {
        self.metrics
            .get(key)
            .and_then(|history| history.last())
            .map(|m| m.value)
    }
}

/// [`TrackingStore`] writing the `mlruns` layout under a root directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn file_uri(path: &Path) -> String {
        url::Url::from_file_path(path)
            .map(|u| u.to_string())
            .unwrap_or_else(|()| path.display().to_string())
    }

    /// Create the root and the `Default` experiment on first use.
    async fn ensure_default_experiment(&self) -> Result<(), MlError> {
        let meta = self.root.join(DEFAULT_EXPERIMENT_ID).join(META_FILE);
        if tokio::fs::try_exists(&meta).await? {
            return Ok(());
        }
        self.write_experiment(DEFAULT_EXPERIMENT_ID, DEFAULT_EXPERIMENT_NAME)
            .await
    }

    async fn write_experiment(&self, id: &str, name: &str) -> Result<(), MlError> {
        let dir = self.root.join(id);
        tokio::fs::create_dir_all(&dir).await?;
        let now = now_millis();
        let meta = ExperimentMeta {
            artifact_location: Self::file_uri(&dir),
            creation_time: now,
            experiment_id: id.to_string(),
            last_update_time: now,
            lifecycle_stage: "active".to_string(),
            name: name.to_string(),
        };
        write_yaml(&dir.join(META_FILE), &meta).await
    }

    async fn experiments(&self) -> Result<Vec<ExperimentMeta>, MlError> {
        let mut found = Vec::new();
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(found),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_name() == TRASH_DIR || !entry.file_type().await?.is_dir() {
                continue;
            }
            let meta_path = entry.path().join(META_FILE);
            if tokio::fs::try_exists(&meta_path).await? {
                found.push(read_yaml::<ExperimentMeta>(&meta_path).await?);
            }
        }
        Ok(found)
    }

    async fn run_dir(&self, run_id: &str) -> Result<PathBuf, MlError> {
        if run_id.is_empty() || run_id.contains(['/', '\\', '.']) {
            return Err(MlError::invalid_input(format!("invalid run id '{run_id}'")));
        }
        for experiment in self.experiments().await? {
            let dir = self.root.join(&experiment.experiment_id).join(run_id);
            if tokio::fs::try_exists(dir.join(META_FILE)).await? {
                return Ok(dir);
            }
        }
        Err(MlError::not_found(format!("run '{run_id}'")))
    }

    async fn run_meta(&self, run_id: &str) -> Result<(PathBuf, RunMeta), MlError> {
        let dir = self.run_dir(run_id).await?;
        let meta = read_yaml(&dir.join(META_FILE)).await?;
        Ok((dir, meta))
    }

    /// Read back params, tags, metric histories and status of a run.
    pub async fn read_run(&self, run_id: &str) -> Result<RunRecord, MlError> {
        let (dir, meta) = self.run_meta(run_id).await?;
        let params = read_values(&dir.join("params")).await?;
        let tags = read_values(&dir.join("tags")).await?;

        let mut metrics = BTreeMap::new();
        for (key, text) in read_values(&dir.join("metrics")).await? {
            let history = text
                .lines()
                .filter(|l| !l.trim().is_empty())
                .map(|line| parse_metric_line(&key, line))
                .collect::<Result<Vec<_>, _>>()?;
            metrics.insert(key, history);
        }

        Ok(RunRecord {
            info: meta.info(),
            params,
            tags,
            metrics,
        })
    }
}

#[async_trait]
impl TrackingStore for FileStore {
    fn location(&self) -> String {
        Self::file_uri(&self.root)
    }

    async fn get_experiment_by_name(&self, name: &str) -> Result<Option<Experiment>, MlError> {
        self.ensure_default_experiment().await?;
        Ok(self
            .experiments()
            .await?
            .into_iter()
            .find(|e| e.name == name)
            .map(|e| Experiment {
                experiment_id: e.experiment_id,
                name: e.name,
                artifact_location: Some(e.artifact_location),
                lifecycle_stage: e.lifecycle_stage,
            }))
    }

    async fn create_experiment(&self, name: &str) -> Result<String, MlError> {
        if name.trim().is_empty() {
            return Err(MlError::invalid_input("experiment name is empty"));
        }
        self.ensure_default_experiment().await?;
        let existing = self.experiments().await?;
        if existing.iter().any(|e| e.name == name) {
            return Err(MlError::invalid_input(format!(
                "experiment '{name}' already exists"
            )));
        }
        let next = existing
            .iter()
            .filter_map(|e| e.experiment_id.parse::<u64>().ok())
            .max()
            .map_or(0, |max| max + 1);
        let id = next.to_string();
        self.write_experiment(&id, name).await?;
        Ok(id)
    }

    async fn create_run(
        &self,
        experiment_id: &str,
        run_name: Option<&str>,
        start_time: i64,
        tags: &[RunTag],
    ) -> Result<RunInfo, MlError> {
        let experiment_dir = self.root.join(experiment_id);
        if !tokio::fs::try_exists(experiment_dir.join(META_FILE)).await? {
            return Err(MlError::not_found(format!("experiment '{experiment_id}'")));
        }

        let run_id = uuid::Uuid::new_v4().simple().to_string();
        let dir = experiment_dir.join(&run_id);
        for sub in ["metrics", "params", "tags", "artifacts"] {
            tokio::fs::create_dir_all(dir.join(sub)).await?;
        }

        let user_id = tags
            .iter()
            .find(|t| t.key == "mlflow.user")
            .map(|t| t.value.clone())
            .unwrap_or_default();
        let meta = RunMeta {
            artifact_uri: Self::file_uri(&dir.join("artifacts")),
            end_time: None,
            entry_point_name: String::new(),
            experiment_id: experiment_id.to_string(),
            lifecycle_stage: "active".to_string(),
            run_id: run_id.clone(),
            run_name: run_name.unwrap_or_default().to_string(),
            run_uuid: run_id.clone(),
            source_name: String::new(),
            source_type: local_source_type(),
            source_version: String::new(),
            start_time,
            status: RunStatus::Running.code(),
            tags: Vec::new(),
            user_id,
        };
        write_yaml(&dir.join(META_FILE), &meta).await?;

        for tag in tags {
            self.set_tag(&run_id, tag).await?;
        }
        debug!(run_id = %run_id, experiment_id, "Created run");
        Ok(meta.info())
    }

    async fn log_metric(&self, run_id: &str, metric: &Metric) -> Result<(), MlError> {
        validate_relative_path(&metric.key)?;
        let path = self.run_dir(run_id).await?.join("metrics").join(&metric.key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        let line = format!("{} {} {}\n", metric.timestamp, metric.value, metric.step);
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    async fn log_param(&self, run_id: &str, param: &Param) -> Result<(), MlError> {
        validate_relative_path(&param.key)?;
        let path = self.run_dir(run_id).await?.join("params").join(&param.key);
        if let Ok(existing) = tokio::fs::read_to_string(&path).await
            && existing != param.value
        {
            return Err(MlError::invalid_input(format!(
                "param '{}' already logged with value '{existing}', refusing '{}'",
                param.key, param.value
            )));
        }
        write_value(&path, &param.value).await
    }

    async fn set_tag(&self, run_id: &str, tag: &RunTag) -> Result<(), MlError> {
        validate_relative_path(&tag.key)?;
        let path = self.run_dir(run_id).await?.join("tags").join(&tag.key);
        write_value(&path, &tag.value).await
    }

    async fn log_artifact(
        &self,
        run: &RunInfo,
        artifact_path: &str,
        contents: &[u8],
    ) -> Result<(), MlError> {
        validate_relative_path(artifact_path)?;
        let target = self
            .run_dir(&run.run_id)
            .await?
            .join("artifacts")
            .join(artifact_path);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&target, contents).await?;
        Ok(())
    }

    async fn update_run(
        &self,
        run_id: &str,
        status: RunStatus,
        end_time: Option<i64>,
    ) -> Result<(), MlError> {
        let (dir, mut meta) = self.run_meta(run_id).await?;
        meta.status = status.code();
        if end_time.is_some() {
            meta.end_time = end_time;
        }
        write_yaml(&dir.join(META_FILE), &meta).await
    }
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn parse_metric_line(key: &str, line: &str) -> Result<Metric, MlError> {
    let bad = || MlError::tracking(format!("malformed metric line for '{key}': {line}"));
    let mut parts = line.split_whitespace();
    let timestamp = parts.next().and_then(|t| t.parse().ok()).ok_or_else(bad)?;
    let value = parts.next().and_then(|v| v.parse().ok()).ok_or_else(bad)?;
    let step = match parts.next() {
        Some(s) => s.parse().map_err(|_| bad())?,
        None => 0,
    };
    Ok(Metric {
        key: key.to_string(),
        value,
        timestamp,
        step,
    })
}

async fn write_yaml<T: Serialize>(path: &Path, value: &T) -> Result<(), MlError> {
    let text = serde_yaml::to_string(value)?;
    tokio::fs::write(path, text).await?;
    Ok(())
}

async fn read_yaml<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, MlError> {
    let text = tokio::fs::read_to_string(path).await?;
    Ok(serde_yaml::from_str(&text)?)
}

async fn write_value(path: &Path, value: &str) -> Result<(), MlError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, value).await?;
    Ok(())
}

/// Read every file below `dir` as `relative/key -> contents`.
async fn read_values(dir: &Path) -> Result<BTreeMap<String, String>, MlError> {
    let mut values = BTreeMap::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        let mut entries = match tokio::fs::read_dir(&current).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if entry.file_type().await?.is_dir() {
                pending.push(path);
                continue;
            }
            let key = path
                .strip_prefix(dir)
                .map_err(|_| MlError::tracking("entry outside run directory"))?
                .to_string_lossy()
                .replace('\\', "/");
            values.insert(key, tokio::fs::read_to_string(&path).await?);
        }
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    async fn store_with_run() -> (tempfile::TempDir, FileStore, RunInfo) {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("mlruns"));
        let exp = store.get_or_create_experiment("new_exp2").await.unwrap();
        let run = store
            .create_run(&exp, Some("test-run"), 1_000, &[RunTag::new("mlflow.user", "tester")])
            .await
            .unwrap();
        (dir, store, run)
    }

    #[tokio::test]
    async fn test_default_experiment_created() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        let default = store
            .get_experiment_by_name(DEFAULT_EXPERIMENT_NAME)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(default.experiment_id, "0");
        assert!(dir.path().join("0").join("meta.yaml").exists());
    }

    #[tokio::test]
    async fn test_get_or_create_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        let first = store.get_or_create_experiment("new_exp2").await.unwrap();
        let second = store.get_or_create_experiment("new_exp2").await.unwrap();
        assert_eq!(first, "1");
        assert_eq!(first, second);
        assert!(store.create_experiment("new_exp2").await.is_err());
    }

    #[tokio::test]
    async fn test_run_layout_and_read_back() {
        let (_dir, store, run) = store_with_run().await;
        assert_eq!(run.status, RunStatus::Running);
        assert!(run.artifact_uri.starts_with("file://"));

        let metric = |value, timestamp| Metric {
            key: "accuracy".into(),
            value,
            timestamp,
            step: 0,
        };
        store.log_metric(&run.run_id, &metric(0.5, 10)).await.unwrap();
        store.log_metric(&run.run_id, &metric(0.75, 20)).await.unwrap();
        store
            .log_param(&run.run_id, &Param { key: "max_depth".into(), value: "6".into() })
            .await
            .unwrap();
        store
            .set_tag(&run.run_id, &RunTag::new("Project", "Wine Classification"))
            .await
            .unwrap();
        store
            .log_artifact(&run, "Random Forest Model/MLmodel", b"flavors: {}\n")
            .await
            .unwrap();
        store
            .update_run(&run.run_id, RunStatus::Finished, Some(2_000))
            .await
            .unwrap();

        let record = store.read_run(&run.run_id).await.unwrap();
        assert_eq!(record.info.status, RunStatus::Finished);
        assert_eq!(record.info.end_time, Some(2_000));
        assert_eq!(record.info.run_name.as_deref(), Some("test-run"));
        assert_eq!(record.params["max_depth"], "6");
        assert_eq!(record.tags["Project"], "Wine Classification");
        assert_eq!(record.tags["mlflow.user"], "tester");
        assert_eq!(record.metrics["accuracy"].len(), 2);
        assert_eq!(record.latest_metric("accuracy"), Some(0.75));

        let run_dir = store.root().join(&run.experiment_id).join(&run.run_id);
        let metric_text = std::fs::read_to_string(run_dir.join("metrics/accuracy")).unwrap();
        assert_eq!(metric_text, "10 0.5 0\n20 0.75 0\n");
        assert!(run_dir.join("artifacts/Random Forest Model/MLmodel").exists());
    }

    #[tokio::test]
    async fn test_param_cannot_change() {
        let (_dir, store, run) = store_with_run().await;
        let param = |v: &str| Param { key: "n_estimators".into(), value: v.into() };
        store.log_param(&run.run_id, &param("11")).await.unwrap();
        store.log_param(&run.run_id, &param("11")).await.unwrap();
        assert!(store.log_param(&run.run_id, &param("12")).await.is_err());
    }

    #[tokio::test]
    async fn test_unknown_run_and_bad_paths() {
        let (_dir, store, run) = store_with_run().await;
        let err = store
            .update_run("0123456789abcdef", RunStatus::Failed, None)
            .await
            .unwrap_err();
        assert!(err.is_resource_missing());
        assert!(store.log_artifact(&run, "../escape.txt", b"x").await.is_err());
        assert!(store.read_run("../0").await.is_err());
    }

    #[test]
    fn test_parse_metric_line() {
        let m = parse_metric_line("accuracy", "1700000000000 0.9444444444444444 0").unwrap();
        assert_eq!(m.timestamp, 1_700_000_000_000);
        assert_eq!(m.value, 0.9444444444444444);
        assert_eq!(m.step, 0);
        assert!(parse_metric_line("accuracy", "nonsense").is_err());
    }
}
