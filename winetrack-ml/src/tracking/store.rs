//! Tracking store trait and the records it exchanges.

use crate::error::MlError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Run lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Running,
    Scheduled,
    Finished,
    Failed,
    Killed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "RUNNING",
            Self::Scheduled => "SCHEDULED",
            Self::Finished => "FINISHED",
            Self::Failed => "FAILED",
            Self::Killed => "KILLED",
        }
    }

    /// Numeric code used in file-store metadata.
    pub fn code(&self) -> u8 {
        match self {
            Self::Running => 1,
            Self::Scheduled => 2,
            Self::Finished => 3,
            Self::Failed => 4,
            Self::Killed => 5,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::Running),
            2 => Some(Self::Scheduled),
            3 => Some(Self::Finished),
            4 => Some(Self::Failed),
            5 => Some(Self::Killed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished | Self::Failed | Self::Killed)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An experiment as reported by a store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Experiment {
    pub experiment_id: String,
    pub name: String,
    #[serde(default)]
    pub artifact_location: Option<String>,
    #[serde(default = "default_lifecycle")]
    pub lifecycle_stage: String,
}

fn default_lifecycle() -> String {
    "active".to_string()
}

impl Experiment {
    pub fn is_deleted(&self) -> bool {
        self.lifecycle_stage == "deleted"
    }
}

/// Identity and location of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunInfo {
    pub run_id: String,
    pub experiment_id: String,
    #[serde(default)]
    pub run_name: Option<String>,
    pub status: RunStatus,
    pub start_time: i64,
    #[serde(default)]
    pub end_time: Option<i64>,
    pub artifact_uri: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub key: String,
    pub value: f64,
    pub timestamp: i64,
    pub step: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Param {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunTag {
    pub key: String,
    pub value: String,
}

impl RunTag {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Backend that persists experiments, runs, and their artifacts.
#[async_trait]
pub trait TrackingStore: Send + Sync {
    /// Human-readable location, e.g. the tracking URI.
    fn location(&self) -> String;

    async fn get_experiment_by_name(&self, name: &str) -> Result<Option<Experiment>, MlError>;

    /// Create an experiment and return its id.
    async fn create_experiment(&self, name: &str) -> Result<String, MlError>;

    async fn create_run(
        &self,
        experiment_id: &str,
        run_name: Option<&str>,
        start_time: i64,
        tags: &[RunTag],
    ) -> Result<RunInfo, MlError>;

    async fn log_metric(&self, run_id: &str, metric: &Metric) -> Result<(), MlError>;

    async fn log_param(&self, run_id: &str, param: &Param) -> Result<(), MlError>;

    async fn set_tag(&self, run_id: &str, tag: &RunTag) -> Result<(), MlError>;

    /// Store `contents` at `artifact_path`, relative to the run's artifact root.
    async fn log_artifact(
        &self,
        run: &RunInfo,
        artifact_path: &str,
        contents: &[u8],
    ) -> Result<(), MlError>;

    async fn update_run(
        &self,
        run_id: &str,
        status: RunStatus,
        end_time: Option<i64>,
    ) -> Result<(), MlError>;

    /// Look an experiment up by name, creating it when missing.
    async fn get_or_create_experiment(&self, name: &str) -> Result<String, MlError> {
        match self.get_experiment_by_name(name).await? {
            Some(exp) if exp.is_deleted() => Err(MlError::tracking(format!(
                "cannot use deleted experiment '{name}'; restore it or pick another name"
            ))),
            Some(exp) => Ok(exp.experiment_id),
            None => {
                let id = self.create_experiment(name).await?;
                tracing::info!(experiment = name, experiment_id = %id, "Created experiment");
                Ok(id)
            }
        }
    }
}

/// Reject artifact paths that would escape the run's artifact root.
pub fn validate_relative_path(path: &str) -> Result<(), MlError> {
    if path.is_empty() {
        return Err(MlError::invalid_input("empty path"));
    }
    if path.starts_with('/') || path.starts_with('\\') {
        return Err(MlError::invalid_input(format!("path '{path}' must be relative")));
    }
    if path
        .split(['/', '\\'])
        .any(|segment| segment == ".." || segment.is_empty())
    {
        return Err(MlError::invalid_input(format!(
            "path '{path}' contains an empty or parent segment"
        )));
    }
    Ok(())
}
