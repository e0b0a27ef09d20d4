//! Configuration for winetrack.
//!
//! Uses `figment` for layered configuration: defaults -> user config file ->
//! workspace config file -> explicit config file -> environment -> CLI overrides.
//! The user file lives at `<config dir>/winetrack/config.toml`, the workspace
//! file at `.winetrack/config.toml`.

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WinetrackConfig {
    #[serde(default)]
    pub tracking: TrackingConfig,
    #[serde(default)]
    pub training: TrainingConfig,
    #[serde(default)]
    pub output: OutputConfig,
    /// Tags attached to every run.
    #[serde(default = "default_tags")]
    pub tags: BTreeMap<String, String>,
}

/// Tracking store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingConfig {
    /// Tracking URI. When unset, `MLFLOW_TRACKING_URI` or the local `mlruns`
    /// directory is used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(default = "default_experiment")]
    pub experiment_name: String,
    /// Per-request timeout for the REST store, in seconds.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            uri: None,
            experiment_name: default_experiment(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

fn default_experiment() -> String {
    "new_exp2".to_string()
}

fn default_request_timeout() -> u64 {
    120
}

/// Split and classifier settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    #[serde(default = "default_test_size")]
    pub test_size: f64,
    #[serde(default = "default_seed")]
    pub seed: u64,
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    #[serde(default = "default_n_estimators")]
    pub n_estimators: usize,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            test_size: default_test_size(),
            seed: default_seed(),
            max_depth: default_max_depth(),
            n_estimators: default_n_estimators(),
        }
    }
}

fn default_test_size() -> f64 {
    0.1
}

fn default_seed() -> u64 {
    42
}

fn default_max_depth() -> usize {
    6
}

fn default_n_estimators() -> usize {
    11
}

/// Local output locations and artifact names.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_cm_path")]
    pub confusion_matrix_path: PathBuf,
    #[serde(default = "default_model_artifact_path")]
    pub model_artifact_path: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            confusion_matrix_path: default_cm_path(),
            model_artifact_path: default_model_artifact_path(),
        }
    }
}

fn default_cm_path() -> PathBuf {
    PathBuf::from("Confusion-matrix.png")
}

fn default_model_artifact_path() -> String {
    "Random Forest Model".to_string()
}

fn default_tags() -> BTreeMap<String, String> {
    BTreeMap::from([
        ("Author".to_string(), "Anamitra".to_string()),
        ("Project".to_string(), "Wine Classification".to_string()),
    ])
}

impl Default for WinetrackConfig {
    fn default() -> Self {
        Self {
            tracking: TrackingConfig::default(),
            training: TrainingConfig::default(),
            output: OutputConfig::default(),
            tags: default_tags(),
        }
    }
}

impl WinetrackConfig {
    pub fn with_defaults() -> Self {
        Self::default()
    }
}

/// Path of the workspace-level config file.
pub fn workspace_config_path(workspace: &Path) -> PathBuf {
    workspace.join(".winetrack").join("config.toml")
}

/// Path of the user-level config file, when a home directory is known.
pub fn user_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("dev", "winetrack", "winetrack")
        .map(|d| d.config_dir().join("config.toml"))
}

/// Load configuration with layered merging.
///
/// Priority (highest wins):
/// 1. Explicit overrides
/// 2. Environment variables (`WINETRACK_TRACKING__URI`, ...)
/// 3. Explicit config file
/// 4. Workspace config (`.winetrack/config.toml`)
/// 5. User config
/// 6. Built-in defaults
pub fn load_config(
    workspace: Option<&Path>,
    explicit: Option<&Path>,
    overrides: Option<&ConfigOverrides>,
) -> Result<WinetrackConfig, Box<figment::Error>> {
    let mut figment = Figment::from(Serialized::defaults(WinetrackConfig::with_defaults()));

    if let Some(user_config) = user_config_path().filter(|p| p.exists()) {
        figment = figment.merge(Toml::file(user_config));
    }

    if let Some(ws) = workspace {
        let ws_config = workspace_config_path(ws);
        if ws_config.exists() {
            figment = figment.merge(Toml::file(ws_config));
        }
    }

    if let Some(path) = explicit {
        if !path.exists() {
            return Err(Box::new(figment::Error::from(format!(
                "config file not found: {}",
                path.display()
            ))));
        }
        figment = figment.merge(Toml::file(path));
    }

    figment = figment.merge(Env::prefixed("WINETRACK_").split("__"));

    if let Some(overrides) = overrides {
        figment = figment.merge(Serialized::defaults(overrides));
    }

    figment.extract().map_err(Box::new)
}

/// Values supplied on the command line. Only set fields override.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConfigOverrides {
    #[serde(skip_serializing_if = "TrackingOverrides::is_empty")]
    pub tracking: TrackingOverrides,
    #[serde(skip_serializing_if = "OutputOverrides::is_empty")]
    pub output: OutputOverrides,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TrackingOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub experiment_name: Option<String>,
}

impl TrackingOverrides {
    fn is_empty(&self) -> bool {
        self.experiment_name.is_none()
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct OutputOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confusion_matrix_path: Option<PathBuf>,
}

impl OutputOverrides {
    fn is_empty(&self) -> bool {
        self.confusion_matrix_path.is_none()
    }
}
