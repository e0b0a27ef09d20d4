//! Model packaging: an `MLmodel` descriptor next to the serialized model.

use crate::error::MlError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const MLMODEL_FILE: &str = "MLmodel";
pub const MODEL_DATA_FILE: &str = "model.json";
pub const FLAVOR_NAME: &str = "winetrack";
/// Run tag listing every model logged to the run.
pub const HISTORY_TAG: &str = "mlflow.log-model.history";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlavorConfig {
    /// Data file, relative to the model directory.
    pub data: String,
    pub model_type: String,
    pub serialization_format: String,
    pub winetrack_version: String,
}

/// Contents of the `MLmodel` file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub artifact_path: String,
    pub flavors: BTreeMap<String, FlavorConfig>,
    pub model_uuid: String,
    pub run_id: String,
    pub utc_time_created: String,
}

impl ModelInfo {
    pub fn new(run_id: &str, artifact_path: &str, model_type: &str) -> Self {
        let flavor = FlavorConfig {
            data: MODEL_DATA_FILE.to_string(),
            model_type: model_type.to_string(),
            serialization_format: "json".to_string(),
            winetrack_version: env!("CARGO_PKG_VERSION").to_string(),
        };
        Self {
            artifact_path: artifact_path.to_string(),
            flavors: BTreeMap::from([(FLAVOR_NAME.to_string(), flavor)]),
            model_uuid: uuid::Uuid::new_v4().simple().to_string(),
            run_id: run_id.to_string(),
            utc_time_created: chrono::Utc::now()
                .format("%Y-%m-%d %H:%M:%S%.6f")
                .to_string(),
        }
    }

    pub fn to_yaml(&self) -> Result<String, MlError> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// JSON value of the history tag after logging this model.
    pub fn history_tag_value(&self) -> Result<String, MlError> {
        Ok(serde_json::to_string(&[self])?)
    }
}

/// Files to upload for one logged model, paths relative to the run's artifact root.
#[derive(Debug, Clone)]
pub struct ModelPackage {
    pub info: ModelInfo,
    pub files: Vec<(String, Vec<u8>)>,
}

/// Serialize `model` and build its descriptor under `artifact_path`.
pub fn package_model<M: Serialize>(
    model: &M,
    model_type: &str,
    run_id: &str,
    artifact_path: &str,
) -> Result<ModelPackage, MlError> {
    let artifact_path = artifact_path.trim_matches('/');
    if artifact_path.is_empty() {
        return Err(MlError::invalid_input("model artifact path is empty"));
    }
    let info = ModelInfo::new(run_id, artifact_path, model_type);
    let data = serde_json::to_vec(model)?;
    let files = vec![
        (
            format!("{artifact_path}/{MLMODEL_FILE}"),
            info.to_yaml()?.into_bytes(),
        ),
        (format!("{artifact_path}/{MODEL_DATA_FILE}"), data),
    ];
    Ok(ModelPackage { info, files })
}
