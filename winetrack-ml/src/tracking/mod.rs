//! Experiment tracking: MLflow-compatible stores and the run scope.

pub mod file;
pub mod model;
pub mod rest;
pub mod run;
pub mod store;
pub mod uri;

pub use file::{FileStore, RunRecord};
pub use model::{ModelInfo, package_model};
pub use rest::{Credentials, RestStore};
pub use run::{ActiveRun, RunOptions};
pub use store::{Experiment, Metric, Param, RunInfo, RunStatus, RunTag, TrackingStore};
pub use uri::{TrackingUri, get_tracking_uri, set_tracking_uri};

use crate::config::TrackingConfig;
use crate::error::MlError;
use std::sync::Arc;
use std::time::Duration;

/// Open the store a URI points at.
pub fn open_store(
    uri: &TrackingUri,
    config: &TrackingConfig,
) -> Result<Arc<dyn TrackingStore>, MlError> {
    match uri {
        TrackingUri::Http(base) => {
            let credentials = Credentials::from_env();
            tracing::debug!(
                base = %base,
                authenticated = credentials.is_some(),
                "Opening REST tracking store"
            );
            let store = RestStore::new(
                base,
                Duration::from_secs(config.request_timeout_secs),
                credentials,
            )?;
            Ok(Arc::new(store))
        }
        TrackingUri::File(root) => {
            tracing::debug!(root = %root.display(), "Opening file tracking store");
            Ok(Arc::new(FileStore::new(root.clone())))
        }
    }
}
