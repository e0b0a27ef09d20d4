//! MLflow tracking server client (REST API 2.0).
//!
//! Artifacts go through the server's artifact proxy
//! (`/api/2.0/mlflow-artifacts/artifacts/...`) when the run's artifact URI
//! uses the `mlflow-artifacts:` scheme. Runs whose artifact root is a local
//! path are written straight to disk, as the reference client does.

use crate::error::MlError;
use crate::tracking::store::{
    Experiment, Metric, Param, RunInfo, RunStatus, RunTag, TrackingStore,
    validate_relative_path,
};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

const API_PREFIX: &str = "api/2.0/mlflow";
const ARTIFACT_PREFIX: &str = "api/2.0/mlflow-artifacts/artifacts";
const ARTIFACT_SCHEME: &str = "mlflow-artifacts:";

/// Credentials sent with every request.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    Bearer(String),
    Basic { username: String, password: String },
}

impl Credentials {
    /// Read `MLFLOW_TRACKING_TOKEN`, falling back to
    /// `MLFLOW_TRACKING_USERNAME` / `MLFLOW_TRACKING_PASSWORD`.
    pub fn from_env() -> Option<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Option<Self> {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.is_empty());
        if let Some(token) = non_empty("MLFLOW_TRACKING_TOKEN") {
            return Some(Self::Bearer(token));
        }
        match (
            non_empty("MLFLOW_TRACKING_USERNAME"),
            non_empty("MLFLOW_TRACKING_PASSWORD"),
        ) {
            (Some(username), Some(password)) => Some(Self::Basic { username, password }),
            _ => None,
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bearer(_) => f.write_str("Bearer(***)"),
            Self::Basic { username, .. } => write!(f, "Basic({username}, ***)"),
        }
    }
}

/// [`TrackingStore`] backed by an MLflow tracking server.
#[derive(Debug, Clone)]
pub struct RestStore {
    base_url: String,
    client: reqwest::Client,
    credentials: Option<Credentials>,
}

impl RestStore {
    pub fn new(
        base_url: &str,
        timeout: Duration,
        credentials: Option<Credentials>,
    ) -> Result<Self, MlError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("winetrack/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            credentials,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{API_PREFIX}/{path}", self.base_url)
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.credentials {
            Some(Credentials::Bearer(token)) => builder.bearer_auth(token),
            Some(Credentials::Basic { username, password }) => {
                builder.basic_auth(username, Some(password))
            }
            None => builder,
        }
    }

    async fn post(&self, path: &str, body: Value) -> Result<Value, MlError> {
        let url = self.endpoint(path);
        debug!(%url, "POST");
        let response = self
            .authorize(self.client.post(&url))
            .json(&body)
            .send()
            .await?;
        read_json(response).await
    }

    async fn get(&self, path: &str, query: &[(&str, &str)]) -> Result<Value, MlError> {
        let url = self.endpoint(path);
        debug!(%url, "GET");
        let response = self
            .authorize(self.client.get(&url))
            .query(query)
            .send()
            .await?;
        read_json(response).await
    }

    async fn upload(
        &self,
        location: &str,
        artifact_path: &str,
        contents: &[u8],
    ) -> Result<(), MlError> {
        let encoded: Vec<String> = location
            .split('/')
            .chain(artifact_path.split('/'))
            .filter(|s| !s.is_empty())
            .map(|s| urlencoding::encode(s).into_owned())
            .collect();
        let url = format!("{}/{ARTIFACT_PREFIX}/{}", self.base_url, encoded.join("/"));
        debug!(%url, bytes = contents.len(), "PUT artifact");
        let response = self
            .authorize(self.client.put(&url))
            .body(contents.to_vec())
            .send()
            .await?;
        read_json(response).await.map(|_| ())
    }
}

/// Turn a response into JSON, mapping non-2xx answers to [`MlError::TrackingApi`].
async fn read_json(response: reqwest::Response) -> Result<Value, MlError> {
    let status = response.status();
    let text = response.text().await?;
    if !status.is_success() {
        let body: Value = serde_json::from_str(&text).unwrap_or(Value::Null);
        return Err(MlError::TrackingApi {
            status: status.as_u16(),
            error_code: body["error_code"]
                .as_str()
                .unwrap_or("UNKNOWN")
                .to_string(),
            message: body["message"]
                .as_str()
                .map(str::to_string)
                .unwrap_or_else(|| text.chars().take(500).collect()),
        });
    }
    if text.trim().is_empty() {
        return Ok(Value::Object(Default::default()));
    }
    Ok(serde_json::from_str(&text)?)
}

/// Where a run's artifacts live, derived from its artifact URI.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ArtifactRoot {
    /// Path below the server's artifact proxy, e.g. `1/<run>/artifacts`.
    Proxied(String),
    Local(PathBuf),
}

impl ArtifactRoot {
    fn parse(artifact_uri: &str) -> Result<Self, MlError> {
        if let Some(rest) = artifact_uri.strip_prefix(ARTIFACT_SCHEME) {
            let rest = match rest.strip_prefix("//") {
                // drop the authority component
                Some(with_host) => with_host.find('/').map_or("", |i| &with_host[i..]),
                None => rest,
            };
            return Ok(Self::Proxied(rest.trim_matches('/').to_string()));
        }
        if artifact_uri.starts_with("file:") {
            return url::Url::parse(artifact_uri)
                .ok()
                .and_then(|u| u.to_file_path().ok())
                .map(Self::Local)
                .ok_or_else(|| {
                    MlError::tracking(format!("invalid artifact URI '{artifact_uri}'"))
                });
        }
        if artifact_uri.starts_with('/') {
            return Ok(Self::Local(PathBuf::from(artifact_uri)));
        }
        Err(MlError::tracking(format!(
            "unsupported artifact location '{artifact_uri}'"
        )))
    }
}

#[derive(Debug, Deserialize)]
struct WireRunInfo {
    #[serde(default)]
    run_id: Option<String>,
    /// Deprecated spelling; servers send both.
    #[serde(default)]
    run_uuid: Option<String>,
    experiment_id: String,
    #[serde(default)]
    run_name: Option<String>,
    #[serde(default)]
    status: Option<RunStatus>,
    #[serde(default, deserialize_with = "lenient_i64")]
    start_time: Option<i64>,
    #[serde(default, deserialize_with = "lenient_i64")]
    end_time: Option<i64>,
    artifact_uri: String,
}

impl WireRunInfo {
    fn into_run_info(self, requested_start: i64) -> Result<RunInfo, MlError> {
        let run_id = self
            .run_id
            .or(self.run_uuid)
            .ok_or_else(|| MlError::tracking("runs/create returned a run without an id"))?;
        Ok(RunInfo {
            run_id,
            experiment_id: self.experiment_id,
            run_name: self.run_name,
            status: self.status.unwrap_or(RunStatus::Running),
            start_time: self.start_time.unwrap_or(requested_start),
            end_time: self.end_time,
            artifact_uri: self.artifact_uri,
        })
    }
}

/// int64 fields may arrive as JSON numbers or strings.
fn lenient_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => Ok(n.as_i64()),
        Some(Value::String(s)) => s.parse().map(Some).map_err(serde::de::Error::custom),
        Some(other) => Err(serde::de::Error::custom(format!(
            "expected integer, got {other}"
        ))),
    }
}

#[async_trait]
impl TrackingStore for RestStore {
    fn location(&self) -> String {
        self.base_url.clone()
    }

    async fn get_experiment_by_name(&self, name: &str) -> Result<Option<Experiment>, MlError> {
        match self
            .get("experiments/get-by-name", &[("experiment_name", name)])
            .await
        {
            Ok(body) => {
                let experiment = serde_json::from_value(body["experiment"].clone())?;
                Ok(Some(experiment))
            }
            Err(e) if e.is_resource_missing() => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn create_experiment(&self, name: &str) -> Result<String, MlError> {
        let body = self.post("experiments/create", json!({ "name": name })).await?;
        body["experiment_id"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| MlError::tracking("experiments/create returned no experiment_id"))
    }

    async fn create_run(
        &self,
        experiment_id: &str,
        run_name: Option<&str>,
        start_time: i64,
        tags: &[RunTag],
    ) -> Result<RunInfo, MlError> {
        let mut request = json!({
            "experiment_id": experiment_id,
            "start_time": start_time,
            "tags": tags,
        });
        if let Some(name) = run_name {
            request["run_name"] = json!(name);
        }
        let body = self.post("runs/create", request).await?;
        let wire: WireRunInfo = serde_json::from_value(body["run"]["info"].clone())?;
        wire.into_run_info(start_time)
    }

    async fn log_metric(&self, run_id: &str, metric: &Metric) -> Result<(), MlError> {
        self.post(
            "runs/log-metric",
            json!({
                "run_id": run_id,
                "key": metric.key,
                "value": metric.value,
                "timestamp": metric.timestamp,
                "step": metric.step,
            }),
        )
        .await
        .map(|_| ())
    }

    async fn log_param(&self, run_id: &str, param: &Param) -> Result<(), MlError> {
        self.post(
            "runs/log-parameter",
            json!({ "run_id": run_id, "key": param.key, "value": param.value }),
        )
        .await
        .map(|_| ())
    }

    async fn set_tag(&self, run_id: &str, tag: &RunTag) -> Result<(), MlError> {
        self.post(
            "runs/set-tag",
            json!({ "run_id": run_id, "key": tag.key, "value": tag.value }),
        )
        .await
        .map(|_| ())
    }

    async fn log_artifact(
        &self,
        run: &RunInfo,
        artifact_path: &str,
        contents: &[u8],
    ) -> Result<(), MlError> {
        validate_relative_path(artifact_path)?;
        match ArtifactRoot::parse(&run.artifact_uri)? {
            ArtifactRoot::Proxied(location) => {
                self.upload(&location, artifact_path, contents).await
            }
            ArtifactRoot::Local(root) => {
                let target = root.join(artifact_path);
                if let Some(parent) = target.parent() {
                    tokio::fs::create_dir_all(parent).await?;
                }
                tokio::fs::write(&target, contents).await?;
                debug!(path = %target.display(), "Wrote artifact to local artifact root");
                Ok(())
            }
        }
    }

    async fn update_run(
        &self,
        run_id: &str,
        status: RunStatus,
        end_time: Option<i64>,
    ) -> Result<(), MlError> {
        let mut request = json!({ "run_id": run_id, "status": status });
        if let Some(end) = end_time {
            request["end_time"] = json!(end);
        }
        self.post("runs/update", request).await.map(|_| ())
    }
}
