//! Integration tests for the REST tracking store against an in-process mock
//! MLflow server.

use axum::Json;
use axum::Router;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode, header::AUTHORIZATION};
use axum::routing::{get, post, put};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use winetrack_ml::config::WinetrackConfig;
use winetrack_ml::tracking::{Credentials, RestStore, TrackingStore};
use winetrack_ml::{Dataset, MlError, TrainingRunner};

#[derive(Default)]
struct MockState {
    calls: Vec<String>,
    experiments: HashMap<String, String>,
    artifacts: HashMap<String, usize>,
    auth: Vec<Option<String>>,
    create_tags: Value,
    fail_action: Option<String>,
}

type Shared = Arc<Mutex<MockState>>;
type Reply = Result<Json<Value>, (StatusCode, Json<Value>)>;

fn record_auth(state: &mut MockState, headers: &HeaderMap) {
    state.auth.push(
        headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(String::from),
    );
}

async fn get_by_name(
    State(state): State<Shared>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Reply {
    let mut s = state.lock().unwrap();
    record_auth(&mut s, &headers);
    s.calls.push("experiments/get-by-name".into());
    let name = query.get("experiment_name").cloned().unwrap_or_default();
    match s.experiments.get(&name) {
        Some(id) => Ok(Json(json!({
            "experiment": {
                "experiment_id": id,
                "name": name,
                "artifact_location": format!("mlflow-artifacts:/{id}"),
                "lifecycle_stage": "active"
            }
        }))),
        None => Err((
            StatusCode::NOT_FOUND,
            Json(json!({
                "error_code": "RESOURCE_DOES_NOT_EXIST",
                "message": format!("Could not find experiment with name '{name}'")
            })),
        )),
    }
}

async fn create_experiment(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Reply {
    let mut s = state.lock().unwrap();
    record_auth(&mut s, &headers);
    s.calls.push("experiments/create".into());
    let id = (s.experiments.len() + 1).to_string();
    let name = body["name"].as_str().unwrap_or_default().to_string();
    s.experiments.insert(name, id.clone());
    Ok(Json(json!({ "experiment_id": id })))
}

async fn runs(
    State(state): State<Shared>,
    Path(action): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Reply {
    let mut s = state.lock().unwrap();
    record_auth(&mut s, &headers);
    let label = match action.as_str() {
        "log-metric" | "log-parameter" | "set-tag" => {
            format!("{action}:{}", body["key"].as_str().unwrap_or_default())
        }
        "update" => format!("update:{}", body["status"].as_str().unwrap_or_default()),
        other => format!("runs/{other}"),
    };
    s.calls.push(label);

    if s.fail_action.as_deref() == Some(action.as_str()) {
        return Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error_code": "INTERNAL_ERROR", "message": "mock failure" })),
        ));
    }

    if action == "create" {
        let experiment_id = body["experiment_id"].as_str().unwrap_or("0").to_string();
        let run_id = format!("run{}", s.calls.len());
        s.create_tags = body["tags"].clone();
        return Ok(Json(json!({
            "run": {
                "info": {
                    "run_id": run_id,
                    "run_uuid": run_id,
                    "experiment_id": experiment_id,
                    "run_name": body["run_name"],
                    "status": "RUNNING",
                    "start_time": body["start_time"],
                    "artifact_uri": format!("mlflow-artifacts:/{experiment_id}/{run_id}/artifacts"),
                    "lifecycle_stage": "active"
                },
                "data": {}
            }
        })));
    }
    Ok(Json(json!({})))
}

async fn put_artifact(
    State(state): State<Shared>,
    Path(path): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Reply {
    let mut s = state.lock().unwrap();
    record_auth(&mut s, &headers);
    let relative = path
        .split_once("/artifacts/")
        .map(|(_, rest)| rest.to_string())
        .unwrap_or(path.clone());
    s.calls.push(format!("artifact:{relative}"));
    s.artifacts.insert(path, body.len());
    Ok(Json(json!({})))
}

async fn spawn_mock(state: Shared) -> String {
    let app = Router::new()
        .route("/api/2.0/mlflow/experiments/get-by-name", get(get_by_name))
        .route("/api/2.0/mlflow/experiments/create", post(create_experiment))
        .route("/api/2.0/mlflow/runs/{action}", post(runs))
        .route("/api/2.0/mlflow-artifacts/artifacts/{*path}", put(put_artifact))
        .with_state(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

fn config_in(dir: &std::path::Path) -> WinetrackConfig {
    let mut config = WinetrackConfig::with_defaults();
    config.output.confusion_matrix_path = dir.join("Confusion-matrix.png");
    config
}

fn store(base: &str, credentials: Option<Credentials>) -> Arc<RestStore> {
    Arc::new(RestStore::new(base, Duration::from_secs(10), credentials).unwrap())
}

#[tokio::test]
async fn test_tracked_run_calls_server_in_order() {
    let state = Shared::default();
    let base = spawn_mock(state.clone()).await;
    let dir = tempfile::tempdir().unwrap();
    let runner = TrainingRunner::new(
        store(&base, Some(Credentials::Bearer("secret-token".into()))),
        config_in(dir.path()),
    )
    .with_source("main.rs", "fn main() {}");

    let outcome = runner.run(&Dataset::wine().unwrap()).await.unwrap();
    assert_eq!(outcome.experiment_id, "1");
    assert_eq!(outcome.test_size, 18);
    assert!(outcome.image_path.exists());

    let s = state.lock().unwrap();
    assert_eq!(
        s.calls,
        vec![
            "experiments/get-by-name",
            "experiments/create",
            "runs/create",
            "log-metric:accuracy",
            "log-parameter:max_depth",
            "log-parameter:n_estimators",
            "artifact:Confusion-matrix.png",
            "artifact:main.rs",
            "set-tag:Author",
            "set-tag:Project",
            "artifact:Random Forest Model/MLmodel",
            "artifact:Random Forest Model/model.json",
            "set-tag:mlflow.log-model.history",
            "update:FINISHED",
        ]
    );
    assert!(
        s.auth
            .iter()
            .all(|a| a.as_deref() == Some("Bearer secret-token"))
    );

    let tag_keys: Vec<&str> = s
        .create_tags
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|t| t["key"].as_str())
        .collect();
    for key in [
        "mlflow.source.name",
        "mlflow.source.type",
        "mlflow.user",
        "mlflow.runName",
    ] {
        assert!(tag_keys.contains(&key), "missing start tag {key}");
    }

    let run_prefix = format!("1/{}/artifacts", outcome.run_id);
    let png = s
        .artifacts
        .get(&format!("{run_prefix}/Confusion-matrix.png"))
        .copied()
        .unwrap();
    assert_eq!(png as u64, std::fs::metadata(&outcome.image_path).unwrap().len());
}

#[tokio::test]
async fn test_existing_experiment_is_reused() {
    let state = Shared::default();
    state
        .lock()
        .unwrap()
        .experiments
        .insert("new_exp2".into(), "7".into());
    let base = spawn_mock(state.clone()).await;

    let id = store(&base, None)
        .get_or_create_experiment("new_exp2")
        .await
        .unwrap();
    assert_eq!(id, "7");
    let s = state.lock().unwrap();
    assert_eq!(s.calls, vec!["experiments/get-by-name"]);
    assert_eq!(s.auth, vec![None]);
}

#[tokio::test]
async fn test_server_error_marks_run_failed() {
    let state = Shared::default();
    state.lock().unwrap().fail_action = Some("log-metric".into());
    let base = spawn_mock(state.clone()).await;
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());
    let image = config.output.confusion_matrix_path.clone();

    let err = TrainingRunner::new(store(&base, None), config)
        .run(&Dataset::wine().unwrap())
        .await
        .unwrap_err();
    match err {
        MlError::TrackingApi {
            status, error_code, ..
        } => {
            assert_eq!(status, 500);
            assert_eq!(error_code, "INTERNAL_ERROR");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(!image.exists());

    let s = state.lock().unwrap();
    assert_eq!(s.calls.last().map(String::as_str), Some("update:FAILED"));
    assert!(!s.calls.iter().any(|c| c.starts_with("artifact:")));
}

#[tokio::test]
async fn test_unreachable_server_fails_before_writing_image() {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path());
    let image = config.output.confusion_matrix_path.clone();

    let err = TrainingRunner::new(store(&format!("http://127.0.0.1:{port}"), None), config)
        .run(&Dataset::wine().unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, MlError::Http(_)), "unexpected error: {err}");
    assert!(!image.exists());
}
