//! Tracking URI parsing and process-wide resolution.
//!
//! Precedence when resolving the active URI:
//! 1. a value set in-process with [`set_tracking_uri`]
//! 2. the `MLFLOW_TRACKING_URI` environment variable
//! 3. the configured `tracking.uri`
//! 4. `./mlruns` under the current directory

use crate::error::MlError;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use url::Url;

pub const TRACKING_URI_ENV: &str = "MLFLOW_TRACKING_URI";
pub const DEFAULT_LOCAL_DIR: &str = "mlruns";

static ACTIVE_URI: RwLock<Option<TrackingUri>> = RwLock::new(None);

/// Where runs are recorded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackingUri {
    /// MLflow tracking server, kept as written (minus trailing slashes).
    Http(String),
    /// Local `mlruns`-style directory, always absolute.
    File(PathBuf),
}

impl TrackingUri {
    /// Parse `raw`, resolving bare relative paths against the current directory.
    pub fn parse(raw: &str) -> Result<Self, MlError> {
        let cwd = std::env::current_dir()?;
        Self::parse_relative_to(raw, &cwd)
    }

    pub fn parse_relative_to(raw: &str, base: &Path) -> Result<Self, MlError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(MlError::invalid_input("tracking URI is empty"));
        }

        match Url::parse(raw) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {
                if url.host_str().is_none_or(str::is_empty) {
                    return Err(MlError::invalid_input(format!(
                        "tracking URI '{raw}' has no host"
                    )));
                }
                Ok(Self::Http(raw.trim_end_matches('/').to_string()))
            }
            Ok(url) if url.scheme() == "file" => url
                .to_file_path()
                .map(Self::File)
                .map_err(|_| MlError::invalid_input(format!("'{raw}' is not a local file URI"))),
            // single-letter schemes are Windows drive letters
            Ok(url) if url.scheme().len() > 1 => Err(MlError::invalid_input(format!(
                "unsupported tracking URI scheme '{}'",
                url.scheme()
            ))),
            Err(e) if raw.contains("://") => Err(MlError::invalid_input(format!(
                "malformed tracking URI '{raw}': {e}"
            ))),
            _ => {
                let path = Path::new(raw);
                let path = if path.is_absolute() {
                    path.to_path_buf()
                } else {
                    base.join(path)
                };
                Ok(Self::File(path))
            }
        }
    }

    /// The `./mlruns` store under `base`.
    pub fn default_local(base: &Path) -> Self {
        Self::File(base.join(DEFAULT_LOCAL_DIR))
    }

    pub fn scheme(&self) -> &str {
        match self {
            Self::Http(raw) if raw.starts_with("https") => "https",
            Self::Http(_) => "http",
            Self::File(_) => "file",
        }
    }
}

impl fmt::Display for TrackingUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Http(raw) => f.write_str(raw),
            Self::File(path) => match Url::from_file_path(path) {
                Ok(url) => f.write_str(url.as_str()),
                Err(()) => write!(f, "file://{}", path.display()),
            },
        }
    }
}

impl std::str::FromStr for TrackingUri {
    type Err = MlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Pick the active URI from the candidate sources, highest precedence first.
pub fn resolve(
    explicit: Option<&TrackingUri>,
    env_value: Option<&str>,
    configured: Option<&str>,
    base: &Path,
) -> Result<TrackingUri, MlError> {
    if let Some(uri) = explicit {
        return Ok(uri.clone());
    }
    if let Some(raw) = env_value.filter(|v| !v.trim().is_empty()) {
        return TrackingUri::parse_relative_to(raw, base);
    }
    if let Some(raw) = configured.filter(|v| !v.trim().is_empty()) {
        return TrackingUri::parse_relative_to(raw, base);
    }
    Ok(TrackingUri::default_local(base))
}

/// Set the URI used by [`get_tracking_uri`] for the rest of the process.
pub fn set_tracking_uri(raw: &str) -> Result<TrackingUri, MlError> {
    let uri = TrackingUri::parse(raw)?;
    let mut active = ACTIVE_URI
        .write()
        .map_err(|_| MlError::tracking("tracking URI lock poisoned"))?;
    *active = Some(uri.clone());
    tracing::debug!(uri = %uri, "Tracking URI set");
    Ok(uri)
}

/// The active tracking URI, given the configured fallback.
pub fn get_tracking_uri(configured: Option<&str>) -> Result<TrackingUri, MlError> {
    let explicit = ACTIVE_URI
        .read()
        .map_err(|_| MlError::tracking("tracking URI lock poisoned"))?
        .clone();
    let env_value = std::env::var(TRACKING_URI_ENV).ok();
    let cwd = std::env::current_dir()?;
    resolve(explicit.as_ref(), env_value.as_deref(), configured, &cwd)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn base() -> PathBuf {
        PathBuf::from("/work")
    }

    #[test]
    fn test_parse_http() {
        let uri = TrackingUri::parse_relative_to("http://127.0.0.1:5000/", &base()).unwrap();
        assert_eq!(uri, TrackingUri::Http("http://127.0.0.1:5000".into()));
        assert_eq!(uri.to_string(), "http://127.0.0.1:5000");
        assert_eq!(uri.scheme(), "http");

        let uri = TrackingUri::parse_relative_to(
            "https://dagshub.com/user/repo.mlflow",
            &base(),
        )
        .unwrap();
        assert_eq!(uri.scheme(), "https");
    }

    #[test]
    fn test_parse_paths() {
        let uri = TrackingUri::parse_relative_to("mlruns", &base()).unwrap();
        assert_eq!(uri, TrackingUri::File(PathBuf::from("/work/mlruns")));
        assert_eq!(uri.to_string(), "file:///work/mlruns");

        let uri = TrackingUri::parse_relative_to("file:///tmp/store", &base()).unwrap();
        assert_eq!(uri, TrackingUri::File(PathBuf::from("/tmp/store")));

        let uri = TrackingUri::parse_relative_to("/abs/store", &base()).unwrap();
        assert_eq!(uri, TrackingUri::File(PathBuf::from("/abs/store")));
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(TrackingUri::parse_relative_to("", &base()).is_err());
        assert!(TrackingUri::parse_relative_to("databricks://profile", &base()).is_err());
        assert!(TrackingUri::parse_relative_to("http://", &base()).is_err());
    }

    #[test]
    fn test_resolution_order() {
        let explicit = TrackingUri::Http("http://explicit:1".into());
        let resolved = resolve(
            Some(&explicit),
            Some("http://env:2"),
            Some("http://config:3"),
            &base(),
        )
        .unwrap();
        assert_eq!(resolved, explicit);

        let resolved =
            resolve(None, Some("http://env:2"), Some("http://config:3"), &base()).unwrap();
        assert_eq!(resolved.to_string(), "http://env:2");

        let resolved = resolve(None, Some("  "), Some("http://config:3"), &base()).unwrap();
        assert_eq!(resolved.to_string(), "http://config:3");

        let resolved = resolve(None, None, None, &base()).unwrap();
        assert_eq!(resolved, TrackingUri::File(PathBuf::from("/work/mlruns")));
    }
}
