//! Reproducibility tracking: environment snapshots recorded as run tags.

use crate::tracking::RunTag;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Snapshot of the training environment for reproducibility.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentSnapshot {
    pub winetrack_version: String,
    pub platform: String,
    pub arch: String,
    pub timestamp: DateTime<Utc>,
    /// SHA-256 of the training data.
    pub dataset_digest: String,
    pub seed: u64,
    /// Hash of environment variables that steer the tracking client.
    pub env_vars_hash: String,
}

impl EnvironmentSnapshot {
    pub fn capture(dataset_digest: &str, seed: u64) -> Self {
        Self {
            winetrack_version: env!("CARGO_PKG_VERSION").to_string(),
            platform: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
            timestamp: Utc::now(),
            dataset_digest: dataset_digest.to_string(),
            seed,
            env_vars_hash: Self::compute_env_vars_hash(),
        }
    }

    /// SHA-256 over the tracking-related environment. Credential values are
    /// reduced to presence markers.
    fn compute_env_vars_hash() -> String {
        let mut hasher = Sha256::new();
        for var in ["MLFLOW_TRACKING_URI", "WINETRACK_TRACKING__URI"] {
            let value = std::env::var(var).unwrap_or_default();
            hasher.update(var.as_bytes());
            hasher.update(b"=");
            hasher.update(value.as_bytes());
            hasher.update(b"\n");
        }
        for var in ["MLFLOW_TRACKING_TOKEN", "MLFLOW_TRACKING_USERNAME"] {
            let present = std::env::var(var).is_ok_and(|v| !v.is_empty());
            hasher.update(var.as_bytes());
            hasher.update(if present { "=set\n" } else { "=\n" });
        }
        format!("{:x}", hasher.finalize())
    }

    /// Run tags under the `winetrack.` namespace.
    pub fn to_tags(&self) -> Vec<RunTag> {
        vec![
            RunTag::new("winetrack.version", self.winetrack_version.as_str()),
            RunTag::new(
                "winetrack.platform",
                format!("{}-{}", self.platform, self.arch),
            ),
            RunTag::new("winetrack.dataset.sha256", self.dataset_digest.as_str()),
            RunTag::new("winetrack.seed", self.seed.to_string()),
            RunTag::new("winetrack.env_hash", self.env_vars_hash.as_str()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_records_inputs() {
        let snap = EnvironmentSnapshot::capture("abc123", 42);
        assert_eq!(snap.dataset_digest, "abc123");
        assert_eq!(snap.seed, 42);
        assert_eq!(snap.platform, std::env::consts::OS);
        assert_eq!(snap.env_vars_hash.len(), 64);
    }

    #[test]
    fn test_tags_are_namespaced() {
        let tags = EnvironmentSnapshot::capture("abc123", 7).to_tags();
        assert!(tags.iter().all(|t| t.key.starts_with("winetrack.")));
        let seed = tags.iter().find(|t| t.key == "winetrack.seed").unwrap();
        assert_eq!(seed.value, "7");
    }
}
