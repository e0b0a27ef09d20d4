//! Tabular classification datasets.
//!
//! Datasets use the layout shipped with scikit-learn's bundled CSVs: a header
//! line `n_samples,n_features,<class name>...` followed by one row per sample
//! holding the feature values and then the integer class label.

use crate::error::MlError;
use ndarray::{Array1, Array2};
use sha2::{Digest, Sha256};
use std::path::Path;

/// Labelled samples in linfa's dataset form.
pub type Samples = linfa::Dataset<f64, usize, ndarray::Ix1>;

const WINE_CSV: &str = include_str!("wine_data.csv");

const WINE_FEATURES: [&str; 13] = [
    "alcohol",
    "malic_acid",
    "ash",
    "alcalinity_of_ash",
    "magnesium",
    "total_phenols",
    "flavanoids",
    "nonflavanoid_phenols",
    "proanthocyanins",
    "color_intensity",
    "hue",
    "od280/od315_of_diluted_wines",
    "proline",
];

/// An immutable feature matrix with integer class labels.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    pub name: String,
    pub features: Array2<f64>,
    pub targets: Array1<usize>,
    pub target_names: Vec<String>,
    pub feature_names: Vec<String>,
    digest: String,
}

impl Dataset {
    /// The UCI wine recognition data: 178 samples, 13 features, 3 cultivars.
    pub fn wine() -> Result<Self, MlError> {
        let mut ds = Self::from_csv_str("wine", WINE_CSV)?;
        ds.feature_names = WINE_FEATURES.iter().map(|s| s.to_string()).collect();
        Ok(ds)
    }

    /// Load a dataset from a CSV file on disk.
    pub fn from_csv_path(path: &Path) -> Result<Self, MlError> {
        let content = std::fs::read_to_string(path)?;
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "dataset".to_string());
        Self::from_csv_str(&name, &content)
    }

    /// Parse a dataset from CSV text.
    pub fn from_csv_str(name: &str, content: &str) -> Result<Self, MlError> {
        let mut lines = content.lines().filter(|l| !l.trim().is_empty());
        let header = lines
            .next()
            .ok_or_else(|| MlError::dataset(format!("{name}: empty CSV")))?;

        let header_fields: Vec<&str> = header.split(',').map(str::trim).collect();
        if header_fields.len() < 3 {
            return Err(MlError::dataset(format!(
                "{name}: header must hold n_samples, n_features and at least one class name"
            )));
        }
        let n_samples: usize = header_fields[0].parse().map_err(|_| {
            MlError::dataset(format!("{name}: bad sample count '{}'", header_fields[0]))
        })?;
        let n_features: usize = header_fields[1].parse().map_err(|_| {
            MlError::dataset(format!("{name}: bad feature count '{}'", header_fields[1]))
        })?;
        if n_features == 0 {
            return Err(MlError::dataset(format!("{name}: zero features")));
        }
        let target_names: Vec<String> = header_fields[2..].iter().map(|s| s.to_string()).collect();

        let mut values = Vec::with_capacity(n_samples * n_features);
        let mut targets = Vec::with_capacity(n_samples);
        for (row, line) in lines.enumerate() {
            let fields: Vec<&str> = line.split(',').map(str::trim).collect();
            if fields.len() != n_features + 1 {
                return Err(MlError::dataset(format!(
                    "{name}: row {} has {} fields, expected {}",
                    row + 1,
                    fields.len(),
                    n_features + 1
                )));
            }
            for field in &fields[..n_features] {
                let v: f64 = field.parse().map_err(|_| {
                    MlError::dataset(format!("{name}: row {}: '{field}' is not numeric", row + 1))
                })?;
                values.push(v);
            }
            let label: usize = fields[n_features].parse().map_err(|_| {
                MlError::dataset(format!(
                    "{name}: row {}: bad label '{}'",
                    row + 1,
                    fields[n_features]
                ))
            })?;
            if label >= target_names.len() {
                return Err(MlError::dataset(format!(
                    "{name}: row {}: label {label} outside {} classes",
                    row + 1,
                    target_names.len()
                )));
            }
            targets.push(label);
        }

        if targets.len() != n_samples {
            return Err(MlError::dataset(format!(
                "{name}: header declares {n_samples} samples, found {}",
                targets.len()
            )));
        }

        let features = Array2::from_shape_vec((n_samples, n_features), values)
            .map_err(|e| MlError::dataset(format!("{name}: {e}")))?;

        Ok(Self {
            name: name.to_string(),
            features,
            targets: Array1::from_vec(targets),
            target_names,
            feature_names: (0..n_features).map(|i| format!("feature_{i}")).collect(),
            digest: compute_digest(content),
        })
    }

    pub fn n_samples(&self) -> usize {
        self.features.nrows()
    }

    pub fn n_features(&self) -> usize {
        self.features.ncols()
    }

    pub fn n_classes(&self) -> usize {
        self.target_names.len()
    }

    /// Number of samples per class, indexed by label.
    pub fn class_counts(&self) -> Vec<usize> {
        let mut counts = vec![0; self.n_classes()];
        for &t in &self.targets {
            counts[t] += 1;
        }
        counts
    }

    /// Copy into a linfa dataset carrying the feature names.
    pub fn to_samples(&self) -> Samples {
        linfa::Dataset::new(self.features.clone(), self.targets.clone())
            .with_feature_names(self.feature_names.clone())
    }

    /// SHA-256 of the source text, hex encoded.
    pub fn digest(&self) -> &str {
        &self.digest
    }
}

fn compute_digest(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_wine_shape() {
        let wine = Dataset::wine().unwrap();
        assert_eq!(wine.n_samples(), 178);
        assert_eq!(wine.n_features(), 13);
        assert_eq!(wine.target_names, vec!["class_0", "class_1", "class_2"]);
        assert_eq!(wine.class_counts(), vec![59, 71, 48]);
        assert_eq!(wine.feature_names.len(), 13);
        assert_eq!(wine.feature_names[0], "alcohol");
    }

    #[test]
    fn test_wine_first_row() {
        let wine = Dataset::wine().unwrap();
        assert_eq!(wine.features[[0, 0]], 14.23);
        assert_eq!(wine.features[[0, 12]], 1065.0);
        assert_eq!(wine.targets[0], 0);
        assert_eq!(wine.targets[177], 2);
    }

    #[test]
    fn test_to_samples_keeps_rows_and_labels() {
        let wine = Dataset::wine().unwrap();
        let samples = wine.to_samples();
        assert_eq!(samples.records.dim(), (178, 13));
        assert_eq!(samples.targets, wine.targets);
        assert_eq!(samples.feature_names()[0], "alcohol");
    }

    #[test]
    fn test_digest_is_stable() {
        let a = Dataset::wine().unwrap();
        let b = Dataset::wine().unwrap();
        assert_eq!(a.digest(), b.digest());
        assert_eq!(a.digest().len(), 64);
    }

    #[test]
    fn test_parse_small() {
        let csv = "3,2,a,b\n1.0,2.0,0\n3.0,4.0,1\n5.0,6.0,1\n";
        let ds = Dataset::from_csv_str("tiny", csv).unwrap();
        assert_eq!(ds.n_samples(), 3);
        assert_eq!(ds.n_classes(), 2);
        assert_eq!(ds.class_counts(), vec![1, 2]);
        assert_eq!(ds.feature_names, vec!["feature_0", "feature_1"]);
    }

    #[test]
    fn test_rejects_label_out_of_range() {
        let csv = "1,2,a,b\n1.0,2.0,2\n";
        let err = Dataset::from_csv_str("tiny", csv).unwrap_err();
        assert!(err.to_string().contains("outside 2 classes"));
    }

    #[test]
    fn test_rejects_sample_count_mismatch() {
        let csv = "2,2,a\n1.0,2.0,0\n";
        assert!(Dataset::from_csv_str("tiny", csv).is_err());
    }

    #[test]
    fn test_rejects_bad_arity_and_values() {
        assert!(Dataset::from_csv_str("t", "1,2,a\n1.0,0\n").is_err());
        assert!(Dataset::from_csv_str("t", "1,2,a\n1.0,x,0\n").is_err());
        assert!(Dataset::from_csv_str("t", "").is_err());
        assert!(Dataset::from_csv_str("t", "1,2\n1.0,2.0,0\n").is_err());
    }

    #[test]
    fn test_from_csv_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pairs.csv");
        std::fs::write(&path, "1,1,only\n0.5,0\n").unwrap();
        let ds = Dataset::from_csv_path(&path).unwrap();
        assert_eq!(ds.name, "pairs");
        assert_eq!(ds.n_samples(), 1);
    }
}
