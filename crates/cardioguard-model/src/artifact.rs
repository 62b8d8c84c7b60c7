//! On-disk model artifact format

use cardioguard_core::{Error, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;

use crate::preprocess::PreprocessorSpec;

/// Serialized model: input schema, optional preprocessor and a fitted estimator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelArtifact {
    /// Human-readable model name
    pub name: String,

    /// Artifact version, used when the training metadata carries none
    #[serde(default)]
    pub version: Option<String>,

    /// Input feature names in the order the model was trained on
    pub feature_names: Vec<String>,

    #[serde(default)]
    pub preprocessor: Option<PreprocessorSpec>,

    pub estimator: EstimatorSpec,
}

/// Fitted estimator parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EstimatorSpec {
    LogisticRegression {
        coefficients: Vec<f64>,
        intercept: f64,
    },
    RandomForest {
        trees: Vec<TreeSpec>,
    },
    LinearSvc {
        coefficients: Vec<f64>,
        intercept: f64,
    },
}

/// Flattened decision tree; node 0 is the root
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeSpec {
    pub nodes: Vec<TreeNode>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TreeNode {
    /// Go left when `x[feature] <= threshold`
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    /// Positive-class probability at this leaf
    Leaf { probability: f64 },
}

/// Raw artifact bytes together with their parsed form
#[derive(Debug, Clone)]
pub struct LoadedArtifact {
    pub artifact: ModelArtifact,

    /// Hex-encoded SHA-256 of the file contents
    pub checksum: String,
}

impl ModelArtifact {
    /// Read and parse an artifact; YAML for `.yaml`/`.yml`, JSON otherwise
    pub fn load(path: &Path) -> Result<LoadedArtifact> {
        if !path.exists() {
            return Err(Error::ArtifactNotFound(path.display().to_string()));
        }

        let bytes = std::fs::read(path).map_err(|e| {
            Error::artifact(format!("failed to read {}: {}", path.display(), e))
        })?;

        let artifact = Self::parse(&bytes, is_yaml(path))
            .map_err(|e| Error::artifact(format!("failed to parse {}: {}", path.display(), e)))?;

        Ok(LoadedArtifact {
            artifact,
            checksum: sha256_hex(&bytes),
        })
    }

    fn parse(bytes: &[u8], yaml: bool) -> std::result::Result<Self, String> {
        if yaml {
            serde_yaml::from_slice(bytes).map_err(|e| e.to_string())
        } else {
            serde_json::from_slice(bytes).map_err(|e| e.to_string())
        }
    }
}

fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|ext| ext.to_str()),
        Some("yaml") | Some("yml")
    )
}

fn sha256_hex(bytes: &[u8]) -> String {
    Sha256::digest(bytes)
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tagged_estimators() {
        let json = r#"{
            "name": "forest",
            "feature_names": ["age"],
            "estimator": {
                "type": "random_forest",
                "trees": [{"nodes": [
                    {"type": "split", "feature": 0, "threshold": 50.0, "left": 1, "right": 2},
                    {"type": "leaf", "probability": 0.2},
                    {"type": "leaf", "probability": 0.9}
                ]}]
            }
        }"#;
        let artifact = ModelArtifact::parse(json.as_bytes(), false).unwrap();
        assert!(artifact.version.is_none());
        assert!(artifact.preprocessor.is_none());
        match artifact.estimator {
            EstimatorSpec::RandomForest { trees } => assert_eq!(trees[0].nodes.len(), 3),
            other => panic!("unexpected estimator {:?}", other),
        }
    }

    #[test]
    fn test_parse_yaml() {
        let yaml = "
name: svc
version: 2.0.0
feature_names: [age, chol]
estimator:
  type: linear_svc
  coefficients: [0.1, -0.2]
  intercept: 0.5
";
        let artifact = ModelArtifact::parse(yaml.as_bytes(), true).unwrap();
        assert_eq!(artifact.version.as_deref(), Some("2.0.0"));
        assert!(matches!(artifact.estimator, EstimatorSpec::LinearSvc { .. }));
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let err = ModelArtifact::load(Path::new("/nonexistent/model.json")).unwrap_err();
        assert!(matches!(err, Error::ArtifactNotFound(_)));
    }

    #[test]
    fn test_checksum_is_hex_sha256() {
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
