//! Immutable, shareable model snapshots

use cardioguard_core::{check_schema, Error, FeatureVector, Result, RiskTier};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::artifact::ModelArtifact;
use crate::estimator::{Estimator, ModelCapability, Score};
use crate::preprocess::Preprocessor;

/// Where the host finds its artifact and optional training metadata
#[derive(Debug, Clone)]
pub struct ModelPaths {
    pub artifact: PathBuf,
    pub metadata: Option<PathBuf>,
}

impl ModelPaths {
    pub fn new(artifact: impl Into<PathBuf>) -> Self {
        Self {
            artifact: artifact.into(),
            metadata: None,
        }
    }

    /// Set the training metadata file
    pub fn with_metadata(mut self, path: impl Into<PathBuf>) -> Self {
        self.metadata = Some(path.into());
        self
    }
}

/// Descriptive fields of a loaded model
#[derive(Debug, Clone, Serialize)]
pub struct SnapshotMetadata {
    pub name: String,
    pub version: String,
    pub source_path: PathBuf,
    pub loaded_at: DateTime<Utc>,

    /// Hex SHA-256 of the artifact file
    pub checksum: String,

    /// Training metadata document, when one was found
    pub training_metadata: Option<Value>,
}

/// Estimator output for one row
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RawPrediction {
    pub label: u8,

    /// Positive-class probability; the label itself for classifier-only models
    pub probability: f64,

    pub confidence: f64,
}

impl RawPrediction {
    fn from_score(score: Score) -> Self {
        match score {
            Score::Probability(p) => Self {
                label: u8::from(p > 0.5),
                probability: p,
                confidence: p.max(1.0 - p),
            },
            Score::Label(label) => Self {
                label,
                probability: f64::from(label),
                confidence: 1.0,
            },
        }
    }

    pub fn risk_tier(&self) -> RiskTier {
        RiskTier::from_probability(self.probability)
    }
}

/// A fully validated model, shared read-only by in-flight requests
#[derive(Debug)]
pub struct ModelSnapshot {
    metadata: SnapshotMetadata,
    preprocessor: Preprocessor,
    estimator: Estimator,
}

impl ModelSnapshot {
    /// Load and validate a snapshot; nothing is returned unless every check passes
    pub fn load(paths: &ModelPaths) -> Result<Self> {
        let loaded = ModelArtifact::load(&paths.artifact)?;
        let artifact = loaded.artifact;

        check_schema(&artifact.feature_names)?;

        let preprocessor = match &artifact.preprocessor {
            Some(spec) => Preprocessor::compile(spec, &artifact.feature_names)?,
            None => Preprocessor::identity(&artifact.feature_names),
        };
        let estimator = Estimator::compile(&artifact.estimator, preprocessor.output_width())?;

        let training_metadata = paths.metadata.as_deref().and_then(read_training_metadata);
        let version = training_metadata
            .as_ref()
            .and_then(|meta| meta.pointer("/config/project/version"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .or(artifact.version)
            .unwrap_or_else(|| "unknown".to_string());

        debug!(
            name = %artifact.name,
            version = %version,
            capability = %estimator.capability(),
            features = preprocessor.output_width(),
            "model artifact validated"
        );

        Ok(Self {
            metadata: SnapshotMetadata {
                name: artifact.name,
                version,
                source_path: paths.artifact.clone(),
                loaded_at: Utc::now(),
                checksum: loaded.checksum,
                training_metadata,
            },
            preprocessor,
            estimator,
        })
    }

    pub fn metadata(&self) -> &SnapshotMetadata {
        &self.metadata
    }

    pub fn version(&self) -> &str {
        &self.metadata.version
    }

    pub fn capability(&self) -> ModelCapability {
        self.estimator.capability()
    }

    pub fn preprocessor(&self) -> &Preprocessor {
        &self.preprocessor
    }

    pub fn estimator(&self) -> &Estimator {
        &self.estimator
    }

    /// Score a batch synchronously, one output per input in order
    pub fn predict(&self, vectors: &[FeatureVector]) -> Result<Vec<RawPrediction>> {
        let rows = vectors
            .iter()
            .map(|vector| self.preprocessor.transform(vector.as_slice()))
            .collect::<Result<Vec<_>>>()?;

        let scores = self.estimator.score(&rows)?;
        if scores.len() != vectors.len() {
            return Err(Error::inference(format!(
                "estimator returned {} scores for {} inputs",
                scores.len(),
                vectors.len()
            )));
        }

        Ok(scores.into_iter().map(RawPrediction::from_score).collect())
    }
}

fn read_training_metadata(path: &Path) -> Option<Value> {
    if !path.exists() {
        debug!(path = %path.display(), "no training metadata file");
        return None;
    }

    let parsed = std::fs::read(path)
        .map_err(|e| e.to_string())
        .and_then(|bytes| serde_json::from_slice(&bytes).map_err(|e| e.to_string()));
    match parsed {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "ignoring unreadable training metadata");
            None
        }
    }
}
