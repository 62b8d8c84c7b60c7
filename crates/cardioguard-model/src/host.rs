//! Hot-swappable model host
//!
//! Readers take an `Arc` to the current snapshot and keep it for the whole
//! request, so a concurrent reload never changes the model under them.
//! Reloads are serialized through a fair async mutex and only swap once the
//! replacement has fully validated.

use cardioguard_core::{Error, FeatureVector, Result};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::estimator::ModelCapability;
use crate::snapshot::{ModelPaths, ModelSnapshot, RawPrediction};

/// Point-in-time view of the host for health and info endpoints
#[derive(Debug, Clone, Serialize)]
pub struct ModelStatus {
    pub loaded: bool,
    pub path: PathBuf,
    pub name: Option<String>,
    pub version: String,
    pub loaded_at: Option<DateTime<Utc>>,
    pub capability: Option<ModelCapability>,
    pub checksum: Option<String>,
}

/// Owner of the active [`ModelSnapshot`]
pub struct ModelHost {
    paths: ModelPaths,
    current: RwLock<Option<Arc<ModelSnapshot>>>,
    reload_gate: Mutex<()>,
}

impl ModelHost {
    /// Start the host, loading the artifact if one exists
    ///
    /// A missing or broken artifact leaves the host in skeletal mode; the
    /// service still starts and reports itself degraded.
    pub fn start(paths: ModelPaths) -> Self {
        let current = if !paths.artifact.exists() {
            warn!(
                path = %paths.artifact.display(),
                "model artifact not found, starting without a model"
            );
            None
        } else {
            match ModelSnapshot::load(&paths) {
                Ok(snapshot) => {
                    info!(
                        name = %snapshot.metadata().name,
                        version = %snapshot.version(),
                        capability = %snapshot.capability(),
                        "model loaded"
                    );
                    Some(Arc::new(snapshot))
                }
                Err(e) => {
                    error!(
                        path = %paths.artifact.display(),
                        error = %e,
                        "failed to load model artifact, starting without a model"
                    );
                    None
                }
            }
        };

        Self {
            paths,
            current: RwLock::new(current),
            reload_gate: Mutex::new(()),
        }
    }

    /// Host with no model and no artifact on disk
    pub fn empty(paths: ModelPaths) -> Self {
        Self {
            paths,
            current: RwLock::new(None),
            reload_gate: Mutex::new(()),
        }
    }

    pub fn paths(&self) -> &ModelPaths {
        &self.paths
    }

    /// The active snapshot
    pub fn snapshot(&self) -> Result<Arc<ModelSnapshot>> {
        self.current.read().clone().ok_or(Error::ModelUnavailable)
    }

    pub fn is_loaded(&self) -> bool {
        self.current.read().is_some()
    }

    /// Re-read the artifact and metadata and swap in the result
    ///
    /// On any failure the previous snapshot stays active.
    pub async fn reload(&self) -> Result<Arc<ModelSnapshot>> {
        let _gate = self.reload_gate.lock().await;

        let paths = self.paths.clone();
        let loaded = tokio::task::spawn_blocking(move || ModelSnapshot::load(&paths))
            .await
            .map_err(|e| Error::artifact(format!("reload task failed: {}", e)))?;

        let snapshot = match loaded {
            Ok(snapshot) => Arc::new(snapshot),
            Err(e) => {
                warn!(
                    path = %self.paths.artifact.display(),
                    error = %e,
                    "model reload failed, keeping current model"
                );
                return Err(e);
            }
        };

        let previous = self.current.write().replace(snapshot.clone());
        info!(
            previous = previous.as_ref().map(|s| s.version()).unwrap_or("none"),
            version = %snapshot.version(),
            checksum = %snapshot.metadata().checksum,
            "model reloaded"
        );

        Ok(snapshot)
    }

    pub fn status(&self) -> ModelStatus {
        let current = self.current.read().clone();
        match current {
            Some(snapshot) => {
                let meta = snapshot.metadata();
                ModelStatus {
                    loaded: true,
                    path: meta.source_path.clone(),
                    name: Some(meta.name.clone()),
                    version: meta.version.clone(),
                    loaded_at: Some(meta.loaded_at),
                    capability: Some(snapshot.capability()),
                    checksum: Some(meta.checksum.clone()),
                }
            }
            None => ModelStatus {
                loaded: false,
                path: self.paths.artifact.clone(),
                name: None,
                version: "unknown".to_string(),
                loaded_at: None,
                capability: None,
                checksum: None,
            },
        }
    }
}

/// Score a batch on the blocking pool
///
/// A panicking or cancelled task surfaces as [`Error::Inference`].
pub async fn predict_offloaded(
    snapshot: Arc<ModelSnapshot>,
    vectors: Vec<FeatureVector>,
) -> Result<Vec<RawPrediction>> {
    tokio::task::spawn_blocking(move || snapshot.predict(&vectors))
        .await
        .map_err(|e| Error::inference(format!("inference task failed: {}", e)))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use cardioguard_core::feature_names;
    use serde_json::json;
    use std::time::Duration;
    use tempfile::TempDir;

    fn write_svc_artifact(dir: &TempDir, version: &str) -> PathBuf {
        let path = dir.path().join("best_model.json");
        let artifact = json!({
            "name": "linear-svc",
            "version": version,
            "feature_names": feature_names(),
            "estimator": {"type": "linear_svc", "coefficients": vec![0.01; 13], "intercept": -1.0}
        });
        std::fs::write(&path, artifact.to_string()).unwrap();
        path
    }

    #[test]
    fn test_missing_artifact_starts_skeletal() {
        let host = ModelHost::start(ModelPaths::new("/nonexistent/best_model.json"));

        assert!(!host.is_loaded());
        assert!(matches!(host.snapshot(), Err(Error::ModelUnavailable)));

        let status = host.status();
        assert!(!status.loaded);
        assert_eq!(status.version, "unknown");
        assert!(status.capability.is_none());
    }

    #[tokio::test]
    async fn test_reload_missing_artifact_is_not_found() {
        let host = ModelHost::empty(ModelPaths::new("/nonexistent/best_model.json"));
        let err = host.reload().await.unwrap_err();
        assert!(matches!(err, Error::ArtifactNotFound(_)));
        assert!(!host.is_loaded());
    }

    #[tokio::test]
    async fn test_reload_queues_behind_running_reload() {
        let dir = TempDir::new().unwrap();
        let path = write_svc_artifact(&dir, "1.0.0");
        let host = Arc::new(ModelHost::empty(ModelPaths::new(path)));

        // Hold the gate as an in-progress reload would
        let gate = host.reload_gate.lock().await;
        let queued = tokio::spawn({
            let host = host.clone();
            async move { host.reload().await }
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!queued.is_finished());
        assert!(!host.is_loaded());

        drop(gate);
        let snapshot = queued.await.unwrap().unwrap();
        assert_eq!(snapshot.version(), "1.0.0");
        assert!(host.is_loaded());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_reloads_never_overlap() {
        let dir = TempDir::new().unwrap();
        let path = write_svc_artifact(&dir, "1.0.0");
        let host = Arc::new(ModelHost::empty(ModelPaths::new(path)));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let host = host.clone();
                tokio::spawn(async move { host.reload().await })
            })
            .collect();

        // Load and swap happen under one gate hold, so the published
        // snapshot is always the most recently loaded one
        let mut loaded_at = Vec::new();
        for handle in handles {
            let snapshot = handle.await.unwrap().unwrap();
            loaded_at.push(snapshot.metadata().loaded_at);
        }
        loaded_at.sort();
        assert_eq!(
            host.snapshot().unwrap().metadata().loaded_at,
            *loaded_at.last().unwrap()
        );
    }
}
