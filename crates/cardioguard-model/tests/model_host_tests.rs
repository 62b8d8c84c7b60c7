//! Integration tests for artifact loading, inference, explanations and reload

use cardioguard_core::{feature_names, vectorize, Error, FeatureVector, RiskTier, Validator};
use cardioguard_model::{
    explain, predict_offloaded, ModelCapability, ModelHost, ModelPaths, ModelSnapshot,
};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

const NUMERIC: [&str; 5] = ["age", "trestbps", "chol", "thalach", "oldpeak"];
const CATEGORICAL: [&str; 5] = ["cp", "restecg", "slope", "ca", "thal"];

/// Logistic artifact with scaler + one-hot + passthrough, 5 + 19 + 3 features
fn logistic_artifact(version: &str, coefficient: f64) -> Value {
    let categories = json!([[0, 1, 2, 3], [0, 1, 2], [0, 1, 2], [0, 1, 2, 3, 4], [0, 1, 2, 3]]);
    let width = 5 + 19 + 3;
    let coefficients: Vec<f64> = (0..width)
        .map(|i| coefficient * if i % 2 == 0 { 1.0 } else { -0.5 })
        .collect();

    json!({
        "name": "logistic-regression",
        "version": version,
        "feature_names": feature_names(),
        "preprocessor": {
            "steps": [
                {
                    "type": "standard_scaler",
                    "columns": NUMERIC,
                    "mean": [54.4, 131.6, 246.3, 149.6, 1.04],
                    "scale": [9.0, 17.5, 51.8, 22.9, 1.16]
                },
                {
                    "type": "one_hot",
                    "columns": CATEGORICAL,
                    "categories": categories
                }
            ],
            "remainder": "passthrough"
        },
        "estimator": {
            "type": "logistic_regression",
            "coefficients": coefficients,
            "intercept": 0.1
        }
    })
}

fn forest_artifact() -> Value {
    // Identity preprocessing: feature 7 is thalach
    json!({
        "name": "random-forest",
        "feature_names": feature_names(),
        "estimator": {
            "type": "random_forest",
            "trees": [
                {"nodes": [
                    {"type": "split", "feature": 7, "threshold": 140.0, "left": 1, "right": 2},
                    {"type": "leaf", "probability": 0.8},
                    {"type": "leaf", "probability": 0.3}
                ]},
                {"nodes": [{"type": "leaf", "probability": 0.5}]}
            ]
        }
    })
}

fn svc_artifact() -> Value {
    let coefficients = vec![0.01; 13];
    json!({
        "name": "linear-svc",
        "feature_names": feature_names(),
        "estimator": {
            "type": "linear_svc",
            "coefficients": coefficients,
            "intercept": -1.0
        }
    })
}

fn write_json(dir: &Path, name: &str, value: &Value) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, serde_json::to_vec_pretty(value).unwrap()).unwrap();
    path
}

fn reference_vector() -> FeatureVector {
    let record = Validator::default()
        .validate(&json!({
            "age": 63, "sex": 1, "cp": 3, "trestbps": 145, "chol": 233, "fbs": 1,
            "restecg": 0, "thalach": 150, "exang": 0, "oldpeak": 2.3, "slope": 0,
            "ca": 0, "thal": 1
        }))
        .unwrap();
    vectorize(&record)
}

fn host_with(dir: &TempDir, artifact: &Value) -> ModelHost {
    let path = write_json(dir.path(), "best_model.json", artifact);
    ModelHost::start(ModelPaths::new(path).with_metadata(dir.path().join("training_metadata.json")))
}

#[test]
fn test_logistic_prediction_and_explanation() {
    let dir = TempDir::new().unwrap();
    let host = host_with(&dir, &logistic_artifact("1.1.0", 0.4));
    let snapshot = host.snapshot().unwrap();

    assert_eq!(snapshot.capability(), ModelCapability::LinearExplainable);
    assert_eq!(snapshot.version(), "1.1.0");

    let vector = reference_vector();
    let raw = snapshot.predict(std::slice::from_ref(&vector)).unwrap();
    assert_eq!(raw.len(), 1);
    assert!((0.0..=1.0).contains(&raw[0].probability));
    assert_eq!(raw[0].label, u8::from(raw[0].probability > 0.5));
    assert_eq!(raw[0].risk_tier(), RiskTier::from_probability(raw[0].probability));

    let contributors = explain(&snapshot, &vector).unwrap();
    assert_eq!(contributors.len(), 3);
    assert!(contributors
        .windows(2)
        .all(|pair| pair[0].contribution >= pair[1].contribution));
    assert!(contributors.iter().all(|c| c.feature.contains("__")));
}

#[test]
fn test_batch_matches_single_predictions() {
    let dir = TempDir::new().unwrap();
    let host = host_with(&dir, &logistic_artifact("1.1.0", 0.4));
    let snapshot = host.snapshot().unwrap();

    let vectors = vec![reference_vector(); 5];
    let batch = snapshot.predict(&vectors).unwrap();
    let single = snapshot.predict(&vectors[..1]).unwrap();

    assert_eq!(batch.len(), 5);
    for raw in &batch {
        assert!((raw.probability - single[0].probability).abs() < 1e-12);
    }
}

#[test]
fn test_zero_weights_yield_no_explanation() {
    let dir = TempDir::new().unwrap();
    let host = host_with(&dir, &logistic_artifact("1.1.0", 0.0));
    let snapshot = host.snapshot().unwrap();

    let raw = snapshot.predict(&[reference_vector()]).unwrap();
    // sigmoid(0.1)
    assert!((raw[0].probability - 0.524_979_187_478_939_7).abs() < 1e-9);
    assert!(explain(&snapshot, &reference_vector()).is_none());
}

#[test]
fn test_forest_probabilities_without_explanation() {
    let dir = TempDir::new().unwrap();
    let host = host_with(&dir, &forest_artifact());
    let snapshot = host.snapshot().unwrap();

    assert_eq!(snapshot.capability(), ModelCapability::ProbabilisticClassifier);
    // thalach 150 > 140: (0.3 + 0.5) / 2
    let raw = snapshot.predict(&[reference_vector()]).unwrap();
    assert!((raw[0].probability - 0.4).abs() < 1e-12);
    assert_eq!(raw[0].label, 0);
    assert!((raw[0].confidence - 0.6).abs() < 1e-12);
    assert!(explain(&snapshot, &reference_vector()).is_none());
}

#[test]
fn test_classifier_only_reports_label_as_probability() {
    let dir = TempDir::new().unwrap();
    let host = host_with(&dir, &svc_artifact());
    let snapshot = host.snapshot().unwrap();

    assert_eq!(snapshot.capability(), ModelCapability::ClassifierOnly);
    let raw = snapshot.predict(&[reference_vector()]).unwrap();
    assert_eq!(raw[0].probability, f64::from(raw[0].label));
    assert_eq!(raw[0].confidence, 1.0);
    assert!(explain(&snapshot, &reference_vector()).is_none());
}

#[test]
fn test_metadata_version_takes_precedence() {
    let dir = TempDir::new().unwrap();
    write_json(
        dir.path(),
        "training_metadata.json",
        &json!({"config": {"project": {"version": "2.3.4"}}, "best_model": "logistic_regression"}),
    );
    let host = host_with(&dir, &logistic_artifact("1.1.0", 0.4));

    let status = host.status();
    assert!(status.loaded);
    assert_eq!(status.version, "2.3.4");
    let meta = host.snapshot().unwrap().metadata().training_metadata.clone().unwrap();
    assert_eq!(meta["best_model"], "logistic_regression");
}

#[test]
fn test_version_defaults_to_unknown() {
    let dir = TempDir::new().unwrap();
    let host = host_with(&dir, &forest_artifact());
    assert_eq!(host.status().version, "unknown");
}

#[test]
fn test_corrupt_artifact_at_startup_is_skeletal() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("best_model.json");
    std::fs::write(&path, b"{ not json").unwrap();

    let host = ModelHost::start(ModelPaths::new(&path));
    assert!(!host.is_loaded());
    assert!(matches!(host.snapshot(), Err(Error::ModelUnavailable)));
}

#[test]
fn test_schema_mismatch_is_rejected() {
    let mut artifact = svc_artifact();
    artifact["feature_names"][0] = json!("years");

    let dir = TempDir::new().unwrap();
    let path = write_json(dir.path(), "best_model.json", &artifact);
    assert!(matches!(
        ModelSnapshot::load(&ModelPaths::new(path)),
        Err(Error::Config(_))
    ));
}

#[test]
fn test_coefficient_width_mismatch_is_rejected() {
    let mut artifact = logistic_artifact("1.0.0", 0.4);
    artifact["estimator"]["coefficients"] = json!([0.1, 0.2]);

    let dir = TempDir::new().unwrap();
    let path = write_json(dir.path(), "best_model.json", &artifact);
    assert!(matches!(
        ModelSnapshot::load(&ModelPaths::new(path)),
        Err(Error::Artifact(_))
    ));
}

#[tokio::test]
async fn test_reload_swaps_snapshot() {
    let dir = TempDir::new().unwrap();
    let host = host_with(&dir, &logistic_artifact("1.0.0", 0.4));
    let before = host.snapshot().unwrap();

    write_json(dir.path(), "best_model.json", &logistic_artifact("1.1.0", 0.2));
    let after = host.reload().await.unwrap();

    assert_eq!(before.version(), "1.0.0");
    assert_eq!(after.version(), "1.1.0");
    assert_eq!(host.status().version, "1.1.0");
    assert_ne!(before.metadata().checksum, after.metadata().checksum);
}

#[tokio::test]
async fn test_failed_reload_keeps_previous_snapshot() {
    let dir = TempDir::new().unwrap();
    let host = host_with(&dir, &logistic_artifact("1.0.0", 0.4));
    let checksum = host.status().checksum;

    std::fs::write(dir.path().join("best_model.json"), b"garbage").unwrap();
    let err = host.reload().await.unwrap_err();
    assert!(matches!(err, Error::Artifact(_)));

    let status = host.status();
    assert!(status.loaded);
    assert_eq!(status.version, "1.0.0");
    assert_eq!(status.checksum, checksum);

    std::fs::remove_file(dir.path().join("best_model.json")).unwrap();
    let err = host.reload().await.unwrap_err();
    assert!(matches!(err, Error::ArtifactNotFound(_)));
    assert_eq!(host.status().version, "1.0.0");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_predictions_during_reloads_use_one_snapshot() {
    let dir = TempDir::new().unwrap();
    let host = Arc::new(host_with(&dir, &logistic_artifact("1.0.0", 0.4)));

    let mut handles = Vec::new();
    for i in 0..16 {
        let host = host.clone();
        handles.push(tokio::spawn(async move {
            if i % 4 == 0 {
                host.reload().await.map(|_| Vec::new())
            } else {
                let snapshot = host.snapshot()?;
                let version = snapshot.version().to_string();
                let raw = predict_offloaded(snapshot.clone(), vec![reference_vector(); 3]).await?;
                assert_eq!(snapshot.version(), version);
                Ok::<_, Error>(raw)
            }
        }));
    }

    for handle in handles {
        let result = handle.await.unwrap();
        assert!(result.is_ok());
    }
    assert!(host.is_loaded());
}

#[tokio::test]
async fn test_offloaded_predict_runs_on_blocking_pool() {
    let dir = TempDir::new().unwrap();
    let host = host_with(&dir, &forest_artifact());
    let snapshot = host.snapshot().unwrap();

    let raw = predict_offloaded(snapshot, vec![reference_vector()]).await.unwrap();
    assert_eq!(raw.len(), 1);
}
