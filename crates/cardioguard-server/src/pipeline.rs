//! Single and batch prediction flows
//!
//! Both flows hold one snapshot for their whole duration, so a reload that
//! lands mid-request never mixes model versions within a response.

use cardioguard_core::{
    vectorize, ClinicalRecord, Error, FeatureVector, PredictionResult, Result, ValidationErrors,
};
use cardioguard_model::{explain, predict_offloaded};
use cardioguard_telemetry::serving;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Instant;
use tracing::{debug, info};

use crate::request_id::RequestId;
use crate::state::AppState;

/// Smallest accepted batch
pub const MIN_BATCH: usize = 1;

/// Largest accepted batch
pub const MAX_BATCH: usize = 100;

/// Body of `POST /batch-predict`
#[derive(Debug, Clone, Deserialize)]
pub struct BatchRequest {
    pub instances: Vec<Value>,
}

/// A scored batch item, tagged with its position in the request
#[derive(Debug, Clone, Serialize)]
pub struct IndexedPrediction {
    pub index: usize,

    #[serde(flatten)]
    pub result: PredictionResult,
}

/// A batch item that failed validation
#[derive(Debug, Clone, Serialize)]
pub struct BatchItemError {
    pub index: usize,
    pub errors: ValidationErrors,
}

/// Response of `POST /batch-predict`
#[derive(Debug, Clone, Serialize)]
pub struct BatchPrediction {
    pub predictions: Vec<IndexedPrediction>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<BatchItemError>,

    /// Number of instances submitted
    pub total: usize,

    pub timestamp: DateTime<Utc>,
    pub request_id: String,
}

/// Validate, score and explain one record
pub async fn predict_single(
    state: &AppState,
    candidate: &Value,
    request_id: &RequestId,
) -> Result<PredictionResult> {
    let record = state.validator.validate(candidate)?;
    let snapshot = state.host.snapshot()?;
    let vector = vectorize(&record);

    let start = Instant::now();
    let raw = predict_offloaded(snapshot.clone(), vec![vector.clone()])
        .await
        .map_err(as_inference)?
        .into_iter()
        .next()
        .ok_or_else(|| Error::inference("estimator returned no prediction"))?;
    serving::record_inference_latency("single", start.elapsed().as_micros() as u64);

    let risk_level = raw.risk_tier();
    serving::record_prediction(risk_level);

    let top_contributors = explain(&snapshot, &vector);
    debug!(
        request_id = %request_id,
        prediction = raw.label,
        probability = raw.probability,
        risk_level = %risk_level,
        "prediction complete"
    );

    Ok(PredictionResult {
        prediction: raw.label,
        probability: raw.probability,
        risk_level,
        confidence: raw.confidence,
        timestamp: Utc::now(),
        request_id: request_id.to_string(),
        top_contributors,
    })
}

/// Validate every item, then score all valid ones in a single call
///
/// Invalid items are reported by index and never block the rest.
pub async fn predict_batch(
    state: &AppState,
    instances: &[Value],
    request_id: &RequestId,
) -> Result<BatchPrediction> {
    let total = instances.len();
    if !(MIN_BATCH..=MAX_BATCH).contains(&total) {
        return Err(Error::BatchSize {
            min: MIN_BATCH,
            max: MAX_BATCH,
            actual: total,
        });
    }

    let mut valid: Vec<(usize, ClinicalRecord)> = Vec::with_capacity(total);
    let mut errors = Vec::new();
    for (index, candidate) in instances.iter().enumerate() {
        match state.validator.validate(candidate) {
            Ok(record) => valid.push((index, record)),
            Err(violations) => {
                serving::record_item_rejection();
                errors.push(BatchItemError {
                    index,
                    errors: violations,
                });
            }
        }
    }

    let timestamp = Utc::now();
    if valid.is_empty() {
        info!(request_id = %request_id, total, rejected = errors.len(), "batch had no valid instances");
        return Ok(BatchPrediction {
            predictions: Vec::new(),
            errors,
            total,
            timestamp,
            request_id: request_id.to_string(),
        });
    }

    let snapshot = state.host.snapshot()?;
    let vectors: Vec<FeatureVector> = valid.iter().map(|(_, record)| vectorize(record)).collect();

    let start = Instant::now();
    let raw = predict_offloaded(snapshot, vectors)
        .await
        .map_err(as_inference)?;
    serving::record_inference_latency("batch", start.elapsed().as_micros() as u64);

    if raw.len() != valid.len() {
        return Err(Error::inference(format!(
            "estimator returned {} predictions for {} rows",
            raw.len(),
            valid.len()
        )));
    }

    let predictions: Vec<IndexedPrediction> = valid
        .iter()
        .zip(raw)
        .map(|((index, _), raw)| {
            let risk_level = raw.risk_tier();
            serving::record_prediction(risk_level);
            IndexedPrediction {
                index: *index,
                result: PredictionResult {
                    prediction: raw.label,
                    probability: raw.probability,
                    risk_level,
                    confidence: raw.confidence,
                    timestamp,
                    request_id: request_id.to_string(),
                    top_contributors: None,
                },
            }
        })
        .collect();

    info!(
        request_id = %request_id,
        total,
        scored = predictions.len(),
        rejected = errors.len(),
        "batch prediction complete"
    );

    Ok(BatchPrediction {
        predictions,
        errors,
        total,
        timestamp,
        request_id: request_id.to_string(),
    })
}

/// Any failure past validation is an inference failure to the caller
fn as_inference(e: Error) -> Error {
    match e {
        Error::Inference(_) => e,
        other => Error::inference(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::ApiKey;
    use crate::config::GatewayConfig;
    use cardioguard_model::{ModelHost, ModelPaths};
    use metrics_exporter_prometheus::PrometheusBuilder;
    use serde_json::json;

    fn state_without_model() -> AppState {
        AppState::new(
            GatewayConfig::default(),
            ModelHost::empty(ModelPaths::new("/nonexistent/best_model.json")),
            ApiKey::new("test-key"),
        )
    }

    fn valid_record() -> Value {
        json!({
            "age": 63, "sex": 1, "cp": 3, "trestbps": 145, "chol": 233,
            "fbs": 1, "restecg": 0, "thalach": 150, "exang": 0,
            "oldpeak": 2.3, "slope": 0, "ca": 0, "thal": 1
        })
    }

    #[tokio::test]
    async fn test_invalid_single_is_rejected_before_model_lookup() {
        let state = state_without_model();
        let err = predict_single(&state, &json!({"age": 63}), &RequestId::generate())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn test_valid_single_without_model_is_unavailable() {
        let state = state_without_model();
        let err = predict_single(&state, &valid_record(), &RequestId::generate())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ModelUnavailable));
    }

    #[tokio::test]
    async fn test_batch_bounds() {
        let state = state_without_model();
        let id = RequestId::generate();

        let err = predict_batch(&state, &[], &id).await.unwrap_err();
        assert!(matches!(err, Error::BatchSize { actual: 0, .. }));

        let oversized = vec![valid_record(); MAX_BATCH + 1];
        let err = predict_batch(&state, &oversized, &id).await.unwrap_err();
        assert!(matches!(err, Error::BatchSize { actual: 101, .. }));
    }

    #[tokio::test]
    async fn test_all_invalid_batch_skips_model() {
        let state = state_without_model();
        let id = RequestId::generate();
        let instances = vec![json!({"age": 63}), json!("not a record")];

        let batch = predict_batch(&state, &instances, &id).await.unwrap();
        assert!(batch.predictions.is_empty());
        assert_eq!(batch.total, 2);
        assert_eq!(batch.errors.len(), 2);
        assert_eq!(batch.errors[0].index, 0);
        assert_eq!(batch.errors[1].index, 1);
        assert_eq!(batch.request_id, id.to_string());
    }

    #[test]
    fn test_batch_item_rejections_are_counted() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        let state = state_without_model();
        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let instances = vec![json!({"age": 63}), valid_record(), json!(null)];

        metrics::with_local_recorder(&recorder, || {
            // The valid item fails on the missing model after validation
            let err = rt
                .block_on(predict_batch(&state, &instances, &RequestId::generate()))
                .unwrap_err();
            assert!(matches!(err, Error::ModelUnavailable));
        });

        let rendered = handle.render();
        assert!(rendered.contains("cardioguard_rejections_total{reason=\"validation\"} 2"));
    }
}
