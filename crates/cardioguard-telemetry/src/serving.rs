//! Serving metrics recorded by the gateway
//!
//! Thin wrappers over the `metrics` facade so metric names and label sets
//! are defined in one place. Nothing is recorded until a recorder is
//! installed.

use cardioguard_core::{Error, RiskTier};

pub const REQUESTS_TOTAL: &str = "cardioguard_requests_total";
pub const PREDICTIONS_TOTAL: &str = "cardioguard_predictions_total";
pub const REJECTIONS_TOTAL: &str = "cardioguard_rejections_total";
pub const INFERENCE_LATENCY_US: &str = "cardioguard_inference_latency_us";
pub const MODEL_RELOADS_TOTAL: &str = "cardioguard_model_reloads_total";
pub const MODEL_LOADED: &str = "cardioguard_model_loaded";

/// Register descriptions with the installed recorder
pub fn describe_metrics() {
    metrics::describe_counter!(REQUESTS_TOTAL, "Total number of requests by endpoint");
    metrics::describe_counter!(
        PREDICTIONS_TOTAL,
        "Total number of predictions served by risk level"
    );
    metrics::describe_counter!(
        REJECTIONS_TOTAL,
        "Total number of rejected requests or batch items by reason"
    );
    metrics::describe_histogram!(
        INFERENCE_LATENCY_US,
        metrics::Unit::Microseconds,
        "Model inference latency in microseconds by mode"
    );
    metrics::describe_counter!(MODEL_RELOADS_TOTAL, "Model reload attempts by outcome");
    metrics::describe_gauge!(MODEL_LOADED, "Whether a model snapshot is active (1) or not (0)");
}

pub fn record_request(endpoint: &'static str) {
    metrics::counter!(REQUESTS_TOTAL, "endpoint" => endpoint).increment(1);
}

pub fn record_prediction(tier: RiskTier) {
    metrics::counter!(PREDICTIONS_TOTAL, "risk_level" => tier.as_str()).increment(1);
}

pub fn record_rejection(error: &Error) {
    metrics::counter!(REJECTIONS_TOTAL, "reason" => error.kind()).increment(1);
}

/// Record a batch item dropped by validation; the batch itself still succeeds
pub fn record_item_rejection() {
    metrics::counter!(REJECTIONS_TOTAL, "reason" => "validation").increment(1);
}

/// Record one inference call; `mode` is `single` or `batch`
pub fn record_inference_latency(mode: &'static str, latency_us: u64) {
    metrics::histogram!(INFERENCE_LATENCY_US, "mode" => mode).record(latency_us as f64);
}

pub fn record_reload(success: bool) {
    let outcome = if success { "success" } else { "failure" };
    metrics::counter!(MODEL_RELOADS_TOTAL, "outcome" => outcome).increment(1);
}

pub fn set_model_loaded(loaded: bool) {
    metrics::gauge!(MODEL_LOADED).set(if loaded { 1.0 } else { 0.0 });
}
