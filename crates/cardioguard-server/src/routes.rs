//! HTTP routes and handlers

use axum::{
    body::Bytes,
    extract::{Request, State},
    http::{header, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use cardioguard_core::{Error, PredictionResult, FEATURE_ORDER};
use cardioguard_model::ModelStatus;
use cardioguard_telemetry::serving;
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{json, Value};
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing::{info, info_span, warn, Span};

use crate::auth::require_api_key;
use crate::error::ApiError;
use crate::pipeline::{self, BatchPrediction, BatchRequest};
use crate::request_id::{assign_request_id, RequestId};
use crate::state::AppState;

pub const SERVICE_NAME: &str = "Cardiovascular Risk Prediction API";

const ENDPOINTS: [&str; 6] = [
    "/health",
    "/predict",
    "/batch-predict",
    "/model/info",
    "/model/reload",
    "/metrics",
];

pub fn create_router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/model/info", get(model_info))
        .route("/metrics", get(metrics));

    let protected_routes = Router::new()
        .route("/predict", post(predict))
        .route("/batch-predict", post(batch_predict))
        .route("/model/reload", post(reload_model))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_api_key));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .fallback(fallback)
        .layer(RequestBodyLimitLayer::new(state.config.server.max_body_bytes))
        .layer(TraceLayer::new_for_http().make_span_with(request_span))
        .layer(CorsLayer::permissive())
        .layer(middleware::from_fn(assign_request_id))
        .with_state(state)
}

fn request_span(req: &Request) -> Span {
    let request_id = req
        .extensions()
        .get::<RequestId>()
        .map(|id| id.to_string())
        .unwrap_or_default();
    info_span!(
        "request",
        method = %req.method(),
        path = %req.uri().path(),
        request_id = %request_id,
    )
}

/// Decode a JSON body, reporting malformed input as a 422
fn parse_body<T: DeserializeOwned>(body: &Bytes, request_id: &RequestId) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|e| ApiError::new(Error::from(e), request_id))
}

async fn root() -> Json<Value> {
    serving::record_request("root");
    Json(json!({
        "message": SERVICE_NAME,
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": ENDPOINTS,
    }))
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    model_loaded: bool,
    version: String,
    timestamp: DateTime<Utc>,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    serving::record_request("health");
    let status = state.host.status();
    Json(HealthResponse {
        status: if status.loaded { "healthy" } else { "degraded" },
        model_loaded: status.loaded,
        version: status.version,
        timestamp: Utc::now(),
    })
}

#[derive(Debug, Serialize)]
struct ModelInfo {
    #[serde(flatten)]
    status: ModelStatus,

    /// Input features in schema order
    features: Vec<&'static str>,

    /// Features after preprocessing, as the estimator sees them
    #[serde(skip_serializing_if = "Option::is_none")]
    model_features: Option<Vec<String>>,

    training_metadata: Option<Value>,
}

async fn model_info(State(state): State<AppState>) -> Json<ModelInfo> {
    serving::record_request("model_info");
    let snapshot = state.host.snapshot().ok();
    Json(ModelInfo {
        status: state.host.status(),
        features: FEATURE_ORDER.to_vec(),
        model_features: snapshot
            .as_ref()
            .map(|s| s.preprocessor().output_names().to_vec()),
        training_metadata: snapshot.and_then(|s| s.metadata().training_metadata.clone()),
    })
}

async fn metrics(State(state): State<AppState>) -> Response {
    match &state.metrics_handle {
        Some(handle) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            handle.render(),
        )
            .into_response(),
        None => (StatusCode::SERVICE_UNAVAILABLE, "metrics recorder not installed").into_response(),
    }
}

async fn reload_model(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
) -> Result<Json<Value>, ApiError> {
    serving::record_request("reload");
    info!(request_id = %request_id, "model reload requested");

    match state.host.reload().await {
        Ok(_) => {
            serving::record_reload(true);
            serving::set_model_loaded(true);
            Ok(Json(json!({
                "message": "Model reloaded",
                "metadata": state.host.status(),
            })))
        }
        Err(e) => {
            serving::record_reload(false);
            serving::set_model_loaded(state.host.is_loaded());
            Err(ApiError::new(e, &request_id))
        }
    }
}

async fn predict(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    body: Bytes,
) -> Result<Json<PredictionResult>, ApiError> {
    serving::record_request("predict");
    let candidate: Value = parse_body(&body, &request_id)?;

    pipeline::predict_single(&state, &candidate, &request_id)
        .await
        .map(Json)
        .map_err(|e| ApiError::new(e, &request_id))
}

async fn batch_predict(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    body: Bytes,
) -> Result<Json<BatchPrediction>, ApiError> {
    serving::record_request("batch_predict");
    let request: BatchRequest = parse_body(&body, &request_id)?;

    pipeline::predict_batch(&state, &request.instances, &request_id)
        .await
        .map(Json)
        .map_err(|e| ApiError::new(e, &request_id))
}

async fn fallback(req: Request) -> Response {
    warn!(path = %req.uri().path(), "no route");
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "detail": "Not Found" })),
    )
        .into_response()
}
