//! Mapping of gateway errors onto HTTP responses

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use cardioguard_core::Error;
use cardioguard_telemetry::serving;
use serde_json::json;
use tracing::error;

use crate::request_id::RequestId;

/// An [`Error`] bound to the request it occurred in
#[derive(Debug)]
pub struct ApiError {
    error: Error,
    request_id: String,
}

impl ApiError {
    pub fn new(error: Error, request_id: &RequestId) -> Self {
        Self {
            error,
            request_id: request_id.to_string(),
        }
    }

    pub fn error(&self) -> &Error {
        &self.error
    }

    /// HTTP status for an error class
    pub fn status_for(error: &Error) -> StatusCode {
        match error {
            Error::Validation(_) | Error::BatchSize { .. } | Error::Serialization(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            Error::Auth(_) => StatusCode::FORBIDDEN,
            Error::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Error::ModelUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            Error::ArtifactNotFound(_) => StatusCode::NOT_FOUND,
            Error::Inference(_) | Error::Artifact(_) | Error::Config(_) | Error::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = Self::status_for(&self.error);
        serving::record_rejection(&self.error);

        let detail = match &self.error {
            Error::Validation(_) => "Validation failed".to_string(),
            Error::Auth(msg) => msg.clone(),
            Error::ModelUnavailable => "Model is not loaded".to_string(),
            Error::ArtifactNotFound(_) => "Model file not found".to_string(),
            Error::Inference(msg) => {
                error!(request_id = %self.request_id, error = %msg, "prediction failed");
                "Internal prediction error".to_string()
            }
            Error::Artifact(msg) => {
                error!(request_id = %self.request_id, error = %msg, "model reload failed");
                format!("Model reload failed: {}", msg)
            }
            Error::Config(msg) => {
                error!(request_id = %self.request_id, error = %msg, "configuration error");
                "Internal server error".to_string()
            }
            Error::Io(e) => {
                error!(request_id = %self.request_id, error = %e, "io error");
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        let mut body = json!({
            "detail": detail,
            "request_id": self.request_id,
        });
        if let Error::Validation(errors) = &self.error {
            body["errors"] = json!(errors);
        }

        let retry_after = match &self.error {
            Error::RateLimited { retry_after_secs } => {
                body["retry_after_secs"] = json!(retry_after_secs);
                Some(*retry_after_secs)
            }
            _ => None,
        };

        let mut response = (status, Json(body)).into_response();
        if let Some(secs) = retry_after {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}
