//! Per-request correlation ids and timing headers

use axum::{
    extract::Request,
    http::HeaderValue,
    middleware::Next,
    response::Response,
};
use std::fmt;
use std::time::Instant;

pub const X_REQUEST_ID: &str = "x-request-id";
pub const X_PROCESS_TIME: &str = "x-process-time";

/// Correlation id assigned to every inbound request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestId(String);

impl RequestId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::generate()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Middleware: assign a request id and report processing time
pub async fn assign_request_id(mut req: Request, next: Next) -> Response {
    let start = Instant::now();
    let request_id = RequestId::generate();
    req.extensions_mut().insert(request_id.clone());

    let mut response = next.run(req).await;

    let headers = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(request_id.as_str()) {
        headers.insert(X_REQUEST_ID, value);
    }
    let elapsed = format!("{:.6}", start.elapsed().as_secs_f64());
    if let Ok(value) = HeaderValue::from_str(&elapsed) {
        headers.insert(X_PROCESS_TIME, value);
    }

    response
}
